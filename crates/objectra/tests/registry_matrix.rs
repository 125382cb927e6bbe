//! Registry and inheritance matrix: ancestor-codec fallback for types
//! without their own codec, codec lookup failures, and the constructor
//! arity rules.

use std::rc::Rc;

use objectra::{
    decode, duplicate, encode, CodecOptions, Content, Identifier, Leaf, Node, ObjectraError,
    Registry, TypeTag, Value,
};

fn field(value: &Value, key: &str) -> Value {
    value.obj().expect("expected an object").borrow().fields[key].clone()
}

// ---------------------------------------------------------------------------
// Ancestor fallback
// ---------------------------------------------------------------------------

fn animal_registry() -> (Registry, TypeTag, TypeTag) {
    let mut registry = Registry::with_builtins().unwrap();
    let animal = registry
        .register_type("Animal", Some(TypeTag::OBJECT), 0, true)
        .unwrap();
    registry.set_construct(animal, Rc::new(move |_| Ok(Value::instance(animal, vec![]))));
    registry
        .register_with(
            Identifier::Type(animal),
            None,
            CodecOptions {
                property_exclusion_mask: vec!["scratchpad".to_string()],
                ..CodecOptions::default()
            },
        )
        .unwrap();
    let dog = registry.register_type("Dog", Some(animal), 0, true).unwrap();
    registry.set_construct(dog, Rc::new(move |_| Ok(Value::instance(dog, vec![]))));
    (registry, animal, dog)
}

#[test]
fn codecless_subclass_round_trips_through_its_ancestors() {
    let (registry, _, dog) = animal_registry();
    let rex = Value::instance(
        dog,
        vec![
            ("name".to_string(), Value::String("Rex".to_string())),
            ("tricks".to_string(), Value::array(vec![Value::String("roll".to_string())])),
        ],
    );
    let copy = duplicate(&registry, &rex).unwrap();
    assert_eq!(copy.obj().unwrap().borrow().tag, dog);
    assert!(Value::deep_equal(&rex, &copy));
    assert!(!Value::same(&rex, &copy));
}

#[test]
fn subclass_node_carries_the_subclass_identifier() {
    let (registry, _, dog) = animal_registry();
    let rex = Value::instance(dog, vec![("name".to_string(), Value::String("Rex".to_string()))]);
    let node = encode(&registry, &rex).unwrap();
    assert_eq!(node.identifier, Some(Identifier::Type(dog)));
}

#[test]
fn exclusion_mask_is_inherited_by_the_subclass() {
    let (registry, _, dog) = animal_registry();
    let rex = Value::instance(
        dog,
        vec![
            ("name".to_string(), Value::String("Rex".to_string())),
            ("scratchpad".to_string(), Value::Int(99)),
        ],
    );
    let node = encode(&registry, &rex).unwrap();
    match &node.content {
        Some(Content::Map(fields)) => {
            assert!(fields.contains_key("name"));
            assert!(!fields.contains_key("scratchpad"));
        }
        other => panic!("expected map content, got {other:?}"),
    }
}

#[test]
fn cycle_through_a_subclass_instance_is_preserved() {
    let (registry, _, dog) = animal_registry();
    let rex = Value::instance(dog, vec![]);
    if let Value::Object(obj) = &rex {
        obj.borrow_mut().fields.insert("buddy".to_string(), rex.clone());
    }
    let copy = duplicate(&registry, &rex).unwrap();
    assert!(Value::same(&copy, &field(&copy, "buddy")));
    assert_eq!(copy.obj().unwrap().borrow().tag, dog);
}

// ---------------------------------------------------------------------------
// Lookup failures
// ---------------------------------------------------------------------------

#[test]
fn type_outside_any_codec_chain_cannot_encode() {
    let mut registry = Registry::with_builtins().unwrap();
    let orphan = registry.register_type("Orphan", None, 0, true).unwrap();
    assert!(matches!(
        encode(&registry, &Value::instance(orphan, vec![])),
        Err(ObjectraError::CodecMatchNotFound(name)) if name == "Orphan"
    ));
}

#[test]
fn get_of_an_unregistered_codec_fails() {
    let registry = Registry::with_builtins().unwrap();
    assert!(matches!(
        registry.get(&Identifier::Name("missing".to_string()), None),
        Err(ObjectraError::CodecNotFound(name)) if name == "missing"
    ));
}

// ---------------------------------------------------------------------------
// Constructor arity rules
// ---------------------------------------------------------------------------

#[test]
fn multi_argument_type_without_strategy_cannot_decode() {
    let mut registry = Registry::with_builtins().unwrap();
    let pair = registry
        .register_type("Pair", Some(TypeTag::OBJECT), 2, true)
        .unwrap();
    registry.register(Identifier::Type(pair), None).unwrap();
    let node = encode(
        &registry,
        &Value::instance(pair, vec![("a".to_string(), Value::Int(1))]),
    )
    .unwrap();
    assert!(matches!(
        decode(&registry, &node),
        Err(ObjectraError::InvalidConstructorArity(name)) if name == "Pair"
    ));
}

#[test]
fn passthrough_config_on_a_multi_argument_type_is_rejected() {
    let mut registry = Registry::with_builtins().unwrap();
    let pair = registry
        .register_type("Wide", Some(TypeTag::OBJECT), 2, true)
        .unwrap();
    registry.register(Identifier::Type(pair), None).unwrap();
    assert!(matches!(
        registry.configure(
            &Identifier::Type(pair),
            None,
            CodecOptions {
                argument_passthrough: true,
                ..CodecOptions::default()
            },
        ),
        Err(ObjectraError::InvalidConstructorArity(name)) if name == "Wide"
    ));
}

#[test]
fn constructor_rejecting_its_argument_surfaces_the_message() {
    let registry = Registry::with_builtins().unwrap();
    let node = Node::leaf(TypeTag::NUMBER, Leaf::String("not-a-number".to_string()));
    match decode(&registry, &node) {
        Err(ObjectraError::InvalidConstructorArguments { type_name, message }) => {
            assert_eq!(type_name, "Number");
            assert!(message.contains("not-a-number"));
        }
        other => panic!("expected constructor rejection, got {other:?}"),
    }
}

#[test]
fn whole_value_passthrough_feeds_the_single_argument_constructor() {
    let mut registry = Registry::with_builtins().unwrap();
    let wrapper = registry
        .register_type("Wrapper", Some(TypeTag::OBJECT), 1, true)
        .unwrap();
    // The single argument is the aggregate of the serialized properties.
    registry.set_construct(
        wrapper,
        Rc::new(move |args| match args.first().and_then(Value::obj) {
            Some(aggregate) => {
                let inner = aggregate
                    .borrow()
                    .fields
                    .get("inner")
                    .cloned()
                    .unwrap_or(Value::Undefined);
                Ok(Value::instance(
                    wrapper,
                    vec![("inner".to_string(), inner)],
                ))
            }
            None => Err("expected an aggregate argument".to_string()),
        }),
    );
    registry
        .register_with(
            Identifier::Type(wrapper),
            None,
            CodecOptions {
                argument_passthrough: true,
                ..CodecOptions::default()
            },
        )
        .unwrap();

    let original = Value::instance(
        wrapper,
        vec![(
            "inner".to_string(),
            Value::object(vec![("n".to_string(), Value::Int(4))]),
        )],
    );
    let copy = duplicate(&registry, &original).unwrap();
    assert_eq!(copy.obj().unwrap().borrow().tag, wrapper);
    let inner = field(&copy, "inner");
    assert!(Value::deep_equal(
        &inner,
        &field(&original, "inner"),
    ));
}
