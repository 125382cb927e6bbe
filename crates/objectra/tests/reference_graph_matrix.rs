//! Shared-reference and cycle matrix: identity preservation across
//! duplication, declaration/consumer tree shape, and constructor-argument
//! injection for referenced instances.

use std::rc::Rc;

use objectra::{
    decode, duplicate, encode, CodecOptions, Content, Identifier, Registry, TypeTag, Value,
};

fn registry() -> Registry {
    Registry::with_builtins().expect("builtin registration must succeed")
}

fn field(value: &Value, key: &str) -> Value {
    value.obj().expect("expected an object").borrow().fields[key].clone()
}

fn element(value: &Value, index: usize) -> Value {
    value.obj().expect("expected an object").borrow().elements[index].clone()
}

// ---------------------------------------------------------------------------
// Identity preservation
// ---------------------------------------------------------------------------

#[test]
fn shared_sibling_is_duplicated_once() {
    let registry = registry();
    let shared = Value::object(vec![("n".to_string(), Value::Int(1))]);
    let root = Value::object(vec![
        ("reference".to_string(), shared.clone()),
        ("reference2".to_string(), shared.clone()),
    ]);
    let copy = duplicate(&registry, &root).unwrap();
    let a = field(&copy, "reference");
    let b = field(&copy, "reference2");
    assert!(Value::same(&a, &b));
    assert!(!Value::same(&a, &shared));
    assert!(Value::deep_equal(&a, &shared));
}

#[test]
fn self_cycle_survives_duplication() {
    let registry = registry();
    let root = Value::object(vec![]);
    if let Value::Object(obj) = &root {
        obj.borrow_mut().fields.insert("own".to_string(), root.clone());
    }
    let copy = duplicate(&registry, &root).unwrap();
    assert!(Value::same(&copy, &field(&copy, "own")));
    assert!(!Value::same(&copy, &root));
}

#[test]
fn mutual_cycle_survives_duplication() {
    let registry = registry();
    let a = Value::object(vec![]);
    let b = Value::object(vec![]);
    if let (Value::Object(x), Value::Object(y)) = (&a, &b) {
        x.borrow_mut().fields.insert("child".to_string(), b.clone());
        y.borrow_mut().fields.insert("parent".to_string(), a.clone());
    }
    let copy = duplicate(&registry, &a).unwrap();
    let child = field(&copy, "child");
    assert!(Value::same(&field(&child, "parent"), &copy));
}

#[test]
fn interconnected_references_keep_their_identities() {
    let registry = registry();
    let low = Value::object(vec![("name".to_string(), Value::String("low".to_string()))]);
    let mid = Value::object(vec![]);
    let high = Value::object(vec![]);
    if let (Value::Object(m), Value::Object(h)) = (&mid, &high) {
        m.borrow_mut().fields.insert("low".to_string(), low.clone());
        m.borrow_mut().fields.insert("high".to_string(), high.clone());
        h.borrow_mut().fields.insert("low".to_string(), low.clone());
        h.borrow_mut().fields.insert("mid".to_string(), mid.clone());
    }
    let root = Value::object(vec![
        ("low".to_string(), low),
        ("mid".to_string(), mid),
        ("high".to_string(), high),
    ]);
    let copy = duplicate(&registry, &root).unwrap();
    let low2 = field(&copy, "low");
    let mid2 = field(&copy, "mid");
    let high2 = field(&copy, "high");
    assert!(Value::same(&field(&mid2, "low"), &low2));
    assert!(Value::same(&field(&high2, "low"), &low2));
    assert!(Value::same(&field(&mid2, "high"), &high2));
    assert!(Value::same(&field(&high2, "mid"), &mid2));
}

#[test]
fn shared_reference_inside_an_entry_container() {
    let registry = registry();
    let child = Value::object(vec![("n".to_string(), Value::Int(5))]);
    let parent = Value::object(vec![
        ("main_child".to_string(), child.clone()),
        ("children".to_string(), Value::set(vec![child.clone()])),
    ]);
    let copy = duplicate(&registry, &parent).unwrap();
    let main_child = field(&copy, "main_child");
    let children = field(&copy, "children");
    assert!(Value::same(&element(&children, 0), &main_child));
}

#[test]
fn map_entry_referencing_the_map_itself() {
    let registry = registry();
    let map = Value::map(vec![]);
    if let Value::Object(obj) = &map {
        let entry = Value::array(vec![Value::String("me".to_string()), map.clone()]);
        obj.borrow_mut().elements.push(entry);
    }
    let copy = duplicate(&registry, &map).unwrap();
    let entry = element(&copy, 0);
    assert!(Value::same(&element(&entry, 1), &copy));
}

#[test]
fn shared_array_inside_two_containers() {
    let registry = registry();
    let shared = Value::array(vec![Value::Int(1), Value::Int(2)]);
    let root = Value::array(vec![shared.clone(), shared.clone()]);
    let copy = duplicate(&registry, &root).unwrap();
    assert!(Value::same(&element(&copy, 0), &element(&copy, 1)));
    assert!(Value::deep_equal(&element(&copy, 0), &shared));
}

// ---------------------------------------------------------------------------
// Tree shape
// ---------------------------------------------------------------------------

#[test]
fn shared_reference_becomes_declaration_plus_consumers() {
    let registry = registry();
    let shared = Value::object(vec![]);
    let root = Value::object(vec![
        ("a".to_string(), shared.clone()),
        ("b".to_string(), shared.clone()),
    ]);
    let node = encode(&registry, &root).unwrap();

    assert_eq!(node.hoisted.len(), 1);
    let declaration = &node.hoisted[0];
    assert!(declaration.is_declaration());
    let id = declaration.reference_id.expect("declaration must carry an id");

    let fields = match &node.content {
        Some(Content::Map(fields)) => fields,
        other => panic!("expected map content, got {other:?}"),
    };
    for key in ["a", "b"] {
        let stub = &fields[key];
        assert!(stub.is_consumer(), "({key}) must be a consumer stub");
        assert_eq!(stub.reference_id, Some(id));
    }
}

#[test]
fn self_cycle_declares_at_the_root_node() {
    let registry = registry();
    let root = Value::object(vec![]);
    if let Value::Object(obj) = &root {
        obj.borrow_mut().fields.insert("own".to_string(), root.clone());
    }
    let node = encode(&registry, &root).unwrap();
    let id = node.reference_id.expect("root must be a declaration");
    assert!(node.hoisted.is_empty());
    match &node.content {
        Some(Content::Map(fields)) => {
            assert!(fields["own"].is_consumer());
            assert_eq!(fields["own"].reference_id, Some(id));
        }
        other => panic!("expected map content, got {other:?}"),
    }
}

#[test]
fn unshared_values_carry_no_reference_ids() {
    let registry = registry();
    let root = Value::object(vec![(
        "inner".to_string(),
        Value::object(vec![("n".to_string(), Value::Int(1))]),
    )]);
    let node = encode(&registry, &root).unwrap();
    assert_eq!(node.reference_id, None);
    assert!(node.hoisted.is_empty());
    match &node.content {
        Some(Content::Map(fields)) => assert_eq!(fields["inner"].reference_id, None),
        other => panic!("expected map content, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Constructor-argument injection
// ---------------------------------------------------------------------------

#[test]
fn referenced_parent_is_injected_through_the_constructor() {
    let mut registry = registry();
    let tag = registry
        .register_type("Child", Some(TypeTag::OBJECT), 1, true)
        .unwrap();
    registry.set_construct(
        tag,
        Rc::new(move |args| {
            Ok(Value::instance(
                tag,
                vec![(
                    "parent".to_string(),
                    args.first().cloned().unwrap_or(Value::Undefined),
                )],
            ))
        }),
    );
    registry
        .register_with(
            Identifier::Type(tag),
            None,
            CodecOptions {
                argument_passthrough_property_keys: vec!["parent".to_string()],
                ..CodecOptions::default()
            },
        )
        .unwrap();

    let parent = Value::object(vec![]);
    let child = Value::instance(tag, vec![("parent".to_string(), parent.clone())]);
    if let (Value::Object(p), Value::Object(c)) = (&parent, &child) {
        p.borrow_mut()
            .fields
            .insert("main_child".to_string(), child.clone());
        p.borrow_mut()
            .fields
            .insert("children".to_string(), Value::set(vec![child.clone()]));
        c.borrow_mut()
            .fields
            .insert("nickname".to_string(), Value::String("kiddo".to_string()));
    }

    let copy = duplicate(&registry, &parent).unwrap();
    let main_child = field(&copy, "main_child");
    assert_eq!(main_child.obj().unwrap().borrow().tag, tag);
    assert!(Value::same(&field(&main_child, "parent"), &copy));
    // Residual fields land after construction.
    assert!(Value::same(
        &field(&main_child, "nickname"),
        &Value::String("kiddo".to_string()),
    ));
    let children = field(&copy, "children");
    assert!(Value::same(&element(&children, 0), &main_child));
}

#[test]
fn decoding_the_same_tree_twice_yields_independent_graphs() {
    let registry = registry();
    let root = Value::object(vec![]);
    if let Value::Object(obj) = &root {
        obj.borrow_mut().fields.insert("own".to_string(), root.clone());
    }
    let node = encode(&registry, &root).unwrap();
    let first = decode(&registry, &node).unwrap();
    let second = decode(&registry, &node).unwrap();
    assert!(Value::same(&first, &field(&first, "own")));
    assert!(Value::same(&second, &field(&second, "own")));
    assert!(!Value::same(&first, &second));
}
