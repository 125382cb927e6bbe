//! Built-in type descriptors and codecs.
//!
//! The arena is always seeded with the core types so the `TypeTag`
//! constants stay valid; codecs are installed by
//! [`Registry::with_builtins`].

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::backloop::Representer;
use crate::error::ObjectraError;
use crate::node::{Content, Identifier};
use crate::registry::{CodecOptions, InstantiateFn, Registry, SerializeFn, SetterFn, TypeTag};
use crate::value::{Instance, Value};

pub(crate) fn install_types(registry: &mut Registry) {
    // Order must match the TypeTag constants.
    let _ = registry.register_type("Object", None, 0, true);
    for (name, arity) in [("String", 1), ("Boolean", 1), ("Number", 1)] {
        let _ = registry.register_type(name, Some(TypeTag::OBJECT), arity, true);
    }
    for name in ["Array", "Map", "Set"] {
        let _ = registry.register_type(name, Some(TypeTag::OBJECT), 0, true);
    }

    registry.set_construct(TypeTag::OBJECT, Rc::new(|_| Ok(Value::object(Vec::new()))));
    registry.set_construct(
        TypeTag::STRING,
        Rc::new(|args| match args.first() {
            Some(Value::String(s)) => Ok(Value::String(s.clone())),
            _ => Err("expected a string argument".to_string()),
        }),
    );
    registry.set_construct(
        TypeTag::BOOLEAN,
        Rc::new(|args| match args.first() {
            Some(Value::Bool(b)) => Ok(Value::Bool(*b)),
            _ => Err("expected a boolean argument".to_string()),
        }),
    );
    registry.set_construct(
        TypeTag::NUMBER,
        Rc::new(|args| match args.first() {
            Some(Value::Int(i)) => Ok(Value::Int(*i)),
            Some(Value::Float(f)) => Ok(Value::Float(*f)),
            // Non-finite floats travel as strings on the wire.
            Some(Value::String(s)) => s
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| format!("({s}) is not a number")),
            _ => Err("expected a numeric argument".to_string()),
        }),
    );
    registry.set_construct(TypeTag::ARRAY, Rc::new(|_| Ok(Value::array(Vec::new()))));
    registry.set_construct(TypeTag::MAP, Rc::new(|_| Ok(Value::map(Vec::new()))));
    registry.set_construct(TypeTag::SET, Rc::new(|_| Ok(Value::set(Vec::new()))));
}

pub(crate) fn install_codecs(registry: &mut Registry) -> Result<(), ObjectraError> {
    for tag in [TypeTag::STRING, TypeTag::BOOLEAN, TypeTag::NUMBER] {
        registry.register(Identifier::Type(tag), None)?;
    }

    registry.register_with(
        Identifier::Type(TypeTag::OBJECT),
        None,
        CodecOptions {
            serialize: Some(object_serialize()),
            instantiate: Some(object_instantiate()),
            ..CodecOptions::default()
        },
    )?;

    registry.register_with(
        Identifier::Type(TypeTag::ARRAY),
        None,
        CodecOptions {
            serialize: Some(array_serialize()),
            instantiate: Some(array_instantiate()),
            ..CodecOptions::default()
        },
    )?;

    registry.register_with(
        Identifier::Type(TypeTag::MAP),
        None,
        CodecOptions {
            serialize: Some(entries_serialize()),
            use_entry_protocol: true,
            entry_depth: 2,
            setter: Some(push_entry()),
            ..CodecOptions::default()
        },
    )?;

    registry.register_with(
        Identifier::Type(TypeTag::SET),
        None,
        CodecOptions {
            serialize: Some(entries_serialize()),
            use_entry_protocol: true,
            entry_depth: 1,
            setter: Some(push_entry()),
            ..CodecOptions::default()
        },
    )?;

    Ok(())
}

fn object_serialize() -> SerializeFn {
    Rc::new(|bridge| {
        let mut map = IndexMap::new();
        for (key, child) in bridge.masked_fields() {
            map.insert(key, bridge.serialize(&child)?);
        }
        Ok(Content::Map(map))
    })
}

/// Populates the pre-allocated target when one is handed in, so cycle
/// back-references within the subtree resolve to the same instance.
fn object_instantiate() -> InstantiateFn {
    Rc::new(|bridge| match bridge.representer.clone() {
        Representer::Map(_, fields) => {
            let target = match &bridge.instance {
                Some(obj) => obj.clone(),
                None => Rc::new(RefCell::new(Instance::new(TypeTag::OBJECT))),
            };
            for (key, child) in fields {
                let value = bridge.instantiate(child.token())?;
                target.borrow_mut().fields.insert(key, value);
            }
            Ok(Value::Object(target))
        }
        Representer::List(_, items) => {
            let target = match &bridge.instance {
                Some(obj) => obj.clone(),
                None => Rc::new(RefCell::new(Instance::new(TypeTag::ARRAY))),
            };
            for child in items {
                let value = bridge.instantiate(child.token())?;
                target.borrow_mut().elements.push(value);
            }
            Ok(Value::Object(target))
        }
        Representer::Endpoint(token) => bridge.value(token),
    })
}

fn array_serialize() -> SerializeFn {
    Rc::new(|bridge| {
        let mut items = Vec::new();
        for element in bridge.elements() {
            items.push(bridge.serialize(&element)?);
        }
        Ok(Content::List(items))
    })
}

fn array_instantiate() -> InstantiateFn {
    Rc::new(|bridge| match bridge.representer.clone() {
        Representer::List(_, items) => {
            let target = match &bridge.instance {
                Some(obj) => obj.clone(),
                None => Rc::new(RefCell::new(Instance::new(TypeTag::ARRAY))),
            };
            for child in items {
                let value = bridge.instantiate(child.token())?;
                target.borrow_mut().elements.push(value);
            }
            Ok(Value::Object(target))
        }
        _ => Err(ObjectraError::MalformedModel(
            "array node without list content".into(),
        )),
    })
}

/// Entry-protocol serialization shared by map- and set-like types.
fn entries_serialize() -> SerializeFn {
    Rc::new(|bridge| {
        let mut items = Vec::new();
        for entry in bridge.entries() {
            items.push(bridge.serialize(&entry)?);
        }
        Ok(Content::List(items))
    })
}

fn push_entry() -> SetterFn {
    Rc::new(|instance: &mut Instance, entry: Value| {
        instance.elements.push(entry);
        Ok(())
    })
}
