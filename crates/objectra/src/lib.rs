//! Structural object-graph codec.
//!
//! Converts an arbitrary in-memory value graph (primitives, containers,
//! class-like instances, shared/circular references) into a typed,
//! serializable intermediate tree and back, preserving reference identity
//! and cycles. Useful for deep-cloning, cross-process transport, and
//! persistence of heterogeneous graphs that plain structural JSON cannot
//! express.
//!
//! ```
//! use objectra::{duplicate, Registry, Value};
//!
//! let registry = Registry::with_builtins().unwrap();
//! let original = Value::object(vec![]);
//! if let Value::Object(obj) = &original {
//!     obj.borrow_mut().fields.insert("own".to_string(), original.clone());
//! }
//! let copy = duplicate(&registry, &original).unwrap();
//! let inner = copy.obj().unwrap().borrow().fields["own"].clone();
//! assert!(Value::same(&copy, &inner));
//! ```

mod analyzer;
mod backloop;
mod builtins;
mod decoder;
mod encoder;
mod error;
mod model;
mod node;
mod registry;
mod value;

pub use backloop::{Representer, Token};
pub use decoder::{decode, InstantiateBridge};
pub use encoder::{encode, encode_named, SerializeBridge};
pub use error::ObjectraError;
pub use model::{
    compose_from_model, from_model, model_from_json, model_to_json, parse_model, stringify_model,
    to_model, Model, ModelContent,
};
pub use node::{Content, Identifier, Leaf, Node};
pub use registry::{
    Codec, CodecOptions, ConstructFn, GetterFn, InstantiateFn, Registry, SerializeFn, SetterFn,
    TypeDescriptor, TypeTag,
};
pub use value::{Instance, ObjRef, Value};

/// Deep-clone through the codec: `decode(encode(value))`.
pub fn duplicate(registry: &Registry, value: &Value) -> Result<Value, ObjectraError> {
    let node = encode(registry, value)?;
    decode(registry, &node)
}
