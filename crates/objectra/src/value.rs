//! In-memory value graph encoded and reconstructed by the codec.
//!
//! Reference identity is `Rc` pointer identity; cycles are expressible
//! through `RefCell` interior mutability.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::registry::TypeTag;

/// Shared, identity-carrying handle to an [`Instance`].
pub type ObjRef = Rc<RefCell<Instance>>;

/// One value in a graph. Primitives are plain; everything composite is an
/// [`Instance`] behind an [`ObjRef`], so two occurrences of the same `Rc`
/// are the same object.
#[derive(Debug, Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// A reified type/constructor reference. Encodes as an identifier-only
    /// node; the body is never serialized.
    Type(TypeTag),
    Object(ObjRef),
    /// Decode-time sentinel for a reference whose declaration is not yet
    /// built. Never escapes a successful decode.
    Unresolved(u64),
}

/// Composite payload: array elements or entry-protocol entries live in
/// `elements`, named properties in `fields` (insertion order preserved).
#[derive(Debug)]
pub struct Instance {
    pub tag: TypeTag,
    pub elements: Vec<Value>,
    pub fields: IndexMap<String, Value>,
}

impl Instance {
    pub fn new(tag: TypeTag) -> Self {
        Instance {
            tag,
            elements: Vec::new(),
            fields: IndexMap::new(),
        }
    }
}

impl Value {
    pub fn array(items: Vec<Value>) -> Value {
        let mut instance = Instance::new(TypeTag::ARRAY);
        instance.elements = items;
        Value::Object(Rc::new(RefCell::new(instance)))
    }

    pub fn object<I>(fields: I) -> Value
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        Value::instance(TypeTag::OBJECT, fields)
    }

    pub fn instance<I>(tag: TypeTag, fields: I) -> Value
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut instance = Instance::new(tag);
        instance.fields = fields.into_iter().collect();
        Value::Object(Rc::new(RefCell::new(instance)))
    }

    /// A map holds its entries as `[key, value]` array instances.
    pub fn map(pairs: Vec<(Value, Value)>) -> Value {
        let mut instance = Instance::new(TypeTag::MAP);
        instance.elements = pairs
            .into_iter()
            .map(|(k, v)| Value::array(vec![k, v]))
            .collect();
        Value::Object(Rc::new(RefCell::new(instance)))
    }

    pub fn set(items: Vec<Value>) -> Value {
        let mut instance = Instance::new(TypeTag::SET);
        instance.elements = items;
        Value::Object(Rc::new(RefCell::new(instance)))
    }

    pub fn obj(&self) -> Option<&ObjRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Reference identity: objects compare by pointer, primitives by value.
    pub fn same(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Object(x), Value::Object(y)) => Rc::ptr_eq(x, y),
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Int(x), Value::Int(y)) => x == y,
            (Value::Float(x), Value::Float(y)) => x == y || (x.is_nan() && y.is_nan()),
            (Value::String(x), Value::String(y)) => x == y,
            (Value::Type(x), Value::Type(y)) => x == y,
            _ => false,
        }
    }

    /// Structural equality ignoring identity. Cyclic graphs terminate:
    /// a pair of objects already under comparison is assumed equal.
    pub fn deep_equal(a: &Value, b: &Value) -> bool {
        fn go(a: &Value, b: &Value, seen: &mut HashSet<(usize, usize)>) -> bool {
            match (a, b) {
                (Value::Object(x), Value::Object(y)) => {
                    let pair = (Rc::as_ptr(x) as usize, Rc::as_ptr(y) as usize);
                    if !seen.insert(pair) {
                        return true;
                    }
                    let (x, y) = (x.borrow(), y.borrow());
                    if x.tag != y.tag
                        || x.elements.len() != y.elements.len()
                        || x.fields.len() != y.fields.len()
                    {
                        return false;
                    }
                    for (l, r) in x.elements.iter().zip(y.elements.iter()) {
                        if !go(l, r, seen) {
                            return false;
                        }
                    }
                    for ((lk, lv), (rk, rv)) in x.fields.iter().zip(y.fields.iter()) {
                        if lk != rk || !go(lv, rv, seen) {
                            return false;
                        }
                    }
                    true
                }
                _ => Value::same(a, b),
            }
        }
        go(a, b, &mut HashSet::new())
    }
}
