//! Value graph -> node tree.
//!
//! Each call opens one isolated session: the analyzer's results, the
//! reference id table, and the already-declared set. Shared/circular
//! references produce one declaration (hoisted to the common-ancestor
//! point) and consumer stubs everywhere else.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::analyzer::{analyze, GraphAnalysis, RefKey};
use crate::error::ObjectraError;
use crate::node::{Identifier, Leaf, Node};
use crate::registry::{Codec, Registry, SerializeFn, TypeTag};
use crate::value::Value;

/// Encodes a value graph into its intermediate node tree.
pub fn encode(registry: &Registry, value: &Value) -> Result<Node, ObjectraError> {
    let mut session = EncodeSession::new(registry, value);
    session.encode_value(value, true)
}

/// Encodes through an ad hoc named codec instead of the value's type.
pub fn encode_named(
    registry: &Registry,
    name: &str,
    overload: Option<u32>,
    value: &Value,
) -> Result<Node, ObjectraError> {
    let codec = registry.get(&Identifier::Name(name.to_string()), overload)?;
    let serialize = codec
        .serialize
        .clone()
        .ok_or_else(|| ObjectraError::SerializeMethodMissing(name.to_string()))?;
    let mut session = EncodeSession::new(registry, value);
    let mut bridge = SerializeBridge {
        value: value.clone(),
        codec: codec.clone(),
        session: &mut session,
    };
    let content = serialize(&mut bridge)?;
    Ok(Node {
        identifier: Some(Identifier::Name(name.to_string())),
        overload: codec.overload,
        content: Some(content),
        ..Node::default()
    })
}

pub(crate) struct EncodeSession<'r> {
    registry: &'r Registry,
    analysis: GraphAnalysis,
    ids: HashMap<RefKey, u64>,
    declared: HashSet<RefKey>,
    in_progress: HashSet<RefKey>,
    next_id: u64,
}

impl<'r> EncodeSession<'r> {
    fn new(registry: &'r Registry, root: &Value) -> EncodeSession<'r> {
        EncodeSession {
            registry,
            analysis: analyze(registry, root),
            ids: HashMap::new(),
            declared: HashSet::new(),
            in_progress: HashSet::new(),
            next_id: 0,
        }
    }

    pub(crate) fn encode_value(
        &mut self,
        value: &Value,
        is_root: bool,
    ) -> Result<Node, ObjectraError> {
        match value {
            Value::Undefined => Ok(Node::undefined()),
            Value::Null => Ok(Node::null()),
            Value::Bool(b) => Ok(Node::leaf(TypeTag::BOOLEAN, Leaf::Bool(*b))),
            Value::Int(i) => Ok(Node::leaf(TypeTag::NUMBER, Leaf::Int(*i))),
            Value::Float(f) => Ok(Node::leaf(TypeTag::NUMBER, Leaf::Float(*f))),
            Value::String(s) => Ok(Node::leaf(TypeTag::STRING, Leaf::String(s.clone()))),
            // Only the type reference is serialized, never a body.
            Value::Type(tag) => Ok(Node {
                identifier: Some(Identifier::Type(*tag)),
                ..Node::default()
            }),
            Value::Unresolved(_) => Err(ObjectraError::InvalidReferenceInjectionPath),
            Value::Object(obj) => {
                let key = Rc::as_ptr(obj) as RefKey;
                let tag = obj.borrow().tag;
                self.encode_object(value, key, tag, is_root)
            }
        }
    }

    fn encode_object(
        &mut self,
        value: &Value,
        key: RefKey,
        tag: TypeTag,
        is_root: bool,
    ) -> Result<Node, ObjectraError> {
        let type_name = self.registry.type_name(tag).to_string();
        let repeating = self.analysis.repeating.contains(&key);

        if repeating && self.declared.contains(&key) {
            return Ok(Node::consumer(self.ids[&key]));
        }
        if self.in_progress.contains(&key) {
            return Err(ObjectraError::SelfSerialization(type_name));
        }

        let codec = self
            .registry
            .codec_for(tag)
            .ok_or_else(|| ObjectraError::CodecMatchNotFound(type_name.clone()))?;
        let serialize = self
            .resolve_serializer(&codec, tag)
            .ok_or(ObjectraError::CodecMatchNotFound(type_name))?;

        // Origin occurrence: declare before descending so re-encounters
        // inside this subtree become consumer stubs.
        let reference_id = if repeating {
            let id = self.next_id;
            self.next_id += 1;
            self.ids.insert(key, id);
            self.declared.insert(key);
            Some(id)
        } else {
            None
        };

        let hoisted = self.encode_hoisted(key, is_root)?;

        self.in_progress.insert(key);
        let mut bridge = SerializeBridge {
            value: value.clone(),
            codec: codec.clone(),
            session: self,
        };
        let content = serialize(&mut bridge);
        self.in_progress.remove(&key);

        Ok(Node {
            identifier: Some(codec.identifier.clone()),
            overload: codec.overload,
            content: Some(content?),
            reference_id,
            hoisted,
        })
    }

    /// Declarations whose computed hoist parent is this value, encoded
    /// ahead of its natural content.
    fn encode_hoisted(&mut self, key: RefKey, is_root: bool) -> Result<Vec<Node>, ObjectraError> {
        let due: Vec<RefKey> = self
            .analysis
            .order
            .iter()
            .copied()
            .filter(|candidate| match self.analysis.hoist_parent.get(candidate) {
                Some(Some(parent)) => *parent == key,
                Some(None) => is_root,
                None => false,
            })
            .collect();
        let mut hoisted = Vec::new();
        for candidate in due {
            if self.declared.contains(&candidate) || candidate == key {
                continue;
            }
            let value = match self.analysis.values.get(&candidate) {
                Some(value) => value.clone(),
                None => continue,
            };
            hoisted.push(self.encode_value(&value, false)?);
        }
        Ok(hoisted)
    }

    fn resolve_serializer(&self, codec: &Rc<Codec>, tag: TypeTag) -> Option<SerializeFn> {
        if let Some(serialize) = &codec.serialize {
            return Some(serialize.clone());
        }
        self.registry
            .find_ancestors(tag)
            .into_iter()
            .find_map(|ancestor| ancestor.serialize.clone())
    }
}

/// Callback view of the running encode session: the instance being
/// serialized, its resolved codec, and re-entry into the session so
/// nested values share the id table and hoisting state.
pub struct SerializeBridge<'s, 'r> {
    pub value: Value,
    pub codec: Rc<Codec>,
    session: &'s mut EncodeSession<'r>,
}

impl SerializeBridge<'_, '_> {
    pub fn serialize(&mut self, value: &Value) -> Result<Node, ObjectraError> {
        self.session.encode_value(value, false)
    }

    /// Own property keys and values minus the codec's exclusion mask.
    pub fn masked_fields(&self) -> Vec<(String, Value)> {
        let obj = match self.value.obj() {
            Some(obj) => obj,
            None => return Vec::new(),
        };
        let instance = obj.borrow();
        self.session
            .registry
            .masked_properties(&instance, &self.codec)
            .into_iter()
            .filter_map(|key| {
                instance
                    .fields
                    .get(&key)
                    .map(|value| (key.clone(), value.clone()))
            })
            .collect()
    }

    /// Entries of an entry-protocol instance, through the codec's getter
    /// when one is configured.
    pub fn entries(&self) -> Vec<Value> {
        let obj = match self.value.obj() {
            Some(obj) => obj,
            None => return Vec::new(),
        };
        let instance = obj.borrow();
        match &self.codec.getter {
            Some(getter) => getter(&instance),
            None => instance.elements.clone(),
        }
    }

    /// Positional elements of the instance (array payload).
    pub fn elements(&self) -> Vec<Value> {
        match self.value.obj() {
            Some(obj) => obj.borrow().elements.clone(),
            None => Vec::new(),
        }
    }
}
