//! Node tree -> value graph.
//!
//! Each call opens one isolated session. Consumer stubs resolve through
//! already-built declarations or hoisted ones built on demand; anything
//! still unresolved becomes a placeholder sentinel recorded with its
//! write path and injected during the final patch pass.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::backloop::{Backloop, Representer, Token};
use crate::error::ObjectraError;
use crate::node::{Content, Identifier, Leaf, Node};
use crate::registry::{Codec, ConstructFn, Registry, TypeTag};
use crate::value::{ObjRef, Value};

/// One step of a write path from the decoded root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    Key(String),
    Index(usize),
    /// Index into an entry-protocol container's buffered entries.
    Entry(usize),
}

/// Decodes a node tree back into a value graph, patching deferred
/// references and applying buffered entries before returning.
pub fn decode(registry: &Registry, node: &Node) -> Result<Value, ObjectraError> {
    let mut session = DecodeSession::new(registry);
    let root = session.decode_node(node)?;
    session.patch(&root)?;
    session.apply_entries()?;
    if matches!(root, Value::Unresolved(_)) {
        return Err(ObjectraError::InvalidReferenceInjectionPath);
    }
    Ok(root)
}

struct EntryBuffer {
    target: ObjRef,
    codec: Rc<Codec>,
    entries: Vec<Value>,
}

pub(crate) struct DecodeSession<'r, 'n> {
    registry: &'r Registry,
    resolved: HashMap<u64, Value>,
    pending_consumers: Vec<(u64, Vec<Segment>)>,
    pending_hoists: HashMap<u64, &'n Node>,
    entry_buffers: Vec<EntryBuffer>,
    path: Vec<Segment>,
    in_progress: HashSet<usize>,
}

impl<'r, 'n> DecodeSession<'r, 'n> {
    fn new(registry: &'r Registry) -> DecodeSession<'r, 'n> {
        DecodeSession {
            registry,
            resolved: HashMap::new(),
            pending_consumers: Vec::new(),
            pending_hoists: HashMap::new(),
            entry_buffers: Vec::new(),
            path: Vec::new(),
            in_progress: HashSet::new(),
        }
    }

    pub(crate) fn decode_node(&mut self, node: &'n Node) -> Result<Value, ObjectraError> {
        if node.is_consumer() {
            let id = match node.reference_id {
                Some(id) => id,
                None => return Err(ObjectraError::MalformedModel("consumer without id".into())),
            };
            if let Some(value) = self.resolved.get(&id) {
                return Ok(value.clone());
            }
            if let Some(declaration) = self.pending_hoists.remove(&id) {
                return self.decode_node(declaration);
            }
            self.pending_consumers.push((id, self.path.clone()));
            return Ok(Value::Unresolved(id));
        }

        let identifier = match &node.identifier {
            Some(identifier) => identifier.clone(),
            None => {
                return match &node.content {
                    Some(Content::Leaf(Leaf::Null)) => Ok(Value::Null),
                    None => Ok(Value::Undefined),
                    _ => Err(ObjectraError::MalformedModel(
                        "structured content without identifier".into(),
                    )),
                }
            }
        };

        // Declarations pre-declared here become available to later
        // consumer stubs, built lazily on first use.
        for hoist in &node.hoisted {
            let id = hoist.reference_id.ok_or_else(|| {
                ObjectraError::MalformedModel("hoisted node without reference id".into())
            })?;
            self.pending_hoists.insert(id, hoist);
        }

        match identifier {
            Identifier::Name(name) => {
                let codec = self
                    .registry
                    .get(&Identifier::Name(name.clone()), node.overload)?;
                if codec.instantiate.is_none() {
                    return Err(ObjectraError::InstantiateMethodMissing(name));
                }
                let value = self.run_instantiate(&codec, node, None, &name)?;
                self.register(node, &value);
                Ok(value)
            }
            Identifier::Type(tag) => self.decode_typed(node, tag),
        }
    }

    fn decode_typed(&mut self, node: &'n Node, tag: TypeTag) -> Result<Value, ObjectraError> {
        let type_name = self.registry.type_name(tag).to_string();
        let codec = self
            .registry
            .codec_for(tag)
            .ok_or_else(|| ObjectraError::CodecNotFound(type_name.clone()))?;

        // Identifier-only node: a reified type reference.
        if node.content.is_none() {
            return Ok(Value::Type(tag));
        }

        let descriptor = self.registry.type_descriptor(tag);
        let arity = descriptor.arity;
        let construct = descriptor.construct.clone();

        // Codec-defined instantiation, with a bare pre-allocated target
        // when the value is a declaration a cycle may point back into.
        if codec.instantiate.is_some() {
            let pre = self.preallocate(node, arity, &construct, &type_name)?;
            let value = self.run_instantiate(&codec, node, pre, &type_name)?;
            self.register(node, &value);
            return Ok(value);
        }

        // Entry-protocol types construct empty and get populated from
        // buffered entries after the patch pass.
        if codec.use_entry_protocol {
            return self.decode_entry_protocol(node, &codec, &construct, &type_name);
        }

        // Primitive leaf passed straight through a single-argument
        // constructor.
        if let Some(Content::Leaf(leaf)) = &node.content {
            let force = codec.ignore_default_argument_behaviour && codec.argument_passthrough;
            if arity == 1 || force {
                if let Some(construct) = &construct {
                    let value = self.call_construct(construct, &[leaf.to_value()], &type_name)?;
                    self.register(node, &value);
                    return Ok(value);
                }
            }
        }

        self.decode_via_ancestors(node, tag, &codec, arity, &construct, &type_name)
    }

    fn decode_via_ancestors(
        &mut self,
        node: &'n Node,
        tag: TypeTag,
        codec: &Rc<Codec>,
        arity: usize,
        construct: &Option<ConstructFn>,
        type_name: &str,
    ) -> Result<Value, ObjectraError> {
        for ancestor in self.registry.find_ancestors(tag) {
            if ancestor.instantiate.is_none() {
                continue;
            }

            if !codec.argument_passthrough_property_keys.is_empty() {
                let aggregate = self.run_instantiate(&ancestor, node, None, type_name)?;
                let fields = match aggregate.obj() {
                    Some(obj) => obj.borrow().fields.clone(),
                    None => {
                        return Err(ObjectraError::InvalidConstructorArity(type_name.to_string()))
                    }
                };
                let construct = construct.as_ref().ok_or_else(|| {
                    ObjectraError::InvalidConstructorArity(type_name.to_string())
                })?;
                let keys = &codec.argument_passthrough_property_keys;
                let args: Vec<Value> = keys
                    .iter()
                    .map(|key| fields.get(key).cloned().unwrap_or(Value::Undefined))
                    .collect();
                let built = self.call_construct(construct, &args, type_name)?;
                if let Some(target) = built.obj() {
                    for (key, value) in fields.iter() {
                        if !keys.contains(key) {
                            target.borrow_mut().fields.insert(key.clone(), value.clone());
                        }
                    }
                }
                self.register(node, &built);
                return Ok(built);
            }

            if codec.argument_passthrough
                && (codec.ignore_default_argument_behaviour || arity == 1)
            {
                let aggregate = self.run_instantiate(&ancestor, node, None, type_name)?;
                let construct = construct.as_ref().ok_or_else(|| {
                    ObjectraError::InvalidConstructorArity(type_name.to_string())
                })?;
                let built = self.call_construct(construct, &[aggregate], type_name)?;
                self.register(node, &built);
                return Ok(built);
            }

            if arity == 0 {
                let construct = construct.as_ref().ok_or_else(|| {
                    ObjectraError::InvalidConstructorArity(type_name.to_string())
                })?;
                let built = self.call_construct(construct, &[], type_name)?;
                let target = match built.obj() {
                    Some(obj) => obj.clone(),
                    None => {
                        return Err(ObjectraError::InvalidConstructorArity(type_name.to_string()))
                    }
                };
                self.register(node, &built);
                let value =
                    self.run_instantiate(&ancestor, node, Some(target), type_name)?;
                self.register(node, &value);
                return Ok(value);
            }
        }
        Err(ObjectraError::InvalidConstructorArity(type_name.to_string()))
    }

    fn decode_entry_protocol(
        &mut self,
        node: &'n Node,
        codec: &Rc<Codec>,
        construct: &Option<ConstructFn>,
        type_name: &str,
    ) -> Result<Value, ObjectraError> {
        let construct = construct
            .as_ref()
            .ok_or_else(|| ObjectraError::InvalidConstructorArity(type_name.to_string()))?;
        let built = self.call_construct(construct, &[], type_name)?;
        let target = match built.obj() {
            Some(obj) => obj.clone(),
            None => return Err(ObjectraError::InvalidConstructorArity(type_name.to_string())),
        };
        self.register(node, &built);

        let children = match &node.content {
            Some(Content::List(children)) => children,
            _ => {
                return Err(ObjectraError::MalformedModel(
                    "entry-protocol node without list content".into(),
                ))
            }
        };
        let buffer_index = self.entry_buffers.len();
        self.entry_buffers.push(EntryBuffer {
            target,
            codec: codec.clone(),
            entries: Vec::new(),
        });
        for (index, child) in children.iter().enumerate() {
            self.path.push(Segment::Entry(index));
            let entry = self.decode_node(child);
            self.path.pop();
            self.entry_buffers[buffer_index].entries.push(entry?);
        }
        Ok(built)
    }

    fn preallocate(
        &mut self,
        node: &'n Node,
        arity: usize,
        construct: &Option<ConstructFn>,
        type_name: &str,
    ) -> Result<Option<ObjRef>, ObjectraError> {
        if node.reference_id.is_none() || arity != 0 {
            return Ok(None);
        }
        let construct = match construct {
            Some(construct) => construct,
            None => return Ok(None),
        };
        let bare = self.call_construct(construct, &[], type_name)?;
        let obj = match bare.obj() {
            Some(obj) => obj.clone(),
            None => return Ok(None),
        };
        self.register(node, &bare);
        Ok(Some(obj))
    }

    fn run_instantiate(
        &mut self,
        codec: &Rc<Codec>,
        node: &'n Node,
        instance: Option<ObjRef>,
        type_name: &str,
    ) -> Result<Value, ObjectraError> {
        let instantiate = codec
            .instantiate
            .clone()
            .ok_or_else(|| ObjectraError::InstantiateMethodMissing(type_name.to_string()))?;
        let key = node as *const Node as usize;
        if !self.in_progress.insert(key) {
            return Err(ObjectraError::SelfInstantiation(type_name.to_string()));
        }
        let (representer, backloop) = Backloop::build(node);
        let mut bridge = InstantiateBridge {
            representer,
            instance,
            backloop,
            session: self,
        };
        let result = instantiate(&mut bridge);
        self.in_progress.remove(&key);
        result.map_err(|error| match error {
            ObjectraError::Custom(_) => ObjectraError::Composition {
                type_name: type_name.to_string(),
                source: Box::new(error),
            },
            other => other,
        })
    }

    fn call_construct(
        &self,
        construct: &ConstructFn,
        args: &[Value],
        type_name: &str,
    ) -> Result<Value, ObjectraError> {
        construct(args).map_err(|message| ObjectraError::InvalidConstructorArguments {
            type_name: type_name.to_string(),
            message,
        })
    }

    /// Records the built value for the node's reference id without
    /// clobbering a pre-registered declaration instance.
    fn register(&mut self, node: &Node, value: &Value) {
        if let Some(id) = node.reference_id {
            self.resolved.entry(id).or_insert_with(|| value.clone());
        }
    }

    // --- patch pass ---

    fn patch(&mut self, root: &Value) -> Result<(), ObjectraError> {
        let consumers = std::mem::take(&mut self.pending_consumers);
        for (id, path) in consumers {
            let replacement = self
                .resolved
                .get(&id)
                .cloned()
                .ok_or(ObjectraError::InvalidReferenceInjectionPath)?;
            self.inject(root, &path, id, replacement)?;
        }
        Ok(())
    }

    fn inject(
        &mut self,
        root: &Value,
        path: &[Segment],
        id: u64,
        replacement: Value,
    ) -> Result<(), ObjectraError> {
        let (last, prefix) = match path.split_last() {
            Some(split) => split,
            None => return Err(ObjectraError::InvalidReferenceInjectionPath),
        };
        let mut cursor = root.clone();
        for segment in prefix {
            cursor = self.child_at(&cursor, segment)?;
        }
        self.assign(&cursor, last, id, replacement)
    }

    fn child_at(&self, container: &Value, segment: &Segment) -> Result<Value, ObjectraError> {
        let obj = container
            .obj()
            .ok_or(ObjectraError::InvalidReferenceInjectionPath)?;
        match segment {
            Segment::Key(key) => obj
                .borrow()
                .fields
                .get(key)
                .cloned()
                .ok_or(ObjectraError::InvalidReferenceInjectionPath),
            Segment::Index(index) => obj
                .borrow()
                .elements
                .get(*index)
                .cloned()
                .ok_or(ObjectraError::InvalidReferenceInjectionPath),
            Segment::Entry(index) => {
                let buffer = self
                    .entry_buffers
                    .iter()
                    .find(|buffer| Rc::ptr_eq(&buffer.target, obj))
                    .ok_or(ObjectraError::InvalidReferenceInjectionPath)?;
                buffer
                    .entries
                    .get(*index)
                    .cloned()
                    .ok_or(ObjectraError::InvalidReferenceInjectionPath)
            }
        }
    }

    fn assign(
        &mut self,
        container: &Value,
        segment: &Segment,
        id: u64,
        replacement: Value,
    ) -> Result<(), ObjectraError> {
        let obj = container
            .obj()
            .ok_or(ObjectraError::InvalidReferenceInjectionPath)?;
        let matches_placeholder =
            |value: &Value| matches!(value, Value::Unresolved(have) if *have == id);
        match segment {
            Segment::Key(key) => {
                let mut instance = obj.borrow_mut();
                match instance.fields.get_mut(key) {
                    Some(slot) if matches_placeholder(slot) => {
                        *slot = replacement;
                        Ok(())
                    }
                    _ => Err(ObjectraError::InvalidReferenceInjectionPath),
                }
            }
            Segment::Index(index) => {
                let mut instance = obj.borrow_mut();
                match instance.elements.get_mut(*index) {
                    Some(slot) if matches_placeholder(slot) => {
                        *slot = replacement;
                        Ok(())
                    }
                    _ => Err(ObjectraError::InvalidReferenceInjectionPath),
                }
            }
            Segment::Entry(index) => {
                let buffer = self
                    .entry_buffers
                    .iter_mut()
                    .find(|buffer| Rc::ptr_eq(&buffer.target, obj))
                    .ok_or(ObjectraError::InvalidReferenceInjectionPath)?;
                match buffer.entries.get_mut(*index) {
                    Some(slot) if matches_placeholder(slot) => {
                        *slot = replacement;
                        Ok(())
                    }
                    _ => Err(ObjectraError::InvalidReferenceInjectionPath),
                }
            }
        }
    }

    /// Applies buffered entries to their entry-protocol instances, after
    /// the patch pass has fixed any placeholders inside them.
    fn apply_entries(&mut self) -> Result<(), ObjectraError> {
        let buffers = std::mem::take(&mut self.entry_buffers);
        for buffer in buffers {
            let mut instance = buffer.target.borrow_mut();
            for entry in buffer.entries {
                match &buffer.codec.setter {
                    Some(setter) => setter(&mut instance, entry)?,
                    None => instance.elements.push(entry),
                }
            }
        }
        Ok(())
    }
}

/// Callback view of the running decode session: the structural mirror of
/// the current node's content, an optional pre-allocated target instance,
/// and bounded recursive decoding by token.
pub struct InstantiateBridge<'s, 'r, 'n> {
    pub representer: Representer,
    pub instance: Option<ObjRef>,
    backloop: Backloop<'n>,
    session: &'s mut DecodeSession<'r, 'n>,
}

impl InstantiateBridge<'_, '_, '_> {
    /// The node behind a token of this invocation.
    pub fn resolve(&self, token: Token) -> Result<&Node, ObjectraError> {
        self.backloop.resolve(token)
    }

    /// Leaf content behind a token.
    pub fn value(&self, token: Token) -> Result<Value, ObjectraError> {
        let node = self.backloop.resolve(token)?;
        match &node.content {
            Some(Content::Leaf(leaf)) => Ok(leaf.to_value()),
            None => Ok(Value::Undefined),
            _ => Err(ObjectraError::MalformedModel(
                "token does not point at a structure endpoint".into(),
            )),
        }
    }

    /// Full recursive decode of the sub-position behind a token, on the
    /// shared session state.
    pub fn instantiate(&mut self, token: Token) -> Result<Value, ObjectraError> {
        let node = self.backloop.resolve(token)?;
        let rel_path: Vec<Segment> = self.backloop.rel_path(token)?.to_vec();
        let depth = rel_path.len();
        self.session.path.extend(rel_path);
        let result = self.session.decode_node(node);
        let keep = self.session.path.len() - depth;
        self.session.path.truncate(keep);
        result
    }
}
