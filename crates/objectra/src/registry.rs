//! Type arena and codec registry.
//!
//! The type hierarchy is an explicit table of descriptors with parent
//! links, consulted for ancestor lookup instead of runtime reflection.
//! Dynamic codecs for codec-less types are synthesized on demand and
//! cached for the lifetime of the registry.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::builtins;
use crate::decoder::InstantiateBridge;
use crate::encoder::SerializeBridge;
use crate::error::ObjectraError;
use crate::node::{Content, Identifier};
use crate::value::{Instance, Value};

/// Index into the registry's type arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeTag(pub(crate) usize);

impl TypeTag {
    pub const OBJECT: TypeTag = TypeTag(0);
    pub const STRING: TypeTag = TypeTag(1);
    pub const BOOLEAN: TypeTag = TypeTag(2);
    pub const NUMBER: TypeTag = TypeTag(3);
    pub const ARRAY: TypeTag = TypeTag(4);
    pub const MAP: TypeTag = TypeTag(5);
    pub const SET: TypeTag = TypeTag(6);
}

/// Reconstructs an instance from positional arguments. Errors are reported
/// as plain messages and surface as `InvalidConstructorArgumentsError`.
pub type ConstructFn = Rc<dyn Fn(&[Value]) -> Result<Value, String>>;

pub type SerializeFn = Rc<dyn Fn(&mut SerializeBridge<'_, '_>) -> Result<Content, ObjectraError>>;
pub type InstantiateFn =
    Rc<dyn Fn(&mut InstantiateBridge<'_, '_, '_>) -> Result<Value, ObjectraError>>;
pub type GetterFn = Rc<dyn Fn(&Instance) -> Vec<Value>>;
pub type SetterFn = Rc<dyn Fn(&mut Instance, Value) -> Result<(), ObjectraError>>;

/// One entry of the type arena.
pub struct TypeDescriptor {
    pub name: String,
    pub parent: Option<TypeTag>,
    /// Declared constructor arity, driving the default reconstruction
    /// strategies during decode.
    pub arity: usize,
    pub constructible: bool,
    pub construct: Option<ConstructFn>,
}

/// Registered per-type behavior: serialize/instantiate callbacks plus
/// property and constructor-argument rules. Identity is
/// `(identifier, overload)`.
pub struct Codec {
    pub identifier: Identifier,
    pub overload: Option<u32>,
    pub(crate) serialize: Option<SerializeFn>,
    pub(crate) instantiate: Option<InstantiateFn>,
    pub property_exclusion_mask: Vec<String>,
    pub argument_passthrough_property_keys: Vec<String>,
    pub argument_passthrough: bool,
    pub ignore_default_argument_behaviour: bool,
    pub use_entry_protocol: bool,
    pub entry_depth: usize,
    pub(crate) getter: Option<GetterFn>,
    pub(crate) setter: Option<SetterFn>,
    configured: bool,
    dynamic: bool,
}

impl Codec {
    fn bare(identifier: Identifier, overload: Option<u32>) -> Codec {
        Codec {
            identifier,
            overload,
            serialize: None,
            instantiate: None,
            property_exclusion_mask: Vec::new(),
            argument_passthrough_property_keys: Vec::new(),
            argument_passthrough: false,
            ignore_default_argument_behaviour: false,
            use_entry_protocol: false,
            entry_depth: 0,
            getter: None,
            setter: None,
            configured: false,
            dynamic: false,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }
}

/// Options record applied once via [`Registry::configure`].
#[derive(Default, Clone)]
pub struct CodecOptions {
    pub serialize: Option<SerializeFn>,
    pub instantiate: Option<InstantiateFn>,
    pub property_exclusion_mask: Vec<String>,
    pub argument_passthrough_property_keys: Vec<String>,
    pub argument_passthrough: bool,
    pub ignore_default_argument_behaviour: bool,
    pub use_entry_protocol: bool,
    pub entry_depth: usize,
    pub getter: Option<GetterFn>,
    pub setter: Option<SetterFn>,
}

/// Process-wide, effectively append-only registry. Populate it during an
/// init phase, then share it immutably with encode/decode sessions.
pub struct Registry {
    types: Vec<TypeDescriptor>,
    by_type_name: HashMap<String, TypeTag>,
    codecs: Vec<Rc<Codec>>,
    by_identifier: HashMap<(Identifier, Option<u32>), usize>,
    dynamic: RefCell<HashMap<TypeTag, Rc<Codec>>>,
}

impl Registry {
    /// Registry seeded with the built-in type arena but no codecs.
    pub fn new() -> Registry {
        let mut registry = Registry {
            types: Vec::new(),
            by_type_name: HashMap::new(),
            codecs: Vec::new(),
            by_identifier: HashMap::new(),
            dynamic: RefCell::new(HashMap::new()),
        };
        builtins::install_types(&mut registry);
        registry
    }

    /// Registry with the built-in types and their codecs installed.
    pub fn with_builtins() -> Result<Registry, ObjectraError> {
        let mut registry = Registry::new();
        builtins::install_codecs(&mut registry)?;
        Ok(registry)
    }

    // --- type arena ---

    pub fn register_type(
        &mut self,
        name: &str,
        parent: Option<TypeTag>,
        arity: usize,
        constructible: bool,
    ) -> Result<TypeTag, ObjectraError> {
        if self.by_type_name.contains_key(name) {
            return Err(ObjectraError::DuplicateRegistration(name.to_string()));
        }
        let tag = TypeTag(self.types.len());
        self.types.push(TypeDescriptor {
            name: name.to_string(),
            parent,
            arity,
            constructible,
            construct: None,
        });
        self.by_type_name.insert(name.to_string(), tag);
        Ok(tag)
    }

    pub fn set_construct(&mut self, tag: TypeTag, construct: ConstructFn) {
        self.types[tag.0].construct = Some(construct);
    }

    pub fn type_descriptor(&self, tag: TypeTag) -> &TypeDescriptor {
        &self.types[tag.0]
    }

    pub fn type_name(&self, tag: TypeTag) -> &str {
        &self.types[tag.0].name
    }

    pub fn tag_by_name(&self, name: &str) -> Option<TypeTag> {
        self.by_type_name.get(name).copied()
    }

    pub fn identifier_name(&self, identifier: &Identifier) -> String {
        match identifier {
            Identifier::Type(tag) => self.type_name(*tag).to_string(),
            Identifier::Name(name) => name.clone(),
        }
    }

    // --- codecs ---

    /// Creates an unconfigured codec for the identifier/overload pair.
    pub fn register(
        &mut self,
        identifier: Identifier,
        overload: Option<u32>,
    ) -> Result<(), ObjectraError> {
        let key = (identifier.clone(), overload);
        if self.by_identifier.contains_key(&key) {
            return Err(ObjectraError::DuplicateRegistration(
                self.identifier_name(&identifier),
            ));
        }
        let index = self.codecs.len();
        self.codecs.push(Rc::new(Codec::bare(identifier, overload)));
        self.by_identifier.insert(key, index);
        Ok(())
    }

    /// Fills a codec's configuration exactly once; a second call fails
    /// with `AlreadyConfiguredError`.
    pub fn configure(
        &mut self,
        identifier: &Identifier,
        overload: Option<u32>,
        options: CodecOptions,
    ) -> Result<(), ObjectraError> {
        let name = self.identifier_name(identifier);
        let index = *self
            .by_identifier
            .get(&(identifier.clone(), overload))
            .ok_or_else(|| ObjectraError::CodecNotFound(name.clone()))?;
        if self.codecs[index].configured {
            return Err(ObjectraError::AlreadyConfigured(name));
        }
        if let Identifier::Type(tag) = identifier {
            let arity = self.types[tag.0].arity;
            if !options.ignore_default_argument_behaviour
                && options.instantiate.is_none()
                && options.argument_passthrough
                && arity > 1
            {
                return Err(ObjectraError::InvalidConstructorArity(name));
            }
        }
        let mut codec = Codec::bare(identifier.clone(), overload);
        codec.serialize = options.serialize;
        codec.instantiate = options.instantiate;
        codec.property_exclusion_mask = options.property_exclusion_mask;
        codec.argument_passthrough_property_keys = options.argument_passthrough_property_keys;
        codec.argument_passthrough = options.argument_passthrough;
        codec.ignore_default_argument_behaviour = options.ignore_default_argument_behaviour;
        codec.use_entry_protocol = options.use_entry_protocol;
        codec.entry_depth = options.entry_depth;
        codec.getter = options.getter;
        codec.setter = options.setter;
        codec.configured = true;
        self.codecs[index] = Rc::new(codec);
        Ok(())
    }

    /// Register-and-configure in one step.
    pub fn register_with(
        &mut self,
        identifier: Identifier,
        overload: Option<u32>,
        options: CodecOptions,
    ) -> Result<(), ObjectraError> {
        self.register(identifier.clone(), overload)?;
        self.configure(&identifier, overload, options)
    }

    pub fn find(&self, identifier: &Identifier, overload: Option<u32>) -> Option<Rc<Codec>> {
        self.by_identifier
            .get(&(identifier.clone(), overload))
            .map(|index| self.codecs[*index].clone())
    }

    pub fn get(
        &self,
        identifier: &Identifier,
        overload: Option<u32>,
    ) -> Result<Rc<Codec>, ObjectraError> {
        self.find(identifier, overload)
            .ok_or_else(|| ObjectraError::CodecNotFound(self.identifier_name(identifier)))
    }

    /// Ordered ancestor-codec chain for a type (nearest first), computed
    /// along the arena's parent links. The type's own codec is excluded.
    pub fn find_ancestors(&self, tag: TypeTag) -> Vec<Rc<Codec>> {
        let mut out = Vec::new();
        let mut cursor = self.types[tag.0].parent;
        while let Some(parent) = cursor {
            if let Some(codec) = self.find(&Identifier::Type(parent), None) {
                out.push(codec);
            }
            cursor = self.types[parent.0].parent;
        }
        out
    }

    /// Codec for a type with a registered codec of its own, or a cached
    /// dynamic codec inheriting the nearest static ancestor's specification
    /// (but none of its callbacks). `None` when no ancestor codec exists.
    pub fn codec_for(&self, tag: TypeTag) -> Option<Rc<Codec>> {
        if let Some(codec) = self.find(&Identifier::Type(tag), None) {
            return Some(codec);
        }
        if let Some(cached) = self.dynamic.borrow().get(&tag) {
            return Some(cached.clone());
        }
        let ancestor = self.find_ancestors(tag).into_iter().next()?;
        let mut codec = Codec::bare(Identifier::Type(tag), None);
        codec.property_exclusion_mask = ancestor.property_exclusion_mask.clone();
        codec.argument_passthrough_property_keys =
            ancestor.argument_passthrough_property_keys.clone();
        codec.argument_passthrough = ancestor.argument_passthrough;
        codec.ignore_default_argument_behaviour = ancestor.ignore_default_argument_behaviour;
        codec.use_entry_protocol = ancestor.use_entry_protocol;
        codec.entry_depth = ancestor.entry_depth;
        codec.getter = ancestor.getter.clone();
        codec.setter = ancestor.setter.clone();
        codec.configured = true;
        codec.dynamic = true;
        let codec = Rc::new(codec);
        self.dynamic.borrow_mut().insert(tag, codec.clone());
        Some(codec)
    }

    /// Property keys to traverse: own field keys minus the exclusion mask.
    pub fn masked_properties(&self, instance: &Instance, codec: &Codec) -> Vec<String> {
        instance
            .fields
            .keys()
            .filter(|key| !codec.property_exclusion_mask.contains(key))
            .cloned()
            .collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new()
    }
}
