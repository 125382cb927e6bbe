//! Compact wire/text projection of a node tree.
//!
//! Wire fields: `t` (type name), `n` (ad hoc codec name), `o` (overload),
//! `c` (content: leaf | array | ordered map), `h` (hoisted models), `id`
//! (reference id), `ctor` (identifier denotes a constructible type).
//! The JSON mapping is hand-rolled over `serde_json::Value` so absent
//! fields stay absent and map order is preserved.

use indexmap::IndexMap;
use serde_json::{json, Map as JsonMap, Value as Json};

use crate::decoder::decode;
use crate::error::ObjectraError;
use crate::node::{Content, Identifier, Leaf, Node};
use crate::registry::Registry;
use crate::value::Value;

/// Registry-independent mirror of [`Node`] with names instead of tags.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Model {
    pub type_name: Option<String>,
    pub name: Option<String>,
    pub overload: Option<u32>,
    pub content: Option<ModelContent>,
    pub hoisted: Vec<Model>,
    pub reference_id: Option<u64>,
    pub constructible: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelContent {
    Leaf(Leaf),
    List(Vec<Model>),
    Map(IndexMap<String, Model>),
}

/// Node -> wire model, resolving type tags to their registered names.
pub fn to_model(registry: &Registry, node: &Node) -> Model {
    let (type_name, name, constructible) = match &node.identifier {
        // `ctor` marks identifier-only nodes standing for a reified
        // constructible type, as opposed to an instance of the type.
        Some(Identifier::Type(tag)) => (
            Some(registry.type_name(*tag).to_string()),
            None,
            node.content.is_none() && registry.type_descriptor(*tag).constructible,
        ),
        Some(Identifier::Name(name)) => (None, Some(name.clone()), false),
        None => (None, None, false),
    };
    Model {
        type_name,
        name,
        overload: node.overload,
        content: node.content.as_ref().map(|content| match content {
            Content::Leaf(leaf) => ModelContent::Leaf(leaf.clone()),
            Content::List(children) => {
                ModelContent::List(children.iter().map(|c| to_model(registry, c)).collect())
            }
            Content::Map(children) => ModelContent::Map(
                children
                    .iter()
                    .map(|(k, c)| (k.clone(), to_model(registry, c)))
                    .collect(),
            ),
        }),
        hoisted: node.hoisted.iter().map(|h| to_model(registry, h)).collect(),
        reference_id: node.reference_id,
        constructible,
    }
}

/// Wire model -> node; an unregistered type name fails with
/// `CodecNotFoundError`.
pub fn from_model(registry: &Registry, model: &Model) -> Result<Node, ObjectraError> {
    let identifier = match (&model.name, &model.type_name) {
        (Some(name), _) => Some(Identifier::Name(name.clone())),
        (None, Some(type_name)) => Some(Identifier::Type(
            registry
                .tag_by_name(type_name)
                .ok_or_else(|| ObjectraError::CodecNotFound(type_name.clone()))?,
        )),
        (None, None) => None,
    };
    let content = match &model.content {
        Some(ModelContent::Leaf(leaf)) => Some(Content::Leaf(leaf.clone())),
        Some(ModelContent::List(children)) => Some(Content::List(
            children
                .iter()
                .map(|c| from_model(registry, c))
                .collect::<Result<_, _>>()?,
        )),
        Some(ModelContent::Map(children)) => Some(Content::Map(
            children
                .iter()
                .map(|(k, c)| Ok((k.clone(), from_model(registry, c)?)))
                .collect::<Result<_, ObjectraError>>()?,
        )),
        None => None,
    };
    Ok(Node {
        identifier,
        overload: model.overload,
        content,
        reference_id: model.reference_id,
        hoisted: model
            .hoisted
            .iter()
            .map(|h| from_model(registry, h))
            .collect::<Result<_, _>>()?,
    })
}

/// Decode straight from a wire model.
pub fn compose_from_model(registry: &Registry, model: &Model) -> Result<Value, ObjectraError> {
    let node = from_model(registry, model)?;
    decode(registry, &node)
}

pub fn model_to_json(model: &Model) -> Json {
    let mut out = JsonMap::new();
    if let Some(type_name) = &model.type_name {
        out.insert("t".to_string(), json!(type_name));
    }
    if let Some(name) = &model.name {
        out.insert("n".to_string(), json!(name));
    }
    if let Some(overload) = model.overload {
        out.insert("o".to_string(), json!(overload));
    }
    if model.constructible {
        out.insert("ctor".to_string(), json!(true));
    }
    if let Some(id) = model.reference_id {
        out.insert("id".to_string(), json!(id));
    }
    if let Some(content) = &model.content {
        out.insert("c".to_string(), content_to_json(content));
    }
    if !model.hoisted.is_empty() {
        out.insert(
            "h".to_string(),
            Json::Array(model.hoisted.iter().map(model_to_json).collect()),
        );
    }
    Json::Object(out)
}

fn content_to_json(content: &ModelContent) -> Json {
    match content {
        ModelContent::Leaf(Leaf::Null) => Json::Null,
        ModelContent::Leaf(Leaf::Bool(b)) => json!(b),
        ModelContent::Leaf(Leaf::Int(i)) => json!(i),
        // Non-finite floats have no JSON rendition; they travel as the
        // strings the Number constructor accepts back.
        ModelContent::Leaf(Leaf::Float(f)) if f.is_finite() => json!(f),
        ModelContent::Leaf(Leaf::Float(f)) => json!(f.to_string()),
        ModelContent::Leaf(Leaf::String(s)) => json!(s),
        ModelContent::List(children) => Json::Array(children.iter().map(model_to_json).collect()),
        ModelContent::Map(children) => Json::Object(
            children
                .iter()
                .map(|(k, c)| (k.clone(), model_to_json(c)))
                .collect(),
        ),
    }
}

pub fn model_from_json(json: &Json) -> Result<Model, ObjectraError> {
    let object = json
        .as_object()
        .ok_or_else(|| ObjectraError::MalformedModel("model must be a json object".into()))?;
    let mut model = Model {
        type_name: field_str(object, "t")?,
        name: field_str(object, "n")?,
        ..Model::default()
    };
    if let Some(overload) = object.get("o") {
        model.overload = Some(
            overload
                .as_u64()
                .and_then(|o| u32::try_from(o).ok())
                .ok_or_else(|| ObjectraError::MalformedModel("overload must be an integer".into()))?,
        );
    }
    if let Some(id) = object.get("id") {
        model.reference_id = Some(
            id.as_u64()
                .ok_or_else(|| ObjectraError::MalformedModel("id must be an integer".into()))?,
        );
    }
    model.constructible = object.get("ctor").and_then(Json::as_bool).unwrap_or(false);
    if let Some(content) = object.get("c") {
        model.content = Some(content_from_json(content)?);
    }
    if let Some(hoisted) = object.get("h") {
        let hoisted = hoisted
            .as_array()
            .ok_or_else(|| ObjectraError::MalformedModel("h must be an array".into()))?;
        model.hoisted = hoisted
            .iter()
            .map(model_from_json)
            .collect::<Result<_, _>>()?;
    }
    Ok(model)
}

fn field_str(object: &JsonMap<String, Json>, key: &str) -> Result<Option<String>, ObjectraError> {
    match object.get(key) {
        None => Ok(None),
        Some(Json::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ObjectraError::MalformedModel(format!(
            "({key}) must be a string"
        ))),
    }
}

fn content_from_json(json: &Json) -> Result<ModelContent, ObjectraError> {
    Ok(match json {
        Json::Null => ModelContent::Leaf(Leaf::Null),
        Json::Bool(b) => ModelContent::Leaf(Leaf::Bool(*b)),
        Json::Number(n) => match n.as_i64() {
            Some(i) => ModelContent::Leaf(Leaf::Int(i)),
            None => ModelContent::Leaf(Leaf::Float(n.as_f64().ok_or_else(|| {
                ObjectraError::MalformedModel("unrepresentable number".into())
            })?)),
        },
        Json::String(s) => ModelContent::Leaf(Leaf::String(s.clone())),
        Json::Array(children) => ModelContent::List(
            children
                .iter()
                .map(model_from_json)
                .collect::<Result<_, _>>()?,
        ),
        Json::Object(children) => ModelContent::Map(
            children
                .iter()
                .map(|(k, c)| Ok((k.clone(), model_from_json(c)?)))
                .collect::<Result<_, ObjectraError>>()?,
        ),
    })
}

pub fn stringify_model(model: &Model) -> Result<String, ObjectraError> {
    serde_json::to_string(&model_to_json(model))
        .map_err(|error| ObjectraError::MalformedModel(error.to_string()))
}

pub fn parse_model(text: &str) -> Result<Model, ObjectraError> {
    let json: Json = serde_json::from_str(text)
        .map_err(|error| ObjectraError::MalformedModel(error.to_string()))?;
    model_from_json(&json)
}
