//! Bounded structural mirror handed to custom instantiate callbacks.
//!
//! The mirror has the same shape as the node's content (object keys,
//! array indices) with every position replaced by an opaque token. Tokens
//! are only valid for the invocation that produced them; resolving a token
//! from another invocation fails with `ForeignReferenceTokenError`.

use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use crate::decoder::Segment;
use crate::error::ObjectraError;
use crate::node::{Content, Node};

static INVOCATION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Opaque handle to one structural position of the current invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    invocation: u64,
    index: usize,
}

/// Mirror of a node's content with tokens at every position.
#[derive(Debug, Clone)]
pub enum Representer {
    Endpoint(Token),
    List(Token, Vec<Representer>),
    Map(Token, IndexMap<String, Representer>),
}

impl Representer {
    pub fn token(&self) -> Token {
        match self {
            Representer::Endpoint(token)
            | Representer::List(token, _)
            | Representer::Map(token, _) => *token,
        }
    }
}

/// Per-invocation token table, discarded when the callback returns.
pub(crate) struct Backloop<'n> {
    invocation: u64,
    nodes: Vec<&'n Node>,
    rel_paths: Vec<Vec<Segment>>,
}

impl<'n> Backloop<'n> {
    pub(crate) fn build(node: &'n Node) -> (Representer, Backloop<'n>) {
        let mut backloop = Backloop {
            invocation: INVOCATION_COUNTER.fetch_add(1, Ordering::Relaxed),
            nodes: Vec::new(),
            rel_paths: Vec::new(),
        };
        let representer = backloop.mirror(node, Vec::new());
        (representer, backloop)
    }

    fn mirror(&mut self, node: &'n Node, rel_path: Vec<Segment>) -> Representer {
        let token = Token {
            invocation: self.invocation,
            index: self.nodes.len(),
        };
        self.nodes.push(node);
        self.rel_paths.push(rel_path.clone());
        match &node.content {
            Some(Content::List(children)) => {
                let mirrored = children
                    .iter()
                    .enumerate()
                    .map(|(index, child)| {
                        let mut path = rel_path.clone();
                        path.push(Segment::Index(index));
                        self.mirror(child, path)
                    })
                    .collect();
                Representer::List(token, mirrored)
            }
            Some(Content::Map(children)) => {
                let mirrored = children
                    .iter()
                    .map(|(key, child)| {
                        let mut path = rel_path.clone();
                        path.push(Segment::Key(key.clone()));
                        (key.clone(), self.mirror(child, path))
                    })
                    .collect();
                Representer::Map(token, mirrored)
            }
            Some(Content::Leaf(_)) | None => Representer::Endpoint(token),
        }
    }

    pub(crate) fn resolve(&self, token: Token) -> Result<&'n Node, ObjectraError> {
        if token.invocation != self.invocation {
            return Err(ObjectraError::ForeignReferenceToken);
        }
        self.nodes
            .get(token.index)
            .copied()
            .ok_or(ObjectraError::ForeignReferenceToken)
    }

    pub(crate) fn rel_path(&self, token: Token) -> Result<&[Segment], ObjectraError> {
        if token.invocation != self.invocation {
            return Err(ObjectraError::ForeignReferenceToken);
        }
        self.rel_paths
            .get(token.index)
            .map(|path| path.as_slice())
            .ok_or(ObjectraError::ForeignReferenceToken)
    }
}
