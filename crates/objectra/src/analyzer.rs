//! Reference-path discovery over a value graph.
//!
//! Runs once per encode session, ahead of tree construction. Finds every
//! shared or circular reference and computes the hoist point where its
//! single declaration will be emitted.

use std::collections::{HashMap, HashSet};

use crate::registry::Registry;
use crate::value::Value;

/// Stable per-session identity of one object reference.
pub(crate) type RefKey = usize;

#[derive(Default)]
pub(crate) struct GraphAnalysis {
    /// References reached from more than one path, or re-reached while on
    /// the current path stack (true self-cycles).
    pub repeating: HashSet<RefKey>,
    /// Repeating reference -> ancestor reference at which it is declared
    /// once; `None` means the session root.
    pub hoist_parent: HashMap<RefKey, Option<RefKey>>,
    /// Discovery order of repeating references; hoist ties at one parent
    /// are emitted in this order.
    pub order: Vec<RefKey>,
    /// Key -> value handle, for encoding hoisted declarations.
    pub values: HashMap<RefKey, Value>,
}

struct Walker<'r> {
    registry: &'r Registry,
    stack: Vec<RefKey>,
    visited: HashSet<RefKey>,
    paths: HashMap<RefKey, Vec<Vec<RefKey>>>,
    analysis: GraphAnalysis,
}

/// Depth-first walk: arrays and entry-protocol containers by index,
/// objects by codec-filtered property keys.
pub(crate) fn analyze(registry: &Registry, root: &Value) -> GraphAnalysis {
    let mut walker = Walker {
        registry,
        stack: Vec::new(),
        visited: HashSet::new(),
        paths: HashMap::new(),
        analysis: GraphAnalysis::default(),
    };
    walker.walk(root);
    walker.compute_hoist_points();
    walker.analysis
}

impl Walker<'_> {
    fn walk(&mut self, value: &Value) {
        let obj = match value {
            Value::Object(obj) => obj,
            _ => return,
        };
        let key = std::rc::Rc::as_ptr(obj) as RefKey;
        self.paths.entry(key).or_default().push(self.stack.clone());
        self.analysis.values.entry(key).or_insert_with(|| value.clone());

        if self.stack.contains(&key) || self.visited.contains(&key) {
            // Repeating; never redescend into an already-explored subtree.
            if self.analysis.repeating.insert(key) {
                self.analysis.order.push(key);
            }
            return;
        }
        self.visited.insert(key);
        self.stack.push(key);

        let children = self.children_of(value);
        for child in &children {
            self.walk(child);
        }
        self.stack.pop();
    }

    fn children_of(&self, value: &Value) -> Vec<Value> {
        let obj = match value {
            Value::Object(obj) => obj,
            _ => return Vec::new(),
        };
        let instance = obj.borrow();
        let codec = self.registry.codec_for(instance.tag);
        let mut children: Vec<Value> = match &codec {
            Some(codec) if codec.use_entry_protocol => match &codec.getter {
                Some(getter) => getter(&instance),
                None => instance.elements.clone(),
            },
            _ => instance.elements.clone(),
        };
        match &codec {
            Some(codec) => {
                for key in self.registry.masked_properties(&instance, codec) {
                    if let Some(child) = instance.fields.get(&key) {
                        children.push(child.clone());
                    }
                }
            }
            // No codec anywhere in the chain; the encoder will surface the
            // error, but traversal still records what it can.
            None => children.extend(instance.fields.values().cloned()),
        }
        children
    }

    /// Hoist point = last element of the forward longest common prefix of
    /// all appearance-path stacks; an empty prefix hoists at the session
    /// root.
    fn compute_hoist_points(&mut self) {
        for key in &self.analysis.order {
            let paths = match self.paths.get(key) {
                Some(paths) if !paths.is_empty() => paths,
                _ => continue,
            };
            let first = &paths[0];
            let mut prefix_len = first.len();
            for path in &paths[1..] {
                let common = first
                    .iter()
                    .zip(path.iter())
                    .take_while(|(a, b)| a == b)
                    .count();
                prefix_len = prefix_len.min(common);
            }
            let parent = if prefix_len == 0 {
                None
            } else {
                Some(first[prefix_len - 1])
            };
            self.analysis.hoist_parent.insert(*key, parent);
        }
    }
}
