//! # Metadata tree
//!
//! The core treats the metadata loader as an external collaborator (§1):
//! somewhere upstream, `.fmf`/YAML files get merged into a tree of nodes
//! with inherited, typed fields. This module defines that contract — the
//! [`Node`] shape and the three read-only queries the engine is allowed to
//! perform against it (list children, fetch by name, iterate leaves) — and
//! provides an in-memory builder good enough to drive the engine in tests
//! without a real loader.
//!
//! Everything downstream of discovery (scheduler, steps, results) only
//! ever talks to a `Node`, never to a file on disk.

pub mod test;
pub mod plan;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// An immutable view onto one node of the metadata tree.
///
/// `name` is always absolute and `/`-rooted (e.g. `/tests/login`). `data` is
/// the fully merged key→value map for this node (parent keys already
/// folded in); `sources` records which files contributed to that merge —
/// purely informational, never consulted by the engine itself.
///
/// Deriving `Serialize`/`Deserialize` lets the CLI read a tree straight out
/// of a YAML or JSON file (`--tree`) as a stand-in for the real `.fmf`
/// loader, which is out of scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    #[serde(default)]
    pub data: HashMap<String, Value>,
    #[serde(default)]
    pub children: Vec<Node>,
    #[serde(default)]
    pub sources: Vec<String>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: HashMap::new(),
            children: Vec::new(),
            sources: Vec::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    /// Lists the direct children under the subtree rooted at `subtree_name`
    /// (or the children of `self` if `subtree_name == self.name`).
    pub fn list_children(&self, subtree_name: &str) -> Vec<&Node> {
        match self.find(subtree_name) {
            Some(node) => node.children.iter().collect(),
            None => Vec::new(),
        }
    }

    /// Fetches a node anywhere in the subtree by its absolute name.
    pub fn find(&self, name: &str) -> Option<&Node> {
        if self.name == name {
            return Some(self);
        }
        for child in &self.children {
            if let Some(found) = child.find(name) {
                return Some(found);
            }
        }
        None
    }

    /// Iterates the leaves (nodes with no children) of the subtree rooted
    /// at `self`, in declaration order.
    pub fn leaves(&self) -> Vec<&Node> {
        if self.children.is_empty() {
            return vec![self];
        }
        let mut out = Vec::new();
        for child in &self.children {
            out.extend(child.leaves());
        }
        out
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.data.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
    }

    pub fn get_i64(&self, key: &str, default: i64) -> i64 {
        self.data.get(key).and_then(|v| v.as_i64()).unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_locates_nested_node() {
        let tree = Node::new("/")
            .with_child(Node::new("/tests").with_child(Node::new("/tests/login")));
        assert!(tree.find("/tests/login").is_some());
        assert!(tree.find("/tests/missing").is_none());
    }

    #[test]
    fn leaves_collects_only_childless_nodes() {
        let tree = Node::new("/tests")
            .with_child(Node::new("/tests/a"))
            .with_child(Node::new("/tests/group").with_child(Node::new("/tests/group/b")));
        let names: Vec<&str> = tree.leaves().iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["/tests/a", "/tests/group/b"]);
    }
}
