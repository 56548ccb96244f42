//! # Policy applier (§4.10)
//!
//! A policy document declares field rewrites (`set`/`append`/`merge`) that
//! apply to test or plan entities, selected by a name regex, before a plan
//! executes. Rewrites are visible in exports and in the runtime recipe but
//! never mutate source files — we apply them to the in-memory
//! [`crate::metadata::Node`] data map only.

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::metadata::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    Test,
    Plan,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PolicyRule {
    pub for_: String,
    #[serde(default)]
    pub set: HashMap<String, Value>,
    #[serde(default)]
    pub append: HashMap<String, Value>,
    #[serde(default)]
    pub merge: HashMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PolicyDocument {
    #[serde(default)]
    pub test: Vec<PolicyRule>,
    #[serde(default)]
    pub plan: Vec<PolicyRule>,
}

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("invalid policy selector regex '{0}': {1}")]
    BadSelector(String, regex::Error),

    #[error("policy references unknown field '{0}' on {1:?} '{2}'")]
    UnknownField(String, PolicyKind, String),

    #[error("failed to read policy file '{0}': {1}")]
    Read(String, std::io::Error),

    #[error("failed to parse policy file '{0}': {1}")]
    Parse(String, serde_yaml::Error),
}

pub fn load(path: &std::path::Path) -> Result<PolicyDocument, PolicyError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| PolicyError::Read(path.display().to_string(), e))?;
    serde_yaml::from_str(&contents).map_err(|e| PolicyError::Parse(path.display().to_string(), e))
}

/// Applies every matching rule of `kind` from `doc` to `node`, in
/// document order so a later rule's `set` can override an earlier one.
/// `known_fields` gates "field must exist" validation (§4.10) — the core
/// doesn't know the full Test/Plan schema, so callers pass the field set
/// relevant to their entity kind.
pub fn apply(
    doc: &PolicyDocument,
    kind: PolicyKind,
    node: &mut Node,
    known_fields: &[&str],
) -> Result<(), PolicyError> {
    let rules = match kind {
        PolicyKind::Test => &doc.test,
        PolicyKind::Plan => &doc.plan,
    };

    for rule in rules {
        let selector = Regex::new(&rule.for_).map_err(|e| PolicyError::BadSelector(rule.for_.clone(), e))?;
        if !selector.is_match(&node.name) {
            continue;
        }

        for field in rule.set.keys().chain(rule.append.keys()).chain(rule.merge.keys()) {
            if !known_fields.contains(&field.as_str()) {
                return Err(PolicyError::UnknownField(field.clone(), kind, node.name.clone()));
            }
        }

        for (field, value) in &rule.set {
            node.data.insert(field.clone(), value.clone());
        }

        for (field, value) in &rule.append {
            append_value(node, field, value);
        }

        for (field, value) in &rule.merge {
            merge_value(node, field, value);
        }
    }

    Ok(())
}

fn append_value(node: &mut Node, field: &str, value: &Value) {
    let entry = node.data.entry(field.to_string()).or_insert_with(|| Value::Array(Vec::new()));
    match entry {
        Value::Array(items) => items.push(value.clone()),
        existing => {
            let mut items = vec![existing.clone()];
            items.push(value.clone());
            *entry = Value::Array(items);
        }
    }
}

fn merge_value(node: &mut Node, field: &str, value: &Value) {
    let entry = node.data.entry(field.to_string()).or_insert_with(|| Value::Object(serde_json::Map::new()));
    if let (Value::Object(existing), Value::Object(incoming)) = (entry, value) {
        for (k, v) in incoming {
            existing.insert(k.clone(), v.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(for_: &str, set: &[(&str, Value)]) -> PolicyRule {
        PolicyRule {
            for_: for_.to_string(),
            set: set.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
            append: HashMap::new(),
            merge: HashMap::new(),
        }
    }

    #[test]
    fn matching_rule_sets_a_field() {
        let doc = PolicyDocument { test: vec![rule("^/tests/", &[("tier", Value::String("1".into()))])], plan: vec![] };
        let mut node = Node::new("/tests/login");
        apply(&doc, PolicyKind::Test, &mut node, &["tier"]).unwrap();
        assert_eq!(node.data.get("tier").unwrap(), &Value::String("1".into()));
    }

    #[test]
    fn non_matching_selector_is_a_no_op() {
        let doc = PolicyDocument { test: vec![rule("^/other/", &[("tier", Value::String("1".into()))])], plan: vec![] };
        let mut node = Node::new("/tests/login");
        apply(&doc, PolicyKind::Test, &mut node, &["tier"]).unwrap();
        assert!(node.data.get("tier").is_none());
    }

    #[test]
    fn unknown_field_is_an_error() {
        let doc = PolicyDocument { test: vec![rule("^/tests/", &[("bogus", Value::Bool(true))])], plan: vec![] };
        let mut node = Node::new("/tests/login");
        let err = apply(&doc, PolicyKind::Test, &mut node, &["tier"]).unwrap_err();
        assert!(matches!(err, PolicyError::UnknownField(_, _, _)));
    }

    #[test]
    fn append_extends_an_existing_array() {
        let mut doc_append = HashMap::new();
        doc_append.insert("tag".to_string(), Value::String("extra".into()));
        let doc = PolicyDocument {
            test: vec![PolicyRule { for_: "^/tests/".into(), set: HashMap::new(), append: doc_append, merge: HashMap::new() }],
            plan: vec![],
        };
        let mut node = Node::new("/tests/login").with_data("tag", serde_json::json!(["base"]));
        apply(&doc, PolicyKind::Test, &mut node, &["tag"]).unwrap();
        assert_eq!(node.data.get("tag").unwrap(), &serde_json::json!(["base", "extra"]));
    }
}
