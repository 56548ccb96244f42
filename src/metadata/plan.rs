//! Typed view of a `Plan` node (§3): the six step subtrees plus the
//! plan-level `context`, `environment` and `gate`.

use serde_json::Value;
use std::collections::HashMap;

use super::Node;
use crate::phase::PhaseSpec;

/// The six ordered steps plus the unconditional cleanup terminator (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StepKind {
    Discover,
    Provision,
    Prepare,
    Execute,
    Report,
    Finish,
    Cleanup,
}

impl StepKind {
    /// The fixed execution order, cleanup excluded (it is never "reached"
    /// in sequence — it always runs as the terminator, see
    /// [`crate::run::PlanExecutor`]).
    pub const ORDERED: [StepKind; 6] = [
        StepKind::Discover,
        StepKind::Provision,
        StepKind::Prepare,
        StepKind::Execute,
        StepKind::Report,
        StepKind::Finish,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Discover => "discover",
            StepKind::Provision => "provision",
            StepKind::Prepare => "prepare",
            StepKind::Execute => "execute",
            StepKind::Report => "report",
            StepKind::Finish => "finish",
            StepKind::Cleanup => "cleanup",
        }
    }
}

/// A plan: its six phase-spec lists plus plan-level metadata.
#[derive(Debug, Clone)]
pub struct Plan {
    pub name: String,
    pub context: HashMap<String, String>,
    pub environment: HashMap<String, String>,
    pub environment_file: Vec<String>,
    pub gate: Vec<String>,
    pub phases: HashMap<StepKind, Vec<PhaseSpec>>,
    /// Set when this plan inherits from another plan (§4.8 rule 5).
    pub imports: Option<String>,
    /// Root of the subtree the discover step walks for tests (§3's "tests
    /// tree"). Defaults to `/tests`, overridable via the `discover-root`
    /// key on the plan node.
    pub discover_root: String,
}

impl Plan {
    pub fn from_node(node: &Node) -> Self {
        let mut phases = HashMap::new();
        for step in StepKind::ORDERED {
            let specs = node
                .find(&format!("{}/{}", node.name, step.as_str()))
                .map(|n| n.children.iter().map(PhaseSpec::from_node).collect())
                .unwrap_or_default();
            phases.insert(step, specs);
        }
        phases.insert(StepKind::Cleanup, {
            node.find(&format!("{}/cleanup", node.name))
                .map(|n| n.children.iter().map(PhaseSpec::from_node).collect())
                .unwrap_or_default()
        });

        Plan {
            name: node.name.clone(),
            context: string_map(node, "context"),
            environment: string_map(node, "environment"),
            environment_file: string_list(node, "environment-file"),
            gate: string_list(node, "gate"),
            phases,
            imports: node.get_str("import-plan").map(|s| s.to_string()),
            discover_root: node.get_str("discover-root").unwrap_or("/tests").to_string(),
        }
    }

    pub fn phases_for(&self, step: StepKind) -> &[PhaseSpec] {
        self.phases.get(&step).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

fn string_list(node: &Node, key: &str) -> Vec<String> {
    match node.data.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn string_map(node: &Node, key: &str) -> HashMap<String, String> {
    match node.data.get(key) {
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect(),
        _ => HashMap::new(),
    }
}
