//! Discover step: resolves the metadata tree's `/tests` leaves into
//! [`Test`] objects, assigns monotonic serial numbers (gaps allowed for
//! later-skipped tests, §3), and persists `discover/tests.yaml`.
//!
//! The concrete discovery backends (fmf filters, shell discovery, …) are
//! out of scope (§1); this step consumes whatever subtree the caller
//! points it at via the three query operations on [`Node`] (§3).

use serde::{Deserialize, Serialize};

use crate::errors::StepError;
use crate::metadata::test::Test;
use crate::metadata::Node;
use crate::workdir::{StepState, StepStatus, Workdir};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredTest {
    pub name: String,
    pub path: String,
    pub serial_number: u64,
    #[serde(default)]
    pub where_: Option<String>,
}

/// Runs discovery: every enabled leaf under `tests_root` becomes a `Test`.
/// Disabled tests are dropped entirely — they never reach execute, so they
/// don't consume a serial number either; only *skipped* tests, decided
/// later by provisioning/selection failures, retain their number (§4.6).
/// Serial numbers themselves are assigned by the caller from tree order,
/// since they're a property of the persisted artifact, not of `Test`.
pub fn discover(tests_root: &Node) -> Vec<Test> {
    tests_root
        .leaves()
        .into_iter()
        .map(Test::from_node)
        .filter(|t| t.enabled)
        .collect()
}

/// Runs the discover step and persists its artifact, honoring the
/// already-`done` resume short-circuit (§4.1, §8 idempotence).
pub fn run(
    workdir: &Workdir,
    plan_name: &str,
    tests_root: &Node,
    force: bool,
) -> Result<Vec<Test>, StepError> {
    if super::already_done(workdir, plan_name, "discover", force)? {
        if let Some(cached) = workdir.read_yaml::<Vec<DiscoveredTest>>(plan_name, "discover", "tests.yaml")? {
            let tests = discover(tests_root);
            let mut by_name: std::collections::HashMap<String, Test> =
                tests.into_iter().map(|t| (t.name.clone(), t)).collect();
            return Ok(cached
                .into_iter()
                .filter_map(|d| by_name.remove(&d.name))
                .collect());
        }
    }

    let tests = discover(tests_root);
    let serialized: Vec<DiscoveredTest> = tests
        .iter()
        .enumerate()
        .map(|(i, t)| DiscoveredTest { name: t.name.clone(), path: t.path.clone(), serial_number: i as u64 + 1, where_: t.where_.clone() })
        .collect();

    workdir.write_yaml(plan_name, "discover", "tests.yaml", &serialized)?;
    workdir.save_step_state(plan_name, "discover", &StepState { status: StepStatus::Done, data: vec![] })?;
    Ok(tests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree() -> Node {
        Node::new("/tests")
            .with_child(Node::new("/tests/a").with_data("test", json!("/bin/true")))
            .with_child(Node::new("/tests/b").with_data("test", json!("/bin/false")).with_data("enabled", json!(false)))
            .with_child(Node::new("/tests/c").with_data("test", json!("sleep 1")))
    }

    #[test]
    fn discover_skips_disabled_tests() {
        let tests = discover(&tree());
        let names: Vec<&str> = tests.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["/tests/a", "/tests/c"]);
    }

    #[test]
    fn run_persists_and_resumes() {
        let base = tempfile::tempdir().unwrap();
        let workdir = Workdir::alloc_run(base.path(), Some("r"), false).unwrap();
        let tree = tree();

        let first = run(&workdir, "/plan", &tree, false).unwrap();
        assert_eq!(first.len(), 2);

        let second = run(&workdir, "/plan", &tree, false).unwrap();
        assert_eq!(second.len(), 2);
    }
}
