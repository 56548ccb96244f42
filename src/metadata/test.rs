//! Typed view of a `Test` leaf (§3), built by reading the fields out of a
//! [`super::Node`]. The core never constructs a `Test` from raw YAML
//! itself (that's the loader's job); discovery plugins hand one of these
//! to the execute engine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    Shell,
    Beakerlib,
}

/// How a test's outcome should be interpreted (§4.5).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultMode {
    Respect,
    Xfail,
    Pass,
    Info,
    Warn,
    Error,
    Fail,
    Custom,
    Restraint,
}

impl Default for ResultMode {
    fn default() -> Self {
        ResultMode::Respect
    }
}

/// A single entry of a test's `check` list (§3, §4.6).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CheckSpec {
    pub how: String,
    #[serde(default)]
    pub event: Vec<CheckEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckEvent {
    BeforeTest,
    AfterTest,
}

/// A test's time budget, parsed from the "N[smhd]" format with sums and
/// `*F` multipliers (§3). `5m` is the default when a test omits `duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Duration(pub std::time::Duration);

impl Default for Duration {
    fn default() -> Self {
        Duration(std::time::Duration::from_secs(5 * 60))
    }
}

impl Duration {
    /// Parses strings like `"5m"`, `"1h30m"`, `"90s*2"`. Each `N[smhd]`
    /// component contributes its seconds to a running sum; an optional
    /// trailing `*F` multiplies the whole sum by `F`.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let (body, factor) = match raw.split_once('*') {
            Some((b, f)) => (
                b,
                f.trim()
                    .parse::<f64>()
                    .map_err(|_| format!("invalid duration multiplier in '{raw}'"))?,
            ),
            None => (raw, 1.0),
        };

        let mut total_secs: f64 = 0.0;
        let mut number = String::new();
        for ch in body.trim().chars() {
            if ch.is_ascii_digit() || ch == '.' {
                number.push(ch);
                continue;
            }
            let unit_secs = match ch {
                's' => 1.0,
                'm' => 60.0,
                'h' => 3600.0,
                'd' => 86400.0,
                _ => return Err(format!("invalid duration unit '{ch}' in '{raw}'")),
            };
            let value: f64 = number
                .parse()
                .map_err(|_| format!("invalid duration component in '{raw}'"))?;
            total_secs += value * unit_secs;
            number.clear();
        }
        if !number.is_empty() {
            return Err(format!("duration '{raw}' is missing a unit"));
        }

        Ok(Duration(std::time::Duration::from_secs_f64(
            total_secs * factor,
        )))
    }
}

/// Typed view of a test node. Constructed from a [`Node`]'s merged data.
#[derive(Debug, Clone)]
pub struct Test {
    pub name: String,
    pub path: String,
    pub test: String,
    pub framework: Framework,
    pub duration: Duration,
    pub environment: HashMap<String, String>,
    pub require: Vec<String>,
    pub recommend: Vec<String>,
    pub result: ResultMode,
    pub check: Vec<CheckSpec>,
    pub tag: Vec<String>,
    pub tier: Option<String>,
    pub order: i64,
    pub enabled: bool,
    pub tty: bool,
    pub restart_with_reboot: bool,
    pub max_restarts: u32,
    /// Discover-assigned guest or role target (§4.4: "execute: tests are
    /// assigned to guests by the discover step's output ... or tagged
    /// with where"). `None` means every guest of the plan runs it.
    pub where_: Option<String>,
}

impl Test {
    /// Builds a `Test` from a leaf `Node`, applying the defaults of §3.
    pub fn from_node(node: &Node) -> Self {
        let framework = match node.get_str("framework") {
            Some("beakerlib") => Framework::Beakerlib,
            _ => Framework::Shell,
        };
        let duration = node
            .get_str("duration")
            .and_then(|raw| Duration::parse(raw).ok())
            .unwrap_or_default();
        let result = node
            .data
            .get("result")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();

        Test {
            name: node.name.clone(),
            path: node.get_str("path").unwrap_or(&node.name).to_string(),
            test: node.get_str("test").unwrap_or_default().to_string(),
            framework,
            duration,
            environment: string_map(node, "environment"),
            require: string_list(node, "require"),
            recommend: string_list(node, "recommend"),
            result,
            check: node
                .data
                .get("check")
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default(),
            tag: string_list(node, "tag"),
            tier: node.get_str("tier").map(|s| s.to_string()),
            order: node.get_i64("order", 50),
            enabled: node.get_bool("enabled", true),
            tty: node.get_bool("tty", false),
            restart_with_reboot: node.get_bool("restart-with-reboot", false),
            max_restarts: node
                .data
                .get("max-restarts")
                .and_then(|v| v.as_u64())
                .unwrap_or(1) as u32,
            where_: node.get_str("where").map(|s| s.to_string()),
        }
    }
}

fn string_list(node: &Node, key: &str) -> Vec<String> {
    match node.data.get(key) {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect(),
        Some(serde_json::Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn string_map(node: &Node, key: &str) -> HashMap<String, String> {
    match node.data.get(key) {
        Some(serde_json::Value::Object(map)) => map
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect(),
        _ => HashMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_parses_compound_values() {
        let d = Duration::parse("1h30m").unwrap();
        assert_eq!(d.0.as_secs(), 5400);
    }

    #[test]
    fn duration_applies_multiplier() {
        let d = Duration::parse("10s*3").unwrap();
        assert_eq!(d.0.as_secs(), 30);
    }

    #[test]
    fn duration_rejects_missing_unit() {
        assert!(Duration::parse("10").is_err());
    }

    #[test]
    fn default_duration_is_five_minutes() {
        assert_eq!(Duration::default().0.as_secs(), 300);
    }
}
