//! Parsing for `tmt-report-results.yaml`, the file the `tmt-report-result`
//! mock script (§4.5, §9) appends to. Each invocation on the guest appends
//! one YAML entry; the execute engine reads the whole file back after the
//! test exits and expands it into [`super::Subresult`]s for `result:
//! restraint` tests (§4.5, scenario S6 in §8).

use serde::{Deserialize, Serialize};

use super::{Outcome, Subresult};
use crate::errors::ResultError;

/// One raw entry as appended by `tmt-report-result`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReportedResult {
    pub name: String,
    pub result: Outcome,
    #[serde(default)]
    pub log: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
}

/// Parses the full contents of `tmt-report-results.yaml` (a YAML sequence
/// of `ReportedResult`s) into subresults, preserving declaration order
/// (§4.5, §8 scenario S6).
pub fn parse_report_file(contents: &str) -> Result<Vec<Subresult>, ResultError> {
    let entries: Vec<ReportedResult> = serde_yaml::from_str(contents)
        .map_err(|e| ResultError::MalformedRestraintResults("tmt-report-results.yaml".into(), e))?;
    Ok(entries
        .into_iter()
        .map(|e| Subresult { name: e.name, result: e.result, log: e.log, end_time: e.end_time })
        .collect())
}

/// The shell wrapper installed on the guest so legacy Restraint/RHTS tests
/// can report multiple subresults (§4.5, §9). Each call appends one YAML
/// document to `$TMT_TEST_DATA/tmt-report-results.yaml`.
pub const TMT_REPORT_RESULT_SCRIPT: &str = r#"#!/bin/sh
# tmt-report-result NAME RESULT [LOG...]
# Appends one entry to $TMT_TEST_DATA/tmt-report-results.yaml.
set -eu
name="$1"
result="$2"
shift 2 || true
out="${TMT_TEST_DATA:-.}/tmt-report-results.yaml"
{
    echo "- name: \"$name\""
    echo "  result: $result"
    echo "  end-time: \"$(date -u +%Y-%m-%dT%H:%M:%SZ)\""
    if [ "$#" -gt 0 ]; then
        echo "  log:"
        for path in "$@"; do
            echo "    - \"$path\""
        done
    fi
} >> "$out"
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_three_appended_entries_preserving_order() {
        let yaml = "\
- name: \"/setup\"
  result: pass
  log: [\"setup.log\"]
- name: \"/body\"
  result: fail
- name: \"/teardown\"
  result: warn
";
        let subresults = parse_report_file(yaml).unwrap();
        assert_eq!(subresults.len(), 3);
        assert_eq!(subresults[0].result, Outcome::Pass);
        assert_eq!(subresults[1].result, Outcome::Fail);
        assert_eq!(subresults[2].result, Outcome::Warn);
        assert_eq!(subresults[0].log, vec!["setup.log".to_string()]);
    }

    #[test]
    fn malformed_yaml_is_reported_as_an_error() {
        let err = parse_report_file("not: [valid, restraint").unwrap_err();
        assert!(matches!(err, ResultError::MalformedRestraintResults(_, _)));
    }
}
