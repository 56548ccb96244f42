//! # Result & subresult model (§3, §4.6)
//!
//! One [`Result`] per (test, guest) pair. A `Result` may carry
//! [`Subresult`]s (single-level nesting only — a `Subresult` cannot itself
//! have subresults) produced by custom test harnesses such as Restraint's
//! `tmt-report-result` protocol (§4.5). The parent outcome is derived from
//! its subresults by *worst-wins* aggregation using the fixed priority
//! order in [`Outcome::priority`].

pub mod restraint;

use serde::{Deserialize, Serialize};

/// The set of outcomes a test, subresult, or check can produce (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pending,
    Skip,
    Info,
    Pass,
    Warn,
    Fail,
    Error,
}

impl Outcome {
    /// Worst-wins priority order from §4.6:
    /// `pending=0, skip=1, info=2, pass=3, warn=4, fail=5, error=6`.
    pub fn priority(&self) -> u8 {
        match self {
            Outcome::Pending => 0,
            Outcome::Skip => 1,
            Outcome::Info => 2,
            Outcome::Pass => 3,
            Outcome::Warn => 4,
            Outcome::Fail => 5,
            Outcome::Error => 6,
        }
    }

    /// The outcome a test's exit code maps to under `result: respect`
    /// (§4.5): `0 -> pass`, anything else `-> fail`.
    pub fn from_exit_code(code: i32) -> Self {
        if code == 0 {
            Outcome::Pass
        } else {
            Outcome::Fail
        }
    }

    /// `xfail` inverts pass/fail only; every other outcome passes through
    /// unchanged (§4.5).
    pub fn inverted(self) -> Self {
        match self {
            Outcome::Pass => Outcome::Fail,
            Outcome::Fail => Outcome::Pass,
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckEvent {
    BeforeTest,
    AfterTest,
}

/// One check's outcome, embedded in a `Result` (§4.6).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub event: CheckEvent,
    pub result: Outcome,
    #[serde(default)]
    pub log: Vec<String>,
}

/// A `Subresult` has the same shape as a `Result` minus nested
/// subresults — single-level nesting only (§3).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Subresult {
    pub name: String,
    pub result: Outcome,
    #[serde(default)]
    pub log: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
}

/// The shape of a `results.yaml`/`results.json` file written by a test
/// under `result: custom` (§4.5: "use it verbatim"). Only the fields a
/// test can meaningfully override are read back; everything else about
/// the [`TestResult`] (guest, timing, data path, serial number) still
/// comes from the engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CustomResult {
    pub result: Outcome,
    #[serde(default)]
    pub note: Vec<String>,
    #[serde(default)]
    pub log: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GuestRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// One test's outcome on one guest (§3).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TestResult {
    pub name: String,
    pub result: Outcome,
    #[serde(default)]
    pub note: Vec<String>,
    pub start_time: String,
    pub end_time: String,
    /// Seconds, rounded (§3 invariant: `duration = end_time - start_time`
    /// within ±1s, §8 invariant 3).
    pub duration: u64,
    pub guest: GuestRef,
    #[serde(default)]
    pub log: Vec<String>,
    #[serde(default)]
    pub check: Vec<CheckResult>,
    #[serde(default)]
    pub subresult: Vec<Subresult>,
    pub data_path: String,
    pub serial_number: u64,
    #[serde(default)]
    pub context: std::collections::HashMap<String, String>,
}

impl TestResult {
    /// Aggregates subresults into this result's `result` field using
    /// worst-wins priority, and writes a note describing the aggregation
    /// (not hoisting individual subresult notes, per §4.6). A no-op when
    /// there are no subresults.
    pub fn aggregate_subresults(&mut self) {
        if self.subresult.is_empty() {
            return;
        }
        let worst = self
            .subresult
            .iter()
            .map(|s| s.result)
            .max_by_key(|o| o.priority())
            .expect("non-empty subresult list");
        let passed = self.subresult.iter().filter(|s| s.result == Outcome::Pass).count();
        self.result = worst;
        self.note
            .push(format!("{}/{} subresults passed", passed, self.subresult.len()));
    }
}

/// Computes `end - start` rounded to the second, clamped to zero so a
/// clock skew never produces a negative duration (§3 invariant `start_time
/// <= end_time`).
pub fn duration_seconds(start: chrono::DateTime<chrono::Utc>, end: chrono::DateTime<chrono::Utc>) -> u64 {
    (end - start).num_seconds().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subresult(name: &str, result: Outcome) -> Subresult {
        Subresult { name: name.to_string(), result, log: vec![], end_time: None }
    }

    fn base_result() -> TestResult {
        TestResult {
            name: "/tests/example".into(),
            result: Outcome::Pending,
            note: vec![],
            start_time: "2026-01-01T00:00:00Z".into(),
            end_time: "2026-01-01T00:00:01Z".into(),
            duration: 1,
            guest: GuestRef { name: "g1".into(), role: None },
            log: vec!["output.txt".into()],
            check: vec![],
            subresult: vec![],
            data_path: "execute/data/guest/g1/tests-example".into(),
            serial_number: 1,
            context: Default::default(),
        }
    }

    #[test]
    fn all_pass_subresults_aggregate_to_pass() {
        let mut r = base_result();
        r.subresult = vec![subresult("a", Outcome::Pass), subresult("b", Outcome::Pass)];
        r.aggregate_subresults();
        assert_eq!(r.result, Outcome::Pass);
        assert_eq!(r.note, vec!["2/2 subresults passed"]);
    }

    #[test]
    fn worst_subresult_lifts_the_parent() {
        let mut r = base_result();
        r.subresult = vec![
            subresult("a", Outcome::Pass),
            subresult("b", Outcome::Fail),
            subresult("c", Outcome::Warn),
        ];
        r.aggregate_subresults();
        assert_eq!(r.result, Outcome::Fail);
        assert_eq!(r.note, vec!["1/3 subresults passed"]);
    }

    #[test]
    fn error_outranks_everything_else() {
        let mut r = base_result();
        r.subresult = vec![subresult("a", Outcome::Fail), subresult("b", Outcome::Error)];
        r.aggregate_subresults();
        assert_eq!(r.result, Outcome::Error);
    }

    #[test]
    fn xfail_inverts_pass_and_fail_only() {
        assert_eq!(Outcome::Pass.inverted(), Outcome::Fail);
        assert_eq!(Outcome::Fail.inverted(), Outcome::Pass);
        assert_eq!(Outcome::Warn.inverted(), Outcome::Warn);
    }

    #[test]
    fn duration_never_goes_negative() {
        use chrono::TimeZone;
        let start = chrono::Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 5).unwrap();
        let end = chrono::Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(duration_seconds(start, end), 0);
    }
}
