//! # Check runner (§4.6, §3)
//!
//! A check is a named pre/after-test diagnostic whose outcome is merged
//! into the test's [`crate::result::TestResult::check`] list. Concrete
//! checks (AVC, dmesg, journal, journal-dmesg, watchdog, coredump) each
//! have a default enablement per provisioner — containers skip
//! kernel-level checks since there's no kernel to inspect.

use async_trait::async_trait;

use crate::environment::Environment;
use crate::errors::GuestError;
use crate::guest::Guest;
use crate::result::{CheckEvent, CheckResult, Outcome};

/// The well-known check kinds named in §4.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    Avc,
    Dmesg,
    Journal,
    JournalDmesg,
    Watchdog,
    Coredump,
}

impl CheckKind {
    pub fn name(&self) -> &'static str {
        match self {
            CheckKind::Avc => "avc",
            CheckKind::Dmesg => "dmesg",
            CheckKind::Journal => "journal",
            CheckKind::JournalDmesg => "journal-dmesg",
            CheckKind::Watchdog => "watchdog",
            CheckKind::Coredump => "coredump",
        }
    }

    /// Whether this check is meaningful on a guest with no real kernel
    /// (e.g. a container). Kernel-level checks default to disabled there.
    pub fn enabled_by_default(&self, guest_is_container: bool) -> bool {
        if guest_is_container {
            matches!(self, CheckKind::Journal)
        } else {
            true
        }
    }
}

/// Contract every check plugin satisfies.
#[async_trait]
pub trait Check: Send + Sync {
    fn kind(&self) -> CheckKind;
    async fn run(&self, event: CheckEvent, guest: &dyn Guest, env: &Environment) -> Result<CheckResult, GuestError>;
}

/// A check that always reports the given outcome — used by tests and as
/// the default for check kinds without a real probe wired up yet.
pub struct StaticCheck {
    pub kind: CheckKind,
    pub outcome: Outcome,
}

#[async_trait]
impl Check for StaticCheck {
    fn kind(&self) -> CheckKind {
        self.kind
    }

    async fn run(&self, event: CheckEvent, _guest: &dyn Guest, _env: &Environment) -> Result<CheckResult, GuestError> {
        Ok(CheckResult { name: self.kind.name().to_string(), event, result: self.outcome, log: vec![] })
    }
}

/// Schedules a test's check list (§3's `check` field) for one event
/// (before-test or after-test), running every enabled check concurrently
/// against the guest and collecting their results in declaration order.
pub async fn run_checks(
    checks: &[Box<dyn Check>],
    event: CheckEvent,
    guest: &dyn Guest,
    env: &Environment,
) -> Vec<CheckResult> {
    let mut results = Vec::with_capacity(checks.len());
    for check in checks {
        match check.run(event, guest, env).await {
            Ok(result) => results.push(result),
            Err(err) => results.push(CheckResult {
                name: check.kind().name().to_string(),
                event,
                result: Outcome::Error,
                log: vec![err.to_string()],
            }),
        }
    }
    results
}

/// Builds the synthetic `internal/interrupt` check recorded against
/// queued tests when a run is cancelled (§4.9, §8 scenario S5).
pub fn interrupt_check() -> CheckResult {
    CheckResult {
        name: "internal/interrupt".to_string(),
        event: CheckEvent::AfterTest,
        result: Outcome::Fail,
        log: vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guest::stub::StubGuest;

    #[tokio::test]
    async fn runs_checks_in_declaration_order() {
        let guest = StubGuest::new("g1");
        let env = Environment::new();
        let checks: Vec<Box<dyn Check>> = vec![
            Box::new(StaticCheck { kind: CheckKind::Dmesg, outcome: Outcome::Pass }),
            Box::new(StaticCheck { kind: CheckKind::Avc, outcome: Outcome::Warn }),
        ];
        let results = run_checks(&checks, CheckEvent::AfterTest, &guest, &env).await;
        assert_eq!(results[0].name, "dmesg");
        assert_eq!(results[1].name, "avc");
        assert_eq!(results[1].result, Outcome::Warn);
    }

    #[test]
    fn container_disables_kernel_level_checks() {
        assert!(!CheckKind::Dmesg.enabled_by_default(true));
        assert!(CheckKind::Journal.enabled_by_default(true));
        assert!(CheckKind::Dmesg.enabled_by_default(false));
    }
}
