//! # Reboot coordination (§4.7, §9)
//!
//! Reboot is modeled as a cooperative suspension of one test: the guest
//! goes away and comes back, the engine waits for readiness, and (for a
//! test-requested reboot) re-invokes the same test with `TMT_REBOOT_COUNT`
//! incremented. `TMT_REBOOT_SCRIPT_EXIT_CODE` is the sentinel a test
//! exits with to request a reboot (§9 reserves `122`).

use std::time::Duration;

use crate::errors::GuestError;
use crate::guest::{Guest, RebootMode as GuestRebootMode};

/// Sentinel exit code a test uses to request a reboot (§9, §4.5).
pub const TMT_REBOOT_SCRIPT_EXIT_CODE: i32 = 122;

/// Why a reboot is happening, distinct from the *mode* (soft/hard) used
/// to perform it — tracked so the execute engine can tell "the test asked
/// for this" apart from "the host rebooted under us" (§4.5, §9 pidfile
/// protocol).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebootTrigger {
    TestRequested,
    HostRebootedUnderTest,
}

/// One guest's reboot policy for the plan: the mode to use, an optional
/// custom command (only honored under `--feeling-safe`), and the timeout
/// to wait for readiness.
#[derive(Debug, Clone)]
pub struct RebootPolicy {
    pub mode: GuestRebootMode,
    pub timeout: Duration,
    pub feeling_safe: bool,
}

impl RebootPolicy {
    pub fn soft(timeout: Duration) -> Self {
        RebootPolicy { mode: GuestRebootMode::Soft, timeout, feeling_safe: false }
    }
}

/// Performs one reboot cycle against `guest`, following §4.7 precisely:
///
/// - `soft`/`systemd-soft`: request a graceful reboot; if the guest
///   doesn't go away and come back within `timeout`, escalate to `hard`
///   only when `allow_hard_escalation` is set, otherwise surface the
///   error.
/// - `hard`: power-cycle via the provisioner; `GuestError::
///   HardRebootUnsupported` if the backend can't do that.
/// - a `Custom` command is rejected unless `policy.feeling_safe` is set
///   (§4.7 "feeling-safe opt-in").
///
/// On success, returns the guest's new reboot count (invariant 5 of §8:
/// incremented by exactly one per successful reboot).
pub async fn perform_reboot(
    guest: &mut dyn Guest,
    policy: &RebootPolicy,
    allow_hard_escalation: bool,
) -> Result<u32, GuestError> {
    if matches!(policy.mode, GuestRebootMode::Custom(_)) && !policy.feeling_safe {
        return Err(GuestError::CustomRebootNotAllowed);
    }

    match guest.reboot(policy.mode.clone(), policy.timeout, allow_hard_escalation).await {
        Ok(count) => Ok(count),
        Err(GuestError::RebootTimeout(name)) if allow_hard_escalation && policy.mode != GuestRebootMode::Hard => {
            guest.reboot(GuestRebootMode::Hard, policy.timeout, allow_hard_escalation).await.map_err(|_| GuestError::RebootTimeout(name))
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guest::stub::StubGuest;

    #[tokio::test]
    async fn successful_reboot_increments_count_by_one() {
        let mut guest = StubGuest::new("g1");
        let policy = RebootPolicy::soft(Duration::from_secs(1));
        let count = perform_reboot(&mut guest, &policy, false).await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(guest.reboot_count(), 1);

        let count2 = perform_reboot(&mut guest, &policy, false).await.unwrap();
        assert_eq!(count2, 2);
    }

    #[tokio::test]
    async fn hard_reboot_fails_when_unsupported() {
        let mut guest = StubGuest::new("g1").with_hard_reboot_support(false);
        let policy = RebootPolicy { mode: GuestRebootMode::Hard, timeout: Duration::from_secs(1), feeling_safe: false };
        let err = perform_reboot(&mut guest, &policy, false).await.unwrap_err();
        assert!(matches!(err, GuestError::HardRebootUnsupported(_)));
    }

    #[tokio::test]
    async fn custom_reboot_command_requires_feeling_safe() {
        let mut guest = StubGuest::new("g1");
        let policy = RebootPolicy { mode: GuestRebootMode::Custom("reboot -f".into()), timeout: Duration::from_secs(1), feeling_safe: false };
        let err = perform_reboot(&mut guest, &policy, false).await.unwrap_err();
        assert!(matches!(err, GuestError::CustomRebootNotAllowed));
    }
}
