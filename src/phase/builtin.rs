//! A minimal set of built-in phase plugins. Concrete phase plugins beyond
//! these are out of scope (§1) — these exist only so the scheduler, step
//! engines, and multihost-coordination tick-boundary rule (§4.4 rule 2)
//! are exercisable end-to-end without a real Ansible/install backend.

use async_trait::async_trait;
use std::time::Duration;

use crate::environment::Environment;
use crate::errors::GuestError;
use crate::guest::{ExecRequest, Guest};

use super::{Phase, PhaseOutcome, PhaseSpec};

/// Runs an arbitrary shell script option (`script: "..."`) on the guest.
/// Used by `prepare`/`execute`/`finish` alike.
pub struct ShellPhase;

#[async_trait]
impl Phase for ShellPhase {
    fn how(&self) -> &'static str {
        "shell"
    }

    async fn run(&self, spec: &PhaseSpec, guest: &dyn Guest, env: &Environment) -> Result<PhaseOutcome, GuestError> {
        let script = spec
            .options
            .get("script")
            .and_then(|v| v.as_str())
            .unwrap_or("true")
            .to_string();

        let result = guest
            .exec(ExecRequest {
                cmd: script,
                env: env.as_pairs(),
                cwd: None,
                tty: false,
                timeout: Some(Duration::from_secs(300)),
            })
            .await?;

        if result.exit_code == 0 {
            Ok(PhaseOutcome::ok())
        } else {
            Ok(PhaseOutcome::fail(format!("exit code {}", result.exit_code)))
        }
    }
}

/// Installs `require`/`recommend` packages via the guest's package
/// manager. The backend package-manager invocation itself is out of
/// scope; this phase only resolves the package list into one exec call
/// per the guest's discovered `package-manager` fact.
pub struct InstallPhase;

#[async_trait]
impl Phase for InstallPhase {
    fn how(&self) -> &'static str {
        "install"
    }

    async fn run(&self, spec: &PhaseSpec, guest: &dyn Guest, env: &Environment) -> Result<PhaseOutcome, GuestError> {
        let packages: Vec<String> = spec
            .options
            .get("package")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|p| p.as_str().map(|s| s.to_string())).collect())
            .unwrap_or_default();

        if packages.is_empty() {
            return Ok(PhaseOutcome::ok());
        }

        let cmd = format!("tmt-install {}", packages.join(" "));
        let result = guest
            .exec(ExecRequest { cmd, env: env.as_pairs(), cwd: None, tty: false, timeout: Some(Duration::from_secs(600)) })
            .await?;

        if result.exit_code == 0 {
            Ok(PhaseOutcome::ok())
        } else {
            Ok(PhaseOutcome::fail(format!("package installation failed: {}", result.stderr)))
        }
    }
}

/// A *shared* multihost-coordination phase (§4.4 rule 2, §9): when its
/// `where` resolves to more than one guest it is treated as a single
/// coordinated unit rather than N independent invocations, forcing a tick
/// boundary around it.
pub struct MultihostSyncPhase;

#[async_trait]
impl Phase for MultihostSyncPhase {
    fn how(&self) -> &'static str {
        "multihost"
    }

    fn is_shared(&self) -> bool {
        true
    }

    async fn run(&self, _spec: &PhaseSpec, guest: &dyn Guest, env: &Environment) -> Result<PhaseOutcome, GuestError> {
        let result = guest
            .exec(ExecRequest {
                cmd: "tmt-multihost-sync".to_string(),
                env: env.as_pairs(),
                cwd: None,
                tty: false,
                timeout: Some(Duration::from_secs(60)),
            })
            .await?;
        Ok(if result.exit_code == 0 { PhaseOutcome::ok() } else { PhaseOutcome::fail("sync barrier failed") })
    }
}

/// A trivial `report` step phase that only needs the aggregated results —
/// concrete HTML/JUnit reporters are out of scope (§1); this stands in
/// for a reporter so the `report` step has something to schedule.
pub struct DisplayReportPhase;

#[async_trait]
impl Phase for DisplayReportPhase {
    fn how(&self) -> &'static str {
        "display"
    }

    async fn run(&self, _spec: &PhaseSpec, _guest: &dyn Guest, _env: &Environment) -> Result<PhaseOutcome, GuestError> {
        Ok(PhaseOutcome::ok())
    }
}
