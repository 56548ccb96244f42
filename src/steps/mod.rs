//! # Step engines (§4.4 cross-step semantics, §8 invariant 1)
//!
//! Each of discover/provision/prepare/execute/report/finish aggregates its
//! phase-scheduler output into the step's persisted artifact and can
//! re-enter on resume (if `step.yaml` already says `done`, the step is
//! skipped unless `--force` cleared the marker). Cleanup is the
//! unconditional terminator: it always runs, even after a failure in any
//! prior step, and does not depend on provision having succeeded (§4.4,
//! §7).

pub mod discover;
pub mod provision;
pub mod prepare;
pub mod execute;
pub mod report;
pub mod finish;
pub mod cleanup;

use crate::errors::StepError;
use crate::metadata::plan::StepKind;
use crate::phase::registry::PhaseRegistry;
use crate::scheduler::roster::GuestRoster;
use crate::scheduler::{self, Tick, TickResult};
use crate::workdir::{PhaseState, StepStatus, Workdir};

/// The `how` identifiers treated as shared/multihost-coordinated for tick
/// boundary purposes (§4.4 rule 2). Kept centrally so every step applies
/// the same rule.
pub const SHARED_PHASE_HOWS: &[&str] = &["multihost"];

/// Runs every phase of `step` for `plan_name` against `guests`/`roster`,
/// returning the flattened per-(phase, guest) outcomes in tick order.
/// Does not itself decide pass/fail — callers fold the outcomes into
/// their step-specific artifact.
pub async fn run_step_phases(
    plan_name: &str,
    step: StepKind,
    phases: &[crate::phase::PhaseSpec],
    guests: &std::collections::HashMap<String, Box<dyn crate::guest::Guest>>,
    roster: &GuestRoster,
    registry: &PhaseRegistry,
    environment: &crate::environment::Environment,
) -> Result<Vec<TickResult>, StepError> {
    let ticks: Vec<Tick> = scheduler::build_ticks(step.as_str(), phases, roster, SHARED_PHASE_HOWS)?;
    let mut all_results = Vec::new();
    for tick in &ticks {
        let results = scheduler::run_tick(tick, guests, roster, registry, environment).await?;
        all_results.extend(results);
    }
    tracing::info!(plan = plan_name, step = step.as_str(), phases = phases.len(), ticks = ticks.len(), "step phases completed");
    Ok(all_results)
}

/// Whether a step's workdir marker says it can be skipped on resume (§4.1,
/// §8 idempotence property): `done` and not forced.
pub fn already_done(workdir: &Workdir, plan_name: &str, step: &str, force: bool) -> Result<bool, StepError> {
    if force {
        return Ok(false);
    }
    let state = workdir.load_step_state(plan_name, step)?;
    Ok(state.status == StepStatus::Done)
}

/// Persists a step's final status plus per-phase bookkeeping.
pub fn persist_step_result(
    workdir: &Workdir,
    plan_name: &str,
    step: &str,
    results: &[TickResult],
) -> Result<StepStatus, StepError> {
    let status = if results.iter().all(|r| r.outcome.ok) {
        StepStatus::Done
    } else {
        StepStatus::Failed
    };
    let data = results
        .iter()
        .map(|r| PhaseState { name: r.phase_name.clone(), how: String::new(), guest: Some(r.guest.clone()), done: r.outcome.ok })
        .collect();
    workdir.save_step_state(plan_name, step, &crate::workdir::StepState { status, data })?;
    Ok(status)
}
