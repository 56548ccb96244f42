//! Prepare step (§4.4): runs each guest's prepare phases (package
//! installs, ansible playbooks, custom scripts) before any test executes.
//! A guest that fails prepare still keeps its place in the roster — the
//! failure surfaces through the persisted step status and propagates to
//! `execute` as a precondition the run driver checks before continuing on
//! that guest.

use std::collections::HashMap;

use crate::environment::Environment;
use crate::errors::StepError;
use crate::guest::Guest;
use crate::phase::registry::PhaseRegistry;
use crate::phase::PhaseSpec;
use crate::scheduler::roster::GuestRoster;
use crate::scheduler::TickResult;
use crate::workdir::{StepStatus, Workdir};

pub async fn run(
    workdir: &Workdir,
    plan_name: &str,
    phases: &[PhaseSpec],
    guests: &HashMap<String, Box<dyn Guest>>,
    roster: &GuestRoster,
    registry: &PhaseRegistry,
    environment: &Environment,
    force: bool,
) -> Result<StepStatus, StepError> {
    if super::already_done(workdir, plan_name, "prepare", force)? {
        return Ok(StepStatus::Done);
    }

    let results: Vec<TickResult> =
        super::run_step_phases(plan_name, crate::metadata::plan::StepKind::Prepare, phases, guests, roster, registry, environment)
            .await?;

    super::persist_step_result(workdir, plan_name, "prepare", &results)
}
