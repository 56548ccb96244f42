//! Finish step (§4.4): last chance to run guest-side cleanup phases
//! (collect logs, revert snapshots, custom teardown scripts) while guests
//! are still reachable. Per Open Question 3, finish always runs against
//! whatever guests were actually provisioned — even after a provisioning
//! failure on some other guest — rather than being skipped wholesale.

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
    if super::already_done(workdir, plan_name, "finish", force)? {
        return Ok(StepStatus::Done);
    }

    let results: Vec<TickResult> =
        super::run_step_phases(plan_name, crate::metadata::plan::StepKind::Finish, phases, guests, roster, registry, environment)
            .await?;

    super::persist_step_result(workdir, plan_name, "finish", &results)
}
