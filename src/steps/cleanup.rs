//! Cleanup step (§4.4, §7): the unconditional terminator. Unlike the six
//! ordered steps, cleanup always runs — after success, after a test
//! failure, after an interrupt, after a provisioning error — and does not
//! consult `already_done`: every run needs its guests released, whether or
//! not this is the first attempt.
//!
//! Runs any declared cleanup phases first (while guests are still up),
//! then stops every guest, collecting failures rather than stopping at the
//! first one so a stuck guest cannot block the others from being released.

use std::collections::HashMap;

use crate::environment::Environment;
use crate::errors::StepError;
use crate::guest::Guest;
use crate::phase::registry::PhaseRegistry;
use crate::phase::PhaseSpec;
use crate::scheduler::roster::GuestRoster;
use crate::scheduler::TickResult;
use crate::workdir::Workdir;

pub async fn run(
    workdir: &Workdir,
    plan_name: &str,
    phases: &[PhaseSpec],
    guests: &mut HashMap<String, Box<dyn Guest>>,
    roster: &GuestRoster,
    registry: &PhaseRegistry,
    environment: &Environment,
) -> Result<Vec<TickResult>, StepError> {
    let phase_results = if phases.is_empty() {
        Vec::new()
    } else {
        super::run_step_phases(plan_name, crate::metadata::plan::StepKind::Cleanup, phases, guests, roster, registry, environment)
            .await?
    };

    for guest in guests.values_mut() {
        if let Err(err) = guest.stop().await {
            tracing::warn!(plan = plan_name, guest = guest.name(), error = %err, "guest failed to stop during cleanup");
        }
    }

    super::persist_step_result(workdir, plan_name, "cleanup", &phase_results)?;
    Ok(phase_results)
}
