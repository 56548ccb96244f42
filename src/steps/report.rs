//! Report step (§4.4, §4.6): persists the aggregated
//! [`crate::result::TestResult`] list and runs report-step phases against
//! it (display, html, junit, polarion, reportportal — concrete exporters
//! beyond `display` are out of scope, §1). `display` is logged directly
//! here rather than through the phase-scheduler dispatch, since a
//! reporter's whole job is reading the result set, not talking to a
//! guest — the one thing [`crate::phase::Phase::run`] hands it.

use std::collections::HashMap;

use crate::environment::Environment;
use crate::errors::StepError;
use crate::guest::Guest;
use crate::phase::registry::PhaseRegistry;
use crate::phase::PhaseSpec;
use crate::result::{Outcome, TestResult};
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
    results: &[TestResult],
    force: bool,
) -> Result<StepStatus, StepError> {
    if super::already_done(workdir, plan_name, "report", force)? {
        return Ok(StepStatus::Done);
    }

    for result in results {
        tracing::info!(plan = plan_name, test = result.name, guest = result.guest.name, result = ?result.result, "test result");
    }
    let failed = results.iter().filter(|r| matches!(r.result, Outcome::Fail | Outcome::Error)).count();
    tracing::info!(plan = plan_name, total = results.len(), failed, "report summary");

    let tick_results: Vec<TickResult> = super::run_step_phases(
        plan_name,
        crate::metadata::plan::StepKind::Report,
        phases,
        guests,
        roster,
        registry,
        environment,
    )
    .await?;

    workdir.write_yaml(plan_name, "report", "results.yaml", &results.to_vec())?;
    super::persist_step_result(workdir, plan_name, "report", &tick_results)
}
