//! # Run driver (§4.2, §6)
//!
//! Ties every other component together into the thing `tmt run` actually
//! does: pick plans, fold CLI phase overlays into each step's phase list,
//! walk discover -> provision -> prepare -> execute -> report -> finish in
//! that fixed order, and always run cleanup last regardless of what
//! happened above — including when provisioning itself failed, per Open
//! Question 3 (finish/cleanup still run, against whatever guests came
//! up, possibly none).

use std::collections::HashMap;
use std::time::Duration;

use regex::Regex;

use crate::check::{Check, CheckKind, StaticCheck};
use crate::environment::{self, Environment, EnvironmentComposer, Layer};
use crate::errors::TmtError;
use crate::guest::{Guest, RebootMode};
use crate::interrupt::CancellationToken;
use crate::metadata::plan::{Plan, StepKind};
use crate::metadata::test::Test;
use crate::metadata::Node;
use crate::phase::registry::PhaseRegistry;
use crate::phase::PhaseSpec;
use crate::reboot::RebootPolicy;
use crate::result::{Outcome, TestResult};
use crate::steps;
use crate::workdir::Workdir;

/// A single `--insert`/`--update`/`--update-missing`/`--remove` CLI
/// overlay targeting one step (§6). Folded into that step's phase list
/// before [`crate::scheduler::build_ticks`] runs, so tick-boundary rule 3
/// ("a CLI overlay insertion") is just rule 1/2 applied to the patched
/// list — no separate boundary logic is needed downstream.
#[derive(Debug, Clone)]
pub enum PhaseOverlay {
    /// Always appended, even if a phase of the same name already exists
    /// (mirrors `tmt run prepare --insert`, which can legitimately add a
    /// second phase sharing a name used in another step).
    Insert(PhaseSpec),
    /// Replaces the phase with the same name, or appends it if none
    /// exists yet.
    Update(PhaseSpec),
    /// Appends only if no phase with that name exists; leaves an existing
    /// one untouched.
    UpdateMissing(PhaseSpec),
    /// Drops every phase with that name.
    Remove(String),
}

/// Applies a step's queued overlays, in the order they appear on the
/// command line, to its metadata-sourced phase list.
pub fn apply_overlays(existing: &[PhaseSpec], overlays: &[PhaseOverlay]) -> Vec<PhaseSpec> {
    let mut phases: Vec<PhaseSpec> = existing.to_vec();
    for overlay in overlays {
        match overlay {
            PhaseOverlay::Insert(spec) => phases.push(spec.clone()),
            PhaseOverlay::Update(spec) => {
                if let Some(slot) = phases.iter_mut().find(|p| p.name == spec.name) {
                    *slot = spec.clone();
                } else {
                    phases.push(spec.clone());
                }
            }
            PhaseOverlay::UpdateMissing(spec) => {
                if !phases.iter().any(|p| p.name == spec.name) {
                    phases.push(spec.clone());
                }
            }
            PhaseOverlay::Remove(name) => phases.retain(|p| &p.name != name),
        }
    }
    phases
}

/// Which plans and tests a run selects (§6 `plans --name`, `tests
/// --name`).
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub plan_name: Option<Regex>,
    pub test_name: Option<Regex>,
}

impl Selection {
    fn matches_plan(&self, plan_name: &str) -> bool {
        self.plan_name.as_ref().map(|re| re.is_match(plan_name)).unwrap_or(true)
    }

    fn matches_test(&self, test_name: &str) -> bool {
        self.test_name.as_ref().map(|re| re.is_match(test_name)).unwrap_or(true)
    }
}

/// Finds every plan node under `root` (a node is a plan when its data
/// carries `plan: true`, the marker the CLI's `--tree` loader attaches —
/// see `main.rs`) whose name matches `selection`.
pub fn select_plans<'a>(root: &'a Node, selection: &Selection) -> Vec<&'a Node> {
    fn walk<'a>(node: &'a Node, out: &mut Vec<&'a Node>) {
        if node.get_bool("plan", false) {
            out.push(node);
        }
        for child in &node.children {
            walk(child, out);
        }
    }
    let mut plans = Vec::new();
    walk(root, &mut plans);
    plans.into_iter().filter(|n| selection.matches_plan(&n.name)).collect()
}

/// Run-wide options that don't vary per plan: CLI flags and environment
/// inputs merged ahead of time (§4.8, §6).
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub force: bool,
    pub boot_timeout: Duration,
    pub reboot_timeout: Duration,
    pub feeling_safe: bool,
    pub reboot_mode: Option<RebootMode>,
    /// `-e KEY=VALUE` (§4.8 layer 7, highest short of phase intrinsics).
    pub cli_environment: HashMap<String, String>,
    /// `--environment-file` (§4.8 layer 6), merged last-wins in
    /// command-line order before the layer is applied.
    pub cli_environment_file_vars: HashMap<String, String>,
    pub overlays: HashMap<StepKind, Vec<PhaseOverlay>>,
    pub is_container: bool,
}

/// One plan's finished run: its aggregated test results plus whatever
/// step-level error interrupted the ordered sequence (discover through
/// report never abort the overall run — finish/cleanup still follow).
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub plan_name: String,
    pub results: Vec<TestResult>,
    pub step_error: Option<String>,
    pub guests_provisioned: usize,
}

fn default_checks(is_container: bool) -> Vec<Box<dyn Check>> {
    [CheckKind::Avc, CheckKind::Dmesg, CheckKind::Journal, CheckKind::JournalDmesg, CheckKind::Watchdog, CheckKind::Coredump]
        .into_iter()
        .filter(|kind| kind.enabled_by_default(is_container))
        .map(|kind| Box::new(StaticCheck { kind, outcome: Outcome::Pass }) as Box<dyn Check>)
        .collect()
}

/// Executes the six ordered steps of one plan, then the unconditional
/// cleanup terminator (§4.4, §4.2, Open Question 3).
pub struct PlanExecutor<'a> {
    pub workdir: &'a Workdir,
    pub registry: &'a PhaseRegistry,
    pub options: &'a RunOptions,
}

impl<'a> PlanExecutor<'a> {
    pub fn new(workdir: &'a Workdir, registry: &'a PhaseRegistry, options: &'a RunOptions) -> Self {
        PlanExecutor { workdir, registry, options }
    }

    fn patched_phases(&self, plan: &Plan, step: StepKind) -> Vec<PhaseSpec> {
        match self.options.overlays.get(&step) {
            Some(overlays) => apply_overlays(plan.phases_for(step), overlays),
            None => plan.phases_for(step).to_vec(),
        }
    }

    /// Composes the plan-level environment (§4.8 layers 2-3 and 6-7; the
    /// guest-provision base and test/phase intrinsics layers are applied
    /// later, per test and per guest, inside the execute step itself).
    fn plan_environment(&self, plan: &Plan) -> Environment {
        let environment_file_vars = environment::file::load_merged(&plan.environment_file).unwrap_or_default();

        EnvironmentComposer::new()
            .layer(Layer::EnvironmentFile, environment_file_vars)
            .layer(Layer::PlanEnvironment, plan.environment.clone())
            .layer(Layer::CliEnvironmentFile, self.options.cli_environment_file_vars.clone())
            .layer(Layer::CliEnvironment, self.options.cli_environment.clone())
            .build()
    }

    pub async fn run(
        &self,
        plan: &Plan,
        tests_root: &Node,
        selection: &Selection,
        cancellation: &CancellationToken,
    ) -> Result<PlanOutcome, TmtError> {
        let plan_name = plan.name.clone();

        let tests_subtree = tests_root
            .find(&plan.discover_root)
            .ok_or_else(|| TmtError::Metadata(format!("plan '{plan_name}' has no tests subtree at '{}'", plan.discover_root)))?;

        let discovered = steps::discover::run(self.workdir, &plan_name, tests_subtree, self.options.force)?;
        let tests: Vec<Test> = discovered.into_iter().filter(|t| selection.matches_test(&t.name)).collect();

        let provision_phases = self.patched_phases(plan, StepKind::Provision);
        let (mut guests, roster, guest_environments) = steps::provision::run(self.workdir, &plan_name, &provision_phases, self.options.force)?;
        let provisioning_error = steps::provision::start_all(&mut guests, self.options.boot_timeout).await.err();

        let plan_environment = self.plan_environment(plan);
        let mut results: Vec<TestResult> = Vec::new();
        let mut step_error = provisioning_error.as_ref().map(|e| format!("provisioning failed: {e}"));

        if step_error.is_none() && !cancellation.is_aborting() {
            let prepare_phases = self.patched_phases(plan, StepKind::Prepare);
            if let Err(err) = steps::prepare::run(
                self.workdir, &plan_name, &prepare_phases, &guests, &roster, self.registry, &plan_environment, self.options.force,
            )
            .await
            {
                step_error = Some(err.to_string());
            }
        }

        if step_error.is_none() && !cancellation.is_aborting() {
            let serials: Vec<(u64, Test)> = tests.into_iter().enumerate().map(|(i, t)| (i as u64 + 1, t)).collect();
            let checks = default_checks(self.options.is_container);
            let reboot_policy = RebootPolicy {
                mode: self.options.reboot_mode.clone().unwrap_or(RebootMode::Soft),
                timeout: self.options.reboot_timeout,
                feeling_safe: self.options.feeling_safe,
            };

            match steps::execute::run(
                self.workdir,
                &plan_name,
                &serials,
                &mut guests,
                &roster,
                &plan_environment,
                &guest_environments,
                &checks,
                &reboot_policy,
                cancellation,
                self.options.force,
            )
            .await
            {
                Ok(r) => results = r,
                Err(err) => step_error = Some(err.to_string()),
            }

            let report_phases = self.patched_phases(plan, StepKind::Report);
            if let Err(err) = steps::report::run(
                self.workdir, &plan_name, &report_phases, &guests, &roster, self.registry, &plan_environment, &results, self.options.force,
            )
            .await
            {
                step_error.get_or_insert_with(|| err.to_string());
            }
        }

        // finish/cleanup: unconditional terminators (§4.4, Open Question
        // 3) except under a second interrupt signal, where the
        // cancellation token itself records the user's wish to abort
        // them too (§4.9).
        if !cancellation.is_aborting() {
            let finish_phases = self.patched_phases(plan, StepKind::Finish);
            if let Err(err) = steps::finish::run(
                self.workdir, &plan_name, &finish_phases, &guests, &roster, self.registry, &plan_environment, self.options.force,
            )
            .await
            {
                step_error.get_or_insert_with(|| err.to_string());
            }

            let cleanup_phases = self.patched_phases(plan, StepKind::Cleanup);
            if let Err(err) =
                steps::cleanup::run(self.workdir, &plan_name, &cleanup_phases, &mut guests, &roster, self.registry, &plan_environment).await
            {
                step_error.get_or_insert_with(|| err.to_string());
            }
        }

        Ok(PlanOutcome { plan_name, results, step_error, guests_provisioned: guests.len() })
    }
}

/// Runs every selected plan serially (§5: "guests are never shared across
/// plans" makes cross-plan concurrency an optional scaling knob, not a
/// correctness requirement — `tmt run` itself defaults to one plan at a
/// time). Returns one [`PlanOutcome`] per plan, in selection order.
pub async fn run_plans(
    workdir: &Workdir,
    registry: &PhaseRegistry,
    options: &RunOptions,
    root: &Node,
    selection: &Selection,
    cancellation: &CancellationToken,
) -> Result<Vec<PlanOutcome>, TmtError> {
    let plan_nodes = select_plans(root, selection);
    if plan_nodes.is_empty() {
        return Err(TmtError::NoSelection);
    }

    let mut outcomes = Vec::with_capacity(plan_nodes.len());
    for node in plan_nodes {
        let plan = Plan::from_node(node);
        let executor = PlanExecutor::new(workdir, registry, options);
        outcomes.push(executor.run(&plan, root, selection, cancellation).await?);
        if cancellation.is_aborting() {
            break;
        }
    }
    Ok(outcomes)
}

/// Maps a run's outcome to the exit codes of §4.2/§6: `0` every test
/// passed, `1` at least one test failed, `2` a step itself could not run
/// or at least one test result is `error` (timeout, interrupt, and other
/// error outcomes all map here, distinct from an ordinary `fail`), `3`
/// nothing matched the selection (already handled by [`run_plans`]
/// returning [`TmtError::NoSelection`] before any plan runs).
pub fn exit_code(outcomes: &[PlanOutcome]) -> i32 {
    if outcomes.iter().any(|o| o.step_error.is_some()) {
        return 2;
    }
    let any_errored = outcomes.iter().flat_map(|o| &o.results).any(|r| matches!(r.result, Outcome::Error));
    if any_errored {
        return 2;
    }
    let any_failed = outcomes.iter().flat_map(|o| &o.results).any(|r| matches!(r.result, Outcome::Fail));
    if any_failed {
        1
    } else {
        0
    }
}
