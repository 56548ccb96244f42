//! `tmt run` entry point (§6): loads a metadata tree, selects plans and
//! tests, folds CLI phase overlays into each step, and runs every
//! selected plan through [`run::PlanExecutor`].
//!
//! The real `.fmf`/YAML metadata loader is out of scope (§1); `--tree`
//! reads a `Node` straight out of a YAML or JSON file instead, with plan
//! nodes marked by an explicit `plan: true` key (there's nothing else in
//! `Node`'s shape that would otherwise distinguish "this subtree is a
//! plan" from an arbitrary grouping node).

mod check;
mod config;
mod environment;
mod errors;
mod guest;
mod interrupt;
mod metadata;
mod phase;
mod policy;
mod reboot;
mod result;
mod run;
mod scheduler;
mod steps;
mod telemetry;
mod topology;
mod workdir;

use std::collections::HashMap;
use std::path::PathBuf;

use clap::{ArgAction, Parser};
use serde_json::Value;

use config::RunConfig;
use errors::TmtError;
use guest::RebootMode;
use interrupt::CancellationToken;
use metadata::plan::StepKind;
use metadata::Node;
use phase::registry::PhaseRegistry;
use phase::PhaseSpec;
use run::{PhaseOverlay, RunOptions, Selection};
use telemetry::TelemetryConfig;
use tracing::Instrument;
use workdir::Workdir;

#[derive(Parser, Debug)]
#[command(name = "tmt", about = "Test management plan execution engine")]
struct Cli {
    /// Path to a YAML or JSON file holding the metadata tree (stand-in
    /// for a real `.fmf` loader).
    #[arg(long)]
    tree: PathBuf,

    /// Reuse `<workdir>/<id>` across invocations so a run can resume
    /// step-by-step (§4.1, §6).
    #[arg(long)]
    id: Option<String>,

    /// Wipe an existing `--id` directory's contents before starting.
    #[arg(long)]
    scratch: bool,

    /// Select every plan (default already does this unless `--plan-name`
    /// narrows the selection; kept for CLI-surface parity with §6).
    #[arg(short = 'a', long)]
    all: bool,

    /// Re-run every step even if its workdir marker says `done`.
    #[arg(long)]
    force: bool,

    /// Accepted for CLI-surface parity with §6; cleanup's declared phases
    /// still run either way, only the final guest teardown is affected,
    /// and that decision lives with the operator re-running with `--id`.
    #[arg(long)]
    keep: bool,

    /// Base directory under which run directories are allocated.
    #[arg(long, default_value = "./run")]
    workdir: PathBuf,

    /// `KEY=VALUE`, repeatable (§4.8 layer 7).
    #[arg(short = 'e', long = "environment", value_parser = parse_kv)]
    environment: Vec<(String, String)>,

    /// Path to an environment file, repeatable; later files win on key
    /// collision (§4.8 layer 6, Open Question 2).
    #[arg(long = "environment-file")]
    environment_file: Vec<PathBuf>,

    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,

    #[arg(short = 'd', long, action = ArgAction::Count)]
    debug: u8,

    /// Resolve the plan/test selection and print it without executing
    /// anything.
    #[arg(short = 'n', long)]
    dry: bool,

    #[arg(short = 'q', long)]
    quiet: bool,

    /// Unlocks `RebootMode::Custom` (§4.7).
    #[arg(long)]
    feeling_safe: bool,

    /// Policy document applied to the tree before selection (§4.10).
    #[arg(long)]
    policy_file: Option<PathBuf>,

    /// Narrows plan selection by name regex (§6 `plans --name`).
    #[arg(long = "plan-name")]
    plan_name: Option<String>,

    /// Narrows test selection by name regex (§6 `tests --name`).
    #[arg(long = "test-name")]
    test_name: Option<String>,

    /// OTLP collector endpoint; overrides `OTEL_EXPORTER_OTLP_ENDPOINT`.
    #[arg(long)]
    otel: Option<String>,

    /// Phase overlay tokens (§6): `step=<step>,how=<how>[,name=<name>]
    /// [,order=<n>][,where=<guest|role>][,when=<expr>][,<option>=<value>...]`.
    /// Repeatable; applied in command-line order within each step.
    #[arg(long = "insert", value_parser = parse_overlay_spec)]
    insert: Vec<HashMap<String, String>>,

    #[arg(long = "update", value_parser = parse_overlay_spec)]
    update: Vec<HashMap<String, String>>,

    #[arg(long = "update-missing", value_parser = parse_overlay_spec)]
    update_missing: Vec<HashMap<String, String>>,

    /// `step=<step>,name=<name>`.
    #[arg(long = "remove", value_parser = parse_overlay_spec)]
    remove: Vec<HashMap<String, String>>,
}

fn parse_kv(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))
}

fn parse_overlay_spec(raw: &str) -> Result<HashMap<String, String>, String> {
    let mut map = HashMap::new();
    for token in raw.split(',') {
        let (k, v) = token
            .split_once('=')
            .ok_or_else(|| format!("invalid overlay token '{token}', expected key=value"))?;
        map.insert(k.trim().to_string(), v.trim().to_string());
    }
    if !map.contains_key("step") {
        return Err(format!("overlay spec '{raw}' is missing a 'step=' key"));
    }
    Ok(map)
}

fn step_kind_from_str(s: &str) -> Option<StepKind> {
    match s {
        "discover" => Some(StepKind::Discover),
        "provision" => Some(StepKind::Provision),
        "prepare" => Some(StepKind::Prepare),
        "execute" => Some(StepKind::Execute),
        "report" => Some(StepKind::Report),
        "finish" => Some(StepKind::Finish),
        "cleanup" => Some(StepKind::Cleanup),
        _ => None,
    }
}

const OVERLAY_RESERVED_KEYS: &[&str] = &["step", "how", "name", "order", "where", "when"];

fn phase_spec_from_overlay(map: &HashMap<String, String>) -> PhaseSpec {
    let how = map.get("how").cloned().unwrap_or_else(|| "shell".to_string());
    let name = map.get("name").cloned().unwrap_or_else(|| how.clone());
    let order = map.get("order").and_then(|s| s.parse().ok()).unwrap_or(50);
    let options = map
        .iter()
        .filter(|(k, _)| !OVERLAY_RESERVED_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();

    PhaseSpec {
        how,
        name,
        order,
        r#where: map.get("where").cloned(),
        when: map.get("when").cloned(),
        options,
    }
}

/// Folds every `--insert`/`--update`/`--update-missing`/`--remove` token
/// from the command line into a per-step overlay list. Cross-kind
/// ordering (e.g. an `--insert` relative to an `--update` on the same
/// step) isn't meaningful here since each kind targets phases
/// independently; §6 only requires ordering *within* one kind, which
/// clap's `Vec<T>` already preserves.
fn build_overlays(cli: &Cli) -> HashMap<StepKind, Vec<PhaseOverlay>> {
    let mut overlays: HashMap<StepKind, Vec<PhaseOverlay>> = HashMap::new();

    for map in &cli.insert {
        if let Some(step) = map.get("step").and_then(|s| step_kind_from_str(s)) {
            overlays.entry(step).or_default().push(PhaseOverlay::Insert(phase_spec_from_overlay(map)));
        }
    }
    for map in &cli.update {
        if let Some(step) = map.get("step").and_then(|s| step_kind_from_str(s)) {
            overlays.entry(step).or_default().push(PhaseOverlay::Update(phase_spec_from_overlay(map)));
        }
    }
    for map in &cli.update_missing {
        if let Some(step) = map.get("step").and_then(|s| step_kind_from_str(s)) {
            overlays.entry(step).or_default().push(PhaseOverlay::UpdateMissing(phase_spec_from_overlay(map)));
        }
    }
    for map in &cli.remove {
        let (Some(step), Some(name)) = (map.get("step").and_then(|s| step_kind_from_str(s)), map.get("name")) else {
            continue;
        };
        overlays.entry(step).or_default().push(PhaseOverlay::Remove(name.clone()));
    }

    overlays
}

fn load_tree(path: &std::path::Path) -> anyhow::Result<Node> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read tree file '{}': {e}", path.display()))?;

    if path.extension().and_then(|e| e.to_str()) == Some("json") {
        Ok(serde_json::from_str(&contents)?)
    } else {
        Ok(serde_yaml::from_str(&contents)?)
    }
}

const PLAN_KNOWN_FIELDS: &[&str] =
    &["context", "environment", "environment-file", "gate", "import-plan", "discover-root", "plan"];
const TEST_KNOWN_FIELDS: &[&str] = &[
    "test", "framework", "duration", "environment", "require", "recommend", "result", "check", "tag", "tier",
    "order", "enabled", "tty", "restart-with-reboot", "max-restarts", "where", "path",
];

/// Applies a loaded policy document to every node in the tree: `Plan`
/// rules against nodes marked `plan: true`, `Test` rules against leaves
/// (§4.10).
fn apply_policy(tree: &mut Node, doc: &policy::PolicyDocument) -> Result<(), policy::PolicyError> {
    fn walk(node: &mut Node, doc: &policy::PolicyDocument) -> Result<(), policy::PolicyError> {
        let is_plan = node.get_bool("plan", false);
        let is_leaf = node.children.is_empty();
        if is_plan {
            policy::apply(doc, policy::PolicyKind::Plan, node, PLAN_KNOWN_FIELDS)?;
        }
        if is_leaf {
            policy::apply(doc, policy::PolicyKind::Test, node, TEST_KNOWN_FIELDS)?;
        }
        for child in &mut node.children {
            walk(child, doc)?;
        }
        Ok(())
    }
    walk(tree, doc)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let run_config = RunConfig::from_env();

    // Allocated before telemetry so `log.txt` (§4.1) can be wired up as a
    // tracing layer right from the first line: `init_telemetry` builds a
    // process-global subscriber exactly once, so the workdir has to exist
    // before that call, not after.
    let workdir = if cli.dry {
        None
    } else {
        Some(Workdir::alloc_run(&cli.workdir, cli.id.as_deref(), cli.scratch)?)
    };

    let log_level = if cli.debug > 0 || run_config.debug {
        tracing::Level::DEBUG
    } else if cli.quiet {
        tracing::Level::WARN
    } else if cli.verbose > 1 {
        tracing::Level::TRACE
    } else {
        tracing::Level::INFO
    };

    let mut telemetry_config = TelemetryConfig::from_env();
    telemetry_config.log_level = log_level;
    telemetry_config.log_file = workdir.as_ref().map(|w| w.log_path());
    if cli.otel.is_some() {
        telemetry_config.otlp_endpoint = cli.otel.clone();
    }
    let _tracer = telemetry::init_telemetry(telemetry_config)?;

    // A run-scoped correlation id, independent of the `run-<ISO-ts>` workdir
    // name, so every log line and span belonging to this invocation can be
    // grepped out of a shared `log.txt`/OTLP backend.
    let run_id = uuid::Uuid::new_v4();
    let exit = run(cli, run_config, workdir).instrument(tracing::info_span!("run", run_id = %run_id)).await;
    telemetry::shutdown_telemetry();

    match exit {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            tracing::error!(error = %err, "run failed");
            eprintln!("error: {err}");
            std::process::exit(2);
        }
    }
}

async fn run(cli: Cli, run_config: RunConfig, workdir: Option<Workdir>) -> anyhow::Result<i32> {
    let mut tree = load_tree(&cli.tree)?;

    if let Some(policy_path) = &cli.policy_file {
        let doc = policy::load(policy_path)?;
        apply_policy(&mut tree, &doc)?;
    }

    let selection = Selection {
        plan_name: cli.plan_name.as_deref().map(regex::Regex::new).transpose()?,
        test_name: cli.test_name.as_deref().map(regex::Regex::new).transpose()?,
    };

    if cli.dry {
        let plans = run::select_plans(&tree, &selection);
        for plan in &plans {
            println!("{}", plan.name);
        }
        return Ok(if plans.is_empty() { 3 } else { 0 });
    }

    let cli_environment: HashMap<String, String> = cli.environment.iter().cloned().collect();
    let cli_environment_file_vars = environment::file::load_merged(&cli.environment_file)?;

    let options = RunOptions {
        force: cli.force,
        boot_timeout: run_config.timeouts.boot,
        reboot_timeout: run_config.timeouts.reboot,
        feeling_safe: cli.feeling_safe,
        reboot_mode: Some(RebootMode::Soft),
        cli_environment,
        cli_environment_file_vars,
        overlays: build_overlays(&cli),
        is_container: false,
    };

    let workdir = workdir.expect("workdir is always allocated on a non-dry run");
    let registry = PhaseRegistry::with_builtins();
    let cancellation = CancellationToken::new();
    install_signal_handler(cancellation.clone());

    let outcomes = match run::run_plans(&workdir, &registry, &options, &tree, &selection, &cancellation).await {
        Ok(outcomes) => outcomes,
        Err(TmtError::NoSelection) => return Ok(3),
        Err(err) => return Err(err.into()),
    };

    for outcome in &outcomes {
        let failed = outcome
            .results
            .iter()
            .filter(|r| matches!(r.result, result::Outcome::Fail | result::Outcome::Error))
            .count();
        tracing::info!(
            plan = outcome.plan_name,
            total = outcome.results.len(),
            failed,
            guests = outcome.guests_provisioned,
            step_error = outcome.step_error.as_deref().unwrap_or(""),
            "plan finished"
        );
    }

    Ok(run::exit_code(&outcomes))
}

/// First SIGINT moves the token to `Cancelling`; a second moves it to
/// `Aborting` (§4.9).
fn install_signal_handler(cancellation: CancellationToken) {
    tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            if cancellation.is_cancelling() {
                cancellation.request_abort();
            } else {
                cancellation.request_cancel();
            }
        }
    });
}
