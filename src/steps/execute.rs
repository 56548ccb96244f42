//! Execute step (§4.5): the core of the engine. For each test, on each
//! guest it targets, this:
//!
//! 1. Creates the test's data directory under the workdir.
//! 2. Composes the environment (§4.8) and writes the topology files.
//! 3. Pushes the test's source tree to the guest, if one exists on disk.
//! 4. Invokes the test through its framework wrapper, applying `duration`
//!    as a wall-clock timeout.
//! 5. Interprets the result per the test's `result` mode, re-invoking the
//!    test across a reboot when it asks for one.
//! 6. Runs before/after checks and assembles the persisted [`TestResult`].

use std::collections::HashMap;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::check::{Check, CheckKind};
use crate::environment::Environment;
use crate::errors::{ResultError, StepError};
use crate::guest::{ExecRequest, ExecResult, Guest};
use crate::interrupt::CancellationToken;
use crate::metadata::test::{Framework, ResultMode, Test};
use crate::reboot::{self, RebootPolicy, TMT_REBOOT_SCRIPT_EXIT_CODE};
use crate::result::{duration_seconds, restraint, CheckEvent as ResultCheckEvent, CheckResult, GuestRef, Outcome, Subresult, TestResult};
use crate::scheduler::roster::GuestRoster;
use crate::workdir::{encode_test_path, StepStatus, Workdir};

static BEAKERLIB_RESULT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"TESTRESULT_RESULT_STRING=([A-Za-z]+)").expect("valid regex"));

/// Resolves which guests a test targets: its `where` tag (a guest name or
/// role), or every guest of the plan when absent (§4.4).
fn targets_for(test: &Test, roster: &GuestRoster) -> Result<Vec<String>, StepError> {
    match &test.where_ {
        None => Ok(roster.all_guest_names()),
        Some(target) => {
            if let Some(members) = roster.guests_in_role(target) {
                return Ok(members);
            }
            if roster.has_guest(target) {
                return Ok(vec![target.clone()]);
            }
            Err(StepError::NoGuests(format!("test '{}' targets unknown guest or role '{}'", test.name, target)))
        }
    }
}

/// Runs the execute step for every discovered test, honoring resume and
/// cancellation. `serials` pairs each test with the serial number assigned
/// by discovery (§4.6: "serial-number assigned at execute time in
/// discovery order").
#[allow(clippy::too_many_arguments)]
pub async fn run(
    workdir: &Workdir,
    plan_name: &str,
    serials: &[(u64, Test)],
    guests: &mut HashMap<String, Box<dyn Guest>>,
    roster: &GuestRoster,
    base_environment: &Environment,
    guest_environments: &HashMap<String, HashMap<String, String>>,
    checks: &[Box<dyn Check>],
    reboot_policy: &RebootPolicy,
    cancellation: &CancellationToken,
    force: bool,
) -> Result<Vec<TestResult>, StepError> {
    if super::already_done(workdir, plan_name, "execute", force)? {
        if let Some(cached) = workdir.read_yaml::<Vec<TestResult>>(plan_name, "execute", "results.yaml")? {
            return Ok(cached);
        }
    }

    let guest_snapshot: Vec<crate::topology::GuestSnapshot> = guests
        .values()
        .map(|g| crate::topology::GuestSnapshot {
            name: g.name().to_string(),
            role: g.role().map(|r| r.to_string()),
            primary_address: g.primary_address().to_string(),
        })
        .collect();
    let mut results = Vec::new();

    for (serial, test) in serials {
        if cancellation.is_cancelling() {
            results.push(interrupted_result(test, *serial));
            continue;
        }

        let target_names = targets_for(test, roster)?;
        for guest_name in target_names {
            let Some(guest) = guests.get_mut(&guest_name) else {
                return Err(StepError::NoGuests(format!("guest '{guest_name}' not provisioned")));
            };

            let guest_base = guest_environments.get(&guest_name).cloned().unwrap_or_default();
            let result = run_test_on_guest(
                workdir,
                plan_name,
                test,
                *serial,
                guest.as_mut(),
                &guest_snapshot,
                base_environment,
                &guest_base,
                checks,
                reboot_policy,
                cancellation,
            )
            .await?;
            results.push(result);
        }
    }

    workdir.write_yaml(plan_name, "execute", "results.yaml", &results)?;
    let status = if results.iter().all(|r| !matches!(r.result, Outcome::Error)) { StepStatus::Done } else { StepStatus::Failed };
    workdir.save_step_state(plan_name, "execute", &crate::workdir::StepState { status, data: vec![] })?;
    Ok(results)
}

fn interrupted_result(test: &Test, serial: u64) -> TestResult {
    let now = Utc::now().to_rfc3339();
    TestResult {
        name: test.name.clone(),
        result: Outcome::Pending,
        note: vec!["interrupted before execution".to_string()],
        start_time: now.clone(),
        end_time: now,
        duration: 0,
        guest: GuestRef { name: String::new(), role: None },
        log: vec![],
        check: vec![crate::check::interrupt_check()],
        subresult: vec![],
        data_path: String::new(),
        serial_number: serial,
        context: Default::default(),
    }
}

/// Result for the test that was actually running when cancellation was
/// requested (§4.9, scenario S5: `a: error (interrupted)`, distinct from
/// `b`/`c` which never started and are recorded `pending` by
/// [`interrupted_result`]).
fn aborted_in_flight_result(
    test: &Test,
    serial: u64,
    guest: &dyn Guest,
    start: chrono::DateTime<Utc>,
    before_checks: Vec<CheckResult>,
) -> TestResult {
    let end = Utc::now();
    TestResult {
        name: test.name.clone(),
        result: Outcome::Error,
        note: vec!["interrupted".to_string()],
        start_time: start.to_rfc3339(),
        end_time: end.to_rfc3339(),
        duration: duration_seconds(start, end),
        guest: GuestRef { name: guest.name().to_string(), role: guest.role().map(|s| s.to_string()) },
        log: vec![],
        check: before_checks.into_iter().chain(std::iter::once(crate::check::interrupt_check())).collect(),
        subresult: vec![],
        data_path: String::new(),
        serial_number: serial,
        context: Default::default(),
    }
}

/// Runs `guest.exec(req)` but races it against `cancellation`: returns
/// `Ok(None)` the moment cancellation is requested instead of waiting for
/// the test script to finish, so a 3600s `sleep` in progress doesn't block
/// SIGINT handling (§4.9).
async fn exec_or_cancelled(
    guest: &dyn Guest,
    req: ExecRequest,
    cancellation: &CancellationToken,
) -> Result<Option<ExecResult>, StepError> {
    let exec_future = guest.exec(req);
    tokio::pin!(exec_future);
    loop {
        tokio::select! {
            result = &mut exec_future => return Ok(Some(result?)),
            _ = tokio::time::sleep(std::time::Duration::from_millis(20)) => {
                if cancellation.is_cancelling() {
                    return Ok(None);
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_test_on_guest(
    workdir: &Workdir,
    plan_name: &str,
    test: &Test,
    serial: u64,
    guest: &mut dyn Guest,
    guest_snapshot: &[crate::topology::GuestSnapshot],
    base_environment: &Environment,
    guest_environment: &HashMap<String, String>,
    checks: &[Box<dyn Check>],
    reboot_policy: &RebootPolicy,
    cancellation: &CancellationToken,
) -> Result<TestResult, StepError> {
    let start = Utc::now();
    let data_dir = workdir.test_data_dir(plan_name, guest.name(), &test.path);
    std::fs::create_dir_all(&data_dir)
        .map_err(|e| StepError::Workdir(crate::errors::WorkdirError::Create(data_dir.display().to_string(), e)))?;

    let mut env = Environment::layered_under(guest_environment.clone(), base_environment);
    env.apply(test.environment.clone());

    let topology = crate::topology::Topology::build_from_snapshot(guest_snapshot, guest.name());
    let topology_yaml_path = data_dir.join("topology.yaml");
    let topology_bash_path = data_dir.join("topology.sh");
    if let Ok(yaml) = topology.to_yaml() {
        let _ = std::fs::write(&topology_yaml_path, yaml);
    }
    let _ = std::fs::write(&topology_bash_path, topology.to_bash());

    env.apply([
        ("TMT_TEST_NAME".to_string(), test.name.clone()),
        ("TMT_TEST_DATA".to_string(), data_dir.display().to_string()),
        ("TMT_TOPOLOGY_YAML".to_string(), topology_yaml_path.display().to_string()),
        ("TMT_TOPOLOGY_BASH".to_string(), topology_bash_path.display().to_string()),
    ]);

    if std::path::Path::new(&test.path).exists() {
        let remote_dest = format!("{}/source", data_dir.display());
        guest.push(&test.path, &remote_dest).await.ok();
    }

    let before_checks = run_checks_for(checks, ResultCheckEvent::BeforeTest, &*guest, &env, test).await;

    let mut reboot_count: u32 = 0;
    let exec_result = loop {
        let mut pairs = env.as_pairs();
        pairs.push(("TMT_REBOOT_COUNT".to_string(), reboot_count.to_string()));
        let cmd = wrap_for_framework(test);

        let req = ExecRequest {
            cmd,
            env: pairs,
            cwd: Some(data_dir.display().to_string()),
            tty: test.tty,
            timeout: Some(test.duration.0),
        };

        let Some(exec) = exec_or_cancelled(&*guest, req, cancellation).await? else {
            return Ok(aborted_in_flight_result(test, serial, &*guest, start, before_checks));
        };

        let wants_reboot = exec.exit_code == TMT_REBOOT_SCRIPT_EXIT_CODE && test.restart_with_reboot;
        if wants_reboot && reboot_count < test.max_restarts {
            reboot::perform_reboot(guest, reboot_policy, true).await?;
            reboot_count += 1;
            continue;
        }
        break exec;
    };

    let (outcome, notes, after_result, custom_log) = interpret_result(test, &exec_result, &*guest, &data_dir).await?;

    let after_checks = run_checks_for(checks, ResultCheckEvent::AfterTest, &*guest, &env, test).await;

    let end = Utc::now();
    let mut result = TestResult {
        name: test.name.clone(),
        result: outcome,
        note: notes,
        start_time: start.to_rfc3339(),
        end_time: end.to_rfc3339(),
        duration: duration_seconds(start, end),
        guest: GuestRef { name: guest.name().to_string(), role: guest.role().map(|s| s.to_string()) },
        log: custom_log.unwrap_or_else(|| vec!["output.txt".to_string()]),
        check: before_checks.into_iter().chain(after_checks).collect(),
        subresult: after_result,
        data_path: format!(
            "execute/data/guest/{}/{}",
            guest.name(),
            encode_test_path(&test.path)
        ),
        serial_number: serial,
        context: Default::default(),
    };

    let output_path = data_dir.join("output.txt");
    let _ = std::fs::write(&output_path, format!("{}{}", exec_result.stdout, exec_result.stderr));

    result.aggregate_subresults();
    Ok(result)
}

/// Wraps the test's command per its framework (§4.5): `shell` runs the
/// script verbatim, `beakerlib` bootstraps an rlJournal-compatible shell
/// so `TESTRESULT_RESULT_STRING`/`TESTRESULT_STATE` land in the captured
/// output for [`interpret_result`] to read back.
fn wrap_for_framework(test: &Test) -> String {
    match test.framework {
        Framework::Shell => test.test.clone(),
        Framework::Beakerlib => format!(
            ". /usr/share/beakerlib/beakerlib.sh; rlJournalStart; {}; rlJournalPrintText; rlJournalEnd",
            test.test
        ),
    }
}

async fn interpret_result(
    test: &Test,
    exec: &ExecResult,
    guest: &dyn Guest,
    data_dir: &std::path::Path,
) -> Result<(Outcome, Vec<String>, Vec<Subresult>, Option<Vec<String>>), StepError> {
    if exec.timed_out {
        return Ok((Outcome::Error, vec!["timeout".to_string()], vec![], None));
    }

    match &test.result {
        ResultMode::Respect => {
            if let Some(beakerlib) = beakerlib_override(&exec.stdout) {
                return Ok((beakerlib, vec![], vec![], None));
            }
            if exec.stderr.contains("Permission denied") {
                return Ok((Outcome::Error, vec!["permission".to_string()], vec![], None));
            }
            if exec.stderr.contains("pidfile") {
                return Ok((Outcome::Error, vec!["pidfile locking".to_string()], vec![], None));
            }
            Ok((Outcome::from_exit_code(exec.exit_code), vec![], vec![], None))
        }
        ResultMode::Xfail => {
            let base = Outcome::from_exit_code(exec.exit_code);
            Ok((base.inverted(), vec![format!("original result: {base:?}").to_lowercase()], vec![], None))
        }
        ResultMode::Pass => Ok((Outcome::Pass, vec![], vec![], None)),
        ResultMode::Info => Ok((Outcome::Info, vec![], vec![], None)),
        ResultMode::Warn => Ok((Outcome::Warn, vec![], vec![], None)),
        ResultMode::Error => Ok((Outcome::Error, vec![], vec![], None)),
        ResultMode::Fail => Ok((Outcome::Fail, vec![], vec![], None)),
        ResultMode::Custom => {
            let remote = format!("{}/results.yaml", data_dir.display());
            let local = data_dir.join("results.yaml");
            if guest.pull(&remote, &local.display().to_string(), None).await.is_err() || !local.exists() {
                return Err(StepError::from(ResultError::CustomResultsMissing));
            }
            let contents = std::fs::read_to_string(&local).unwrap_or_default();
            let custom: crate::result::CustomResult = serde_yaml::from_str(&contents)
                .map_err(|e| ResultError::MalformedCustomResults(local.display().to_string(), e))?;
            let log = if custom.log.is_empty() { None } else { Some(custom.log) };
            Ok((custom.result, custom.note, vec![], log))
        }
        ResultMode::Restraint => {
            let remote = format!("{}/tmt-report-results.yaml", data_dir.display());
            let local = data_dir.join("tmt-report-results.yaml");
            let _ = guest.pull(&remote, &local.display().to_string(), None).await;
            let contents = std::fs::read_to_string(&local).unwrap_or_default();
            let subresults = restraint::parse_report_file(&contents)?;
            let worst = subresults.iter().map(|s| s.result).max_by_key(|o| o.priority()).unwrap_or(Outcome::Pass);
            Ok((worst, vec![], subresults, None))
        }
    }
}

fn beakerlib_override(stdout: &str) -> Option<Outcome> {
    let captures = BEAKERLIB_RESULT.captures(stdout)?;
    match captures.get(1)?.as_str() {
        "PASS" => Some(Outcome::Pass),
        "FAIL" => Some(Outcome::Fail),
        "WARN" => Some(Outcome::Warn),
        _ => None,
    }
}

async fn run_checks_for(
    checks: &[Box<dyn Check>],
    event: ResultCheckEvent,
    guest: &dyn Guest,
    env: &Environment,
    test: &Test,
) -> Vec<CheckResult> {
    let event_key = match event {
        ResultCheckEvent::BeforeTest => crate::metadata::test::CheckEvent::BeforeTest,
        ResultCheckEvent::AfterTest => crate::metadata::test::CheckEvent::AfterTest,
    };
    let wanted: std::collections::HashSet<&str> = test
        .check
        .iter()
        .filter(|c| c.event.is_empty() || c.event.contains(&event_key))
        .map(|c| c.how.as_str())
        .collect();

    let applicable: Vec<&Box<dyn Check>> = checks.iter().filter(|c| wanted.contains(check_how(c.kind()))).collect();
    let mut results = Vec::with_capacity(applicable.len());
    for check in applicable {
        match check.run(event, guest, env).await {
            Ok(r) => results.push(r),
            Err(err) => results.push(CheckResult { name: check_how(check.kind()).to_string(), event, result: Outcome::Error, log: vec![err.to_string()] }),
        }
    }
    results
}

fn check_how(kind: CheckKind) -> &'static str {
    kind.name()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::StaticCheck;
    use crate::guest::stub::StubGuest;
    use crate::metadata::test::{Duration, Framework as Fw};
    use std::collections::HashMap as Map;

    fn basic_test(name: &str, script: &str) -> Test {
        Test {
            name: name.to_string(),
            path: name.to_string(),
            test: script.to_string(),
            framework: Fw::Shell,
            duration: Duration::parse("5m").unwrap(),
            environment: Map::new(),
            require: vec![],
            recommend: vec![],
            result: ResultMode::Respect,
            check: vec![],
            tag: vec![],
            tier: None,
            order: 50,
            enabled: true,
            tty: false,
            restart_with_reboot: false,
            max_restarts: 1,
            where_: None,
        }
    }

    #[tokio::test]
    async fn respect_mode_maps_zero_exit_to_pass() {
        let base = tempfile::tempdir().unwrap();
        let workdir = Workdir::alloc_run(base.path(), Some("r"), false).unwrap();
        let mut guests: HashMap<String, Box<dyn Guest>> = HashMap::new();
        let stub = StubGuest::new("g1");
        stub.queue_exec(ExecResult::success("ok"));
        guests.insert("g1".to_string(), Box::new(stub));
        let roster = GuestRoster::new(vec![("g1".to_string(), None)]);
        let env = Environment::new();
        let cancellation = CancellationToken::new();
        let reboot_policy = RebootPolicy::soft(std::time::Duration::from_secs(1));

        let tests = vec![(1u64, basic_test("/tests/a", "true"))];
        let results = run(&workdir, "/plan", &tests, &mut guests, &roster, &env, &Map::new(), &[], &reboot_policy, &cancellation, false).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].result, Outcome::Pass);
        assert_eq!(results[0].serial_number, 1);
    }

    #[tokio::test]
    async fn timed_out_exec_maps_to_error_with_a_timeout_check_note() {
        let base = tempfile::tempdir().unwrap();
        let workdir = Workdir::alloc_run(base.path(), Some("r"), false).unwrap();
        let mut guests: HashMap<String, Box<dyn Guest>> = HashMap::new();
        let stub = StubGuest::new("g1");
        stub.queue_exec(ExecResult { exit_code: 0, stdout: String::new(), stderr: String::new(), timed_out: true });
        guests.insert("g1".to_string(), Box::new(stub));
        let roster = GuestRoster::new(vec![("g1".to_string(), None)]);
        let env = Environment::new();
        let cancellation = CancellationToken::new();
        let reboot_policy = RebootPolicy::soft(std::time::Duration::from_secs(1));

        let mut test = basic_test("/tests/slow", "sleep 999");
        test.duration = Duration::parse("1s").unwrap();
        let tests = vec![(1u64, test)];
        let results = run(&workdir, "/plan", &tests, &mut guests, &roster, &env, &Map::new(), &[], &reboot_policy, &cancellation, false).await.unwrap();
        assert_eq!(results[0].result, Outcome::Error);
        assert!(results[0].note.iter().any(|n| n == "timeout"));
    }

    #[tokio::test]
    async fn cancelled_run_marks_remaining_tests_pending() {
        let base = tempfile::tempdir().unwrap();
        let workdir = Workdir::alloc_run(base.path(), Some("r"), false).unwrap();
        let mut guests: HashMap<String, Box<dyn Guest>> = HashMap::new();
        guests.insert("g1".to_string(), Box::new(StubGuest::new("g1")));
        let roster = GuestRoster::new(vec![("g1".to_string(), None)]);
        let env = Environment::new();
        let cancellation = CancellationToken::new();
        let reboot_policy = RebootPolicy::soft(std::time::Duration::from_secs(1));
        cancellation.request_cancel();

        let tests = vec![(1u64, basic_test("/tests/a", "true"))];
        let results = run(&workdir, "/plan", &tests, &mut guests, &roster, &env, &Map::new(), &[], &reboot_policy, &cancellation, false).await.unwrap();
        assert_eq!(results[0].result, Outcome::Pending);
        assert_eq!(results[0].check[0].name, "internal/interrupt");
    }

    #[tokio::test]
    async fn cancellation_mid_exec_marks_the_running_test_error_interrupted() {
        let base = tempfile::tempdir().unwrap();
        let workdir = Workdir::alloc_run(base.path(), Some("r"), false).unwrap();
        let mut stub = StubGuest::new("g1").with_exec_delay(std::time::Duration::from_millis(200));
        stub.queue_exec(ExecResult::success("ok"));
        let env = Environment::new();
        let cancellation = CancellationToken::new();
        let reboot_policy = RebootPolicy::soft(std::time::Duration::from_secs(1));
        let test = basic_test("/tests/a", "sleep 3600");

        let test_fut = run_test_on_guest(
            &workdir,
            "/plan",
            &test,
            1,
            &mut stub,
            &[],
            &env,
            &Map::new(),
            &[],
            &reboot_policy,
            &cancellation,
        );
        let cancel_fut = async {
            tokio::time::sleep(std::time::Duration::from_millis(30)).await;
            cancellation.request_cancel();
        };
        let (result, _) = tokio::join!(test_fut, cancel_fut);
        let result = result.unwrap();
        assert_eq!(result.result, Outcome::Error);
        assert!(result.note.iter().any(|n| n == "interrupted"));
        assert!(result.check.iter().any(|c| c.name == "internal/interrupt"));
    }

    #[tokio::test]
    async fn xfail_inverts_a_failing_exit_code_to_pass() {
        let base = tempfile::tempdir().unwrap();
        let workdir = Workdir::alloc_run(base.path(), Some("r"), false).unwrap();
        let mut guests: HashMap<String, Box<dyn Guest>> = HashMap::new();
        let stub = StubGuest::new("g1");
        stub.queue_exec(ExecResult { exit_code: 1, stdout: String::new(), stderr: String::new(), timed_out: false });
        guests.insert("g1".to_string(), Box::new(stub));
        let roster = GuestRoster::new(vec![("g1".to_string(), None)]);
        let env = Environment::new();
        let cancellation = CancellationToken::new();
        let reboot_policy = RebootPolicy::soft(std::time::Duration::from_secs(1));

        let mut test = basic_test("/tests/b", "false");
        test.result = ResultMode::Xfail;
        let results = run(&workdir, "/plan", &[(2, test)], &mut guests, &roster, &env, &Map::new(), &[], &reboot_policy, &cancellation, false).await.unwrap();
        assert_eq!(results[0].result, Outcome::Pass);
    }

    #[tokio::test]
    async fn custom_mode_reads_a_result_object_verbatim() {
        let base = tempfile::tempdir().unwrap();
        let workdir = Workdir::alloc_run(base.path(), Some("r"), false).unwrap();
        let mut guests: HashMap<String, Box<dyn Guest>> = HashMap::new();
        guests.insert("g1".to_string(), Box::new(StubGuest::new("g1")));
        let roster = GuestRoster::new(vec![("g1".to_string(), None)]);
        let env = Environment::new();
        let cancellation = CancellationToken::new();
        let reboot_policy = RebootPolicy::soft(std::time::Duration::from_secs(1));

        let mut test = basic_test("/tests/custom", "true");
        test.result = ResultMode::Custom;

        let data_dir = workdir.test_data_dir("/plan", "g1", &test.path);
        std::fs::create_dir_all(&data_dir).unwrap();
        std::fs::write(
            data_dir.join("results.yaml"),
            "result: warn\nnote:\n  - \"from custom harness\"\nlog:\n  - custom.log\n",
        )
        .unwrap();

        let results = run(&workdir, "/plan", &[(5, test)], &mut guests, &roster, &env, &Map::new(), &[], &reboot_policy, &cancellation, false).await.unwrap();
        assert_eq!(results[0].result, Outcome::Warn);
        assert_eq!(results[0].note, vec!["from custom harness".to_string()]);
        assert_eq!(results[0].log, vec!["custom.log".to_string()]);
    }

    #[tokio::test]
    async fn restraint_mode_expands_subresults() {
        let base = tempfile::tempdir().unwrap();
        let workdir = Workdir::alloc_run(base.path(), Some("r"), false).unwrap();
        let mut guests: HashMap<String, Box<dyn Guest>> = HashMap::new();
        guests.insert("g1".to_string(), Box::new(StubGuest::new("g1")));
        let roster = GuestRoster::new(vec![("g1".to_string(), None)]);
        let env = Environment::new();
        let cancellation = CancellationToken::new();
        let reboot_policy = RebootPolicy::soft(std::time::Duration::from_secs(1));

        let mut test = basic_test("/tests/c", "true");
        test.result = ResultMode::Restraint;

        let data_dir = workdir.test_data_dir("/plan", "g1", &test.path);
        std::fs::create_dir_all(&data_dir).unwrap();
        std::fs::write(
            data_dir.join("tmt-report-results.yaml"),
            "- name: \"/setup\"\n  result: pass\n- name: \"/body\"\n  result: fail\n- name: \"/teardown\"\n  result: warn\n",
        )
        .unwrap();

        let results = run(&workdir, "/plan", &[(3, test)], &mut guests, &roster, &env, &Map::new(), &[], &reboot_policy, &cancellation, false).await.unwrap();
        assert_eq!(results[0].result, Outcome::Fail);
        assert_eq!(results[0].subresult.len(), 3);
    }

    #[tokio::test]
    async fn test_requested_reboot_reruns_with_incremented_count() {
        let base = tempfile::tempdir().unwrap();
        let workdir = Workdir::alloc_run(base.path(), Some("r"), false).unwrap();
        let mut guests: HashMap<String, Box<dyn Guest>> = HashMap::new();
        let stub = StubGuest::new("g1");
        stub.queue_exec(ExecResult { exit_code: TMT_REBOOT_SCRIPT_EXIT_CODE, stdout: String::new(), stderr: String::new(), timed_out: false });
        stub.queue_exec(ExecResult::success("ok"));
        guests.insert("g1".to_string(), Box::new(stub));
        let roster = GuestRoster::new(vec![("g1".to_string(), None)]);
        let env = Environment::new();
        let cancellation = CancellationToken::new();
        let reboot_policy = RebootPolicy::soft(std::time::Duration::from_secs(1));

        let mut test = basic_test("/tests/d", "reboot-then-pass");
        test.restart_with_reboot = true;
        test.max_restarts = 1;

        let results = run(&workdir, "/plan", &[(4, test)], &mut guests, &roster, &env, &Map::new(), &[], &reboot_policy, &cancellation, false).await.unwrap();
        assert_eq!(results[0].result, Outcome::Pass);
        assert_eq!(guests["g1"].reboot_count(), 1);
    }

    #[test]
    fn checks_run_with_a_static_outcome() {
        let checks: Vec<Box<dyn Check>> = vec![Box::new(StaticCheck { kind: CheckKind::Dmesg, outcome: Outcome::Pass })];
        assert_eq!(checks.len(), 1);
    }
}
