//! Provision step (§4.3, §4.4): turns a plan's `provision` phase specs into
//! live [`Guest`] handles plus the [`GuestRoster`] the scheduler uses to
//! resolve `where` targets for every later step.
//!
//! Concrete backends (container, virtual machine, SSH `connect`, beaker,
//! bootc) are external collaborators and out of scope here (§1) — this
//! step only knows `local` (runs on the machine executing the engine) and
//! `stub` (a scriptable double used by tests to simulate boot delays,
//! connection loss and reboot sequences). Any other `how` is an error:
//! there is nothing this binary can provision it with.

use std::collections::HashMap;
use std::time::Duration;

use crate::errors::{GuestError, StepError};
use crate::guest::local::LocalGuest;
use crate::guest::stub::StubGuest;
use crate::guest::Guest;
use crate::phase::PhaseSpec;
use crate::scheduler::roster::GuestRoster;
use crate::workdir::Workdir;

/// One provisioned guest's connection summary, persisted to
/// `provision/guests.yaml` (§6) so `tmt run --id <id>` can resume without
/// re-provisioning.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GuestRecord {
    pub name: String,
    pub how: String,
    pub role: Option<String>,
    #[serde(rename = "primary-address")]
    pub primary_address: String,
}

/// Builds one guest per `provision` phase spec. A spec's `name` becomes the
/// guest name (falling back to its `how` if unnamed, mirroring a
/// single-guest plan with no explicit `provision` name); its `role` option,
/// if present, feeds the [`GuestRoster`] used by multihost `where`
/// resolution (§4.4). A spec's `environment` option, if present, becomes
/// that guest's §4.8 layer-1 (`GuestProvision`) base — the lowest-priority
/// contributor to every test's composed environment on that guest.
pub fn build_guests(
    phases: &[PhaseSpec],
) -> Result<
    (HashMap<String, Box<dyn Guest>>, GuestRoster, HashMap<String, HashMap<String, String>>),
    StepError,
> {
    let mut guests: HashMap<String, Box<dyn Guest>> = HashMap::new();
    let mut roster_entries = Vec::with_capacity(phases.len());
    let mut guest_environments: HashMap<String, HashMap<String, String>> = HashMap::new();

    for spec in phases {
        let role = spec
            .options
            .get("role")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        let environment = spec
            .options
            .get("environment")
            .and_then(|v| v.as_object())
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        let guest: Box<dyn Guest> = match spec.how.as_str() {
            "local" => Box::new(LocalGuest::new(spec.name.clone())),
            "stub" => Box::new(StubGuest::new(spec.name.clone())),
            other => {
                return Err(StepError::Guest(GuestError::Transport(
                    spec.name.clone(),
                    format!("no guest backend registered for how='{other}'"),
                )))
            }
        };

        roster_entries.push((spec.name.clone(), role));
        guest_environments.insert(spec.name.clone(), environment);
        guests.insert(spec.name.clone(), guest);
    }

    Ok((guests, GuestRoster::new(roster_entries), guest_environments))
}

/// Starts every provisioned guest concurrently, collecting the first
/// failure rather than stopping at it — a provisioning failure on one
/// guest must not block others from reaching `Ready` for their own sake
/// (and so `finish` can later reach whatever *did* come up, per Open
/// Question 3).
pub async fn start_all(
    guests: &mut HashMap<String, Box<dyn Guest>>,
    boot_timeout: Duration,
) -> Result<(), GuestError> {
    let mut first_error = None;
    for guest in guests.values_mut() {
        if let Err(err) = guest.start(boot_timeout).await {
            tracing::warn!(guest = guest.name(), error = %err, "guest failed to reach ready state");
            if first_error.is_none() {
                first_error = Some(err);
            }
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

pub fn run(
    workdir: &Workdir,
    plan_name: &str,
    phases: &[PhaseSpec],
    force: bool,
) -> Result<
    (HashMap<String, Box<dyn Guest>>, GuestRoster, HashMap<String, HashMap<String, String>>),
    StepError,
> {
    if super::already_done(workdir, plan_name, "provision", force)? {
        if let Some(records) = workdir.read_yaml::<Vec<GuestRecord>>(plan_name, "provision", "guests.yaml")? {
            let roster = GuestRoster::new(records.iter().map(|r| (r.name.clone(), r.role.clone())).collect());
            let (guests, _, guest_environments) = build_guests(phases)?;
            return Ok((guests, roster, guest_environments));
        }
    }

    let (guests, roster, guest_environments) = build_guests(phases)?;
    let records: Vec<GuestRecord> = guests
        .values()
        .map(|g| GuestRecord {
            name: g.name().to_string(),
            how: phases
                .iter()
                .find(|p| p.name == g.name())
                .map(|p| p.how.clone())
                .unwrap_or_default(),
            role: g.role().map(|s| s.to_string()),
            primary_address: g.primary_address().to_string(),
        })
        .collect();

    workdir.write_yaml(plan_name, "provision", "guests.yaml", &records)?;
    Ok((guests, roster, guest_environments))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::PhaseSpec;
    use std::collections::HashMap as Map;

    fn spec(name: &str, how: &str, role: Option<&str>) -> PhaseSpec {
        let mut options = Map::new();
        if let Some(r) = role {
            options.insert("role".to_string(), serde_json::json!(r));
        }
        PhaseSpec { how: how.to_string(), name: name.to_string(), order: 50, r#where: None, when: None, options }
    }

    #[test]
    fn builds_one_guest_per_phase_spec() {
        let phases = vec![spec("client", "stub", Some("client")), spec("server", "stub", Some("server"))];
        let (guests, roster, _environments) = build_guests(&phases).unwrap();
        assert_eq!(guests.len(), 2);
        assert_eq!(roster.guests_in_role("client"), Some(vec!["client".to_string()]));
    }

    #[test]
    fn extracts_per_guest_environment_from_provision_options() {
        let mut client = spec("client", "stub", Some("client"));
        client.options.insert("environment".to_string(), serde_json::json!({"ROLE_VAR": "client-value"}));
        let (_, _, environments) = build_guests(&[client]).unwrap();
        assert_eq!(environments["client"].get("ROLE_VAR").map(String::as_str), Some("client-value"));
    }

    #[test]
    fn unknown_how_is_an_error() {
        let phases = vec![spec("g1", "beaker", None)];
        let err = build_guests(&phases).unwrap_err();
        assert!(matches!(err, StepError::Guest(GuestError::Transport(_, _))));
    }

    #[tokio::test]
    async fn start_all_reports_first_failure_but_starts_the_rest() {
        let mut guests: HashMap<String, Box<dyn Guest>> = HashMap::new();
        guests.insert("ok".to_string(), Box::new(StubGuest::new("ok")));
        let mut failing = StubGuest::new("bad");
        failing.fail_next_start();
        guests.insert("bad".to_string(), Box::new(failing));

        let result = start_all(&mut guests, Duration::from_secs(1)).await;
        assert!(result.is_err());
        assert_eq!(guests["ok"].state(), crate::guest::GuestState::Ready);
    }
}
