//! # Phase queue & scheduler — the central algorithm (§4.4)
//!
//! Orders phases into *ticks*: within one tick every targeted guest runs
//! its phase concurrently with every other guest, while phases that share
//! a guest run sequentially in declaration order. Tick boundaries are
//! introduced by an order change, by a transition between a *shared*
//! phase (targeting more than one guest, and whose plugin opts into
//! multihost coordination) and a per-guest phase, or by a CLI overlay
//! insertion (§6) — callers fold overlays into the phase list before
//! calling [`build_ticks`], so boundary rule 3 is just rule 1/2 applied to
//! the already-patched list.

pub mod roster;

use std::collections::HashMap;

use crate::environment::Environment;
use crate::errors::SchedulerError;
use crate::guest::Guest;
use crate::phase::{Phase, PhaseOutcome, PhaseSpec};
use roster::GuestRoster;

/// One group of phases that may run concurrently across guests.
#[derive(Debug, Clone)]
pub struct Tick {
    pub order: i64,
    pub shared: bool,
    pub phases: Vec<PhaseSpec>,
}

/// Resolves `where` (guest name, role name, or absent = every guest) to a
/// concrete list of guest names, validating along the way.
fn resolve_targets(spec: &PhaseSpec, roster: &GuestRoster) -> Result<Vec<String>, SchedulerError> {
    match &spec.r#where {
        None => Ok(roster.all_guest_names()),
        Some(target) => {
            if let Some(names) = roster.guests_in_role(target) {
                return Ok(names);
            }
            if roster.has_guest(target) {
                return Ok(vec![target.clone()]);
            }
            Err(SchedulerError::UnknownTarget(spec.name.clone(), target.clone()))
        }
    }
}

/// Groups a step's phase specs into ordered ticks (§4.4). Validates that
/// phase names are unique within the step (§3 invariant) before grouping.
pub fn build_ticks(
    step_name: &str,
    phases: &[PhaseSpec],
    roster: &GuestRoster,
    shared_hows: &[&str],
) -> Result<Vec<Tick>, SchedulerError> {
    let mut seen = std::collections::HashSet::new();
    for phase in phases {
        if !seen.insert(phase.name.clone()) {
            return Err(SchedulerError::DuplicatePhaseName(phase.name.clone(), step_name.to_string()));
        }
    }

    // Stable-sort by order; ties preserve declaration order (§4.4 rule 1).
    let mut ordered: Vec<PhaseSpec> = phases.to_vec();
    ordered.sort_by_key(|p| p.order);

    let mut ticks: Vec<Tick> = Vec::new();
    for phase in ordered {
        let targets = resolve_targets(&phase, roster)?;
        let is_shared = targets.len() > 1 && shared_hows.contains(&phase.how.as_str());

        match ticks.last_mut() {
            Some(tick) if tick.order == phase.order && tick.shared == is_shared => {
                tick.phases.push(phase);
            }
            _ => ticks.push(Tick { order: phase.order, shared: is_shared, phases: vec![phase] }),
        }
    }

    Ok(ticks)
}

/// Outcome of one phase run on one guest, as produced by [`run_tick`].
#[derive(Debug, Clone)]
pub struct TickResult {
    pub phase_name: String,
    pub guest: String,
    pub outcome: PhaseOutcome,
}

/// Runs every phase in `tick` against its resolved guests. Phases
/// targeting different guests run concurrently (one tokio task per
/// guest); phases sharing a guest run sequentially, in the tick's
/// declaration order, on that guest's task. A phase failing on one guest
/// does not cancel peers in the same tick (§4.4).
pub async fn run_tick(
    tick: &Tick,
    guests: &HashMap<String, Box<dyn Guest>>,
    roster: &GuestRoster,
    registry: &crate::phase::registry::PhaseRegistry,
    environment: &Environment,
) -> Result<Vec<TickResult>, SchedulerError> {
    // Bucket this tick's phases by the concrete guest they target, in
    // declaration order, so each guest's task runs its phases serially.
    let mut per_guest: HashMap<String, Vec<PhaseSpec>> = HashMap::new();
    for phase in &tick.phases {
        for guest_name in resolve_targets(phase, roster)? {
            per_guest.entry(guest_name).or_default().push(phase.clone());
        }
    }

    let mut futures = Vec::new();
    for (guest_name, phases) in per_guest {
        let guest = guests.get(&guest_name);
        futures.push(async move {
            let mut results = Vec::new();
            let Some(guest) = guest else {
                for phase in &phases {
                    results.push(TickResult {
                        phase_name: phase.name.clone(),
                        guest: guest_name.clone(),
                        outcome: PhaseOutcome::fail(format!("unknown guest '{guest_name}'")),
                    });
                }
                return results;
            };
            for phase in &phases {
                let outcome = match registry.get(&phase.how) {
                    Some(plugin) => run_phase(plugin.as_ref(), phase, guest.as_ref(), environment).await,
                    None => PhaseOutcome::fail(format!("no phase plugin for how='{}'", phase.how)),
                };
                results.push(TickResult { phase_name: phase.name.clone(), guest: guest_name.clone(), outcome });
            }
            results
        });
    }

    let gathered = futures::future::join_all(futures).await;
    Ok(gathered.into_iter().flatten().collect())
}

async fn run_phase(
    plugin: &dyn Phase,
    spec: &PhaseSpec,
    guest: &dyn Guest,
    environment: &Environment,
) -> PhaseOutcome {
    match plugin.run(spec, guest, environment).await {
        Ok(outcome) => outcome,
        Err(err) => PhaseOutcome::fail(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, order: i64, r#where: Option<&str>) -> PhaseSpec {
        PhaseSpec {
            how: "shell".into(),
            name: name.into(),
            order,
            r#where: r#where.map(|s| s.to_string()),
            when: None,
            options: Default::default(),
        }
    }

    #[test]
    fn duplicate_phase_names_are_rejected() {
        let roster = GuestRoster::new(vec![("g1".into(), None)]);
        let phases = vec![spec("p", 50, None), spec("p", 60, None)];
        let err = build_ticks("prepare", &phases, &roster, &[]).unwrap_err();
        assert!(matches!(err, SchedulerError::DuplicatePhaseName(_, _)));
    }

    #[test]
    fn lower_order_forms_an_earlier_tick() {
        let roster = GuestRoster::new(vec![("g1".into(), None)]);
        let phases = vec![spec("b", 60, None), spec("a", 10, None)];
        let ticks = build_ticks("prepare", &phases, &roster, &[]).unwrap();
        assert_eq!(ticks.len(), 2);
        assert_eq!(ticks[0].phases[0].name, "a");
        assert_eq!(ticks[1].phases[0].name, "b");
    }

    #[test]
    fn equal_order_phases_share_a_tick_and_keep_declaration_order() {
        let roster = GuestRoster::new(vec![("g1".into(), None)]);
        let phases = vec![spec("first", 50, None), spec("second", 50, None)];
        let ticks = build_ticks("prepare", &phases, &roster, &[]).unwrap();
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].phases.len(), 2);
        assert_eq!(ticks[0].phases[0].name, "first");
    }

    #[test]
    fn shared_transition_forces_a_new_tick_at_the_same_order() {
        let roster = GuestRoster::new(vec![("g1".into(), None), ("g2".into(), None)]);
        let shared = spec("coord", 50, None); // targets both guests
        let solo = {
            let mut s = spec("solo", 50, Some("g1"));
            s.how = "shell".into();
            s
        };
        let mut shared_spec = shared;
        shared_spec.how = "multihost".into();

        let phases = vec![shared_spec, solo];
        let ticks = build_ticks("prepare", &phases, &roster, &["multihost"]).unwrap();
        assert_eq!(ticks.len(), 2);
        assert!(ticks[0].shared);
        assert!(!ticks[1].shared);
    }

    #[test]
    fn unknown_where_target_is_an_error() {
        let roster = GuestRoster::new(vec![("g1".into(), None)]);
        let phases = vec![spec("p", 50, Some("ghost"))];
        let err = build_ticks("prepare", &phases, &roster, &[]).unwrap_err();
        assert!(matches!(err, SchedulerError::UnknownTarget(_, _)));
    }
}
