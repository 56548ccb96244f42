//! # Phases and the static plugin registry
//!
//! A `Phase` is an individual contributor to a step (§4.4): a `how`
//! identifier, an order, an optional `where`/`when` filter, plus whatever
//! options the plugin itself takes. Concrete phase *plugins* (install,
//! ansible, shell, html/junit reporters, …) are out of scope (§1) — what's
//! in scope is the trait they satisfy and a small built-in set used to
//! exercise the scheduler end-to-end.
//!
//! Per the design note in §9, plugin discovery is a static registry built
//! from a compiled-in list, not runtime class introspection.

pub mod registry;
pub mod builtin;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use crate::environment::Environment;
use crate::errors::GuestError;
use crate::guest::Guest;
use crate::metadata::Node;

/// A phase's static shape, parsed out of metadata (or a CLI overlay, §6).
#[derive(Debug, Clone)]
pub struct PhaseSpec {
    pub how: String,
    pub name: String,
    pub order: i64,
    pub r#where: Option<String>,
    pub when: Option<String>,
    pub options: HashMap<String, Value>,
}

impl PhaseSpec {
    pub fn from_node(node: &Node) -> Self {
        PhaseSpec {
            how: node.get_str("how").unwrap_or("shell").to_string(),
            name: node
                .get_str("name")
                .unwrap_or(&node.name)
                .to_string(),
            order: node.get_i64("order", 50),
            r#where: node.get_str("where").map(|s| s.to_string()),
            when: node.get_str("when").map(|s| s.to_string()),
            options: node.data.clone(),
        }
    }

    /// Whether this phase, given no explicit `where`, implicitly targets
    /// every guest of the plan (§4.4 "Phase placement").
    pub fn targets_all_guests(&self) -> bool {
        self.r#where.is_none()
    }
}

/// Outcome of running one phase on one guest.
#[derive(Debug, Clone)]
pub struct PhaseOutcome {
    pub ok: bool,
    pub message: Option<String>,
}

impl PhaseOutcome {
    pub fn ok() -> Self {
        PhaseOutcome { ok: true, message: None }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        PhaseOutcome { ok: false, message: Some(message.into()) }
    }
}

/// The contract every phase plugin satisfies (§4.4's "Phase" interface).
///
/// Implementations are `Send + Sync` because the scheduler runs distinct
/// guests' phases concurrently (§5).
#[async_trait]
pub trait Phase: Send + Sync {
    /// The `how` identifier this implementation answers to.
    fn how(&self) -> &'static str;

    /// Whether this plugin is a *shared* phase: when its `where` resolves
    /// to more than one guest, the scheduler treats all of those
    /// invocations as a single multihost-coordinated unit rather than N
    /// independent per-guest invocations (§4.4 rule 2). Concrete
    /// multihost-coordination plugins are out of scope; this flag exists
    /// so the tick-boundary rule is exercisable.
    fn is_shared(&self) -> bool {
        false
    }

    /// Runs the phase against one guest.
    async fn run(
        &self,
        spec: &PhaseSpec,
        guest: &dyn Guest,
        env: &Environment,
    ) -> Result<PhaseOutcome, GuestError>;
}
