//! # Environment composition (§4.8)
//!
//! Variables reaching a test are composed from eight sources with a fixed
//! precedence, lowest priority first. We model each source as a named
//! *layer*; building the final map applies them in order so a later layer
//! always overrides an earlier one for the same key — this is the
//! "last-wins" behavior used throughout §4.8, and the same rule we apply
//! to `environment-file` merges between files.
//!
//! `Environment` only ever holds `String` values: everything a test sees
//! is exported as a shell environment variable, so unlike the metadata
//! tree's typed `Node::data`, loose JSON does not belong here.

pub mod file;

use std::collections::HashMap;

/// One named contributor to the final environment, in the order §4.8
/// lists them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Layer {
    GuestProvision,
    PlanIntrinsics,
    EnvironmentFile,
    PlanEnvironment,
    ImportedPlanEnvironment,
    CliEnvironmentFile,
    CliEnvironment,
    TestEnvironment,
    PhaseIntrinsics,
}

/// The composed environment for one (test, guest) pair.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one layer. Layers must be applied in ascending [`Layer`]
    /// order for the precedence of §4.8 to hold; debug builds would be a
    /// reasonable place to assert that, but the composer below already
    /// guarantees ordering by construction.
    pub fn apply(&mut self, vars: impl IntoIterator<Item = (String, String)>) {
        for (k, v) in vars {
            self.vars.insert(k, v);
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(|s| s.as_str())
    }

    /// Builds a new environment with `lower` (e.g. a guest's per-guest
    /// provision-phase environment, §4.8 layer 1) as its base, then
    /// applies every variable already composed in `self` on top — used by
    /// the execute step so the same plan-level `Environment` can be
    /// specialized per guest without recomposing the whole precedence
    /// chain from scratch for each one.
    pub fn layered_under(lower: HashMap<String, String>, upper: &Environment) -> Environment {
        let mut env = Environment { vars: lower };
        env.apply(upper.vars.clone());
        env
    }

    pub fn as_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<_> = self.vars.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        pairs.sort();
        pairs
    }
}

/// Builds an [`Environment`] by applying each non-empty layer in the order
/// fixed by §4.8. Call sites only need to supply whichever layers are
/// relevant to their test/guest pair; omitted layers simply contribute
/// nothing.
#[derive(Debug, Default)]
pub struct EnvironmentComposer {
    layers: Vec<(Layer, HashMap<String, String>)>,
}

impl EnvironmentComposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layer(mut self, layer: Layer, vars: HashMap<String, String>) -> Self {
        self.layers.push((layer, vars));
        self
    }

    pub fn build(mut self) -> Environment {
        self.layers.sort_by_key(|(layer, _)| *layer);
        let mut env = Environment::new();
        for (_, vars) in self.layers {
            env.apply(vars);
        }
        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn later_layer_wins_on_key_collision() {
        let env = EnvironmentComposer::new()
            .layer(Layer::PlanEnvironment, map(&[("X", "plan")]))
            .layer(Layer::TestEnvironment, map(&[("X", "test")]))
            .build();
        assert_eq!(env.get("X"), Some("test"));
    }

    #[test]
    fn layer_order_is_independent_of_call_order() {
        let env = EnvironmentComposer::new()
            .layer(Layer::TestEnvironment, map(&[("X", "test")]))
            .layer(Layer::PlanEnvironment, map(&[("X", "plan")]))
            .build();
        assert_eq!(env.get("X"), Some("test"));
    }

    #[test]
    fn layered_under_lets_a_guest_base_be_overridden_by_higher_layers() {
        let upper = EnvironmentComposer::new()
            .layer(Layer::PlanEnvironment, map(&[("X", "plan"), ("Y", "plan")]))
            .build();
        let env = Environment::layered_under(map(&[("X", "guest"), ("Z", "guest")]), &upper);
        assert_eq!(env.get("X"), Some("plan"));
        assert_eq!(env.get("Y"), Some("plan"));
        assert_eq!(env.get("Z"), Some("guest"));
    }

    #[test]
    fn phase_intrinsics_always_win() {
        let env = EnvironmentComposer::new()
            .layer(Layer::CliEnvironment, map(&[("TMT_REBOOT_COUNT", "0")]))
            .layer(Layer::PhaseIntrinsics, map(&[("TMT_REBOOT_COUNT", "1")]))
            .build();
        assert_eq!(env.get("TMT_REBOOT_COUNT"), Some("1"));
    }
}
