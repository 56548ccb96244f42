//! Static phase plugin registry (§9 design note: "prefer a static
//! registry built from a list of plugin implementations... no runtime
//! module scanning is required").

use std::collections::HashMap;
use std::sync::Arc;

use super::Phase;

#[derive(Default)]
pub struct PhaseRegistry {
    plugins: HashMap<&'static str, Arc<dyn Phase>>,
}

impl PhaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Arc<dyn Phase>) {
        self.plugins.insert(plugin.how(), plugin);
    }

    pub fn get(&self, how: &str) -> Option<Arc<dyn Phase>> {
        self.plugins.get(how).cloned()
    }

    /// The built-in set: enough shell/install/reporter stand-ins to
    /// exercise every step kind end-to-end.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(super::builtin::ShellPhase));
        registry.register(Arc::new(super::builtin::InstallPhase));
        registry.register(Arc::new(super::builtin::MultihostSyncPhase));
        registry.register(Arc::new(super::builtin::DisplayReportPhase));
        registry
    }
}
