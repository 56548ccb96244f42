//! # Guest abstraction (§4.3)
//!
//! A `Guest` is a polymorphic handle to one provisioned machine. The
//! concrete backends (container, virtual machine, SSH `connect`, beaker
//! lab reservation, local execution, bootc) are external collaborators —
//! each is a *guest factory* returning a boxed [`Guest`]. What lives here
//! is the trait itself, the lifecycle state machine, and a `local`
//! implementation plus a scriptable `stub` implementation used by tests to
//! simulate slow boots, lost connections, and reboot sequences without a
//! real backend.

pub mod facts;
pub mod local;
pub mod stub;

use async_trait::async_trait;
use std::time::Duration;

use crate::errors::GuestError;
pub use facts::GuestFacts;

/// Lifecycle states from §3: `NotStarted -> Starting -> Ready -> Rebooting
/// -> Ready ... -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuestState {
    NotStarted,
    Starting,
    Ready,
    Rebooting,
    Stopped,
}

/// Reboot mode (§4.7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebootMode {
    Soft,
    SystemdSoft,
    Hard,
    Custom(String),
}

/// Result of an `exec` call (§4.3).
#[derive(Debug, Clone)]
pub struct ExecResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl ExecResult {
    pub fn success(stdout: impl Into<String>) -> Self {
        ExecResult { exit_code: 0, stdout: stdout.into(), stderr: String::new(), timed_out: false }
    }
}

/// A command to run on a guest.
#[derive(Debug, Clone, Default)]
pub struct ExecRequest {
    pub cmd: String,
    pub env: Vec<(String, String)>,
    pub cwd: Option<String>,
    pub tty: bool,
    pub timeout: Option<Duration>,
}

/// Copy-mode used by [`Guest::pull`] to preserve expected directories for
/// beakerlib (`pull(extend = backup*)`, §4.3).
#[derive(Debug, Clone, Default)]
pub struct PullExtend {
    pub patterns: Vec<String>,
}

/// Everything the execute/prepare/finish steps need from a provisioned
/// machine. Variants that cannot support a given operation (e.g. a
/// container backend and `reboot(Hard)` being the one combination that
/// *is* supported, vs. `connect` which is not) return
/// [`GuestError::HardRebootUnsupported`] rather than panicking.
#[async_trait]
pub trait Guest: Send + Sync {
    fn name(&self) -> &str;
    fn role(&self) -> Option<&str>;
    fn primary_address(&self) -> &str;
    fn state(&self) -> GuestState;

    /// Idempotent: calling `start` on an already-`Ready` guest is a no-op.
    /// Blocks until reachable or `boot_timeout` elapses.
    async fn start(&mut self, boot_timeout: Duration) -> Result<(), GuestError>;

    async fn stop(&mut self) -> Result<(), GuestError>;

    async fn exec(&self, req: ExecRequest) -> Result<ExecResult, GuestError>;

    async fn push(&self, src: &str, dest: &str) -> Result<(), GuestError>;

    async fn pull(&self, src: &str, dest: &str, extend: Option<PullExtend>) -> Result<(), GuestError>;

    /// Reboots the guest per the mode semantics of §4.7. Returns the
    /// number of reboots this guest has completed across its lifetime
    /// (mirrors `TMT_REBOOT_COUNT` bookkeeping, incremented by exactly one
    /// per successful reboot — invariant 5 of §8).
    async fn reboot(
        &mut self,
        mode: RebootMode,
        timeout: Duration,
        allow_hard_escalation: bool,
    ) -> Result<u32, GuestError>;

    /// Best-effort fact discovery, cached after first success (§4.3).
    async fn facts(&mut self) -> Result<GuestFacts, GuestError>;

    fn reboot_count(&self) -> u32;
}
