//! Structured error taxonomy for the engine.
//!
//! Each step of a run can fail in a handful of well-known ways (§7 of the
//! design). We keep those as distinct `thiserror` enums rather than one
//! grab-bag error so callers can match on the *kind* of failure (a guest
//! transport error is recoverable with a single reconnect attempt; an
//! internal precondition violation is always fatal) instead of parsing
//! strings.

use thiserror::Error;

/// Errors raised while allocating or (de)serializing workdir state.
#[derive(Debug, Error)]
pub enum WorkdirError {
    #[error("run directory '{0}' is locked by another process")]
    Locked(String),

    #[error("failed to create run directory '{0}': {1}")]
    Create(String, std::io::Error),

    #[error("failed to write state file '{0}': {1}")]
    Write(String, std::io::Error),

    #[error("failed to read state file '{0}': {1}")]
    Read(String, std::io::Error),

    #[error("failed to parse YAML in '{0}': {1}")]
    Parse(String, serde_yaml::Error),
}

/// Errors raised by a [`crate::guest::Guest`] implementation.
#[derive(Debug, Error)]
pub enum GuestError {
    #[error("guest '{0}' lost connection")]
    LostConnection(String),

    #[error("guest '{0}' did not become ready within the boot timeout")]
    BootTimeout(String),

    #[error("guest '{0}' does not support hard reboot")]
    HardRebootUnsupported(String),

    #[error("custom reboot command requires --feeling-safe")]
    CustomRebootNotAllowed,

    #[error("guest '{0}' reboot did not complete within the reboot timeout")]
    RebootTimeout(String),

    #[error("guest '{0}': {1}")]
    Transport(String, String),
}

/// Errors raised by the phase scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("duplicate phase name '{0}' in step '{1}'")]
    DuplicatePhaseName(String, String),

    #[error("phase '{0}' targets unknown guest or role '{1}'")]
    UnknownTarget(String, String),

    #[error("no phase plugin registered for how='{0}' in step '{1}'")]
    UnknownPlugin(String, String),
}

/// Errors surfaced while running a step.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("step '{0}' has no guests to run on")]
    NoGuests(String),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Guest(#[from] GuestError),

    #[error(transparent)]
    Workdir(#[from] WorkdirError),

    #[error(transparent)]
    Result(#[from] ResultError),
}

/// Errors surfaced while building or reading Result/Subresult data.
#[derive(Debug, Error)]
pub enum ResultError {
    #[error("custom results missing")]
    CustomResultsMissing,

    #[error("malformed custom results file '{0}': {1}")]
    MalformedCustomResults(String, serde_yaml::Error),

    #[error("malformed restraint results file '{0}': {1}")]
    MalformedRestraintResults(String, serde_yaml::Error),
}

/// The top-level, user-visible error kinds enumerated in §7. Every concrete
/// error above maps into exactly one of these so the run driver can choose
/// the right process exit code without re-deriving the taxonomy.
#[derive(Debug, Error)]
pub enum TmtError {
    #[error("metadata error: {0}")]
    Metadata(String),

    #[error("no plans or tests matched the selection")]
    NoSelection,

    #[error("provisioning failed: {0}")]
    Provisioning(#[from] GuestError),

    #[error(transparent)]
    Step(#[from] StepError),

    #[error(transparent)]
    Workdir(#[from] WorkdirError),

    #[error(transparent)]
    Result(#[from] ResultError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl TmtError {
    /// Maps an error to the process exit code defined in §4.2/§6.
    ///
    /// `0` (success) and `1` (test failures) are not representable here —
    /// those are decided from the aggregated [`crate::result::Result`]s,
    /// not from an error value. This mapping only covers `2` (error) and
    /// `3` (no tests matched).
    pub fn exit_code(&self) -> i32 {
        match self {
            TmtError::NoSelection => 3,
            _ => 2,
        }
    }
}
