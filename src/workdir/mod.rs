//! # Workdir & serialization (§4.1)
//!
//! A run's workdir is the durable source of truth that makes a run
//! resumable step-by-step: one directory per run, one subtree per plan,
//! one `step.yaml` per step, one `results.yaml` for the execute step. All
//! writes go through `write(tmp); rename(tmp, final)` so a crash mid-write
//! never leaves a half-written state file behind.

pub mod lock;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::WorkdirError;
use lock::RunLock;

/// Status of one step, persisted in `step.yaml` (§3 invariants, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Todo,
    Running,
    Done,
    Failed,
}

/// Per-phase bookkeeping persisted alongside a step's status.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PhaseState {
    pub name: String,
    pub how: String,
    pub guest: Option<String>,
    pub done: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StepState {
    pub status: StepStatus,
    pub data: Vec<PhaseState>,
}

impl Default for StepState {
    fn default() -> Self {
        StepState { status: StepStatus::Todo, data: Vec::new() }
    }
}

/// Owns one run's directory tree and its advisory lock. Dropping it
/// releases the lock.
pub struct Workdir {
    root: PathBuf,
    _lock: RunLock,
}

impl Workdir {
    /// Allocates (or reuses) a run directory under `base`.
    ///
    /// With an explicit `id`, `base/id` is reused across invocations so a
    /// run can be resumed step-by-step; `scratch` wipes that directory's
    /// prior contents first, discarding any `step.yaml`/`results.yaml`
    /// left over from an earlier attempt. Without an `id`, a fresh
    /// `run-<ISO-ts>` directory is always created. A single advisory lock
    /// file prevents two processes from racing on the same run directory.
    pub fn alloc_run(base: &Path, id: Option<&str>, scratch: bool) -> Result<Self, WorkdirError> {
        let root = match id {
            Some(id) => base.join(id),
            None => base.join(format!("run-{}", Utc::now().format("%Y%m%dT%H%M%SZ"))),
        };

        if scratch && root.exists() {
            std::fs::remove_dir_all(&root)
                .map_err(|e| WorkdirError::Create(root.display().to_string(), e))?;
        }

        std::fs::create_dir_all(&root)
            .map_err(|e| WorkdirError::Create(root.display().to_string(), e))?;

        let lock = RunLock::acquire(&root)
            .map_err(|_| WorkdirError::Locked(root.display().to_string()))?;

        Ok(Workdir { root, _lock: lock })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Translates a `/`-rooted plan name into a directory under this run's
    /// `plans/` subtree (§4.1).
    pub fn plan_dir(&self, plan_name: &str) -> PathBuf {
        let relative = plan_name.trim_start_matches('/');
        self.root.join("plans").join(relative)
    }

    pub fn step_dir(&self, plan_name: &str, step: &str) -> PathBuf {
        self.plan_dir(plan_name).join(step)
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join("log.txt")
    }

    pub fn plan_log_path(&self, plan_name: &str) -> PathBuf {
        self.plan_dir(plan_name).join("data").join("log.txt")
    }

    pub fn load_step_state(&self, plan_name: &str, step: &str) -> Result<StepState, WorkdirError> {
        let path = self.step_dir(plan_name, step).join("step.yaml");
        if !path.exists() {
            return Ok(StepState::default());
        }
        let contents = std::fs::read_to_string(&path)
            .map_err(|e| WorkdirError::Read(path.display().to_string(), e))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| WorkdirError::Parse(path.display().to_string(), e))
    }

    pub fn save_step_state(
        &self,
        plan_name: &str,
        step: &str,
        state: &StepState,
    ) -> Result<(), WorkdirError> {
        let dir = self.step_dir(plan_name, step);
        std::fs::create_dir_all(&dir).map_err(|e| WorkdirError::Create(dir.display().to_string(), e))?;
        let path = dir.join("step.yaml");
        let yaml = serde_yaml::to_string(state)
            .map_err(|e| WorkdirError::Parse(path.display().to_string(), e))?;
        atomic_write(&path, yaml.as_bytes())
    }

    /// Writes arbitrary YAML-serializable state to `<plan>/<step>/<file>`
    /// using the atomic write-then-rename pattern.
    pub fn write_yaml<T: Serialize>(
        &self,
        plan_name: &str,
        step: &str,
        file: &str,
        value: &T,
    ) -> Result<(), WorkdirError> {
        let dir = self.step_dir(plan_name, step);
        std::fs::create_dir_all(&dir).map_err(|e| WorkdirError::Create(dir.display().to_string(), e))?;
        let path = dir.join(file);
        let yaml = serde_yaml::to_string(value)
            .map_err(|e| WorkdirError::Parse(path.display().to_string(), e))?;
        atomic_write(&path, yaml.as_bytes())
    }

    pub fn read_yaml<T: for<'de> Deserialize<'de>>(
        &self,
        plan_name: &str,
        step: &str,
        file: &str,
    ) -> Result<Option<T>, WorkdirError> {
        let path = self.step_dir(plan_name, step).join(file);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)
            .map_err(|e| WorkdirError::Read(path.display().to_string(), e))?;
        let value = serde_yaml::from_str(&contents)
            .map_err(|e| WorkdirError::Parse(path.display().to_string(), e))?;
        Ok(Some(value))
    }

    /// Per-test artifact directory (§3, §6): `execute/data/guest/<guest>/<test-path-encoded>/`.
    pub fn test_data_dir(&self, plan_name: &str, guest: &str, test_path: &str) -> PathBuf {
        self.step_dir(plan_name, "execute")
            .join("data")
            .join("guest")
            .join(guest)
            .join(encode_test_path(test_path))
    }
}

/// Encodes a test path (which may contain `/`) into a single filesystem
/// component, mirroring the "test-path-encoded" directories of §3/§6.
pub fn encode_test_path(path: &str) -> String {
    path.trim_start_matches('/').replace('/', "-")
}

fn atomic_write(path: &Path, contents: &[u8]) -> Result<(), WorkdirError> {
    let tmp_path = path.with_extension("tmp");
    {
        let mut tmp = std::fs::File::create(&tmp_path)
            .map_err(|e| WorkdirError::Write(tmp_path.display().to_string(), e))?;
        tmp.write_all(contents)
            .map_err(|e| WorkdirError::Write(tmp_path.display().to_string(), e))?;
        tmp.sync_all().map_err(|e| WorkdirError::Write(tmp_path.display().to_string(), e))?;
    }
    std::fs::rename(&tmp_path, path).map_err(|e| WorkdirError::Write(path.display().to_string(), e))?;
    Ok(())
}
