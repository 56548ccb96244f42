//! `local` guest variant: runs everything directly on the machine running
//! the engine. No boot, no transport — `start`/`stop` are no-ops, `exec`
//! shells out via `tokio::process::Command`, and reboot is never
//! supported (there's nothing to power-cycle).

use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;

use crate::errors::GuestError;
use crate::guest::{ExecRequest, ExecResult, Guest, GuestFacts, GuestState, PullExtend, RebootMode};

pub struct LocalGuest {
    name: String,
    state: GuestState,
    facts: Option<GuestFacts>,
}

impl LocalGuest {
    pub fn new(name: impl Into<String>) -> Self {
        LocalGuest { name: name.into(), state: GuestState::NotStarted, facts: None }
    }
}

#[async_trait]
impl Guest for LocalGuest {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> Option<&str> {
        None
    }

    fn primary_address(&self) -> &str {
        "localhost"
    }

    fn state(&self) -> GuestState {
        self.state
    }

    async fn start(&mut self, _boot_timeout: Duration) -> Result<(), GuestError> {
        self.state = GuestState::Ready;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), GuestError> {
        self.state = GuestState::Stopped;
        Ok(())
    }

    async fn exec(&self, req: ExecRequest) -> Result<ExecResult, GuestError> {
        let mut command = Command::new("/bin/sh");
        command.arg("-c").arg(&req.cmd);
        for (k, v) in &req.env {
            command.env(k, v);
        }
        if let Some(cwd) = &req.cwd {
            command.current_dir(cwd);
        }

        let run = async {
            command
                .output()
                .await
                .map_err(|e| GuestError::Transport(self.name.clone(), e.to_string()))
        };

        let (output, timed_out) = match req.timeout {
            Some(t) => match tokio::time::timeout(t, run).await {
                Ok(result) => (result?, false),
                Err(_) => {
                    return Ok(ExecResult {
                        exit_code: -1,
                        stdout: String::new(),
                        stderr: String::new(),
                        timed_out: true,
                    })
                }
            },
            None => (run.await?, false),
        };

        Ok(ExecResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            timed_out,
        })
    }

    async fn push(&self, src: &str, dest: &str) -> Result<(), GuestError> {
        tokio::fs::copy(src, dest)
            .await
            .map_err(|e| GuestError::Transport(self.name.clone(), e.to_string()))?;
        Ok(())
    }

    async fn pull(&self, src: &str, dest: &str, _extend: Option<PullExtend>) -> Result<(), GuestError> {
        tokio::fs::copy(src, dest)
            .await
            .map_err(|e| GuestError::Transport(self.name.clone(), e.to_string()))?;
        Ok(())
    }

    async fn reboot(
        &mut self,
        _mode: RebootMode,
        _timeout: Duration,
        _allow_hard_escalation: bool,
    ) -> Result<u32, GuestError> {
        Err(GuestError::HardRebootUnsupported(self.name.clone()))
    }

    async fn facts(&mut self) -> Result<GuestFacts, GuestError> {
        if let Some(facts) = &self.facts {
            return Ok(facts.clone());
        }
        let facts = GuestFacts {
            arch: std::env::consts::ARCH.to_string().into(),
            distro: None,
            kernel: None,
            package_manager: None,
            selinux: false,
            is_superuser: is_superuser(),
        };
        self.facts = Some(facts.clone());
        Ok(facts)
    }

    fn reboot_count(&self) -> u32 {
        0
    }
}

#[cfg(unix)]
fn is_superuser() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
fn is_superuser() -> bool {
    false
}
