//! A scriptable `Guest` used by tests (and by the `--dry` run mode) to
//! exercise the scheduler, reboot, and interrupt logic without a real
//! container/VM/SSH backend. Each call to `exec` pops the next scripted
//! [`ExecResult`] off a queue; once the queue is empty, execs succeed with
//! exit code 0.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::errors::GuestError;
use crate::guest::{ExecRequest, ExecResult, Guest, GuestFacts, GuestState, PullExtend, RebootMode};

pub struct StubGuest {
    name: String,
    role: Option<String>,
    address: String,
    state: GuestState,
    reboot_count: u32,
    supports_hard_reboot: bool,
    lose_connection: bool,
    fail_boot: bool,
    exec_delay: Option<Duration>,
    scripted_execs: Mutex<VecDeque<ExecResult>>,
    pushed: Mutex<Vec<(String, String)>>,
}

impl StubGuest {
    pub fn new(name: impl Into<String>) -> Self {
        StubGuest {
            name: name.into(),
            role: None,
            address: "10.0.0.1".to_string(),
            state: GuestState::NotStarted,
            reboot_count: 0,
            supports_hard_reboot: true,
            lose_connection: false,
            fail_boot: false,
            exec_delay: None,
            scripted_execs: Mutex::new(VecDeque::new()),
            pushed: Mutex::new(Vec::new()),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_hard_reboot_support(mut self, supported: bool) -> Self {
        self.supports_hard_reboot = supported;
        self
    }

    pub fn with_lost_connection(mut self, lose: bool) -> Self {
        self.lose_connection = lose;
        self
    }

    /// Makes `exec` sleep before returning, so tests can simulate a
    /// long-running test script and race a cancellation against it.
    pub fn with_exec_delay(mut self, delay: Duration) -> Self {
        self.exec_delay = Some(delay);
        self
    }

    /// Marks this guest so the next `start` call reports a boot timeout
    /// instead of reaching `Ready`, simulating a provisioning failure.
    pub fn fail_next_start(&mut self) {
        self.fail_boot = true;
    }

    pub fn queue_exec(&self, result: ExecResult) {
        if let Ok(mut guard) = self.scripted_execs.try_lock() {
            guard.push_back(result);
        }
    }

    pub async fn pushed_files(&self) -> Vec<(String, String)> {
        self.pushed.lock().await.clone()
    }
}

#[async_trait]
impl Guest for StubGuest {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    fn primary_address(&self) -> &str {
        &self.address
    }

    fn state(&self) -> GuestState {
        self.state
    }

    async fn start(&mut self, _boot_timeout: Duration) -> Result<(), GuestError> {
        if self.fail_boot {
            self.fail_boot = false;
            return Err(GuestError::BootTimeout(self.name.clone()));
        }
        self.state = GuestState::Ready;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), GuestError> {
        self.state = GuestState::Stopped;
        Ok(())
    }

    async fn exec(&self, _req: ExecRequest) -> Result<ExecResult, GuestError> {
        if self.lose_connection {
            return Err(GuestError::LostConnection(self.name.clone()));
        }
        if let Some(delay) = self.exec_delay {
            tokio::time::sleep(delay).await;
        }
        let mut queue = self.scripted_execs.lock().await;
        Ok(queue.pop_front().unwrap_or_else(|| ExecResult::success("")))
    }

    async fn push(&self, src: &str, dest: &str) -> Result<(), GuestError> {
        self.pushed.lock().await.push((src.to_string(), dest.to_string()));
        Ok(())
    }

    async fn pull(&self, _src: &str, _dest: &str, _extend: Option<PullExtend>) -> Result<(), GuestError> {
        Ok(())
    }

    async fn reboot(
        &mut self,
        mode: RebootMode,
        _timeout: Duration,
        allow_hard_escalation: bool,
    ) -> Result<u32, GuestError> {
        if matches!(mode, RebootMode::Hard) && !self.supports_hard_reboot {
            return Err(GuestError::HardRebootUnsupported(self.name.clone()));
        }
        if matches!(mode, RebootMode::Custom(_)) && !allow_hard_escalation {
            // `allow_hard_escalation` doubles as the "feeling-safe" gate
            // check performed by the caller before reaching here; this
            // branch only guards against a stub being misused directly.
            return Err(GuestError::CustomRebootNotAllowed);
        }
        self.state = GuestState::Rebooting;
        tokio::time::sleep(Duration::from_millis(1)).await;
        self.state = GuestState::Ready;
        self.reboot_count += 1;
        Ok(self.reboot_count)
    }

    async fn facts(&mut self) -> Result<GuestFacts, GuestError> {
        Ok(GuestFacts {
            arch: Some("x86_64".to_string()),
            distro: Some("stub-linux".to_string()),
            kernel: Some("6.0.0-stub".to_string()),
            package_manager: Some("dnf".to_string()),
            selinux: true,
            is_superuser: true,
        })
    }

    fn reboot_count(&self) -> u32 {
        self.reboot_count
    }
}
