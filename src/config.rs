//! Process-level configuration (§4.8 "Recognized configuration options",
//! §5 timeout defaults): the `TMT_*` environment variables merged with
//! the CLI flags of §6 into one [`RunConfig`]. None of these are ever
//! propagated into a test's own environment (§4.8) — they configure the
//! engine, not the test.

use std::time::Duration;

use crate::metadata::test::Duration as TestDuration;

/// Color behavior, resolved from `NO_COLOR` / `TMT_NO_COLOR` /
/// `TMT_FORCE_COLOR` (§4.8). `TMT_FORCE_COLOR` wins over the two
/// disabling variables when both are set, since it is the more specific,
/// tool-scoped override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

/// Timeout knobs overridable via `TMT_BOOT_TIMEOUT`, `TMT_CONNECT_TIMEOUT`,
/// `TMT_REBOOT_TIMEOUT` (§4.8), falling back to the defaults of §5 (boot
/// 300s, connect 60s, reboot 600s).
#[derive(Debug, Clone)]
pub struct Timeouts {
    pub boot: Duration,
    pub connect: Duration,
    pub reboot: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            boot: Duration::from_secs(300),
            connect: Duration::from_secs(60),
            reboot: Duration::from_secs(600),
        }
    }
}

/// `git clone` retry knobs (`TMT_GIT_CLONE_ATTEMPTS/INTERVAL/TIMEOUT`,
/// §4.8). The engine itself never clones anything (that lives in the
/// out-of-scope metadata loader, §1) but these are recognized process
/// options nonetheless, consumed by whatever discovery backend runs.
#[derive(Debug, Clone)]
pub struct GitCloneConfig {
    pub attempts: u32,
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for GitCloneConfig {
    fn default() -> Self {
        GitCloneConfig { attempts: 5, interval: Duration::from_secs(10), timeout: Duration::from_secs(300) }
    }
}

/// The merged process configuration: CLI flags plus every recognized
/// `TMT_*` environment variable (§4.8).
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub debug: bool,
    pub show_traceback: bool,
    pub output_width: Option<u16>,
    pub color: ColorMode,
    pub timeouts: Timeouts,
    pub git_clone: GitCloneConfig,
    pub report_artifacts_url: Option<String>,
    pub feeling_safe: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            debug: false,
            show_traceback: false,
            output_width: None,
            color: ColorMode::Auto,
            timeouts: Timeouts::default(),
            git_clone: GitCloneConfig::default(),
            report_artifacts_url: None,
            feeling_safe: false,
        }
    }
}

impl RunConfig {
    /// Reads the `TMT_*` environment variables of §4.8 on top of the
    /// defaults; `feeling_safe` is CLI-only (`--feeling-safe`, §4.7) and
    /// is folded in by the caller after this returns.
    pub fn from_env() -> Self {
        let mut config = RunConfig::default();

        config.debug = env_flag("TMT_DEBUG");
        config.show_traceback = env_flag("TMT_SHOW_TRACEBACK");
        config.output_width = std::env::var("TMT_OUTPUT_WIDTH").ok().and_then(|v| v.parse().ok());

        config.color = if env_flag("TMT_FORCE_COLOR") {
            ColorMode::Always
        } else if env_flag("NO_COLOR") || env_flag("TMT_NO_COLOR") {
            ColorMode::Never
        } else {
            ColorMode::Auto
        };

        if let Some(d) = env_duration("TMT_BOOT_TIMEOUT") {
            config.timeouts.boot = d;
        }
        if let Some(d) = env_duration("TMT_CONNECT_TIMEOUT") {
            config.timeouts.connect = d;
        }
        if let Some(d) = env_duration("TMT_REBOOT_TIMEOUT") {
            config.timeouts.reboot = d;
        }

        if let Ok(v) = std::env::var("TMT_GIT_CLONE_ATTEMPTS") {
            if let Ok(n) = v.parse() {
                config.git_clone.attempts = n;
            }
        }
        if let Some(d) = env_duration("TMT_GIT_CLONE_INTERVAL") {
            config.git_clone.interval = d;
        }
        if let Some(d) = env_duration("TMT_GIT_CLONE_TIMEOUT") {
            config.git_clone.timeout = d;
        }

        config.report_artifacts_url = std::env::var("TMT_REPORT_ARTIFACTS_URL").ok();

        config
    }

    /// Looks up a per-plugin override, `TMT_PLUGIN_<STEP>_<PLUGIN>_<OPTION>`
    /// (§4.8), e.g. `TMT_PLUGIN_PREPARE_ANSIBLE_PLAYBOOK`.
    pub fn plugin_override(step: &str, plugin: &str, option: &str) -> Option<String> {
        let key = format!(
            "TMT_PLUGIN_{}_{}_{}",
            step.to_uppercase(),
            plugin.to_uppercase(),
            option.to_uppercase()
        );
        std::env::var(key).ok()
    }

    /// Collects every `TMT_SSH_*` variable (§4.8) for the `connect` guest
    /// variant to fold into its ambient SSH options (§4.3: "user-supplied
    /// options are injected before the defaults so user overrides win").
    pub fn ssh_options() -> Vec<(String, String)> {
        std::env::vars().filter(|(k, _)| k.starts_with("TMT_SSH_")).collect()
    }
}

fn env_flag(name: &str) -> bool {
    match std::env::var(name) {
        Ok(v) => !v.is_empty() && v != "0" && !v.eq_ignore_ascii_case("false"),
        Err(_) => false,
    }
}

fn env_duration(name: &str) -> Option<Duration> {
    let raw = std::env::var(name).ok()?;
    TestDuration::parse(&raw).ok().map(|d| d.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_section_5_timeouts() {
        let timeouts = Timeouts::default();
        assert_eq!(timeouts.boot, Duration::from_secs(300));
        assert_eq!(timeouts.connect, Duration::from_secs(60));
        assert_eq!(timeouts.reboot, Duration::from_secs(600));
    }

    #[test]
    fn plugin_override_builds_the_documented_key_shape() {
        std::env::set_var("TMT_PLUGIN_PREPARE_ANSIBLE_PLAYBOOK", "site.yml");
        assert_eq!(
            RunConfig::plugin_override("prepare", "ansible", "playbook"),
            Some("site.yml".to_string())
        );
        std::env::remove_var("TMT_PLUGIN_PREPARE_ANSIBLE_PLAYBOOK");
    }
}
