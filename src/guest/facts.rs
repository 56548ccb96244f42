//! Guest facts: best-effort discovery results cached after first success
//! (§4.3), shown to the user only at high verbosity (§9 verbosity-gating).

#[derive(Debug, Clone, Default)]
pub struct GuestFacts {
    pub arch: Option<String>,
    pub distro: Option<String>,
    pub kernel: Option<String>,
    pub package_manager: Option<String>,
    pub selinux: bool,
    pub is_superuser: bool,
}
