//! # Topology service (§3, §6)
//!
//! Materializes the set of live guests and roles of a plan into the two
//! files every test gets in its data directory: `TMT_TOPOLOGY_YAML` (a
//! structured snapshot) and `TMT_TOPOLOGY_BASH` (a shell-sourceable
//! equivalent). Tests only ever learn about topology through those two
//! env vars pointing at files under their data directory — the core never
//! mutates a "guest environment" to smuggle topology in (§9 design note).

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::guest::Guest;

#[derive(Debug, Clone, Serialize)]
pub struct TopologyGuest {
    pub name: String,
    pub role: Option<String>,
    pub hostname: String,
    #[serde(rename = "primary-address")]
    pub primary_address: String,
}

/// A guest's identity as far as topology cares, detached from the `&dyn
/// Guest` that produced it.
#[derive(Debug, Clone)]
pub struct GuestSnapshot {
    pub name: String,
    pub role: Option<String>,
    pub primary_address: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Topology {
    pub guest: TopologyGuest,
    #[serde(rename = "guest-names")]
    pub guest_names: Vec<String>,
    #[serde(rename = "role-names")]
    pub role_names: Vec<String>,
    pub roles: BTreeMap<String, Vec<String>>,
    pub guests: BTreeMap<String, TopologyGuest>,
}

impl Topology {
    /// Builds the topology snapshot as seen from `current_guest`'s point
    /// of view (each guest gets its own file with itself as `guest:`).
    pub fn build(guests: &[&dyn Guest], current_guest: &str) -> Self {
        let snapshot: Vec<GuestSnapshot> = guests
            .iter()
            .map(|g| GuestSnapshot {
                name: g.name().to_string(),
                role: g.role().map(|r| r.to_string()),
                primary_address: g.primary_address().to_string(),
            })
            .collect();
        Topology::build_from_snapshot(&snapshot, current_guest)
    }

    /// Same as [`Topology::build`] but from a plain data snapshot rather
    /// than live `&dyn Guest` references — lets a caller take a mutable
    /// borrow of the guest under test (e.g. to reboot it) without also
    /// holding shared borrows of every other guest for topology's sake.
    pub fn build_from_snapshot(snapshot: &[GuestSnapshot], current_guest: &str) -> Self {
        let mut guest_names = Vec::new();
        let mut roles: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut guests_map = BTreeMap::new();

        for g in snapshot {
            guest_names.push(g.name.clone());
            let entry = TopologyGuest {
                name: g.name.clone(),
                role: g.role.clone(),
                hostname: g.primary_address.clone(),
                primary_address: g.primary_address.clone(),
            };
            if let Some(role) = &g.role {
                roles.entry(role.clone()).or_default().push(g.name.clone());
            }
            guests_map.insert(g.name.clone(), entry);
        }

        let current = guests_map
            .get(current_guest)
            .cloned()
            .unwrap_or_else(|| TopologyGuest {
                name: current_guest.to_string(),
                role: None,
                hostname: current_guest.to_string(),
                primary_address: current_guest.to_string(),
            });

        let mut role_names: Vec<String> = roles.keys().cloned().collect();
        role_names.sort();

        Topology {
            guest: current,
            guest_names,
            role_names,
            roles,
            guests: guests_map,
        }
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Renders the sh-sourceable equivalent (§6): `TMT_GUEST_HOSTNAME`,
    /// `TMT_GUEST_ROLE`, one `TMT_ROLE_<role>` per role (space-separated
    /// hostnames), a `TMT_GUESTS` associative array, and `SERVERS` (every
    /// guest's hostname, space-joined).
    pub fn to_bash(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("TMT_GUEST_HOSTNAME={}\n", shell_quote(&self.guest.hostname)));
        out.push_str(&format!(
            "TMT_GUEST_ROLE={}\n",
            shell_quote(self.guest.role.as_deref().unwrap_or(""))
        ));

        for (role, members) in &self.roles {
            let hostnames: Vec<&str> = members
                .iter()
                .filter_map(|name| self.guests.get(name).map(|g| g.hostname.as_str()))
                .collect();
            out.push_str(&format!(
                "TMT_ROLE_{}={}\n",
                sanitize_role(role),
                shell_quote(&hostnames.join(" "))
            ));
        }

        out.push_str("declare -A TMT_GUESTS\n");
        for (name, guest) in &self.guests {
            out.push_str(&format!(
                "TMT_GUESTS[{}.hostname]={}\n",
                sanitize_role(name),
                shell_quote(&guest.hostname)
            ));
        }

        let all_hostnames: Vec<&str> = self.guest_names.iter().filter_map(|n| self.guests.get(n).map(|g| g.hostname.as_str())).collect();
        out.push_str(&format!("SERVERS={}\n", shell_quote(&all_hostnames.join(" "))));
        out
    }
}

fn sanitize_role(name: &str) -> String {
    name.chars().map(|c| if c.is_alphanumeric() { c } else { '_' }).collect()
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Looks up a guest by name for cross-step queries (Node: "list children
/// under a subtree" analogue for the live-guest set).
pub fn find_guest<'a>(guests: &'a HashMap<String, Box<dyn Guest>>, name: &str) -> Option<&'a dyn Guest> {
    guests.get(name).map(|g| g.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guest::stub::StubGuest;

    #[test]
    fn topology_groups_guests_by_role_and_lists_servers() {
        let client1 = StubGuest::new("client-1").with_role("client");
        let client2 = StubGuest::new("client-2").with_role("client");
        let server = StubGuest::new("server").with_role("server");
        let guests: Vec<&dyn Guest> = vec![&client1, &client2, &server];

        let topo = Topology::build(&guests, "server");
        assert_eq!(topo.guest.name, "server");
        assert_eq!(topo.roles.get("client").unwrap(), &vec!["client-1".to_string(), "client-2".to_string()]);
        assert_eq!(topo.role_names, vec!["client".to_string(), "server".to_string()]);

        let bash = topo.to_bash();
        assert!(bash.contains("TMT_ROLE_client='10.0.0.1 10.0.0.1'"));
        assert!(bash.contains("SERVERS='10.0.0.1 10.0.0.1 10.0.0.1'"));
    }
}
