//! The set of live guests and their roles, as seen by the scheduler when
//! resolving a phase's `where` target (§4.4).

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct GuestRoster {
    /// guest name -> role, in declaration order (order matters for
    /// deterministic role-member lists).
    guests: Vec<(String, Option<String>)>,
}

impl GuestRoster {
    pub fn new(guests: Vec<(String, Option<String>)>) -> Self {
        GuestRoster { guests }
    }

    pub fn has_guest(&self, name: &str) -> bool {
        self.guests.iter().any(|(n, _)| n == name)
    }

    pub fn all_guest_names(&self) -> Vec<String> {
        self.guests.iter().map(|(n, _)| n.clone()).collect()
    }

    /// Returns the guest names with the given role, in declaration order,
    /// or `None` if no guest carries that role (so callers can
    /// distinguish "empty role" from "not a role at all").
    pub fn guests_in_role(&self, role: &str) -> Option<Vec<String>> {
        let members: Vec<String> = self
            .guests
            .iter()
            .filter(|(_, r)| r.as_deref() == Some(role))
            .map(|(n, _)| n.clone())
            .collect();
        if members.is_empty() {
            None
        } else {
            Some(members)
        }
    }

    pub fn roles(&self) -> HashMap<String, Vec<String>> {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for (name, role) in &self.guests {
            if let Some(role) = role {
                map.entry(role.clone()).or_default().push(name.clone());
            }
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guests_in_role_preserves_declaration_order() {
        let roster = GuestRoster::new(vec![
            ("client-1".into(), Some("client".into())),
            ("server".into(), Some("server".into())),
            ("client-2".into(), Some("client".into())),
        ]);
        assert_eq!(
            roster.guests_in_role("client"),
            Some(vec!["client-1".to_string(), "client-2".to_string()])
        );
    }

    #[test]
    fn unknown_role_returns_none() {
        let roster = GuestRoster::new(vec![("g1".into(), None)]);
        assert_eq!(roster.guests_in_role("ghost"), None);
    }
}
