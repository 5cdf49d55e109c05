// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::Display;

/// Placeholder identities an ACL rule may name. Everything else is matched literally against the
/// acting identity.
pub mod well_known_identity {
    pub const EVERYBODY: &str = "*";
    pub const OWNER: &str = "$owner";
    pub const CREATOR: &str = "$creator";
    pub const SYSTEM: &str = "$system";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Permission {
    Read,
    Write,
    Execute,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    pub perm: Permission,
    pub keys: Vec<String>,
}

/// Ordered list of permission rules. Any object in an entity's serialized form that has an `acls`
/// field of this shape guards the subtree it sits in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acls {
    #[serde(default)]
    pub rules: Vec<Acl>,
}

impl Acls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, perm: Permission, key: &str) -> Self {
        match self.rules.iter_mut().find(|r| r.perm == perm) {
            Some(rule) => {
                if !rule.keys.iter().any(|k| k == key) {
                    rule.keys.push(key.to_string());
                }
            }
            None => self.rules.push(Acl {
                perm,
                keys: vec![key.to_string()],
            }),
        }
        self
    }

    pub fn owner_writes() -> Self {
        Self::new()
            .add(Permission::Write, well_known_identity::OWNER)
            .add(Permission::Write, well_known_identity::SYSTEM)
    }

    pub fn everybody_writes() -> Self {
        Self::new().add(Permission::Write, well_known_identity::EVERYBODY)
    }

    /// `None` when no rule mentions `perm`, leaving the decision to an enclosing ACL.
    pub fn decide(&self, perm: Permission, context: &SecurityContext) -> Option<bool> {
        let mut seen = false;
        for rule in self.rules.iter().filter(|r| r.perm == perm) {
            seen = true;
            if rule.keys.iter().any(|k| context.matches(k)) {
                return Some(true);
            }
        }
        seen.then_some(false)
    }

    pub fn has(&self, perm: Permission, context: &SecurityContext) -> bool {
        self.decide(perm, context).unwrap_or(true)
    }
}

/// Who is acting, plus how the placeholder identities resolve for the entity being checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityContext {
    pub identity: String,
    pub mappings: BTreeMap<String, String>,
}

impl SecurityContext {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            mappings: BTreeMap::new(),
        }
    }

    pub fn system() -> Self {
        Self::new(well_known_identity::SYSTEM)
    }

    pub fn with_mapping(mut self, placeholder: &str, identity: impl Into<String>) -> Self {
        self.mappings.insert(placeholder.to_string(), identity.into());
        self
    }

    fn matches(&self, key: &str) -> bool {
        if key == well_known_identity::EVERYBODY || key == self.identity {
            return true;
        }
        self.mappings
            .get(key)
            .is_some_and(|mapped| *mapped == self.identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("jacob", true; "owner may write")]
    #[test_case("carla", false; "stranger may not")]
    #[test_case("$system", true; "system always may")]
    fn test_owner_writes(identity: &str, expected: bool) {
        let acls = Acls::owner_writes();
        let ctx = SecurityContext::new(identity).with_mapping(well_known_identity::OWNER, "jacob");
        assert_eq!(acls.has(Permission::Write, &ctx), expected);
    }

    #[test]
    fn test_no_rule_defers() {
        let acls = Acls::new().add(Permission::Read, "jacob");
        let ctx = SecurityContext::new("carla");
        assert_eq!(acls.decide(Permission::Write, &ctx), None);
        assert_eq!(acls.decide(Permission::Read, &ctx), Some(false));
    }

    #[test]
    fn test_everybody() {
        let ctx = SecurityContext::new("anyone");
        assert!(Acls::everybody_writes().has(Permission::Write, &ctx));
    }
}
