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

//! Write checks derived from what actually changed. Every object in an entity tree may carry an
//! `acls` field; a change is governed by the nearest enclosing ACL that has a rule for the
//! permission being checked.

use crate::model::acls::{Acls, Permission, SecurityContext};
use crate::model::diff::Diff;
use crate::model::keys::EntityKey;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

const ACLS_FIELD: &str = "acls";

/// Bookkeeping maintained by the server itself. Changes beneath these never require permission.
/// `*` matches any single segment.
const UNGUARDED_PATHS: &[&[&str]] = &[
    &["version"],
    &["props", "touched"],
    &["props", "described"],
    &["props", "gid"],
    &["scopes", "identifiers"],
    &["scopes", "behaviors", "behaviors", "*", "logs"],
    &["scopes", "behaviors", "behaviors", "*", "executable"],
];

#[derive(Debug, Clone, Error, PartialEq)]
#[error("{identity} lacks {perm} on `{acl}` guarding `{path}`")]
pub struct SecurityCheckError {
    pub perm: Permission,
    pub identity: String,
    pub path: String,
    pub acl: String,
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("security check failed for {key}: {error}")]
pub struct DiffSecurityError {
    pub key: EntityKey,
    pub diff: Diff,
    pub error: SecurityCheckError,
}

/// Every ACL in a serialized tree, keyed by the dotted path of the object carrying it. The root
/// object's ACL has the empty path.
pub fn find_all_acls(tree: &Value) -> Vec<(String, Acls)> {
    let mut found = vec![];
    let mut path = vec![];
    collect(tree, &mut path, &mut found);
    found
        .into_iter()
        .map(|(path, acls)| (path.join("."), acls))
        .collect()
}

fn collect(value: &Value, path: &mut Vec<String>, found: &mut Vec<(Vec<String>, Acls)>) {
    match value {
        Value::Object(map) => {
            if let Some(acls) = map.get(ACLS_FIELD) {
                match serde_json::from_value::<Acls>(acls.clone()) {
                    Ok(acls) => found.push((path.clone(), acls)),
                    Err(e) => warn!(path = %path.join("."), "ignoring malformed acls: {e}"),
                }
            }
            for (key, child) in map.iter().filter(|(k, _)| *k != ACLS_FIELD) {
                path.push(key.clone());
                collect(child, path, found);
                path.pop();
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                path.push(i.to_string());
                collect(child, path, found);
                path.pop();
            }
        }
        _ => {}
    }
}

/// The ACLs that govern one changed path, nearest first.
#[derive(Debug, Clone, PartialEq)]
struct Guarded {
    path: String,
    enclosing: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SecurityCheck {
    /// Every ACL enclosing at least one change, in tree order.
    pub acls: Vec<(String, Acls)>,
    guarded: Vec<Guarded>,
}

impl SecurityCheck {
    pub fn acl_paths(&self) -> Vec<&str> {
        self.acls.iter().map(|(p, _)| p.as_str()).collect()
    }

    pub fn verify(
        &self,
        perm: Permission,
        context: &SecurityContext,
    ) -> Result<(), SecurityCheckError> {
        for guarded in &self.guarded {
            for index in &guarded.enclosing {
                let (acl_path, acls) = &self.acls[*index];
                match acls.decide(perm, context) {
                    None => continue,
                    Some(true) => break,
                    Some(false) => {
                        debug!(
                            target: "dimsum::security",
                            path = %guarded.path,
                            acl = %acl_path,
                            identity = %context.identity,
                            "denied"
                        );
                        return Err(SecurityCheckError {
                            perm,
                            identity: context.identity.clone(),
                            path: guarded.path.clone(),
                            acl: acl_path.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

fn is_prefix(prefix: &[String], path: &[String]) -> bool {
    prefix.len() <= path.len() && prefix.iter().zip(path).all(|(a, b)| a == b)
}

fn is_unguarded(path: &[String]) -> bool {
    UNGUARDED_PATHS.iter().any(|unguarded| {
        unguarded.len() <= path.len()
            && unguarded
                .iter()
                .zip(path)
                .all(|(a, b)| *a == "*" || *a == b.as_str())
    })
}

/// Build the check for `diff` against the ACLs present in the tree before the change, so a
/// change cannot loosen the rules it is judged by.
pub fn generate_security_check_from_json_diff(original: &Value, diff: &Diff) -> SecurityCheck {
    let mut all = vec![];
    collect(original, &mut vec![], &mut all);

    let mut used = vec![false; all.len()];
    let mut guarded = vec![];
    for path in diff.paths().filter(|p| !is_unguarded(p)) {
        let mut enclosing: Vec<usize> = all
            .iter()
            .enumerate()
            .filter(|(_, (acl_path, _))| is_prefix(acl_path, path))
            .map(|(i, _)| i)
            .collect();
        enclosing.sort_by_key(|i| std::cmp::Reverse(all[*i].0.len()));
        for i in &enclosing {
            used[*i] = true;
        }
        guarded.push(Guarded {
            path: path.join("."),
            enclosing,
        });
    }

    // Re-index onto the ACLs that are actually in play.
    let mut remap = vec![usize::MAX; all.len()];
    let mut acls = vec![];
    for (i, (path, acl)) in all.into_iter().enumerate() {
        if used[i] {
            remap[i] = acls.len();
            acls.push((path.join("."), acl));
        }
    }
    for g in guarded.iter_mut() {
        for i in g.enclosing.iter_mut() {
            *i = remap[*i];
        }
    }

    SecurityCheck { acls, guarded }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::acls::well_known_identity;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use test_case::test_case;

    fn acls_json() -> Value {
        json!({"rules": [{"perm": "write", "keys": ["$owner"]}]})
    }

    fn tree() -> Value {
        json!({
            "acls": acls_json(),
            "value": 1,
            "left": {
                "value": 1,
                "example": {"acls": acls_json(), "value": 1}
            },
            "collection": [
                {"example": {"value": 1}},
                {"example": {"acls": acls_json(), "value": 1}}
            ]
        })
    }

    fn check_for(change: impl FnOnce(&mut Value)) -> SecurityCheck {
        let original = tree();
        let mut modified = original.clone();
        change(&mut modified);
        let diff = Diff::between(&original, &modified);
        generate_security_check_from_json_diff(&original, &diff)
    }

    #[test]
    fn test_find_all_acls() {
        let found: Vec<String> = find_all_acls(&tree()).into_iter().map(|(p, _)| p).collect();
        assert_eq!(found, vec!["", "collection.1.example", "left.example"]);
    }

    #[test_case(|v: &mut Value| v["value"] = json!(2), vec![""]; "root value")]
    #[test_case(|v: &mut Value| v["left"]["value"] = json!(2), vec![""]; "unguarded child")]
    #[test_case(|v: &mut Value| v["left"]["example"]["value"] = json!(2), vec!["", "left.example"]; "guarded child")]
    #[test_case(|v: &mut Value| v["collection"].as_array_mut().unwrap().push(json!({})), vec![""]; "append")]
    #[test_case(|v: &mut Value| v["collection"][1]["example"]["value"] = json!(2), vec!["", "collection.1.example"]; "guarded element")]
    fn test_acls_in_play(change: fn(&mut Value), expected: Vec<&str>) {
        let check = check_for(change);
        assert_eq!(check.acl_paths(), expected);
    }

    #[test]
    fn test_verify_owner_only() {
        let check = check_for(|v| v["value"] = json!(2));
        let owner = SecurityContext::new("jacob").with_mapping(well_known_identity::OWNER, "jacob");
        let stranger =
            SecurityContext::new("carla").with_mapping(well_known_identity::OWNER, "jacob");
        assert!(check.verify(Permission::Write, &owner).is_ok());
        let err = check.verify(Permission::Write, &stranger).unwrap_err();
        assert_eq!(err.path, "value");
        assert_eq!(err.acl, "");
    }

    #[test]
    fn test_nearest_acl_wins() {
        let original = json!({
            "acls": acls_json(),
            "containing": {"acls": {"rules": [{"perm": "write", "keys": ["*"]}]}, "holding": []}
        });
        let mut modified = original.clone();
        modified["containing"]["holding"] = json!(["x"]);
        let diff = Diff::between(&original, &modified);
        let check = generate_security_check_from_json_diff(&original, &diff);
        let stranger =
            SecurityContext::new("carla").with_mapping(well_known_identity::OWNER, "jacob");
        assert!(check.verify(Permission::Write, &stranger).is_ok());
    }

    #[test]
    fn test_behavior_logs_are_unguarded() {
        let original = json!({
            "acls": acls_json(),
            "scopes": {"behaviors": {"behaviors": {"b:default": {"acls": acls_json(), "logs": []}}}}
        });
        let mut modified = original.clone();
        modified["scopes"]["behaviors"]["behaviors"]["b:default"]["logs"] = json!([{"name": "x"}]);
        let diff = Diff::between(&original, &modified);
        let check = generate_security_check_from_json_diff(&original, &diff);
        assert!(check.verify(Permission::Write, &SecurityContext::new("carla")).is_ok());
    }

    #[test]
    fn test_bookkeeping_is_unguarded() {
        let original = json!({"acls": acls_json(), "props": {"touched": 1}});
        let mut modified = original.clone();
        modified["props"]["touched"] = json!(2);
        let diff = Diff::between(&original, &modified);
        let check = generate_security_check_from_json_diff(&original, &diff);
        assert!(check.verify(Permission::Write, &SecurityContext::new("carla")).is_ok());
        assert!(check.acls.is_empty());
    }
}
