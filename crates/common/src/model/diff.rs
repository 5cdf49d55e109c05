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

//! Structural difference between two serialized entity trees. Paths are the object keys and
//! array indices walked from the root, so `collection.1.example` names the `example` field of
//! the second element of `collection`.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Change {
    pub path: Vec<String>,
    pub kind: ChangeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
}

impl Change {
    pub fn dotted(&self) -> String {
        self.path.join(".")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diff {
    pub changes: Vec<Change>,
}

impl Diff {
    pub fn between(before: &Value, after: &Value) -> Self {
        let mut changes = vec![];
        let mut path = vec![];
        walk(before, after, &mut path, &mut changes);
        Self { changes }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &[String]> {
        self.changes.iter().map(|c| c.path.as_slice())
    }
}

fn walk(before: &Value, after: &Value, path: &mut Vec<String>, changes: &mut Vec<Change>) {
    match (before, after) {
        (Value::Object(b), Value::Object(a)) => {
            for (key, bv) in b {
                path.push(key.clone());
                match a.get(key) {
                    Some(av) => walk(bv, av, path, changes),
                    None => changes.push(Change {
                        path: path.clone(),
                        kind: ChangeKind::Removed,
                        before: Some(bv.clone()),
                        after: None,
                    }),
                }
                path.pop();
            }
            for (key, av) in a.iter().filter(|(k, _)| !b.contains_key(*k)) {
                path.push(key.clone());
                changes.push(Change {
                    path: path.clone(),
                    kind: ChangeKind::Added,
                    before: None,
                    after: Some(av.clone()),
                });
                path.pop();
            }
        }
        (Value::Array(b), Value::Array(a)) => {
            for i in 0..b.len().max(a.len()) {
                path.push(i.to_string());
                match (b.get(i), a.get(i)) {
                    (Some(bv), Some(av)) => walk(bv, av, path, changes),
                    (Some(bv), None) => changes.push(Change {
                        path: path.clone(),
                        kind: ChangeKind::Removed,
                        before: Some(bv.clone()),
                        after: None,
                    }),
                    (None, Some(av)) => changes.push(Change {
                        path: path.clone(),
                        kind: ChangeKind::Added,
                        before: None,
                        after: Some(av.clone()),
                    }),
                    (None, None) => {}
                }
                path.pop();
            }
        }
        (b, a) if b != a => changes.push(Change {
            path: path.clone(),
            kind: ChangeKind::Modified,
            before: Some(b.clone()),
            after: Some(a.clone()),
        }),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_identical_is_empty() {
        let v = json!({"a": [1, 2, {"b": true}]});
        assert!(Diff::between(&v, &v.clone()).is_empty());
    }

    #[test]
    fn test_nested_paths() {
        let before = json!({"left": {"example": {"value": 1}}, "collection": [{"x": 1}]});
        let after = json!({"left": {"example": {"value": 2}}, "collection": [{"x": 1}, {"x": 2}]});
        let diff = Diff::between(&before, &after);
        let paths: Vec<String> = diff.changes.iter().map(Change::dotted).collect();
        assert_eq!(paths, vec!["collection.1", "left.example.value"]);
        assert_eq!(diff.changes[0].kind, ChangeKind::Added);
        assert_eq!(diff.changes[1].kind, ChangeKind::Modified);
    }

    #[test]
    fn test_removed_key() {
        let diff = Diff::between(&json!({"a": 1, "b": 2}), &json!({"a": 1}));
        assert_eq!(diff.changes.len(), 1);
        assert_eq!(diff.changes[0].kind, ChangeKind::Removed);
        assert_eq!(diff.changes[0].dotted(), "b");
    }
}
