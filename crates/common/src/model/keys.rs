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
use serde_json::Value;
use std::fmt::{Display, Formatter};
use strum::{Display as StrumDisplay, EnumString};

/// Field name that marks an object in serialized entity JSON as a reference to another entity.
pub const REF_MARKER: &str = "$entity";

/// Globally unique, immutable string key of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKey(String);

impl EntityKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// A fresh random key. v7 keeps keys roughly time ordered in storage.
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for EntityKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EntityKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Logical class of an entity. Behavior and reach decisions dispatch on this.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    StrumDisplay,
    EnumString,
    Default,
)]
pub enum EntityClass {
    World,
    Area,
    #[default]
    Item,
    Exit,
    Living,
    Service,
}

/// A serialized pointer to another entity. Materialization discovers the referenced entity by
/// scanning entity JSON for objects carrying [`REF_MARKER`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    #[serde(rename = "$entity")]
    pub key: EntityKey,
    pub klass: EntityClass,
    pub name: String,
}

impl EntityRef {
    pub fn new(key: EntityKey, klass: EntityClass, name: impl Into<String>) -> Self {
        Self {
            key,
            klass,
            name: name.into(),
        }
    }

    /// Collect every entity reference in a serialized tree, in document order, without
    /// duplicates.
    pub fn find_all(value: &Value) -> Vec<EntityKey> {
        let mut found = vec![];
        collect_refs(value, &mut found);
        found
    }
}

fn collect_refs(value: &Value, found: &mut Vec<EntityKey>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(key)) = map.get(REF_MARKER) {
                let key = EntityKey::new(key.clone());
                if !found.contains(&key) {
                    found.push(key);
                }
                return;
            }
            for child in map.values() {
                collect_refs(child, found);
            }
        }
        Value::Array(items) => {
            for child in items {
                collect_refs(child, found);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_find_all_refs() {
        let tree = json!({
            "creator": {"$entity": "world", "klass": "World", "name": "World"},
            "scopes": {
                "containing": {
                    "holding": [
                        {"$entity": "a", "klass": "Item", "name": "A"},
                        {"$entity": "b", "klass": "Item", "name": "B"},
                        {"$entity": "a", "klass": "Item", "name": "A"},
                    ]
                }
            }
        });
        let refs = EntityRef::find_all(&tree);
        assert_eq!(
            refs,
            vec![EntityKey::from("world"), "a".into(), "b".into()]
        );
    }

    #[test]
    fn test_ref_serialization_carries_marker() {
        let r = EntityRef::new("k".into(), EntityClass::Area, "Kitchen");
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v[REF_MARKER], "k");
        assert_eq!(v["klass"], "Area");
    }
}
