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

use crate::model::acls::Acls;
use crate::model::identity::Identity;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Identifies "the same sort of thing", e.g. two coins minted from one template. Two kinds are
/// the same when their public keys match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kind {
    pub identity: Identity,
}

impl Kind {
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }

    pub fn same(&self, other: &Kind) -> bool {
        self.identity.public == other.identity.public
    }
}

/// A free-form property value with its own guard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub value: Value,
    #[serde(default)]
    pub acls: Acls,
}

/// Properties every entity carries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Props {
    pub name: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub described: String,
    /// Global numeric id, assigned on registration.
    #[serde(default)]
    pub gid: Option<u64>,
    /// Milliseconds since the epoch.
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub touched: i64,
    #[serde(default)]
    pub frozen: Option<Identity>,
    #[serde(default)]
    pub destroyed: Option<Identity>,
    #[serde(default)]
    pub related: BTreeMap<String, Kind>,
    #[serde(default)]
    pub map: BTreeMap<String, Property>,
}

impl Props {
    pub fn named(name: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            name: name.into(),
            created: now,
            touched: now,
            ..Default::default()
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.map.get(name).map(|p| &p.value)
    }

    pub fn set(&mut self, name: &str, value: Value) {
        match self.map.get_mut(name) {
            Some(property) => property.value = value,
            None => {
                self.map.insert(
                    name.to_string(),
                    Property {
                        value,
                        acls: Acls::new(),
                    },
                );
            }
        }
    }
}
