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

use crate::model::{Acls, EntityKey, Scope};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const DEFAULT_BEHAVIOR: &str = "b:default";

/// One recorded handler invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorLog {
    /// Milliseconds since the epoch.
    pub time: i64,
    pub elapsed_us: u64,
    pub name: String,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub exception: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Behavior {
    pub acls: Acls,
    #[serde(default)]
    pub source: Option<String>,
    pub executable: bool,
    #[serde(default)]
    pub logs: Vec<BehaviorLog>,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            acls: Acls::owner_writes(),
            source: None,
            executable: true,
            logs: vec![],
        }
    }
}

impl Behavior {
    /// Append `entry`, keeping only the most recent `retain` entries.
    pub fn append_log(&mut self, entry: BehaviorLog, retain: usize) {
        self.logs.push(entry);
        if self.logs.len() > retain {
            let excess = self.logs.len() - retain;
            self.logs.drain(..excess);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Behaviors {
    #[serde(default)]
    pub behaviors: BTreeMap<String, Behavior>,
}

impl Behaviors {
    pub fn default_behavior(&self) -> Option<&Behavior> {
        self.behaviors.get(DEFAULT_BEHAVIOR)
    }

    pub fn default_behavior_mut(&mut self) -> &mut Behavior {
        self.behaviors.entry(DEFAULT_BEHAVIOR.to_string()).or_default()
    }
}

impl Scope for Behaviors {
    const NAME: &'static str = "behaviors";
}

/// Kept on the world: every entity that has a behavior, so world-wide sweeps need not scan
/// storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorCollection {
    pub acls: Acls,
    #[serde(default)]
    pub entities: BTreeSet<EntityKey>,
}

impl Default for BehaviorCollection {
    fn default() -> Self {
        Self {
            acls: Acls::everybody_writes(),
            entities: BTreeSet::new(),
        }
    }
}

impl Scope for BehaviorCollection {
    const NAME: &'static str = "behaviorCollection";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> BehaviorLog {
        BehaviorLog {
            time: 0,
            elapsed_us: 0,
            name: name.to_string(),
            logs: vec![],
            exception: None,
        }
    }

    #[test]
    fn test_log_retention() {
        let mut behavior = Behavior::default();
        for i in 0..25 {
            behavior.append_log(entry(&format!("call-{i}")), 20);
        }
        assert_eq!(behavior.logs.len(), 20);
        assert_eq!(behavior.logs[0].name, "call-5");
        assert_eq!(behavior.logs[19].name, "call-24");
    }
}
