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

use dimsum_common::model::EntityKey;
use dimsum_common::scopes::BehaviorLog;

/// Record of one handler invocation (or one failed compile), kept until the request finishes and
/// then written into the entity's behavior log.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicCall {
    pub entity_key: EntityKey,
    pub behavior_key: String,
    pub name: String,
    /// Milliseconds since the epoch.
    pub time: i64,
    pub elapsed_us: u64,
    pub logs: Vec<String>,
    pub exception: Option<String>,
}

impl DynamicCall {
    pub fn succeeded(&self) -> bool {
        self.exception.is_none()
    }

    pub fn to_log(&self) -> BehaviorLog {
        BehaviorLog {
            time: self.time,
            elapsed_us: self.elapsed_us,
            name: self.name.clone(),
            logs: self.logs.clone(),
            exception: self.exception.clone(),
        }
    }
}
