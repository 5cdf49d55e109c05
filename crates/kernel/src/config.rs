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

//! Config is created by the host daemon and handed to the domain, whereupon it is available to
//! every session. Holds things typically configured by CLI flags or a YAML file.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub materialize: MaterializeConfig,
    pub behavior: BehaviorConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterializeConfig {
    /// Ceiling on the depth a reach function may extend loading to. Entities found beyond it
    /// are left unloaded.
    pub max_reach_depth: u32,
}

impl Default for MaterializeConfig {
    fn default() -> Self {
        Self { max_reach_depth: 32 }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// How many call records each behavior keeps.
    pub max_call_logs: usize,
    /// Script operation budget per call. 0 disables the limit.
    pub max_operations: u64,
    /// Whether successful calls are recorded, or only faults.
    pub log_successful_calls: bool,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            max_call_logs: 20,
            max_operations: 0,
            log_successful_calls: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Floor, in milliseconds, on how soon the host is asked to wake again.
    pub minimum_wake_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            minimum_wake_ms: 100,
        }
    }
}
