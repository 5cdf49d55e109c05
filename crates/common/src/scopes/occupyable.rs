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

use crate::model::{Acls, EntityKey, EntityRef, Scope};
use serde::{Deserialize, Serialize};

/// An area living things may stand in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Occupyable {
    pub acls: Acls,
    #[serde(default)]
    pub occupied: Vec<EntityRef>,
}

impl Default for Occupyable {
    fn default() -> Self {
        Self {
            acls: Acls::everybody_writes(),
            occupied: vec![],
        }
    }
}

impl Occupyable {
    pub fn occupy(&mut self, living: EntityRef) {
        if !self.occupied.iter().any(|r| r.key == living.key) {
            self.occupied.push(living);
        }
    }

    pub fn leave(&mut self, key: &EntityKey) {
        self.occupied.retain(|r| r.key != *key);
    }
}

impl Scope for Occupyable {
    const NAME: &'static str = "occupyable";
}

/// The area a living thing is standing in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Occupying {
    #[serde(default)]
    pub area: Option<EntityRef>,
}

impl Scope for Occupying {
    const NAME: &'static str = "occupying";
}
