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

/// Persistence version of an entity. `i` is the number of times the row has been written;
/// 0 means the entity has never been persisted. `dirty` never leaves memory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub i: u64,
    #[serde(skip)]
    dirty: bool,
}

impl Version {
    pub fn new(i: u64) -> Self {
        Self { i, dirty: false }
    }

    pub fn touch(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_persisted(&self) -> bool {
        self.i > 0
    }

    /// Record a successful write at version `i`.
    pub fn saved(&mut self, i: u64) {
        self.i = i;
        self.dirty = false;
    }

    pub fn clean(&mut self) {
        self.dirty = false;
    }
}
