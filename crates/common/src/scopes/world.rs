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
use std::collections::BTreeMap;

/// Local names for entities the world needs to find without searching.
pub mod well_known {
    pub const WELCOME_AREA: &str = "welcomeArea";
    pub const POST_SERVICE: &str = "postService";
}

/// Anyone may register a well-known entity, since they are created lazily by whichever
/// session first needs one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WellKnown {
    pub acls: Acls,
    #[serde(default)]
    pub entities: BTreeMap<String, EntityKey>,
}

impl Default for WellKnown {
    fn default() -> Self {
        Self {
            acls: Acls::everybody_writes(),
            entities: BTreeMap::new(),
        }
    }
}

impl Scope for WellKnown {
    const NAME: &'static str = "wellKnown";
}

/// Persisted gid counter, kept on the world.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Identifiers {
    pub gid: u64,
}

impl Scope for Identifiers {
    const NAME: &'static str = "identifiers";
}
