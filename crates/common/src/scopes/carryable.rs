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

use crate::model::{Acls, EntityKey, EntityRef, Kind, Scope};
use serde::{Deserialize, Serialize};

/// Something that can be picked up. Items of the same kind stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Carryable {
    #[serde(default)]
    pub kind: Option<Kind>,
    pub quantity: f64,
}

impl Default for Carryable {
    fn default() -> Self {
        Self {
            kind: None,
            quantity: 1.0,
        }
    }
}

impl Carryable {
    pub fn same_kind(&self, other: &Carryable) -> bool {
        match (&self.kind, &other.kind) {
            (Some(a), Some(b)) => a.same(b),
            _ => false,
        }
    }
}

impl Scope for Carryable {
    const NAME: &'static str = "carryable";
}

/// Anything that holds other entities: people's hands, an area's ground, a box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Containing {
    pub acls: Acls,
    #[serde(default)]
    pub holding: Vec<EntityRef>,
    #[serde(default)]
    pub capacity: Option<u32>,
}

impl Default for Containing {
    fn default() -> Self {
        Self {
            acls: Acls::everybody_writes(),
            holding: vec![],
            capacity: None,
        }
    }
}

impl Containing {
    pub fn contains(&self, key: &EntityKey) -> bool {
        self.holding.iter().any(|r| r.key == *key)
    }

    pub fn is_full(&self) -> bool {
        self.capacity
            .is_some_and(|capacity| self.holding.len() >= capacity as usize)
    }

    pub fn hold(&mut self, item: EntityRef) -> bool {
        if self.contains(&item.key) {
            return false;
        }
        self.holding.push(item);
        true
    }

    pub fn drop_item(&mut self, key: &EntityKey) -> bool {
        let before = self.holding.len();
        self.holding.retain(|r| r.key != *key);
        before != self.holding.len()
    }
}

impl Scope for Containing {
    const NAME: &'static str = "containing";
}

/// Where a carryable entity currently is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub acls: Acls,
    #[serde(default)]
    pub container: Option<EntityRef>,
}

impl Default for Location {
    fn default() -> Self {
        Self {
            acls: Acls::everybody_writes(),
            container: None,
        }
    }
}

impl Scope for Location {
    const NAME: &'static str = "location";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityClass, Identity};

    #[test]
    fn test_hold_and_drop() {
        let mut containing = Containing::default();
        let item = EntityRef::new("a".into(), EntityClass::Item, "A");
        assert!(containing.hold(item.clone()));
        assert!(!containing.hold(item));
        assert!(containing.drop_item(&"a".into()));
        assert!(!containing.drop_item(&"a".into()));
    }

    #[test]
    fn test_same_kind() {
        let kind = Kind::new(Identity::generate());
        let a = Carryable {
            kind: Some(kind.clone()),
            quantity: 1.0,
        };
        let b = Carryable {
            kind: Some(kind),
            quantity: 3.0,
        };
        assert!(a.same_kind(&b));
        assert!(!a.same_kind(&Carryable::default()));
    }
}
