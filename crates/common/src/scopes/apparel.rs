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

use crate::model::{EntityKey, EntityRef, Scope};
use serde::{Deserialize, Serialize};

/// What a person has on. Worn items are no longer held.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Apparel {
    #[serde(default)]
    pub wearing: Vec<EntityRef>,
}

impl Apparel {
    pub fn is_wearing(&self, key: &EntityKey) -> bool {
        self.wearing.iter().any(|r| r.key == *key)
    }

    pub fn wear(&mut self, item: EntityRef) -> bool {
        if self.is_wearing(&item.key) {
            return false;
        }
        self.wearing.push(item);
        true
    }

    pub fn unwear(&mut self, key: &EntityKey) -> bool {
        let before = self.wearing.len();
        self.wearing.retain(|r| r.key != *key);
        before != self.wearing.len()
    }
}

impl Scope for Apparel {
    const NAME: &'static str = "apparel";
}

/// Whether an item can be put on. Items without this scope can't.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Wearable {
    #[serde(default)]
    pub wearable: bool,
}

impl Scope for Wearable {
    const NAME: &'static str = "wearable";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntityClass;

    #[test]
    fn test_wear_and_unwear() {
        let mut apparel = Apparel::default();
        let hat = EntityRef::new("hat".into(), EntityClass::Item, "Hat");
        assert!(apparel.wear(hat.clone()));
        assert!(!apparel.wear(hat));
        assert!(apparel.is_wearing(&"hat".into()));
        assert!(apparel.unwear(&"hat".into()));
        assert!(!apparel.unwear(&"hat".into()));
        assert!(apparel.wearing.is_empty());
    }
}
