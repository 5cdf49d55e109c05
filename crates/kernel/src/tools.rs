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

//! Small queries over loaded entities: where things are, what someone holds, and which entities
//! get a say in a command.

use dimsum_common::model::{Entity, EntityKey, EntityRef, Registrar};
use dimsum_common::scopes::{Apparel, Containing, Location, Occupying};
use indexmap::IndexMap;
use strum::{Display, EnumString};
use tracing::warn;

/// How an entity relates to whoever is acting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Relation {
    World,
    Person,
    Area,
    Ground,
    Held,
    Wearing,
    Other,
}

/// Ordered, de-duplicated set of entities with their relation. The first relation recorded for
/// a key wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntitySet {
    entries: IndexMap<EntityKey, Relation>,
}

impl EntitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, relation: Relation, key: &EntityKey) {
        self.entries.entry(key.clone()).or_insert(relation);
    }

    pub fn relation(&self, key: &EntityKey) -> Option<Relation> {
        self.entries.get(key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityKey, Relation)> {
        self.entries.iter().map(|(k, r)| (k, *r))
    }

    pub fn keys(&self) -> impl Iterator<Item = &EntityKey> {
        self.entries.keys()
    }

    pub fn with(&self, relation: Relation) -> impl Iterator<Item = &EntityKey> {
        self.entries
            .iter()
            .filter(move |(_, r)| **r == relation)
            .map(|(k, _)| k)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The area a person stands in, or the container an item sits in.
pub fn area_of(entity: &Entity) -> Option<EntityKey> {
    if let Ok(occupying) = entity.scope::<Occupying>()
        && let Some(area) = occupying.area
    {
        return Some(area.key);
    }
    entity
        .scope::<Location>()
        .ok()
        .and_then(|l| l.container)
        .map(|c| c.key)
}

pub fn holding(entity: &Entity) -> Vec<EntityRef> {
    match entity.scope::<Containing>() {
        Ok(containing) => containing.holding,
        Err(e) => {
            warn!(key = %entity.key, "unreadable containing scope: {e}");
            vec![]
        }
    }
}

pub fn wearing(entity: &Entity) -> Vec<EntityRef> {
    match entity.scope::<Apparel>() {
        Ok(apparel) => apparel.wearing,
        Err(e) => {
            warn!(key = %entity.key, "unreadable apparel scope: {e}");
            vec![]
        }
    }
}

/// World, person, the person's area, whatever lies on the ground there and whatever the person
/// holds or wears. Entities that aren't loaded are left out.
pub fn get_contributing_entities(
    registrar: &Registrar,
    world: &EntityKey,
    person: &EntityKey,
) -> EntitySet {
    let mut set = EntitySet::new();
    set.add(Relation::World, world);
    let Some(person) = registrar.find_by_key(person) else {
        return set;
    };
    set.add(Relation::Person, &person.key);
    if let Some(area) = area_of(person).and_then(|k| registrar.find_by_key(&k)) {
        set.add(Relation::Area, &area.key);
        for item in holding(area) {
            if registrar.contains(&item.key) {
                set.add(Relation::Ground, &item.key);
            }
        }
    }
    for item in holding(person) {
        if registrar.contains(&item.key) {
            set.add(Relation::Held, &item.key);
        }
    }
    for item in wearing(person) {
        if registrar.contains(&item.key) {
            set.add(Relation::Wearing, &item.key);
        }
    }
    set
}

/// Does `q` describe this entity? Matches on name words or `#gid`.
pub fn describes(entity: &Entity, q: &str) -> bool {
    let q = q.trim().to_lowercase();
    if let Some(gid) = q.strip_prefix('#') {
        return gid.parse::<u64>().ok() == entity.gid();
    }
    let name = entity.name().to_lowercase();
    name == q || name.split_whitespace().any(|w| w == q)
}

/// First entity in `candidates` that `q` describes.
pub fn find<'r>(
    registrar: &'r Registrar,
    candidates: impl IntoIterator<Item = &'r EntityKey>,
    q: &str,
) -> Option<&'r Entity> {
    candidates
        .into_iter()
        .filter_map(|k| registrar.find_by_key(k))
        .find(|e| describes(e, q))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dimsum_common::model::{EntityBuilder, EntityClass};
    use test_case::test_case;

    #[test_case("Red Ball", "ball" => true; "word")]
    #[test_case("Red Ball", "red ball" => true; "full name")]
    #[test_case("Red Ball", "RED" => true; "case")]
    #[test_case("Red Ball", "blue" => false; "miss")]
    #[test_case("Red Ball", "#3" => true; "gid")]
    #[test_case("Red Ball", "#4" => false; "wrong gid")]
    fn test_describes(name: &str, q: &str) -> bool {
        let world = EntityBuilder::new(EntityClass::World, "World").build().unwrap();
        let mut e = EntityBuilder::new(EntityClass::Item, name)
            .creator(&world)
            .build()
            .unwrap();
        e.props.gid = Some(3);
        describes(&e, q)
    }

    #[test]
    fn test_worn_items_contribute() {
        let world = EntityBuilder::new(EntityClass::World, "World").build().unwrap();
        let hat = EntityBuilder::new(EntityClass::Item, "Hat")
            .creator(&world)
            .build()
            .unwrap();
        let mut person = EntityBuilder::new(EntityClass::Living, "Jacob")
            .creator(&world)
            .build()
            .unwrap();
        person.make::<Apparel>().unwrap().wear(hat.to_ref());

        let mut registrar = Registrar::new();
        let world_key = registrar.register(world, None).unwrap().key.clone();
        let hat_key = registrar.register(hat, None).unwrap().key.clone();
        let person_key = registrar.register(person, None).unwrap().key.clone();

        let set = get_contributing_entities(&registrar, &world_key, &person_key);
        assert_eq!(set.relation(&hat_key), Some(Relation::Wearing));
        assert_eq!(set.with(Relation::Held).count(), 0);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_first_relation_wins() {
        let mut set = EntitySet::new();
        set.add(Relation::Held, &"a".into());
        set.add(Relation::Ground, &"a".into());
        assert_eq!(set.relation(&"a".into()), Some(Relation::Held));
        assert_eq!(set.len(), 1);
    }
}
