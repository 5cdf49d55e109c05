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

//! Loading entities out of storage and into a session's registrar, following entity references
//! as far as a reach function allows.

use crate::errors::SessionError;
use dimsum_common::model::{
    CompiledJson, Entity, EntityClass, EntityKey, EntityRef, ModelError, Registrar, Serialized,
};
use dimsum_db::EntityStorage;
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use tracing::{debug, trace, warn};

/// Decides, once an entity has loaded, how far to follow its references. Negative stops, zero
/// keeps the current depth and positive values push referents that much deeper.
pub type ReachFn = dyn Fn(&Entity, u32) -> i32;

/// Rewrites a stored shape before it is decoded. Returns whether anything changed.
pub type MigrateFn = dyn Fn(&mut Value) -> bool;

/// Follow every reference without ever deepening.
pub fn infinite_reach(_entity: &Entity, _depth: u32) -> i32 {
    0
}

/// Areas pull in their surroundings, two areas out. Everything else rides along at the depth of
/// whatever referenced it.
pub fn default_reach(entity: &Entity, depth: u32) -> i32 {
    match entity.klass {
        EntityClass::Area if depth >= 2 => -1,
        EntityClass::Area => 1,
        _ => 0,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Key(EntityKey),
    Gid(u64),
}

impl From<&EntityKey> for Lookup {
    fn from(key: &EntityKey) -> Self {
        Lookup::Key(key.clone())
    }
}

impl std::fmt::Display for Lookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lookup::Key(key) => write!(f, "key {key}"),
            Lookup::Gid(gid) => write!(f, "gid #{gid}"),
        }
    }
}

/// What a materialize call produced. Entities themselves live in the registrar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Materialized {
    /// The entities the lookup itself resolved to.
    pub roots: Vec<EntityKey>,
    /// Everything read from storage along the way, roots included.
    pub loaded: Vec<EntityKey>,
}

impl Materialized {
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn maybe_one(&self) -> Option<&EntityKey> {
        self.roots.first()
    }

    pub fn one(&self, lookup: &Lookup) -> Result<&EntityKey, SessionError> {
        self.roots
            .first()
            .ok_or_else(|| SessionError::MissingEntity(lookup.to_string()))
    }
}

pub(crate) struct Materializer<'a> {
    pub registrar: &'a mut Registrar,
    pub store: &'a dyn EntityStorage,
    pub max_depth: u32,
    pub migrate: Option<&'a MigrateFn>,
}

impl Materializer<'_> {
    pub fn materialize(
        &mut self,
        lookup: &Lookup,
        reach: Option<&ReachFn>,
        refresh: bool,
    ) -> Result<Materialized, SessionError> {
        let mut materialized = Materialized::default();

        if !refresh && let Some(key) = self.registered(lookup) {
            trace!(%lookup, "already registered");
            materialized.roots.push(key);
            return Ok(materialized);
        }

        let rows = match lookup {
            Lookup::Key(key) => self.store.load_by_key(key)?,
            Lookup::Gid(gid) => self.store.load_by_gid(*gid)?,
        };
        for row in rows {
            let key = self.load_row(row, refresh)?;
            materialized.roots.push(key.clone());
            materialized.loaded.push(key);
        }

        if let Some(reach) = reach {
            self.follow(&mut materialized, reach)?;
        }

        debug!(%lookup, loaded = materialized.loaded.len(), "materialized");
        Ok(materialized)
    }

    fn registered(&self, lookup: &Lookup) -> Option<EntityKey> {
        match lookup {
            Lookup::Key(key) => self.registrar.contains(key).then(|| key.clone()),
            Lookup::Gid(gid) => self.registrar.find_by_gid(*gid).map(|e| e.key.clone()),
        }
    }

    /// Breadth first over the references of everything loaded so far. Each entity is visited
    /// once, so cycles terminate, and nothing is followed past `max_depth`.
    fn follow(
        &mut self,
        materialized: &mut Materialized,
        reach: &ReachFn,
    ) -> Result<(), SessionError> {
        let mut seen: HashSet<EntityKey> = materialized.roots.iter().cloned().collect();
        let mut queue: VecDeque<(EntityKey, u32)> =
            materialized.roots.iter().map(|k| (k.clone(), 0)).collect();

        while let Some((key, depth)) = queue.pop_front() {
            let Some(entity) = self.registrar.find_by_key(&key) else {
                continue;
            };
            let extend = reach(entity, depth);
            if extend < 0 {
                continue;
            }
            let child_depth = depth.saturating_add(extend.unsigned_abs());
            if child_depth > self.max_depth {
                warn!(key = %key, depth = child_depth, "reach exceeds maximum depth, stopping");
                continue;
            }

            for child in references(entity)? {
                if !seen.insert(child.clone()) {
                    continue;
                }
                if !self.registrar.contains(&child) {
                    let rows = self.store.load_by_key(&child)?;
                    if rows.is_empty() {
                        return Err(SessionError::MissingEntity(format!(
                            "{child} (referenced by {key})"
                        )));
                    }
                    for row in rows {
                        let loaded = self.load_row(row, false)?;
                        materialized.loaded.push(loaded);
                    }
                }
                queue.push_back((child, child_depth));
            }
        }
        Ok(())
    }

    fn load_row(&mut self, row: Serialized, refresh: bool) -> Result<EntityKey, SessionError> {
        let original = CompiledJson::from_text(&row.serialized)?;

        let mut decoding = original.compiled.clone();
        let migrated = self.migrate.is_some_and(|migrate| migrate(&mut decoding));
        let mut entity = Entity::from_json(&decoding)?;
        if entity.key != row.key {
            return Err(ModelError::MalformedJson(format!(
                "row {} holds entity {}",
                row.key, entity.key
            ))
            .into());
        }
        if migrated {
            debug!(key = %entity.key, "migrated");
            entity.touch();
        }

        let key = entity.key.clone();
        if refresh {
            if self.registrar.find_by_key(&key).is_some_and(Entity::is_dirty) {
                debug!(key = %key, "refresh skipped, entity modified in session");
                return Ok(key);
            }
            self.registrar.replace(entity, original)?;
        } else {
            self.registrar.register(entity, Some(original))?;
        }
        Ok(key)
    }
}

/// Keys of every other entity this one refers to, in document order.
fn references(entity: &Entity) -> Result<Vec<EntityKey>, SessionError> {
    let value = serde_json::to_value(entity).map_err(|e| ModelError::Serialization {
        key: entity.key.clone(),
        message: e.to_string(),
    })?;
    Ok(EntityRef::find_all(&value)
        .into_iter()
        .filter(|k| *k != entity.key)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dimsum_common::model::EntityBuilder;
    use dimsum_common::scopes::Containing;
    use dimsum_db::InMemoryStorage;
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;

    /// world -> area -> box -> marble, each holding the next.
    fn chain() -> (InMemoryStorage, Vec<EntityKey>) {
        let mut world = EntityBuilder::new(EntityClass::World, "World")
            .key("world".into())
            .build()
            .unwrap();
        let marble = EntityBuilder::new(EntityClass::Item, "Marble")
            .creator(&world)
            .build()
            .unwrap();
        let mut bx = EntityBuilder::new(EntityClass::Item, "Box")
            .creator(&world)
            .build()
            .unwrap();
        bx.make::<Containing>().unwrap().hold(marble.to_ref());
        let mut area = EntityBuilder::new(EntityClass::Area, "Area")
            .creator(&world)
            .build()
            .unwrap();
        area.make::<Containing>().unwrap().hold(bx.to_ref());
        world.make::<Containing>().unwrap().hold(area.to_ref());

        let mut rows = IndexMap::new();
        let mut keys = vec![];
        for (gid, mut e) in [world, area, bx, marble].into_iter().enumerate() {
            e.props.gid = Some(gid as u64);
            keys.push(e.key.clone());
            rows.insert(e.key.clone(), e.serialize().unwrap());
        }
        let store = InMemoryStorage::new();
        store.update(rows).unwrap();
        (store, keys)
    }

    fn load(store: &InMemoryStorage, reach: Option<&ReachFn>) -> Registrar {
        let mut registrar = Registrar::new();
        let mut materializer = Materializer {
            registrar: &mut registrar,
            store,
            max_depth: 32,
            migrate: None,
        };
        materializer
            .materialize(&Lookup::Key("world".into()), reach, false)
            .unwrap();
        registrar
    }

    #[test]
    fn test_no_reach_loads_root_only() {
        let (store, _) = chain();
        assert_eq!(load(&store, None).len(), 1);
    }

    #[test]
    fn test_infinite_reach_loads_everything() {
        let (store, _) = chain();
        assert_eq!(load(&store, Some(&infinite_reach)).len(), 4);
    }

    #[test]
    fn test_negative_reach_stops() {
        let (store, keys) = chain();
        let reach = |_: &Entity, depth: u32| if depth == 1 { -1 } else { 1 };
        let registrar = load(&store, Some(&reach));
        assert_eq!(registrar.len(), 2);
        assert!(registrar.contains(&keys[1]));
    }

    #[test]
    fn test_reach_agrees_below_cutoff() {
        let (store, _) = chain();
        let shallow = |_: &Entity, depth: u32| if depth >= 2 { -1 } else { 1 };
        let deep = |_: &Entity, _: u32| 1;
        let a: HashSet<EntityKey> = load(&store, Some(&shallow))
            .entities()
            .map(|e| e.key.clone())
            .collect();
        let b: HashSet<EntityKey> = load(&store, Some(&deep))
            .entities()
            .map(|e| e.key.clone())
            .collect();
        assert!(a.is_subset(&b));
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn test_max_depth_caps_extension() {
        let (store, _) = chain();
        let mut registrar = Registrar::new();
        let always_deeper = |_: &Entity, _: u32| 1;
        Materializer {
            registrar: &mut registrar,
            store: &store,
            max_depth: 1,
            migrate: None,
        }
        .materialize(&Lookup::Key("world".into()), Some(&always_deeper), false)
        .unwrap();
        assert_eq!(registrar.len(), 2);
    }

    #[test]
    fn test_registered_entities_skip_storage() {
        let (store, keys) = chain();
        let mut registrar = load(&store, None);
        let loaded = Materializer {
            registrar: &mut registrar,
            store: &store,
            max_depth: 32,
            migrate: None,
        }
        .materialize(&Lookup::Gid(0), Some(&infinite_reach), false)
        .unwrap();
        assert_eq!(loaded.roots, vec![keys[0].clone()]);
        assert!(loaded.loaded.is_empty());
    }

    #[test]
    fn test_missing_reference_is_fatal() {
        let (store, keys) = chain();
        let mut gone = IndexMap::new();
        let mut registrar = Registrar::new();
        Materializer {
            registrar: &mut registrar,
            store: &store,
            max_depth: 32,
            migrate: None,
        }
        .materialize(&Lookup::Key(keys[3].clone()), None, false)
        .unwrap();
        let marble = registrar.find_by_key_mut(&keys[3]).unwrap();
        marble.destroy();
        gone.insert(keys[3].clone(), marble.serialize().unwrap());
        store.update(gone).unwrap();

        let mut registrar = Registrar::new();
        let result = Materializer {
            registrar: &mut registrar,
            store: &store,
            max_depth: 32,
            migrate: None,
        }
        .materialize(&Lookup::Key("world".into()), Some(&infinite_reach), false);
        assert!(matches!(result, Err(SessionError::MissingEntity(_))));
    }

    #[test]
    fn test_migration_marks_dirty() {
        let (store, _) = chain();
        let mut registrar = Registrar::new();
        let migrate = |value: &mut Value| {
            value["props"]["desc"] = Value::String("upgraded".to_string());
            true
        };
        Materializer {
            registrar: &mut registrar,
            store: &store,
            max_depth: 32,
            migrate: Some(&migrate),
        }
        .materialize(&Lookup::Key("world".into()), None, false)
        .unwrap();
        let world = registrar.find_by_key(&"world".into()).unwrap();
        assert!(world.is_dirty());
        assert_eq!(world.props.desc, "upgraded");
    }

    #[test]
    fn test_refresh_keeps_dirty_entities() {
        let (store, _) = chain();
        let mut registrar = load(&store, None);
        registrar
            .find_by_key_mut(&"world".into())
            .unwrap()
            .props
            .desc = "local".to_string();
        registrar.find_by_key_mut(&"world".into()).unwrap().touch();
        Materializer {
            registrar: &mut registrar,
            store: &store,
            max_depth: 32,
            migrate: None,
        }
        .materialize(&Lookup::Key("world".into()), None, true)
        .unwrap();
        assert_eq!(
            registrar.find_by_key(&"world".into()).unwrap().props.desc,
            "local"
        );
    }
}
