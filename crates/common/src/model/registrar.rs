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

use crate::model::ModelError;
use crate::model::compiled::CompiledJson;
use crate::model::diff::Diff;
use crate::model::entity::Entity;
use crate::model::keys::EntityKey;
use indexmap::IndexMap;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// An entity that differs from what was loaded, ready to be written.
#[derive(Debug, Clone)]
pub struct Modified {
    pub key: EntityKey,
    pub saving: CompiledJson,
    pub original: Option<CompiledJson>,
    /// `None` for entities that have never been persisted.
    pub diff: Option<Diff>,
}

/// Per-session arena of every entity the session has loaded or created, keyed by entity key and
/// by global id, along with the serialized form each entity had when it was first seen.
#[derive(Debug, Default)]
pub struct Registrar {
    entities: IndexMap<EntityKey, Entity>,
    garbage: IndexMap<EntityKey, Entity>,
    numbered: HashMap<u64, EntityKey>,
    originals: HashMap<EntityKey, CompiledJson>,
    number: u64,
}

impl Registrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next gid that will be handed out.
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Never moves the counter backwards past gids already in use.
    pub fn set_number(&mut self, number: u64) {
        let floor = self.numbered.keys().max().map(|g| g + 1).unwrap_or(0);
        self.number = number.max(floor);
    }

    /// Track `entity`, assigning it a gid if it has none. `original` is kept only the first time
    /// a key is seen in this session.
    pub fn register(
        &mut self,
        mut entity: Entity,
        original: Option<CompiledJson>,
    ) -> Result<&mut Entity, ModelError> {
        let gid = match entity.gid() {
            Some(gid) => {
                if let Some(existing) = self.numbered.get(&gid)
                    && *existing != entity.key
                {
                    return Err(ModelError::RegistrationConflict {
                        gid,
                        existing: existing.clone(),
                        key: entity.key.clone(),
                    });
                }
                gid
            }
            None => {
                let gid = self.number;
                entity.assign_gid(gid);
                gid
            }
        };
        self.number = self.number.max(gid + 1);
        self.numbered.insert(gid, entity.key.clone());

        if let Some(original) = original {
            self.originals.entry(entity.key.clone()).or_insert(original);
        }
        debug!(key = %entity.key, gid, "registered");

        let key = entity.key.clone();
        self.entities.insert(key.clone(), entity);
        Ok(&mut self.entities[&key])
    }

    /// Swap in a freshly loaded copy of an entity, taking its stored form as the new baseline.
    pub fn replace(
        &mut self,
        entity: Entity,
        original: CompiledJson,
    ) -> Result<&mut Entity, ModelError> {
        if let Some(previous) = self.entities.get(&entity.key)
            && let Some(gid) = previous.gid()
            && previous.gid() != entity.gid()
        {
            self.numbered.remove(&gid);
        }
        self.originals.insert(entity.key.clone(), original.clone());
        self.register(entity, Some(original))
    }

    /// Tombstone an entity. It disappears from lookups but is still written (as a delete) on the
    /// next save.
    pub fn unregister(&mut self, key: &EntityKey) -> Option<()> {
        let mut entity = self.entities.shift_remove(key)?;
        entity.destroy();
        if let Some(gid) = entity.gid() {
            self.numbered.remove(&gid);
        }
        info!(key = %key, "unregistered");
        self.garbage.insert(key.clone(), entity);
        Some(())
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.entities.contains_key(key)
    }

    pub fn find_by_key(&self, key: &EntityKey) -> Option<&Entity> {
        self.entities.get(key)
    }

    pub fn find_by_key_mut(&mut self, key: &EntityKey) -> Option<&mut Entity> {
        self.entities.get_mut(key)
    }

    pub fn find_by_gid(&self, gid: u64) -> Option<&Entity> {
        self.numbered
            .get(&gid)
            .and_then(|key| self.entities.get(key))
    }

    pub fn original(&self, key: &EntityKey) -> Option<&CompiledJson> {
        self.originals.get(key)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn entities_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.values_mut()
    }

    /// Live entities with unsaved changes. Tombstones are not included.
    pub fn modified(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values().filter(|e| e.is_dirty())
    }

    pub fn garbage(&self) -> impl Iterator<Item = &Entity> {
        self.garbage.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Serialized form of every live and tombstoned entity.
    pub fn serialize_all(&self) -> Result<IndexMap<EntityKey, CompiledJson>, ModelError> {
        self.entities
            .values()
            .chain(self.garbage.values())
            .map(|e| Ok((e.key.clone(), e.serialize()?)))
            .collect()
    }

    /// Keep only candidates whose serialized form differs from the original.
    pub fn filter_modified(
        &self,
        candidates: IndexMap<EntityKey, CompiledJson>,
    ) -> IndexMap<EntityKey, Modified> {
        let mut modified = IndexMap::new();
        for (key, saving) in candidates {
            let original = self.originals.get(&key);
            let diff = match original {
                Some(original) if original.text == saving.text => continue,
                Some(original) => {
                    let diff = Diff::between(&original.compiled, &saving.compiled);
                    if diff.is_empty() {
                        continue;
                    }
                    Some(diff)
                }
                None => None,
            };
            let dirty = self
                .entities
                .get(&key)
                .or_else(|| self.garbage.get(&key))
                .is_some_and(Entity::is_dirty);
            if !dirty {
                warn!(key = %key, "untouched entity changed, saving anyway");
            }
            modified.insert(
                key.clone(),
                Modified {
                    key,
                    saving,
                    original: original.cloned(),
                    diff,
                },
            );
        }
        modified
    }

    /// Record a successful write of `key`.
    pub fn saved(&mut self, key: &EntityKey, saved: CompiledJson) {
        if let Some(entity) = self.entities.get_mut(key) {
            entity.version.saved(saved.version());
            self.originals.insert(key.clone(), saved);
        }
    }

    /// Forget tombstones once they have been written, and clear every dirty flag.
    pub fn settle(&mut self) {
        for key in self.garbage.keys() {
            self.originals.remove(key);
        }
        self.garbage.clear();
        for entity in self.entities.values_mut() {
            entity.version.clean();
        }
    }

    pub fn log_summary(&self) {
        let dirty = self.modified().count();
        info!(
            target: "dimsum::registrar",
            entities = self.entities.len(),
            dirty,
            garbage = self.garbage.len(),
            next_gid = self.number,
            "registrar:summary"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entity::EntityBuilder;
    use crate::model::keys::EntityClass;

    fn world() -> Entity {
        EntityBuilder::new(EntityClass::World, "World")
            .key("world".into())
            .build()
            .unwrap()
    }

    #[test]
    fn test_assigns_sequential_gids() {
        let mut registrar = Registrar::new();
        let world = world();
        let item = EntityBuilder::new(EntityClass::Item, "Box")
            .creator(&world)
            .build()
            .unwrap();
        assert_eq!(registrar.register(world, None).unwrap().gid(), Some(0));
        assert_eq!(registrar.register(item, None).unwrap().gid(), Some(1));
        assert_eq!(registrar.number(), 2);
        assert_eq!(registrar.find_by_gid(1).unwrap().name(), "Box");
    }

    #[test]
    fn test_gid_collision() {
        let mut registrar = Registrar::new();
        let world = world();
        let mut a = EntityBuilder::new(EntityClass::Item, "A").creator(&world).build().unwrap();
        let mut b = EntityBuilder::new(EntityClass::Item, "B").creator(&world).build().unwrap();
        a.props.gid = Some(5);
        b.props.gid = Some(5);
        registrar.register(a, None).unwrap();
        assert!(matches!(
            registrar.register(b, None),
            Err(ModelError::RegistrationConflict { gid: 5, .. })
        ));
        assert_eq!(registrar.number(), 6);
    }

    #[test]
    fn test_original_kept_once() {
        let mut registrar = Registrar::new();
        let mut world = world();
        world.props.gid = Some(0);
        let first = world.serialize().unwrap();
        registrar.register(world.clone(), Some(first.clone())).unwrap();
        let mut changed = world;
        changed.props.name = "Changed".to_string();
        let second = changed.serialize().unwrap();
        registrar.register(changed, Some(second)).unwrap();
        assert_eq!(registrar.original(&"world".into()), Some(&first));
    }

    #[test]
    fn test_replace_takes_new_baseline() {
        let mut registrar = Registrar::new();
        let mut world = world();
        world.props.gid = Some(0);
        registrar
            .register(world.clone(), Some(world.serialize().unwrap()))
            .unwrap();
        let mut newer = world;
        newer.props.desc = "newer".to_string();
        let newer_json = newer.serialize().unwrap();
        registrar.replace(newer, newer_json.clone()).unwrap();
        assert_eq!(registrar.original(&"world".into()), Some(&newer_json));
        assert_eq!(registrar.find_by_gid(0).unwrap().props.desc, "newer");
    }

    #[test]
    fn test_filter_modified_skips_identical() {
        let mut registrar = Registrar::new();
        let world = world();
        registrar.register(world, None).unwrap();
        let saved = registrar.find_by_key(&"world".into()).unwrap().serialize().unwrap();
        registrar.saved(&"world".into(), saved);
        registrar.settle();
        assert_eq!(registrar.modified().count(), 0);

        let all = registrar.serialize_all().unwrap();
        assert!(registrar.filter_modified(all).is_empty());

        registrar
            .find_by_key_mut(&"world".into())
            .unwrap()
            .props
            .desc = "changed".to_string();
        let all = registrar.serialize_all().unwrap();
        let modified = registrar.filter_modified(all);
        assert_eq!(modified.len(), 1);
        assert!(modified[0].diff.is_some());
    }

    #[test]
    fn test_unregister_moves_to_garbage() {
        let mut registrar = Registrar::new();
        let world = world();
        let item = EntityBuilder::new(EntityClass::Item, "Box").creator(&world).build().unwrap();
        let key = item.key.clone();
        registrar.register(item, None).unwrap();
        registrar.unregister(&key).unwrap();
        assert!(!registrar.contains(&key));
        assert!(registrar.garbage().next().unwrap().is_destroyed());
        assert!(registrar.serialize_all().unwrap().contains_key(&key));
        registrar.settle();
        assert!(registrar.garbage().next().is_none());
    }
}
