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

use crate::{EntityStorage, StorageError, StorageFields};
use dimsum_common::model::{CompiledJson, EntityKey, Serialized};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone)]
struct Row {
    gid: Option<u64>,
    version: u64,
    serialized: String,
}

#[derive(Debug, Default)]
struct Inner {
    rows: IndexMap<EntityKey, Row>,
    gids: HashMap<u64, EntityKey>,
}

/// Volatile storage, for tests and throwaway worlds.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    inner: RwLock<Inner>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> StorageError {
    StorageError::Backend("in-memory store lock poisoned".to_string())
}

impl EntityStorage for InMemoryStorage {
    fn number_of_entities(&self) -> Result<usize, StorageError> {
        Ok(self.inner.read().map_err(poisoned)?.rows.len())
    }

    fn update(
        &self,
        updates: IndexMap<EntityKey, CompiledJson>,
    ) -> Result<IndexMap<EntityKey, CompiledJson>, StorageError> {
        let mut inner = self.inner.write().map_err(poisoned)?;

        let mut staged = Vec::with_capacity(updates.len());
        for (key, row) in &updates {
            let fields = StorageFields::parse(key, row)?;
            fields.check_version(inner.rows.get(key).map(|r| r.version))?;
            staged.push((fields, row));
        }

        let mut written = IndexMap::new();
        for (fields, row) in staged {
            if let Some(previous) = inner.rows.get(&fields.key).and_then(|r| r.gid) {
                inner.gids.remove(&previous);
            }
            if fields.destroyed {
                debug!(key = %fields.key, "deleting");
                inner.rows.shift_remove(&fields.key);
                continue;
            }
            let bumped = fields.bumped(row)?;
            if let Some(gid) = fields.gid {
                inner.gids.insert(gid, fields.key.clone());
            }
            inner.rows.insert(
                fields.key.clone(),
                Row {
                    gid: fields.gid,
                    version: fields.original + 1,
                    serialized: bumped.text.clone(),
                },
            );
            written.insert(fields.key, bumped);
        }
        Ok(written)
    }

    fn load_by_gid(&self, gid: u64) -> Result<Vec<Serialized>, StorageError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner
            .gids
            .get(&gid)
            .and_then(|key| inner.rows.get(key).map(|row| (key, row)))
            .map(|(key, row)| Serialized {
                key: key.clone(),
                serialized: row.serialized.clone(),
            })
            .into_iter()
            .collect())
    }

    fn load_by_key(&self, key: &EntityKey) -> Result<Vec<Serialized>, StorageError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner
            .rows
            .get(key)
            .map(|row| Serialized {
                key: key.clone(),
                serialized: row.serialized.clone(),
            })
            .into_iter()
            .collect())
    }

    fn load_all_keys(&self) -> Result<Vec<EntityKey>, StorageError> {
        Ok(self
            .inner
            .read()
            .map_err(poisoned)?
            .rows
            .keys()
            .cloned()
            .collect())
    }

    fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{batch, destroyed, row};

    #[test]
    fn test_insert_bumps_version() {
        let storage = InMemoryStorage::new();
        let written = storage.update(batch(vec![row("a", 1, 0)])).unwrap();
        assert_eq!(written[0].version(), 1);
        assert_eq!(storage.number_of_entities().unwrap(), 1);

        let loaded = storage.load_by_gid(1).unwrap();
        assert_eq!(loaded.len(), 1);
        let back = CompiledJson::from_text(&loaded[0].serialized).unwrap();
        assert_eq!(back.version(), 1);
    }

    #[test]
    fn test_stale_update_conflicts() {
        let storage = InMemoryStorage::new();
        storage.update(batch(vec![row("a", 1, 0)])).unwrap();
        storage.update(batch(vec![row("a", 1, 1)])).unwrap();
        let err = storage.update(batch(vec![row("a", 1, 1)])).unwrap_err();
        assert_eq!(
            err,
            StorageError::VersionConflict {
                key: "a".into(),
                expected: 1,
                found: 2
            }
        );
    }

    #[test]
    fn test_conflict_rejects_whole_batch() {
        let storage = InMemoryStorage::new();
        storage.update(batch(vec![row("a", 1, 0)])).unwrap();
        assert!(
            storage
                .update(batch(vec![row("b", 2, 0), row("a", 1, 5)]))
                .is_err()
        );
        assert!(storage.load_by_key(&"b".into()).unwrap().is_empty());
    }

    #[test]
    fn test_destroyed_rows_are_deleted() {
        let storage = InMemoryStorage::new();
        storage.update(batch(vec![row("a", 1, 0)])).unwrap();
        let written = storage.update(batch(vec![destroyed("a", 1, 1)])).unwrap();
        assert!(written.is_empty());
        assert!(storage.load_by_key(&"a".into()).unwrap().is_empty());
        assert!(storage.load_by_gid(1).unwrap().is_empty());
        assert!(storage.load_all_keys().unwrap().is_empty());
    }
}
