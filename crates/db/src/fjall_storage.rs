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
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, error, info};

/// One row per entity, keyed by entity key.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRow {
    gid: Option<u64>,
    version: u64,
    klass: String,
    identity: String,
    serialized: String,
}

/// Durable storage on a fjall keyspace: an `entities` partition of rows by key and a `gids`
/// partition mapping gid to key.
pub struct FjallStorage {
    keyspace: Keyspace,
    entities: PartitionHandle,
    gids: PartitionHandle,
}

fn backend(e: impl std::fmt::Display) -> StorageError {
    error!("fjall storage failure: {e}");
    StorageError::Backend(e.to_string())
}

impl FjallStorage {
    /// Open (or create) the store at `path`. The flag is true when the keyspace was empty.
    pub fn open(path: &Path) -> Result<(Self, bool), StorageError> {
        let keyspace = Config::new(path).open().map_err(backend)?;
        let fresh = keyspace.partition_count() == 0;
        let entities = keyspace
            .open_partition("entities", PartitionCreateOptions::default())
            .map_err(backend)?;
        let gids = keyspace
            .open_partition("gids", PartitionCreateOptions::default())
            .map_err(backend)?;
        info!(?path, fresh, "opened entity storage");
        Ok((
            Self {
                keyspace,
                entities,
                gids,
            },
            fresh,
        ))
    }

    fn row(&self, key: &EntityKey) -> Result<Option<StoredRow>, StorageError> {
        let Some(bytes) = self.entities.get(key.as_str()).map_err(backend)? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StorageError::Malformed(format!("{key}: {e}")))
    }
}

impl EntityStorage for FjallStorage {
    fn number_of_entities(&self) -> Result<usize, StorageError> {
        self.entities.len().map_err(backend)
    }

    fn update(
        &self,
        updates: IndexMap<EntityKey, CompiledJson>,
    ) -> Result<IndexMap<EntityKey, CompiledJson>, StorageError> {
        let mut staged = Vec::with_capacity(updates.len());
        for (key, row) in &updates {
            let fields = StorageFields::parse(key, row)?;
            let stored = self.row(key)?;
            fields.check_version(stored.as_ref().map(|r| r.version))?;
            staged.push((fields, stored, row));
        }

        let mut batch = self.keyspace.batch();
        let mut written = IndexMap::new();
        for (fields, stored, row) in staged {
            if let Some(gid) = stored.and_then(|r| r.gid)
                && (fields.destroyed || fields.gid != Some(gid))
            {
                batch.remove(&self.gids, gid.to_be_bytes().to_vec());
            }
            if fields.destroyed {
                debug!(key = %fields.key, "deleting");
                batch.remove(&self.entities, fields.key.as_str());
                continue;
            }
            let bumped = fields.bumped(row)?;
            let stored = StoredRow {
                gid: fields.gid,
                version: fields.original + 1,
                klass: fields.klass.clone(),
                identity: fields.identity.clone(),
                serialized: bumped.text.clone(),
            };
            let bytes = serde_json::to_vec(&stored)
                .map_err(|e| StorageError::Malformed(format!("{}: {e}", fields.key)))?;
            batch.insert(&self.entities, fields.key.as_str(), bytes);
            if let Some(gid) = fields.gid {
                batch.insert(&self.gids, gid.to_be_bytes().to_vec(), fields.key.as_str());
            }
            written.insert(fields.key, bumped);
        }
        batch.commit().map_err(backend)?;
        self.keyspace.persist(PersistMode::SyncAll).map_err(backend)?;
        Ok(written)
    }

    fn load_by_gid(&self, gid: u64) -> Result<Vec<Serialized>, StorageError> {
        let Some(key) = self.gids.get(gid.to_be_bytes()).map_err(backend)? else {
            return Ok(vec![]);
        };
        let key = std::str::from_utf8(&key)
            .map_err(|e| StorageError::Malformed(format!("gid {gid}: {e}")))?;
        self.load_by_key(&EntityKey::from(key))
    }

    fn load_by_key(&self, key: &EntityKey) -> Result<Vec<Serialized>, StorageError> {
        Ok(self
            .row(key)?
            .map(|row| Serialized {
                key: key.clone(),
                serialized: row.serialized,
            })
            .into_iter()
            .collect())
    }

    fn load_all_keys(&self) -> Result<Vec<EntityKey>, StorageError> {
        let mut keys = vec![];
        for entry in self.entities.keys() {
            let key = entry.map_err(backend)?;
            let key = std::str::from_utf8(&key)
                .map_err(|e| StorageError::Malformed(e.to_string()))?;
            keys.push(EntityKey::from(key));
        }
        Ok(keys)
    }

    fn close(&self) -> Result<(), StorageError> {
        self.keyspace.persist(PersistMode::SyncAll).map_err(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{batch, destroyed, row};

    #[test]
    fn test_fresh_then_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let (storage, fresh) = FjallStorage::open(dir.path()).unwrap();
            assert!(fresh);
            storage.update(batch(vec![row("a", 7, 0)])).unwrap();
            storage.close().unwrap();
        }
        let (storage, fresh) = FjallStorage::open(dir.path()).unwrap();
        assert!(!fresh);
        assert_eq!(storage.number_of_entities().unwrap(), 1);
        let loaded = storage.load_by_gid(7).unwrap();
        assert_eq!(loaded[0].key, EntityKey::from("a"));
        assert_eq!(
            CompiledJson::from_text(&loaded[0].serialized)
                .unwrap()
                .version(),
            1
        );
    }

    #[test]
    fn test_conflict_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let (storage, _) = FjallStorage::open(dir.path()).unwrap();
        storage.update(batch(vec![row("a", 1, 0)])).unwrap();
        assert!(matches!(
            storage.update(batch(vec![row("a", 1, 0)])),
            Err(StorageError::VersionConflict { .. })
        ));
        storage.update(batch(vec![destroyed("a", 1, 1)])).unwrap();
        assert!(storage.load_by_key(&"a".into()).unwrap().is_empty());
        assert!(storage.load_by_gid(1).unwrap().is_empty());
        assert!(storage.load_all_keys().unwrap().is_empty());
    }
}
