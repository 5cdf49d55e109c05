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

//! Stores composed out of other stores.

use crate::{EntityStorage, StorageError};
use dimsum_common::model::{CompiledJson, EntityKey, Serialized};
use indexmap::{IndexMap, IndexSet};
use std::sync::Arc;

/// Reads are answered by the first child that has the row; writes go to the first child.
pub struct PrioritizedStorageChain {
    children: Vec<Arc<dyn EntityStorage>>,
}

impl PrioritizedStorageChain {
    pub fn new(children: Vec<Arc<dyn EntityStorage>>) -> Result<Self, StorageError> {
        if children.is_empty() {
            return Err(StorageError::Backend(
                "storage chain needs at least one child".to_string(),
            ));
        }
        Ok(Self { children })
    }

    fn first_answer(
        &self,
        load: impl Fn(&dyn EntityStorage) -> Result<Vec<Serialized>, StorageError>,
    ) -> Result<Vec<Serialized>, StorageError> {
        for child in &self.children {
            let rows = load(child.as_ref())?;
            if !rows.is_empty() {
                return Ok(rows);
            }
        }
        Ok(vec![])
    }
}

impl EntityStorage for PrioritizedStorageChain {
    fn number_of_entities(&self) -> Result<usize, StorageError> {
        Ok(self.load_all_keys()?.len())
    }

    fn update(
        &self,
        updates: IndexMap<EntityKey, CompiledJson>,
    ) -> Result<IndexMap<EntityKey, CompiledJson>, StorageError> {
        self.children[0].update(updates)
    }

    fn load_by_gid(&self, gid: u64) -> Result<Vec<Serialized>, StorageError> {
        self.first_answer(|s| s.load_by_gid(gid))
    }

    fn load_by_key(&self, key: &EntityKey) -> Result<Vec<Serialized>, StorageError> {
        self.first_answer(|s| s.load_by_key(key))
    }

    fn load_all_keys(&self) -> Result<Vec<EntityKey>, StorageError> {
        let mut keys = IndexSet::new();
        for child in &self.children {
            keys.extend(child.load_all_keys()?);
        }
        Ok(keys.into_iter().collect())
    }

    fn close(&self) -> Result<(), StorageError> {
        for child in &self.children {
            child.close()?;
        }
        Ok(())
    }
}

/// Writes go to `write`; reads prefer `write` and fall back to `read`.
pub struct SeparatedStorageChain {
    chain: PrioritizedStorageChain,
}

impl SeparatedStorageChain {
    pub fn new(read: Arc<dyn EntityStorage>, write: Arc<dyn EntityStorage>) -> Self {
        Self {
            chain: PrioritizedStorageChain {
                children: vec![write, read],
            },
        }
    }
}

impl EntityStorage for SeparatedStorageChain {
    fn number_of_entities(&self) -> Result<usize, StorageError> {
        self.chain.number_of_entities()
    }

    fn update(
        &self,
        updates: IndexMap<EntityKey, CompiledJson>,
    ) -> Result<IndexMap<EntityKey, CompiledJson>, StorageError> {
        self.chain.update(updates)
    }

    fn load_by_gid(&self, gid: u64) -> Result<Vec<Serialized>, StorageError> {
        self.chain.load_by_gid(gid)
    }

    fn load_by_key(&self, key: &EntityKey) -> Result<Vec<Serialized>, StorageError> {
        self.chain.load_by_key(key)
    }

    fn load_all_keys(&self) -> Result<Vec<EntityKey>, StorageError> {
        self.chain.load_all_keys()
    }

    fn close(&self) -> Result<(), StorageError> {
        self.chain.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryStorage;
    use crate::testing::{batch, row};

    #[test]
    fn test_prioritized_reads_first_answer() {
        let first = Arc::new(InMemoryStorage::new());
        let second = Arc::new(InMemoryStorage::new());
        second.update(batch(vec![row("a", 1, 0)])).unwrap();
        second.update(batch(vec![row("b", 2, 0)])).unwrap();
        first.update(batch(vec![row("a", 1, 0)])).unwrap();

        let children: Vec<Arc<dyn EntityStorage>> = vec![first.clone(), second.clone()];
        let chain = PrioritizedStorageChain::new(children).unwrap();
        assert_eq!(chain.load_by_key(&"a".into()).unwrap().len(), 1);
        assert_eq!(chain.load_by_gid(2).unwrap()[0].key, EntityKey::from("b"));
        assert_eq!(chain.number_of_entities().unwrap(), 2);

        chain.update(batch(vec![row("c", 3, 0)])).unwrap();
        assert_eq!(first.number_of_entities().unwrap(), 2);
        assert_eq!(second.number_of_entities().unwrap(), 2);
    }

    #[test]
    fn test_separated_overlays_writes() {
        let read = Arc::new(InMemoryStorage::new());
        read.update(batch(vec![row("a", 1, 0)])).unwrap();
        let write = Arc::new(InMemoryStorage::new());
        let chain = SeparatedStorageChain::new(read.clone(), write.clone());

        // Loaded from the read side at version 1, written to the write side.
        chain.update(batch(vec![row("a", 1, 1)])).unwrap();
        assert_eq!(write.number_of_entities().unwrap(), 1);
        let loaded = chain.load_by_key(&"a".into()).unwrap();
        assert_eq!(
            CompiledJson::from_text(&loaded[0].serialized)
                .unwrap()
                .version(),
            2
        );
    }

    #[test]
    fn test_empty_chain_rejected() {
        assert!(PrioritizedStorageChain::new(vec![]).is_err());
    }
}
