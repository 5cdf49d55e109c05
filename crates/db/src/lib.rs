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

use dimsum_common::model::{CompiledJson, EntityKey, ModelError, Serialized};
use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;

mod chains;
mod fjall_storage;
mod memory;

pub use chains::{PrioritizedStorageChain, SeparatedStorageChain};
pub use fjall_storage::FjallStorage;
pub use memory::InMemoryStorage;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StorageError {
    #[error("version conflict on {key}: expected {expected}, found {found}")]
    VersionConflict {
        key: EntityKey,
        expected: u64,
        found: u64,
    },
    #[error("malformed row: {0}")]
    Malformed(String),
    #[error("storage backend failure: {0}")]
    Backend(String),
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Durable home of serialized entities. Implementations are shared across sessions and threads.
pub trait EntityStorage: Send + Sync {
    fn number_of_entities(&self) -> Result<usize, StorageError>;

    /// Apply a batch atomically: every row's version is incremented, rows of destroyed entities
    /// are deleted, and a row whose stored version differs from the one it was loaded at is
    /// rejected. Returns the rows as written, excluding deletions.
    fn update(
        &self,
        updates: IndexMap<EntityKey, CompiledJson>,
    ) -> Result<IndexMap<EntityKey, CompiledJson>, StorageError>;

    fn load_by_gid(&self, gid: u64) -> Result<Vec<Serialized>, StorageError>;

    fn load_by_key(&self, key: &EntityKey) -> Result<Vec<Serialized>, StorageError>;

    fn load_all_keys(&self) -> Result<Vec<EntityKey>, StorageError>;

    fn close(&self) -> Result<(), StorageError>;
}

/// The columns storage cares about, pulled out of one serialized entity.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageFields {
    pub key: EntityKey,
    pub gid: Option<u64>,
    pub original: u64,
    pub klass: String,
    pub identity: String,
    pub destroyed: bool,
}

impl StorageFields {
    pub fn parse(key: &EntityKey, row: &CompiledJson) -> Result<Self, StorageError> {
        let embedded = row
            .key()
            .ok_or_else(|| StorageError::Malformed(format!("{key}: no key in serialized form")))?;
        if embedded != *key {
            return Err(StorageError::Malformed(format!(
                "{key}: serialized form claims key {embedded}"
            )));
        }
        Ok(Self {
            key: embedded,
            gid: row.gid(),
            original: row.version(),
            klass: row.klass().unwrap_or_default().to_string(),
            identity: row
                .compiled
                .pointer("/identity/public")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            destroyed: row.is_destroyed(),
        })
    }

    /// The row as it will be written: same content at the next version.
    pub fn bumped(&self, row: &CompiledJson) -> Result<CompiledJson, StorageError> {
        let mut compiled = row.compiled.clone();
        let Some(object) = compiled.as_object_mut() else {
            return Err(StorageError::Malformed(format!("{}: not an object", self.key)));
        };
        object.insert(
            "version".to_string(),
            serde_json::json!({ "i": self.original + 1 }),
        );
        Ok(CompiledJson::from_value(compiled)?)
    }

    /// Stored rows that don't exist yet accept any original version, so layered stores can
    /// take over rows first written elsewhere.
    pub fn check_version(&self, stored: Option<u64>) -> Result<(), StorageError> {
        match stored {
            Some(found) if found != self.original => Err(StorageError::VersionConflict {
                key: self.key.clone(),
                expected: self.original,
                found,
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use dimsum_common::model::{CompiledJson, EntityKey};
    use serde_json::json;

    pub fn row(key: &str, gid: u64, version: u64) -> CompiledJson {
        CompiledJson::from_value(json!({
            "key": key,
            "version": {"i": version},
            "klass": "Item",
            "identity": {"public": format!("pk-{key}")},
            "props": {"name": key, "gid": gid},
        }))
        .unwrap()
    }

    pub fn destroyed(key: &str, gid: u64, version: u64) -> CompiledJson {
        let mut r = row(key, gid, version).compiled;
        r["props"]["destroyed"] = json!({"public": "x"});
        CompiledJson::from_value(r).unwrap()
    }

    pub fn batch(rows: Vec<CompiledJson>) -> indexmap::IndexMap<EntityKey, CompiledJson> {
        rows.into_iter().map(|r| (r.key().unwrap(), r)).collect()
    }
}
