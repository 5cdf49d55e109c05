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

use crate::dynamic::DynamicError;
use dimsum_common::model::{DiffSecurityError, EntityKey, ModelError};
use dimsum_db::StorageError;
use thiserror::Error;

/// Everything that can go wrong inside a session. Frozen entities are the only fault an action
/// recovers from; the rest mean the session should be discarded.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    #[error("entity {0} is frozen")]
    Frozen(EntityKey),
    #[error("missing entity: {0}")]
    MissingEntity(String),
    #[error("registration conflict: gid {gid} belongs to {existing}, not {key}")]
    Registration {
        gid: u64,
        existing: EntityKey,
        key: EntityKey,
    },
    #[error(transparent)]
    Security(#[from] DiffSecurityError),
    #[error(transparent)]
    Dynamic(#[from] DynamicError),
    #[error(transparent)]
    Storage(StorageError),
    #[error(transparent)]
    Model(ModelError),
    #[error("session previously failed and cannot be used")]
    Failed,
    #[error("session is closed")]
    Closed,
    #[error("session has not been prepared")]
    NotPrepared,
}

impl From<ModelError> for SessionError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::EntityFrozen(key) => SessionError::Frozen(key),
            ModelError::RegistrationConflict { gid, existing, key } => {
                SessionError::Registration { gid, existing, key }
            }
            e => SessionError::Model(e),
        }
    }
}

impl From<StorageError> for SessionError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Model(e) => e.into(),
            e => SessionError::Storage(e),
        }
    }
}
