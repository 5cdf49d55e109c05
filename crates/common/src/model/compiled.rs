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
use crate::model::keys::EntityKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A serialized entity held both as text and as its parsed tree. The text is always produced
/// from the tree, so two structurally equal entities have byte-identical text.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledJson {
    pub text: String,
    pub compiled: Value,
}

impl CompiledJson {
    pub fn from_value(compiled: Value) -> Result<Self, ModelError> {
        let text =
            serde_json::to_string(&compiled).map_err(|e| ModelError::MalformedJson(e.to_string()))?;
        Ok(Self { text, compiled })
    }

    pub fn from_text(text: &str) -> Result<Self, ModelError> {
        let compiled: Value =
            serde_json::from_str(text).map_err(|e| ModelError::MalformedJson(e.to_string()))?;
        Self::from_value(compiled)
    }

    pub fn key(&self) -> Option<EntityKey> {
        self.compiled
            .get("key")
            .and_then(Value::as_str)
            .map(EntityKey::from)
    }

    pub fn version(&self) -> u64 {
        self.compiled
            .pointer("/version/i")
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }

    pub fn gid(&self) -> Option<u64> {
        self.compiled.pointer("/props/gid").and_then(Value::as_u64)
    }

    pub fn klass(&self) -> Option<&str> {
        self.compiled.get("klass").and_then(Value::as_str)
    }

    pub fn is_destroyed(&self) -> bool {
        self.compiled
            .pointer("/props/destroyed")
            .is_some_and(|v| !v.is_null())
    }
}

/// A stored row as handed back by storage: the entity key and its serialized text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Serialized {
    pub key: EntityKey,
    pub serialized: String,
}
