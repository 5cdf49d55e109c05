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
use crate::model::entity::Entity;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::ops::{Deref, DerefMut};
use tracing::error;

/// A named, independently typed slice of entity state. Scope data is stored on the entity as
/// plain JSON under `NAME` and decoded on checkout.
pub trait Scope: Serialize + DeserializeOwned + Default {
    const NAME: &'static str;
}

/// Exclusive checkout of one scope. Changes are written back to the entity by [`ScopeGuard::commit`]
/// or, failing that, when the guard is dropped. The entity is marked dirty only if the stored data
/// actually changed.
pub struct ScopeGuard<'a, S: Scope> {
    entity: &'a mut Entity,
    data: S,
    depth: u32,
    discard: bool,
}

impl<'a, S: Scope> ScopeGuard<'a, S> {
    pub(crate) fn new(entity: &'a mut Entity, data: S) -> Self {
        Self {
            entity,
            data,
            depth: 0,
            discard: false,
        }
    }

    pub fn entity(&self) -> &Entity {
        self.entity
    }

    /// Nested checkout of the same scope. Only the outermost guard commits.
    pub fn reenter(&mut self) -> Reentered<'_, 'a, S> {
        self.depth += 1;
        Reentered { guard: self }
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Drop the guard without writing anything back.
    pub fn discard(mut self) {
        self.discard = true;
    }

    /// Write the data back now. Returns whether the entity changed. A dropped guard can only log
    /// a failed write.
    pub fn commit(mut self) -> Result<bool, ModelError> {
        self.discard = true;
        self.entity.checkin(&self.data)
    }
}

impl<S: Scope> Deref for ScopeGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.data
    }
}

impl<S: Scope> DerefMut for ScopeGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.data
    }
}

impl<S: Scope> Drop for ScopeGuard<'_, S> {
    fn drop(&mut self) {
        if self.discard {
            return;
        }
        if let Err(e) = self.entity.checkin(&self.data) {
            error!(key = %self.entity.key, scope = S::NAME, "scope checkin failed: {e}");
        }
    }
}

pub struct Reentered<'g, 'a, S: Scope> {
    guard: &'g mut ScopeGuard<'a, S>,
}

impl<S: Scope> Deref for Reentered<'_, '_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.guard.data
    }
}

impl<S: Scope> DerefMut for Reentered<'_, '_, S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.guard.data
    }
}

impl<S: Scope> Drop for Reentered<'_, '_, S> {
    fn drop(&mut self) {
        self.guard.depth -= 1;
    }
}
