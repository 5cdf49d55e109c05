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

//! The entity model shared by storage, the kernel and hosts: entities and their scopes,
//! identities, permissions, the structural diff used for security checks, and the registrar
//! that tracks every entity a session has touched.

pub mod model;
pub mod scopes;
pub mod tracing;

pub use model::{
    Acl, Acls, CompiledJson, Diff, DiffSecurityError, Entity, EntityBuilder, EntityClass,
    EntityKey, EntityRef, Identity, Kind, ModelError, Permission, Props, Registrar, Scope,
    ScopeGuard, SecurityCheck, SecurityCheckError, SecurityContext, Serialized, Version,
};

/// Key of the root entity every world hangs off of.
pub const WORLD_KEY: &str = "world";
