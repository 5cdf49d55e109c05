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

pub use crate::model::acls::{Acl, Acls, Permission, SecurityContext, well_known_identity};
pub use crate::model::compiled::{CompiledJson, Serialized};
pub use crate::model::diff::{Change, ChangeKind, Diff};
pub use crate::model::entity::{Entity, EntityBuilder, EntityVisitor};
pub use crate::model::identity::Identity;
pub use crate::model::keys::{EntityClass, EntityKey, EntityRef, REF_MARKER};
pub use crate::model::props::{Kind, Property, Props};
pub use crate::model::registrar::{Modified, Registrar};
pub use crate::model::scope::{Scope, ScopeGuard};
pub use crate::model::security::{
    DiffSecurityError, SecurityCheck, SecurityCheckError, find_all_acls,
    generate_security_check_from_json_diff,
};
pub use crate::model::version::Version;

use thiserror::Error;

mod acls;
mod compiled;
mod diff;
mod entity;
mod identity;
mod keys;
mod props;
mod registrar;
mod scope;
mod security;
mod version;

/// Errors raised by the entity model itself, independent of storage or sessions.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("entity {0} is frozen")]
    EntityFrozen(EntityKey),
    #[error("entity {0} is not frozen")]
    EntityUnfrozen(EntityKey),
    #[error("gid {gid} already assigned to {existing}, refusing {key}")]
    RegistrationConflict {
        gid: u64,
        existing: EntityKey,
        key: EntityKey,
    },
    #[error("scope `{scope}` on {key} could not be decoded: {message}")]
    ScopeDecode {
        key: EntityKey,
        scope: String,
        message: String,
    },
    #[error("unable to serialize {key}: {message}")]
    Serialization { key: EntityKey, message: String },
    #[error("malformed entity json: {0}")]
    MalformedJson(String),
    #[error("identity error: {0}")]
    Identity(String),
    #[error("entity {0} requires a creator")]
    MissingCreator(EntityKey),
}
