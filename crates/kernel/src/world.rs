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

//! Builders for the handful of entity shapes the kernel itself relies on.

use crate::errors::SessionError;
use crate::session::Session;
use dimsum_common::model::{EntityBuilder, EntityClass, EntityKey};
use dimsum_common::scopes::{
    Carryable, Containing, Location, Occupyable, Occupying, Ownership,
};
use tracing::info;

/// A new, empty area created by `creator`.
pub fn create_area(
    session: &mut Session,
    creator: &EntityKey,
    name: &str,
) -> Result<EntityKey, SessionError> {
    let creator = session.materialize_key(creator, None)?;
    let area = EntityBuilder::new(EntityClass::Area, name)
        .creator(session.get(&creator)?)
        .with_scope(Containing::default())
        .with_scope(Occupyable::default())
        .build()?;
    let key = session.register(area)?.key.clone();
    info!(%key, name, "created area");
    Ok(key)
}

/// A new person standing in `area`. People own themselves.
pub fn create_person(
    session: &mut Session,
    area: &EntityKey,
    name: &str,
) -> Result<EntityKey, SessionError> {
    let area = &session.materialize_key(area, None)?;
    let world = session.world()?;
    let area_ref = session.get(area)?.to_ref();
    let mut person = EntityBuilder::new(EntityClass::Living, name)
        .creator(world)
        .with_scope(Containing::default())
        .with_scope(Occupying {
            area: Some(area_ref),
        })
        .build()?;
    let owner = person.to_ref();
    person.make::<Ownership>()?.owner = Some(owner);

    let person = session.register(person)?.to_ref();
    let area = session.get_mut(area)?;
    area.try_modify()?;
    area.make::<Occupyable>()?.occupy(person.clone());
    info!(key = %person.key, name, "created person");
    Ok(person.key)
}

/// A new carryable item lying in `area`, created by `creator`. Items given the same `kind` name by
/// the same creator stack.
pub fn create_item(
    session: &mut Session,
    creator: &EntityKey,
    area: &EntityKey,
    name: &str,
    kind: Option<&str>,
) -> Result<EntityKey, SessionError> {
    let creator = &session.materialize_key(creator, None)?;
    let area = &session.materialize_key(area, None)?;
    let kind = match kind {
        Some(kind) => {
            let creator = session.get_mut(creator)?;
            Some(creator.get_kind(kind)?)
        }
        None => None,
    };
    let area_ref = session.get(area)?.to_ref();
    let item = EntityBuilder::new(EntityClass::Item, name)
        .creator(session.get(creator)?)
        .with_scope(Carryable {
            kind,
            quantity: 1.0,
        })
        .with_scope(Location {
            container: Some(area_ref),
            ..Default::default()
        })
        .build()?;
    let item = session.register(item)?.to_ref();
    let area = session.get_mut(area)?;
    area.try_modify()?;
    area.make::<Containing>()?.hold(item.clone());
    Ok(item.key)
}
