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

//! Named entities the world keeps track of, and the world's gid counter.

use crate::errors::SessionError;
use crate::session::Session;
use dimsum_common::model::{Entity, EntityKey, ModelError};
use dimsum_common::scopes::{Identifiers, WellKnown};
use tracing::{info, warn};

/// Builds a well-known entity the first time it's needed. Receives the world as creator.
pub type CreateFn<'a> = &'a dyn Fn(&Entity) -> Result<Entity, ModelError>;

pub fn get_well_known_key(session: &Session, name: &str) -> Result<Option<EntityKey>, SessionError> {
    let world = session.world()?;
    Ok(world.scope::<WellKnown>()?.entities.get(name).cloned())
}

pub fn set_well_known_key(
    session: &mut Session,
    name: &str,
    key: &EntityKey,
) -> Result<(), SessionError> {
    let world = session.world_mut()?;
    let mut well_known = world.make::<WellKnown>()?;
    well_known.entities.insert(name.to_string(), key.clone());
    Ok(())
}

/// Load the entity registered under `name`, creating and registering it with `create` when there
/// is none. A name pointing at a missing entity is treated as unset.
pub fn materialize_well_known_entity(
    session: &mut Session,
    name: &str,
    create: Option<CreateFn<'_>>,
) -> Result<Option<EntityKey>, SessionError> {
    if let Some(key) = get_well_known_key(session, name)? {
        match session.try_materialize_key(&key, None)? {
            Some(key) => return Ok(Some(key)),
            None => warn!(name, %key, "well known entity missing"),
        }
    }
    let Some(create) = create else {
        return Ok(None);
    };
    let entity = create(session.world()?)?;
    let key = session.register(entity)?.key.clone();
    set_well_known_key(session, name, &key)?;
    info!(name, %key, "created well known entity");
    Ok(Some(key))
}

pub fn get_current_gid(session: &Session) -> Result<u64, SessionError> {
    Ok(session.world()?.scope::<Identifiers>()?.gid)
}

pub fn set_current_gid(session: &mut Session, gid: u64) -> Result<(), SessionError> {
    let world = session.world_mut()?;
    world.make::<Identifiers>()?.gid = gid;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestWorld;
    use dimsum_common::model::{EntityBuilder, EntityClass};
    use dimsum_common::scopes::well_known::WELCOME_AREA;
    use pretty_assertions::assert_eq;

    fn area(world: &Entity) -> Result<Entity, ModelError> {
        EntityBuilder::new(EntityClass::Area, "Welcome")
            .creator(world)
            .build()
    }

    #[test]
    fn test_created_once() {
        let tw = TestWorld::new();
        let mut session = tw.prepared().unwrap();
        assert_eq!(
            materialize_well_known_entity(&mut session, WELCOME_AREA, None).unwrap(),
            None
        );
        let created = materialize_well_known_entity(&mut session, WELCOME_AREA, Some(&area))
            .unwrap()
            .unwrap();
        session.save(None).unwrap();

        let mut session = tw.prepared().unwrap();
        let found = materialize_well_known_entity(&mut session, WELCOME_AREA, Some(&area))
            .unwrap()
            .unwrap();
        assert_eq!(found, created);
        assert_eq!(
            get_well_known_key(&session, WELCOME_AREA).unwrap(),
            Some(created)
        );
    }

    #[test]
    fn test_gid_counter_saved() {
        let tw = TestWorld::new();
        let mut session = tw.prepared().unwrap();
        let before = get_current_gid(&session).unwrap();
        materialize_well_known_entity(&mut session, WELCOME_AREA, Some(&area)).unwrap();
        session.save(None).unwrap();

        let session = tw.prepared().unwrap();
        assert!(get_current_gid(&session).unwrap() > before);
    }
}
