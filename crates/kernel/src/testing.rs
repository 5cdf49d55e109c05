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

//! Fixtures for exercising sessions against an in-memory world.

use crate::actions::Reply;
use crate::bus::CollectingBus;
use crate::clock::{Clock, ManualClock};
use crate::config::Config;
use crate::domain::Domain;
use crate::errors::SessionError;
use crate::session::Session;
use crate::world::{create_area, create_item, create_person};
use chrono::{DateTime, Utc};
use dimsum_common::model::EntityKey;
use dimsum_db::InMemoryStorage;
use std::rc::Rc;
use std::sync::Arc;

/// 2023-11-14T22:13:20Z, a Tuesday.
pub const EPOCH_SECONDS: i64 = 1_700_000_000;

/// A world in memory with a clock that only moves when told and a bus that remembers.
pub struct TestWorld {
    pub store: Arc<InMemoryStorage>,
    pub clock: Rc<ManualClock>,
    pub bus: Rc<CollectingBus>,
    pub domain: Domain,
}

/// Keys of the entities [`TestWorld::build`] creates.
#[derive(Debug, Clone)]
pub struct Built {
    pub world: EntityKey,
    pub area: EntityKey,
    pub person: EntityKey,
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl TestWorld {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(InMemoryStorage::new());
        let clock = Rc::new(ManualClock::new(
            DateTime::from_timestamp(EPOCH_SECONDS, 0).unwrap_or_default(),
        ));
        let bus = Rc::new(CollectingBus::default());
        let domain = Domain::builder(store.clone())
            .config(config)
            .clock(clock.clone())
            .bus(bus.clone())
            .build();
        Self {
            store,
            clock,
            bus,
            domain,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn prepared(&self) -> Result<Session, SessionError> {
        let mut session = self.domain.session();
        session.prepare(None)?;
        Ok(session)
    }

    /// A lobby with one person, Jacob, standing in it.
    pub fn build(&self) -> Result<Built, SessionError> {
        let mut session = self.prepared()?;
        let world = session.world_key()?;
        let area = create_area(&mut session, &world, "Lobby")?;
        let person = create_person(&mut session, &area, "Jacob")?;
        session.save(None)?;
        Ok(Built {
            world,
            area,
            person,
        })
    }

    /// An item lying in `area`, made by the world.
    pub fn add_item(
        &self,
        area: &EntityKey,
        name: &str,
        kind: Option<&str>,
    ) -> Result<EntityKey, SessionError> {
        let mut session = self.prepared()?;
        let world = session.world_key()?;
        let key = create_item(&mut session, &world, area, name, kind)?;
        session.save(None)?;
        Ok(key)
    }

    /// An item lying in `area` that carries `source` as its behavior.
    pub fn add_behavior(
        &self,
        area: &EntityKey,
        name: &str,
        source: &str,
    ) -> Result<EntityKey, SessionError> {
        let mut session = self.prepared()?;
        let world = session.world_key()?;
        let key = create_item(&mut session, &world, area, name, None)?;
        session.set_behavior(&key, source)?;
        session.save(None)?;
        Ok(key)
    }

    /// Run one command in its own session, saving afterwards unless the session failed.
    pub fn execute(&self, person: &EntityKey, command: &str) -> Result<Reply, SessionError> {
        let mut session = self.prepared()?;
        let reply = session.execute(person, command)?;
        if !session.is_failed() {
            session.save(None)?;
        }
        Ok(reply)
    }

    /// Service the domain in its own session, saving afterwards.
    pub fn service(&self) -> Result<crate::session::ServiceOutcome, SessionError> {
        let mut session = self.prepared()?;
        let outcome = session.service()?;
        session.save(None)?;
        Ok(outcome)
    }
}
