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


//! The single-player host: bootstraps the welcome area and player, runs their commands and
//! services the domain when it asks to be woken.

use dimsum_common::model::{Entity, EntityBuilder, EntityClass, EntityKey, ModelError};
use dimsum_common::scopes::well_known::WELCOME_AREA;
use dimsum_common::scopes::{Containing, Occupyable};
use dimsum_kernel::well_known::{get_well_known_key, materialize_well_known_entity, set_well_known_key};
use dimsum_kernel::world::create_person;
use dimsum_kernel::{
    Domain, Event, EventBus, Reply, SecurityContextFn, ServiceOutcome, Session, SessionError,
    acting_as,
};
use std::time::Duration;
use tracing::{info, warn};

/// Prints what entities say to the console, and logs everything.
pub struct ConsoleBus;

impl EventBus for ConsoleBus {
    fn publish(&self, event: &Event) {
        info!(target: "dimsum::bus", name = %event.name, source = ?event.source, payload = %event.payload, "event");
        if event.name == "said"
            && let Some(message) = event.payload.get("message").and_then(|m| m.as_str())
        {
            println!("{message}");
        }
    }
}

fn welcome_area(world: &Entity) -> Result<Entity, ModelError> {
    EntityBuilder::new(EntityClass::Area, "Welcome Area")
        .creator(world)
        .desc("A quiet place to start.")
        .with_scope(Containing::default())
        .with_scope(Occupyable::default())
        .build()
}

fn player_key_name(name: &str) -> String {
    format!("player:{name}")
}

pub struct WorldHost {
    domain: Domain,
    player: EntityKey,
}

impl WorldHost {
    /// Make sure the welcome area and the named player exist, then work out the first wake.
    pub fn open(domain: Domain, player_name: &str) -> Result<Self, SessionError> {
        let mut session = prepared(&domain)?;
        let area = materialize_well_known_entity(&mut session, WELCOME_AREA, Some(&welcome_area))?
            .ok_or_else(|| SessionError::MissingEntity(WELCOME_AREA.to_string()))?;

        let name = player_key_name(player_name);
        let existing = match get_well_known_key(&session, &name)? {
            Some(key) => session.try_materialize_key(&key, None)?,
            None => None,
        };
        let player = match existing {
            Some(player) => player,
            None => {
                let player = create_person(&mut session, &area, player_name)?;
                set_well_known_key(&mut session, &name, &player)?;
                player
            }
        };
        session.save(None)?;
        session.reschedule()?;
        info!(%player, name = player_name, "ready");

        Ok(Self { domain, player })
    }

    pub fn player(&self) -> &EntityKey {
        &self.player
    }

    /// Run one command as the player. Changes are saved as the player, so only what they may
    /// write gets written.
    pub fn command(&self, line: &str) -> Result<Reply, SessionError> {
        let mut session = prepared(&self.domain)?;
        let reply = session.execute(&self.player, line)?;
        if !session.is_failed() {
            let as_player = acting_as(self.player.clone());
            let contexts: SecurityContextFn<'_> = &as_player;
            session.save(Some(contexts))?;
        }
        Ok(reply)
    }

    pub fn is_due(&self) -> bool {
        self.domain
            .scheduled()
            .is_some_and(|task| task.is_due(self.domain.now()))
    }

    pub fn service(&self) -> Result<ServiceOutcome, SessionError> {
        let mut session = prepared(&self.domain)?;
        let outcome = session.service()?;
        session.save(None)?;
        Ok(outcome)
    }

    /// After a failed session the pending wake may be gone, so work it out again.
    pub fn recover(&self) -> Result<(), SessionError> {
        let mut session = prepared(&self.domain)?;
        let next = session.reschedule()?;
        warn!(next = ?next.as_ref().map(|t| t.when()), "rescheduled after failure");
        Ok(())
    }

    /// How long to wait for input before servicing. `None` when nothing is scheduled.
    pub fn next_wake(&self) -> Option<Duration> {
        self.domain
            .next_wake()
            .map(|wait| wait.to_std().unwrap_or_default())
    }
}

fn prepared(domain: &Domain) -> Result<Session, SessionError> {
    let mut session = domain.session();
    session.prepare(None)?;
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dimsum_db::FjallStorage;
    use dimsum_kernel::config::Config;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn open(path: &std::path::Path) -> WorldHost {
        let (store, _) = FjallStorage::open(path).unwrap();
        let domain = Domain::builder(Arc::new(store))
            .config(Config::default())
            .bus(std::rc::Rc::new(ConsoleBus))
            .build();
        WorldHost::open(domain, "Jacob").unwrap()
    }

    #[test]
    fn test_player_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let player = {
            let host = open(dir.path());
            let reply = host.command("create lamp").unwrap();
            assert_eq!(reply, Reply::Success("You're holding a new lamp.".to_string()));
            host.player().clone()
        };

        let host = open(dir.path());
        assert_eq!(host.player(), &player);
        let Reply::Observation(observation) = host.command("look").unwrap() else {
            panic!("expected an observation");
        };
        assert!(observation.area.starts_with("Welcome Area"));
        assert_eq!(observation.holding.len(), 1);
        assert!(observation.holding[0].starts_with("lamp"));
    }

    #[test]
    fn test_nothing_scheduled_in_a_new_world() {
        let dir = tempfile::tempdir().unwrap();
        let host = open(dir.path());
        assert!(!host.is_due());
        assert_eq!(host.next_wake(), None);
        let outcome = host.service().unwrap();
        assert!(outcome.crons.is_empty());
        assert!(outcome.delivered.is_empty());
    }
}
