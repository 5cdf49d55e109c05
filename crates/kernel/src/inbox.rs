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

//! The post office: a single well-known entity whose `post` scope queues events for delivery at
//! a later time.

use crate::bus::Event;
use crate::errors::SessionError;
use crate::scheduling::FutureTask;
use crate::session::Session;
use crate::well_known::materialize_well_known_entity;
use chrono::{DateTime, Utc};
use dimsum_common::model::{Entity, EntityBuilder, EntityClass, EntityKey, ModelError};
use dimsum_common::scopes::well_known::POST_SERVICE;
use dimsum_common::scopes::{Post, QueuedMessage};
use tracing::{debug, warn};

/// A queued event whose time has come.
#[derive(Debug, Clone, PartialEq)]
pub struct Dequeued {
    pub entity_key: EntityKey,
    pub when: DateTime<Utc>,
    pub event: Event,
}

pub struct PostService<'s> {
    session: &'s mut Session,
    key: EntityKey,
}

fn create_post_office(world: &Entity) -> Result<Entity, ModelError> {
    EntityBuilder::new(EntityClass::Service, "Post Office")
        .creator(world)
        .with_scope(Post::default())
        .build()
}

impl<'s> PostService<'s> {
    /// The post office, created if the world has none yet.
    pub fn open(session: &'s mut Session) -> Result<Self, SessionError> {
        let key = materialize_well_known_entity(session, POST_SERVICE, Some(&create_post_office))?
            .ok_or_else(|| SessionError::MissingEntity(POST_SERVICE.to_string()))?;
        Ok(Self { session, key })
    }

    /// The post office, if the world has one.
    pub fn existing(session: &'s mut Session) -> Result<Option<Self>, SessionError> {
        let key = materialize_well_known_entity(session, POST_SERVICE, None)?;
        Ok(key.map(|key| Self { session, key }))
    }

    fn office(&mut self) -> Result<&mut Entity, SessionError> {
        self.session
            .find_mut(&self.key)
            .ok_or_else(|| SessionError::MissingEntity(self.key.to_string()))
    }

    /// Queue `event` for `receiver` at `when`. Returns false if that exact delivery was already
    /// queued.
    pub fn future(
        &mut self,
        receiver: &EntityKey,
        when: DateTime<Utc>,
        event: &Event,
    ) -> Result<bool, SessionError> {
        let office = self.office()?;
        let message = serde_json::to_string(event).map_err(|e| ModelError::Serialization {
            key: office.key.clone(),
            message: e.to_string(),
        })?;
        let queued = office.make::<Post>()?.enqueue(QueuedMessage {
            when: when.timestamp_millis(),
            entity_key: receiver.clone(),
            message,
        });
        debug!(receiver = %receiver, %when, name = %event.name, queued, "posted");
        Ok(queued)
    }

    /// Remove everything due at or before `now`. Messages that no longer decode are dropped with
    /// a warning.
    pub fn service(&mut self, now: DateTime<Utc>) -> Result<Vec<Dequeued>, SessionError> {
        let office = self.office()?;
        let due = office.make::<Post>()?.dequeue(now.timestamp_millis());
        Ok(due
            .into_iter()
            .filter_map(|queued| {
                match serde_json::from_str::<Event>(&queued.message) {
                    Ok(event) => Some(Dequeued {
                        entity_key: queued.entity_key,
                        when: DateTime::from_timestamp_millis(queued.when).unwrap_or(now),
                        event,
                    }),
                    Err(e) => {
                        warn!(receiver = %queued.entity_key, "dropping undecodable message: {e}");
                        None
                    }
                }
            })
            .collect())
    }

    /// The next delivery, if any.
    pub fn peek(&mut self) -> Result<Option<FutureTask>, SessionError> {
        let office = self.office()?;
        let post = office.scope::<Post>()?;
        Ok(post.peek().map(|head| FutureTask::Queued {
            when: DateTime::from_timestamp_millis(head.when).unwrap_or_default(),
            entity_key: head.entity_key.clone(),
            message: head.message.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestWorld;
    use chrono::TimeDelta;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_deliver_when_due() {
        let tw = TestWorld::new();
        let mut session = tw.prepared().unwrap();
        let now = tw.now();
        let event = Event::new("ding", json!({"n": 1}));
        let receiver = EntityKey::from("bell");

        let mut post = PostService::open(&mut session).unwrap();
        assert!(post.future(&receiver, now + TimeDelta::seconds(5), &event).unwrap());
        assert!(!post.future(&receiver, now + TimeDelta::seconds(5), &event).unwrap());
        assert_eq!(
            post.peek().unwrap().map(|t| t.when()),
            Some(now + TimeDelta::seconds(5))
        );

        assert_eq!(post.service(now + TimeDelta::seconds(4)).unwrap(), vec![]);
        let delivered = post.service(now + TimeDelta::seconds(6)).unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].entity_key, receiver);
        assert_eq!(delivered[0].event, event);
        assert_eq!(post.peek().unwrap(), None);
    }

    #[test]
    fn test_existing_does_not_create() {
        let tw = TestWorld::new();
        let mut session = tw.prepared().unwrap();
        assert!(PostService::existing(&mut session).unwrap().is_none());
        PostService::open(&mut session).unwrap();
        assert!(PostService::existing(&mut session).unwrap().is_some());
    }
}
