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

use crate::actions::{Action, Reply};
use crate::bus::Event;
use crate::ctx::Ctx;
use crate::domain::Domain;
use crate::dynamic::{Behavior, DynamicCall, Effect};
use crate::errors::SessionError;
use crate::grammar;
use crate::inbox::{Dequeued, PostService};
use crate::materialize::{Lookup, Materialized, Materializer, ReachFn, default_reach};
use crate::scheduling::{CronKey, CronTab, FutureTask};
use crate::tools::{self, EntitySet, Relation};
use crate::well_known::{get_current_gid, get_well_known_key, set_current_gid};
use chrono::{DateTime, TimeDelta, Utc};
use dimsum_common::WORLD_KEY;
use dimsum_common::model::{
    DiffSecurityError, Entity, EntityBuilder, EntityClass, EntityKey, Modified, Permission,
    Registrar, SecurityContext, generate_security_check_from_json_diff, well_known_identity,
};
use dimsum_common::scopes::well_known::POST_SERVICE;
use dimsum_common::scopes::{BehaviorCollection, Behaviors, Ownership};
use indexmap::IndexMap;
use minstant::Instant;
use serde_json::json;
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unprepared,
    Prepared,
    Closed,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveOutcome {
    /// Keys sent to storage, deletions included.
    pub written: Vec<EntityKey>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceOutcome {
    pub crons: Vec<CronKey>,
    pub delivered: Vec<Dequeued>,
    pub next: Option<FutureTask>,
}

/// Produces the identity a save is checked as, for one entity being written.
pub type SecurityContextFn<'a> = &'a dyn Fn(&Entity) -> SecurityContext;

/// Security contexts for saves made on behalf of `actor`. `$owner` resolves to the entity's
/// owner (or, failing that, its creator) and `$creator` to its creator.
pub fn acting_as(actor: EntityKey) -> impl Fn(&Entity) -> SecurityContext {
    move |entity| {
        let creator = entity.creator.as_ref().map(|c| c.key.clone());
        let owner = entity
            .scope::<Ownership>()
            .ok()
            .and_then(|o| o.owner)
            .map(|o| o.key)
            .or_else(|| creator.clone());
        let mut context = SecurityContext::new(actor.to_string());
        if let Some(owner) = owner {
            context = context.with_mapping(well_known_identity::OWNER, owner.to_string());
        }
        if let Some(creator) = creator {
            context = context.with_mapping(well_known_identity::CREATOR, creator.to_string());
        }
        context
    }
}

/// A unit of work over the entity graph. Entities are loaded into the session's registrar as
/// needed, changed in memory, and written back together by [`Session::save`], which persists
/// only what actually changed and only if every change passes its ACLs.
///
/// A session that hits a fault it can't turn into a reply is marked failed and refuses to do
/// anything else. Discard it and open another.
pub struct Session {
    domain: Domain,
    registrar: Registrar,
    state: SessionState,
    failed: bool,
    world: Option<EntityKey>,
    opened: Instant,
}

impl Session {
    pub(crate) fn new(domain: Domain) -> Self {
        debug!("session opened");
        Self {
            domain,
            registrar: Registrar::new(),
            state: SessionState::Unprepared,
            failed: false,
            world: None,
            opened: Instant::now(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn registrar(&self) -> &Registrar {
        &self.registrar
    }

    fn ready(&self) -> Result<(), SessionError> {
        if self.failed {
            return Err(SessionError::Failed);
        }
        match self.state {
            SessionState::Unprepared => Err(SessionError::NotPrepared),
            SessionState::Closed => Err(SessionError::Closed),
            SessionState::Prepared => Ok(()),
        }
    }

    fn fail(&mut self, error: &SessionError) {
        if !self.failed {
            warn!(%error, "session failed");
        }
        self.failed = true;
    }

    /// Load the world, creating it if storage has none, and pick up the world's gid counter.
    pub fn prepare(&mut self, reach: Option<&ReachFn>) -> Result<EntityKey, SessionError> {
        if self.failed {
            return Err(SessionError::Failed);
        }
        match self.state {
            SessionState::Closed => return Err(SessionError::Closed),
            SessionState::Prepared => return self.world_key(),
            SessionState::Unprepared => {}
        }

        let key = EntityKey::from(WORLD_KEY);
        let found = self.load(&Lookup::Key(key.clone()), reach, false)?;
        if found.is_empty() {
            let world = EntityBuilder::new(EntityClass::World, "World")
                .key(key.clone())
                .build()?;
            self.registrar.register(world, None)?;
            info!(%key, "created world");
        }
        self.world = Some(key.clone());
        let number = get_current_gid(self)?;
        self.registrar.set_number(number);

        self.state = SessionState::Prepared;
        Ok(key)
    }

    fn load(
        &mut self,
        lookup: &Lookup,
        reach: Option<&ReachFn>,
        refresh: bool,
    ) -> Result<Materialized, SessionError> {
        let mut materializer = Materializer {
            registrar: &mut self.registrar,
            store: self.domain.store(),
            max_depth: self.domain.config().materialize.max_reach_depth,
            migrate: self.domain.migration(),
        };
        materializer.materialize(lookup, reach, refresh)
    }

    pub fn materialize(
        &mut self,
        lookup: &Lookup,
        reach: Option<&ReachFn>,
        refresh: bool,
    ) -> Result<Materialized, SessionError> {
        self.ready()?;
        self.load(lookup, reach, refresh)
    }

    /// The entity under `key`, loading it if needed. `None` when storage has no such entity.
    pub fn try_materialize_key(
        &mut self,
        key: &EntityKey,
        reach: Option<&ReachFn>,
    ) -> Result<Option<EntityKey>, SessionError> {
        Ok(self
            .load(&Lookup::from(key), reach, false)?
            .maybe_one()
            .cloned())
    }

    pub fn materialize_key(
        &mut self,
        key: &EntityKey,
        reach: Option<&ReachFn>,
    ) -> Result<EntityKey, SessionError> {
        let lookup = Lookup::from(key);
        Ok(self.load(&lookup, reach, false)?.one(&lookup)?.clone())
    }

    /// Load `key` along with its chain of parents, so inherited behavior can be found.
    fn materialize_lineage(&mut self, key: &EntityKey) -> Result<Option<EntityKey>, SessionError> {
        let Some(found) = self.try_materialize_key(key, None)? else {
            return Ok(None);
        };
        let mut seen = HashSet::from([found.clone()]);
        let mut next = self.get(&found)?.parent.as_ref().map(|p| p.key.clone());
        while let Some(parent) = next {
            if !seen.insert(parent.clone()) {
                break;
            }
            next = match self.try_materialize_key(&parent, None)? {
                Some(parent) => self.get(&parent)?.parent.as_ref().map(|p| p.key.clone()),
                None => {
                    warn!(key = %found, %parent, "parent missing");
                    None
                }
            };
        }
        Ok(Some(found))
    }

    pub fn register(&mut self, entity: Entity) -> Result<&mut Entity, SessionError> {
        Ok(self.registrar.register(entity, None)?)
    }

    pub fn unregister(&mut self, key: &EntityKey) -> Result<(), SessionError> {
        self.registrar
            .unregister(key)
            .ok_or_else(|| SessionError::MissingEntity(key.to_string()))
    }

    pub fn find(&self, key: &EntityKey) -> Option<&Entity> {
        self.registrar.find_by_key(key)
    }

    pub fn find_mut(&mut self, key: &EntityKey) -> Option<&mut Entity> {
        self.registrar.find_by_key_mut(key)
    }

    /// Like [`Session::find`], for entities that must already be loaded.
    pub fn get(&self, key: &EntityKey) -> Result<&Entity, SessionError> {
        self.find(key)
            .ok_or_else(|| SessionError::MissingEntity(key.to_string()))
    }

    pub fn get_mut(&mut self, key: &EntityKey) -> Result<&mut Entity, SessionError> {
        self.find_mut(key)
            .ok_or_else(|| SessionError::MissingEntity(key.to_string()))
    }

    pub fn world_key(&self) -> Result<EntityKey, SessionError> {
        self.world.clone().ok_or(SessionError::NotPrepared)
    }

    pub fn world(&self) -> Result<&Entity, SessionError> {
        self.get(&self.world_key()?)
    }

    pub fn world_mut(&mut self) -> Result<&mut Entity, SessionError> {
        let key = self.world_key()?;
        self.get_mut(&key)
    }

    /// Parse and perform `command` on behalf of `person`. Language handlers of nearby behaviors
    /// get the first look at the command, then the built-in verbs unless a behavior replaced
    /// them.
    pub fn execute(&mut self, person: &EntityKey, command: &str) -> Result<Reply, SessionError> {
        self.ready()?;
        let started = Instant::now();
        let (result, calls) = self.request(Some(person.clone()), |session, ctx, behavior| {
            session.gather(person, ctx)?;
            behavior.load(&session.registrar, &ctx.entities)?;
            let action = match behavior.evaluate(command) {
                Some(action) => Action::Dynamic(action),
                None if behavior.replaces_grammar() => Action::Unknown,
                None => grammar::evaluate(command).unwrap_or(Action::Unknown),
            };
            info!(%person, command, ?action, "execute");
            session.perform_with(&action, ctx, behavior)
        });
        let reply = self.reply(result, &calls);
        debug!(elapsed_us = started.elapsed().as_micros() as u64, "executed");
        reply
    }

    /// Perform an already resolved action on behalf of `person`.
    pub fn perform(&mut self, action: &Action, person: &EntityKey) -> Result<Reply, SessionError> {
        self.ready()?;
        let (result, calls) = self.request(Some(person.clone()), |session, ctx, behavior| {
            session.gather(person, ctx)?;
            behavior.load(&session.registrar, &ctx.entities)?;
            session.perform_with(action, ctx, behavior)
        });
        self.reply(result, &calls)
    }

    /// Command-triggered script faults become replies. Anything else propagates.
    fn reply(
        &mut self,
        result: Result<Reply, SessionError>,
        calls: &[DynamicCall],
    ) -> Result<Reply, SessionError> {
        match self.settle_calls(result, calls) {
            Err(SessionError::Dynamic(e)) => Ok(Reply::DynamicFailure {
                entity: e.key().clone(),
                message: e.to_string(),
            }),
            other => other,
        }
    }

    fn request<T>(
        &mut self,
        person: Option<EntityKey>,
        body: impl FnOnce(&mut Self, &mut Ctx, &mut Behavior) -> Result<T, SessionError>,
    ) -> (Result<T, SessionError>, Vec<DynamicCall>) {
        let mut behavior = Behavior::new(&self.domain);
        let mut ctx = Ctx::new(person, EntitySet::new());
        let result = body(self, &mut ctx, &mut behavior);
        (result, behavior.take_calls())
    }

    /// Load the person with their surroundings and work out whose behavior takes part.
    fn gather(&mut self, person: &EntityKey, ctx: &mut Ctx) -> Result<(), SessionError> {
        let world = self.world_key()?;
        self.materialize_key(person, Some(&default_reach))?;
        let entities = tools::get_contributing_entities(&self.registrar, &world, person);
        for key in entities.keys() {
            self.materialize_lineage(key)?;
        }
        debug!(%person, entities = entities.len(), "gathered");
        ctx.entities = entities;
        Ok(())
    }

    fn perform_with(
        &mut self,
        action: &Action,
        ctx: &mut Ctx,
        behavior: &mut Behavior,
    ) -> Result<Reply, SessionError> {
        let performed = action.perform(self, ctx, behavior).and_then(|reply| {
            self.complete(ctx, behavior)?;
            Ok(reply)
        });
        match performed {
            Err(SessionError::Frozen(key)) => {
                info!(%key, "refused, frozen");
                Ok(Reply::Failure("Whoa, that's frozen.".to_string()))
            }
            performed => performed,
        }
    }

    /// Publish everything raised during the request. Raised events also go to the request's
    /// behaviors, whose effects may raise more.
    pub(crate) fn complete(
        &mut self,
        ctx: &mut Ctx,
        behavior: &mut Behavior,
    ) -> Result<(), SessionError> {
        while let Some(event) = ctx.next_raised() {
            self.domain.bus().publish(&event);
            let effects = behavior.notify(&event, &self.registrar, &ctx.entities)?;
            self.apply(effects, ctx)?;
        }
        for event in ctx.take_said() {
            self.domain.bus().publish(&event);
        }
        Ok(())
    }

    pub(crate) fn apply(&mut self, effects: Vec<Effect>, ctx: &mut Ctx) -> Result<(), SessionError> {
        for effect in effects {
            match effect {
                Effect::Set { key, name, value } => {
                    let entity = self.get_mut(&key)?;
                    entity.try_modify()?;
                    if entity.props.get(&name) != Some(&value) {
                        entity.props.set(&name, value);
                        entity.touch();
                    }
                }
                Effect::Say { key, message } => {
                    ctx.say(Event::new("said", json!({ "message": message })).from(&key));
                }
                Effect::Post {
                    receiver,
                    delay_ms,
                    event,
                } => {
                    let when = self.domain.now() + TimeDelta::milliseconds(delay_ms);
                    PostService::open(self)?.future(&receiver, when, &event)?;
                }
            }
        }
        Ok(())
    }

    /// Log the calls of a finished request. On success they go into this session; on failure
    /// into a fresh one, since this one is about to be thrown away.
    fn settle_calls<T>(
        &mut self,
        result: Result<T, SessionError>,
        calls: &[DynamicCall],
    ) -> Result<T, SessionError> {
        match result {
            Ok(value) => {
                self.record_calls(calls)?;
                Ok(value)
            }
            Err(e) => {
                self.fail(&e);
                if !calls.is_empty() {
                    match Self::record_pristine(&self.domain, calls) {
                        Ok(saved) => info!(
                            calls = calls.len(),
                            written = saved.written.len(),
                            "logged calls of failed session"
                        ),
                        Err(logging) => error!(%logging, "unable to log calls of failed session"),
                    }
                }
                Err(e)
            }
        }
    }

    fn record_pristine(domain: &Domain, calls: &[DynamicCall]) -> Result<SaveOutcome, SessionError> {
        let mut pristine = domain.session();
        pristine.prepare(None)?;
        pristine.record_calls(calls)?;
        pristine.save(None)
    }

    /// Append each call to its entity's behavior log. A faulted call also disables the behavior.
    fn record_calls(&mut self, calls: &[DynamicCall]) -> Result<(), SessionError> {
        let config = self.domain.config().behavior.clone();
        for call in calls {
            if call.succeeded() && !config.log_successful_calls {
                continue;
            }
            let Some(key) = self.try_materialize_key(&call.entity_key, None)? else {
                warn!(key = %call.entity_key, "no entity to log call against");
                continue;
            };
            let entity = self.get_mut(&key)?;
            let mut behaviors = entity.make::<Behaviors>()?;
            let behavior = behaviors.default_behavior_mut();
            behavior.append_log(call.to_log(), config.max_call_logs);
            if !call.succeeded() {
                warn!(%key, name = %call.name, "disabling behavior");
                behavior.executable = false;
            }
        }
        Ok(())
    }

    /// Write every changed entity. With `contexts`, each change is first checked against the
    /// ACLs of the entity as it was loaded and one refusal fails the whole save. Without it the
    /// save is made as the system and nothing is checked.
    pub fn save(
        &mut self,
        contexts: Option<SecurityContextFn<'_>>,
    ) -> Result<SaveOutcome, SessionError> {
        self.ready()?;
        let number = self.registrar.number();
        set_current_gid(self, number)?;
        for entity in self.registrar.entities_mut().filter(|e| e.is_dirty()) {
            let described = entity.describe();
            if entity.props.described != described {
                entity.props.described = described;
            }
        }

        let modified = self
            .registrar
            .filter_modified(self.registrar.serialize_all()?);
        if modified.is_empty() {
            debug!("nothing to save");
            return Ok(SaveOutcome::default());
        }

        if let Some(contexts) = contexts {
            for change in modified.values() {
                if let Err(e) = self.verify(change, contexts) {
                    self.fail(&e);
                    return Err(e);
                }
            }
        }

        let updates: IndexMap<EntityKey, _> = modified
            .into_iter()
            .map(|(key, change)| (key, change.saving))
            .collect();
        let written: Vec<EntityKey> = updates.keys().cloned().collect();
        let rows = match self.domain.store().update(updates) {
            Ok(rows) => rows,
            Err(e) => {
                let e = SessionError::from(e);
                self.fail(&e);
                return Err(e);
            }
        };
        for (key, row) in rows {
            self.registrar.saved(&key, row);
        }
        self.registrar.settle();
        info!(written = written.len(), "saved");

        self.schedule_post()?;
        Ok(SaveOutcome { written })
    }

    fn verify(&self, change: &Modified, contexts: SecurityContextFn<'_>) -> Result<(), SessionError> {
        let (Some(original), Some(diff)) = (&change.original, &change.diff) else {
            return Ok(());
        };
        let entity = self
            .registrar
            .find_by_key(&change.key)
            .or_else(|| self.registrar.garbage().find(|e| e.key == change.key));
        let Some(entity) = entity else {
            return Ok(());
        };
        let context = contexts(entity);
        let check = generate_security_check_from_json_diff(&original.compiled, diff);
        debug!(
            target: "dimsum::security",
            key = %change.key,
            identity = %context.identity,
            acls = ?check.acl_paths(),
            "checking"
        );
        check.verify(Permission::Write, &context).map_err(|error| {
            warn!(target: "dimsum::security", key = %change.key, %error, "save refused");
            SessionError::Security(DiffSecurityError {
                key: change.key.clone(),
                diff: diff.clone(),
                error,
            })
        })
    }

    /// Make sure the domain wakes for the head of the post office queue.
    fn schedule_post(&mut self) -> Result<(), SessionError> {
        let Some(key) = get_well_known_key(self, POST_SERVICE)? else {
            return Ok(());
        };
        if !self.registrar.contains(&key) {
            return Ok(());
        }
        let next = match PostService::existing(self)? {
            Some(mut post) => post.peek()?,
            None => None,
        };
        self.domain.schedule(next);
        Ok(())
    }

    /// Deliver `event` to the behavior of one entity.
    pub fn notify(&mut self, key: &EntityKey, event: &Event) -> Result<(), SessionError> {
        self.ready()?;
        let (result, calls) = self.request(None, |session, ctx, behavior| {
            session.deliver(key, event, ctx, behavior)?;
            session.complete(ctx, behavior)
        });
        self.settle_calls(result, &calls)
    }

    /// Deliver `event` to every entity with a behavior. Entities that have gone missing are
    /// dropped from the world's index. Returns how many were notified.
    pub fn everywhere(&mut self, event: &Event) -> Result<usize, SessionError> {
        self.ready()?;
        let (result, calls) = self.request(None, |session, ctx, behavior| {
            let mut notified = 0;
            for key in session.behavior_keys()? {
                match session.deliver(&key, event, ctx, behavior) {
                    Err(SessionError::MissingEntity(missing)) => {
                        warn!(%key, missing, "forgetting behavior");
                        session.forget_behavior(&key)?;
                    }
                    delivered => {
                        delivered?;
                        notified += 1;
                    }
                }
            }
            session.complete(ctx, behavior)?;
            Ok(notified)
        });
        self.settle_calls(result, &calls)
    }

    fn deliver(
        &mut self,
        key: &EntityKey,
        event: &Event,
        ctx: &mut Ctx,
        behavior: &mut Behavior,
    ) -> Result<(), SessionError> {
        let found = self
            .materialize_lineage(key)?
            .ok_or_else(|| SessionError::MissingEntity(key.to_string()))?;
        ctx.entities.add(Relation::Other, &found);
        behavior.load(&self.registrar, &ctx.entities)?;
        let mut target = EntitySet::new();
        target.add(Relation::Other, &found);
        self.domain.bus().publish(event);
        let effects = behavior.notify(event, &self.registrar, &target)?;
        self.apply(effects, ctx)
    }

    fn fire_cron(
        &mut self,
        cron: &CronKey,
        ctx: &mut Ctx,
        behavior: &mut Behavior,
    ) -> Result<(), SessionError> {
        let found = self
            .materialize_lineage(&cron.entity_key)?
            .ok_or_else(|| SessionError::MissingEntity(cron.entity_key.to_string()))?;
        ctx.entities.add(Relation::Other, &found);
        behavior.load(&self.registrar, &ctx.entities)?;
        info!(%cron, "firing");
        let effects = behavior.fire_cron(cron, &self.registrar)?;
        self.apply(effects, ctx)
    }

    /// Fire the crons of the domain's pending task if it's due, deliver everything due in the
    /// post office, then work out and schedule what comes next. Missing targets are skipped. A
    /// script fault fails the session after its calls are logged elsewhere.
    pub fn service(&mut self) -> Result<ServiceOutcome, SessionError> {
        self.ready()?;
        let now = self.domain.now();
        let due = self.domain.take_due(now);
        let (result, calls) = self.request(None, |session, ctx, behavior| {
            let mut outcome = ServiceOutcome::default();
            if let Some(FutureTask::Cron { crons, .. }) = &due {
                for cron in crons {
                    match session.fire_cron(cron, ctx, behavior) {
                        Err(SessionError::MissingEntity(missing)) => {
                            warn!(%cron, missing, "skipping cron");
                            continue;
                        }
                        fired => fired?,
                    }
                    outcome.crons.push(cron.clone());
                }
            }

            let delivered = match PostService::existing(session)? {
                Some(mut post) => post.service(now)?,
                None => vec![],
            };
            for message in delivered {
                match session.deliver(&message.entity_key, &message.event, ctx, behavior) {
                    Err(SessionError::MissingEntity(missing)) => {
                        warn!(receiver = %message.entity_key, missing, "undeliverable");
                        continue;
                    }
                    delivered => delivered?,
                }
                outcome.delivered.push(message);
            }

            session.complete(ctx, behavior)?;
            outcome.next = session.next_task(now)?;
            Ok(outcome)
        });
        let outcome = self.settle_calls(result, &calls)?;
        self.domain.schedule(outcome.next.clone());
        info!(
            crons = outcome.crons.len(),
            delivered = outcome.delivered.len(),
            next = ?outcome.next.as_ref().map(FutureTask::when),
            "serviced"
        );
        Ok(outcome)
    }

    /// Compute the next task from scratch and offer it to the domain.
    pub fn reschedule(&mut self) -> Result<Option<FutureTask>, SessionError> {
        self.ready()?;
        let next = self.next_task(self.domain.now())?;
        self.domain.schedule(next.clone());
        Ok(next)
    }

    fn next_task(&mut self, now: DateTime<Utc>) -> Result<Option<FutureTask>, SessionError> {
        let mut crons = vec![];
        for key in self.behavior_keys()? {
            let Some(found) = self.materialize_lineage(&key)? else {
                warn!(%key, "forgetting behavior");
                self.forget_behavior(&key)?;
                continue;
            };
            let mut set = EntitySet::new();
            set.add(Relation::Other, &found);
            let mut behavior = Behavior::new(&self.domain);
            match behavior.load(&self.registrar, &set) {
                Ok(()) => crons.extend(behavior.crons()),
                Err(e) => warn!(%key, "ignoring crons of faulted behavior: {e}"),
            }
        }
        let crons = CronTab::new(crons).get_future_task(now);
        let queued = match PostService::existing(self)? {
            Some(mut post) => post.peek()?,
            None => None,
        };
        Ok(FutureTask::earliest(crons, queued))
    }

    fn behavior_keys(&self) -> Result<Vec<EntityKey>, SessionError> {
        Ok(self
            .world()?
            .scope::<BehaviorCollection>()?
            .entities
            .into_iter()
            .collect())
    }

    fn forget_behavior(&mut self, key: &EntityKey) -> Result<(), SessionError> {
        self.world_mut()?
            .make::<BehaviorCollection>()?
            .entities
            .remove(key);
        Ok(())
    }

    /// Give `key` a script, replacing any it had, and list it among the world's behaviors.
    pub fn set_behavior(&mut self, key: &EntityKey, source: &str) -> Result<(), SessionError> {
        self.ready()?;
        let entity = self.get_mut(key)?;
        entity.try_modify()?;
        {
            let mut behaviors = entity.make::<Behaviors>()?;
            let behavior = behaviors.default_behavior_mut();
            behavior.source = Some(source.to_string());
            behavior.executable = true;
        }
        self.world_mut()?
            .make::<BehaviorCollection>()?
            .entities
            .insert(key.clone());
        info!(%key, "behavior set");
        Ok(())
    }

    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.registrar.log_summary();
        info!(
            elapsed_us = self.opened.elapsed().as_micros() as u64,
            failed = self.failed,
            "session closed"
        );
        self.state = SessionState::Closed;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestWorld;
    use dimsum_db::EntityStorage;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_prepare_creates_then_reloads_world() {
        let tw = TestWorld::new();
        let world = EntityKey::from(WORLD_KEY);

        let mut session = tw.domain.session();
        assert_eq!(session.prepare(None).unwrap(), world);
        assert_eq!(session.world().unwrap().key, world);
        assert_eq!(session.prepare(None).unwrap(), world);
        session.save(None).unwrap();
        drop(session);
        assert_eq!(tw.store.load_by_key(&world).unwrap().len(), 1);

        let built = tw.build().unwrap();
        let mut session = tw.domain.session();
        assert_eq!(session.prepare(None).unwrap(), world);
        let stored = get_current_gid(&session).unwrap();
        assert!(stored > 0);
        assert_eq!(session.registrar().number(), stored);

        session.materialize_key(&built.person, None).unwrap();
        let gid = session.get(&built.person).unwrap().gid();
        assert!(gid.is_some_and(|gid| gid < stored));
    }
}
