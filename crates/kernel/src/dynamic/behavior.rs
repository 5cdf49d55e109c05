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

use crate::actions::Reply;
use crate::bus::Event;
use crate::domain::Domain;
use crate::dynamic::calls::DynamicCall;
use crate::dynamic::compiler::{CompiledBehavior, Condition};
use crate::dynamic::host::{Effect, Host};
use crate::dynamic::DynamicError;
use crate::scheduling::CronKey;
use crate::tools::{self, EntitySet, Relation};
use dimsum_common::model::{Entity, EntityKey, Registrar};
use dimsum_common::scopes::{Behaviors, DEFAULT_BEHAVIOR};
use minstant::Instant;
use rhai::{Dynamic, Map};
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;
use tracing::{debug, info, warn};

/// A command matched by a behavior's language handler.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicAction {
    /// Entity the handler runs as.
    pub this: EntityKey,
    /// Entity whose script defines the handler; differs from `this` when inherited.
    pub owner: EntityKey,
    pub handler: String,
    pub args: BTreeMap<String, String>,
}

struct Contributor {
    relation: Relation,
    this: EntityKey,
    compiled: Rc<CompiledBehavior>,
}

/// Execution context for all scripted behavior run during one command or notification. Every
/// call made through it is recorded, so the batch can be logged whether the request succeeds or
/// not.
pub struct Behavior {
    domain: Domain,
    contributors: Vec<Contributor>,
    calls: Vec<DynamicCall>,
}

impl Behavior {
    pub fn new(domain: &Domain) -> Self {
        Self {
            domain: domain.clone(),
            contributors: vec![],
            calls: vec![],
        }
    }

    /// Compile the behavior of every entity in `entities` that has one. The first compile fault
    /// is recorded against the script's entity and returned.
    pub fn load(&mut self, registrar: &Registrar, entities: &EntitySet) -> Result<(), DynamicError> {
        for (key, relation) in entities.iter() {
            if self.contributors.iter().any(|c| c.this == *key) {
                continue;
            }
            let Some((owner, source)) = find_source(registrar, key) else {
                continue;
            };
            let time = self.domain.now().timestamp_millis();
            let started = Instant::now();
            match self.domain.compiler().compile(&owner, &source) {
                Ok(compiled) => self.contributors.push(Contributor {
                    relation,
                    this: key.clone(),
                    compiled,
                }),
                Err(e) => {
                    self.record(DynamicCall {
                        entity_key: owner,
                        behavior_key: DEFAULT_BEHAVIOR.to_string(),
                        name: "compile".to_string(),
                        time,
                        elapsed_us: elapsed_us(started),
                        logs: vec![],
                        exception: Some(e.to_string()),
                    });
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    pub fn replaces_grammar(&self) -> bool {
        self.contributors
            .iter()
            .any(|c| c.compiled.handlers.replace_grammar)
    }

    /// The first language handler that applies to its entity's relation and matches `command`.
    pub fn evaluate(&self, command: &str) -> Option<DynamicAction> {
        for contributor in &self.contributors {
            for language in &contributor.compiled.handlers.language {
                let applies = match language.condition {
                    Condition::Always => true,
                    Condition::Held => contributor.relation == Relation::Held,
                    Condition::Ground => contributor.relation == Relation::Ground,
                    Condition::Worn => contributor.relation == Relation::Wearing,
                };
                if !applies {
                    continue;
                }
                if let Some(args) = language.prose.matches(command) {
                    debug!(this = %contributor.this, prose = %language.prose, "matched");
                    return Some(DynamicAction {
                        this: contributor.this.clone(),
                        owner: contributor.compiled.key.clone(),
                        handler: language.handler.clone(),
                        args,
                    });
                }
            }
        }
        None
    }

    /// Run a matched language handler. Slots named `item` resolve against what the person holds
    /// and what lies nearby, `held` against held items only. Unresolved items arrive as `()`.
    pub fn perform(
        &mut self,
        action: &DynamicAction,
        registrar: &Registrar,
        entities: &EntitySet,
    ) -> Result<(Reply, Vec<Effect>), DynamicError> {
        let unavailable = |message: &str| DynamicError::Call {
            key: action.owner.clone(),
            handler: action.handler.clone(),
            message: message.to_string(),
        };
        let compiled = self
            .contributors
            .iter()
            .find(|c| c.this == action.this && c.compiled.key == action.owner)
            .map(|c| c.compiled.clone())
            .ok_or_else(|| unavailable("behavior no longer loaded"))?;
        let this = registrar
            .find_by_key(&action.this)
            .ok_or_else(|| unavailable("entity no longer loaded"))?;

        let mut args = Map::new();
        for (slot, text) in &action.args {
            let value = match slot.as_str() {
                "item" => {
                    let nearby = entities
                        .with(Relation::Held)
                        .chain(entities.with(Relation::Wearing))
                        .chain(entities.with(Relation::Ground));
                    found(tools::find(registrar, nearby, text))
                }
                "held" => found(tools::find(registrar, entities.with(Relation::Held), text)),
                "worn" => found(tools::find(registrar, entities.with(Relation::Wearing), text)),
                _ => text.as_str().into(),
            };
            args.insert(slot.as_str().into(), value);
        }

        let (value, effects) =
            self.invoke(&compiled, this, &action.handler, vec![Dynamic::from_map(args)])?;
        Ok((reply_from(value), effects))
    }

    /// Deliver `event` to the behaviors of `targets` that registered for it.
    pub fn notify(
        &mut self,
        event: &Event,
        registrar: &Registrar,
        targets: &EntitySet,
    ) -> Result<Vec<Effect>, DynamicError> {
        let mut effects = vec![];
        for (compiled, this, handler) in self.matching(|h| &h.received, &event.name) {
            if targets.relation(&this).is_none() {
                continue;
            }
            let Some(entity) = registrar.find_by_key(&this) else {
                warn!(key = %this, "notify target no longer loaded");
                continue;
            };
            let ev = event_to_dynamic(event).map_err(|message| DynamicError::Call {
                key: compiled.key.clone(),
                handler: handler.clone(),
                message,
            })?;
            let (_, mut produced) = self.invoke(&compiled, entity, &handler, vec![ev])?;
            effects.append(&mut produced);
        }
        Ok(effects)
    }

    /// Run hooks registered under `name`. The first hook to return a string vetoes the
    /// operation, and that string is the reason.
    pub fn hook(
        &mut self,
        name: &str,
        registrar: &Registrar,
        subject: &Entity,
    ) -> Result<(Option<String>, Vec<Effect>), DynamicError> {
        let mut effects = vec![];
        for (compiled, this, handler) in self.matching(|h| &h.hooks, name) {
            let Some(entity) = registrar.find_by_key(&this) else {
                continue;
            };
            let (value, mut produced) =
                self.invoke(&compiled, entity, &handler, vec![describe(subject)])?;
            effects.append(&mut produced);
            if value.is_string() {
                let reason = value.into_string().unwrap_or_default();
                info!(hook = name, this = %this, reason, "vetoed");
                return Ok((Some(reason), effects));
            }
        }
        Ok((None, effects))
    }

    /// Every cron registered by a loaded behavior.
    pub fn crons(&self) -> Vec<CronKey> {
        self.contributors
            .iter()
            .flat_map(|c| {
                c.compiled.handlers.crons.iter().map(|(spec, _)| CronKey {
                    entity_key: c.this.clone(),
                    spec: spec.clone(),
                })
            })
            .collect()
    }

    pub fn fire_cron(
        &mut self,
        cron: &CronKey,
        registrar: &Registrar,
    ) -> Result<Vec<Effect>, DynamicError> {
        let Some(entity) = registrar.find_by_key(&cron.entity_key) else {
            warn!(%cron, "cron target no longer loaded");
            return Ok(vec![]);
        };
        let mut effects = vec![];
        for (compiled, this, handler) in self.matching(|h| &h.crons, &cron.spec) {
            if this != cron.entity_key {
                continue;
            }
            let (_, mut produced) = self.invoke(&compiled, entity, &handler, vec![])?;
            effects.append(&mut produced);
        }
        Ok(effects)
    }

    /// Calls made so far, leaving none behind.
    pub fn take_calls(&mut self) -> Vec<DynamicCall> {
        std::mem::take(&mut self.calls)
    }

    /// (compiled, this, handler) for every registration in the selected list named `name`.
    fn matching(
        &self,
        select: impl Fn(&crate::dynamic::Handlers) -> &Vec<(String, String)>,
        name: &str,
    ) -> Vec<(Rc<CompiledBehavior>, EntityKey, String)> {
        self.contributors
            .iter()
            .flat_map(|c| {
                select(&c.compiled.handlers)
                    .iter()
                    .filter(|(registered, _)| registered == name)
                    .map(|(_, handler)| (c.compiled.clone(), c.this.clone(), handler.clone()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn invoke(
        &mut self,
        compiled: &CompiledBehavior,
        this: &Entity,
        handler: &str,
        args: Vec<Dynamic>,
    ) -> Result<(Dynamic, Vec<Effect>), DynamicError> {
        let host = Host::new(this);
        let mut all = Vec::with_capacity(args.len() + 1);
        all.push(Dynamic::from(host.clone()));
        all.extend(args);

        let time = self.domain.now().timestamp_millis();
        let started = Instant::now();
        let result = self.domain.compiler().call(compiled, handler, all);
        let elapsed_us = elapsed_us(started);
        let (logs, effects) = host.finish();

        let name = if compiled.key == this.key {
            handler.to_string()
        } else {
            format!("{handler} as {}", this.key)
        };
        self.record(DynamicCall {
            entity_key: compiled.key.clone(),
            behavior_key: DEFAULT_BEHAVIOR.to_string(),
            name,
            time,
            elapsed_us,
            logs,
            exception: result.as_ref().err().map(|e| e.to_string()),
        });

        match result {
            Ok(value) => Ok((value, effects)),
            Err(e) => Err(DynamicError::Call {
                key: compiled.key.clone(),
                handler: handler.to_string(),
                message: e.to_string(),
            }),
        }
    }

    fn record(&mut self, call: DynamicCall) {
        info!(
            target: "dimsum::dynamic::calls",
            key = %call.entity_key,
            name = %call.name,
            elapsed_us = call.elapsed_us,
            logs = call.logs.len(),
            exception = ?call.exception,
            "call"
        );
        self.calls.push(call);
    }
}

/// The script that governs `key`: its own, or else the nearest ancestor's. A behavior marked
/// not executable stops the search, so a faulted script is never picked up again.
fn find_source(registrar: &Registrar, key: &EntityKey) -> Option<(EntityKey, String)> {
    let mut current = registrar.find_by_key(key)?;
    let mut seen = HashSet::new();
    loop {
        if !seen.insert(current.key.clone()) {
            warn!(key = %key, "cycle in parent chain");
            return None;
        }
        let behaviors = match current.scope::<Behaviors>() {
            Ok(behaviors) => behaviors,
            Err(e) => {
                warn!(key = %current.key, "unreadable behaviors: {e}");
                return None;
            }
        };
        if let Some(behavior) = behaviors.default_behavior() {
            if !behavior.executable {
                debug!(key = %current.key, "behavior disabled");
                return None;
            }
            if let Some(source) = behavior.source.as_ref().filter(|s| !s.trim().is_empty()) {
                return Some((current.key.clone(), source.clone()));
            }
        }
        let parent = current.parent.as_ref()?;
        current = match registrar.find_by_key(&parent.key) {
            Some(parent) => parent,
            None => {
                debug!(key = %current.key, parent = %parent.key, "parent not loaded");
                return None;
            }
        };
    }
}

fn elapsed_us(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX)
}

fn describe(entity: &Entity) -> Dynamic {
    let mut map = Map::new();
    map.insert("key".into(), entity.key.to_string().into());
    map.insert("name".into(), entity.name().into());
    map.insert(
        "gid".into(),
        entity
            .gid()
            .and_then(|g| i64::try_from(g).ok())
            .map(Dynamic::from)
            .unwrap_or(Dynamic::UNIT),
    );
    Dynamic::from_map(map)
}

fn found(entity: Option<&Entity>) -> Dynamic {
    entity.map(describe).unwrap_or(Dynamic::UNIT)
}

fn event_to_dynamic(event: &Event) -> Result<Dynamic, String> {
    let mut map = Map::new();
    map.insert("name".into(), event.name.as_str().into());
    map.insert(
        "source".into(),
        event
            .source
            .as_ref()
            .map(|k| Dynamic::from(k.to_string()))
            .unwrap_or(Dynamic::UNIT),
    );
    let payload = rhai::serde::to_dynamic(&event.payload).map_err(|e| e.to_string())?;
    map.insert("payload".into(), payload);
    Ok(Dynamic::from_map(map))
}

/// Strings are successes; `success(..)` and `failure(..)` maps say which explicitly.
fn reply_from(value: Dynamic) -> Reply {
    if value.is_unit() {
        return Reply::Success("done".to_string());
    }
    if value.is_string() {
        return Reply::Success(value.into_string().unwrap_or_default());
    }
    if let Some(map) = value.clone().try_cast::<Map>() {
        if let Some(message) = map.get("failure") {
            return Reply::Failure(message.to_string());
        }
        if let Some(message) = map.get("success") {
            return Reply::Success(message.to_string());
        }
    }
    Reply::Success(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Dynamic::UNIT => Reply::Success("done".to_string()); "unit")]
    #[test_case(Dynamic::from("hi") => Reply::Success("hi".to_string()); "string")]
    #[test_case(Dynamic::from(3_i64) => Reply::Success("3".to_string()); "number")]
    fn test_reply_from(value: Dynamic) -> Reply {
        reply_from(value)
    }

    #[test]
    fn test_reply_from_maps() {
        let mut failure = Map::new();
        failure.insert("failure".into(), "nope".into());
        assert_eq!(
            reply_from(Dynamic::from_map(failure)),
            Reply::Failure("nope".to_string())
        );
        let mut success = Map::new();
        success.insert("success".into(), "yes".into());
        assert_eq!(
            reply_from(Dynamic::from_map(success)),
            Reply::Success("yes".to_string())
        );
    }
}
