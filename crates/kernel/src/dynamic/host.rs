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

use crate::bus::Event;
use dimsum_common::model::{Entity, EntityKey};
use rhai::{Dynamic, Engine, EvalAltResult};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Something a handler asked for, applied by the session after the call returns.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Set {
        key: EntityKey,
        name: String,
        value: Value,
    },
    Say {
        key: EntityKey,
        message: String,
    },
    Post {
        receiver: EntityKey,
        delay_ms: i64,
        event: Event,
    },
}

#[derive(Debug)]
struct HostState {
    key: EntityKey,
    name: String,
    props: BTreeMap<String, Value>,
    logs: Vec<String>,
    effects: Vec<Effect>,
}

/// The `ctx` handed to every handler. Reads come from a snapshot of the entity taken before the
/// call, writes are buffered as effects.
#[derive(Debug, Clone)]
pub struct Host(Rc<RefCell<HostState>>);

impl Host {
    pub fn new(entity: &Entity) -> Self {
        let props = entity
            .props
            .map
            .iter()
            .map(|(k, p)| (k.clone(), p.value.clone()))
            .collect();
        Self(Rc::new(RefCell::new(HostState {
            key: entity.key.clone(),
            name: entity.name().to_string(),
            props,
            logs: vec![],
            effects: vec![],
        })))
    }

    /// Captured log lines and effects, leaving the host empty.
    pub fn finish(&self) -> (Vec<String>, Vec<Effect>) {
        let mut state = self.0.borrow_mut();
        (
            std::mem::take(&mut state.logs),
            std::mem::take(&mut state.effects),
        )
    }

    fn log(&mut self, message: &str) {
        self.0.borrow_mut().logs.push(message.to_string());
    }

    fn say(&mut self, message: &str) {
        let mut state = self.0.borrow_mut();
        let key = state.key.clone();
        state.effects.push(Effect::Say {
            key,
            message: message.to_string(),
        });
    }

    fn get(&mut self, name: &str) -> Result<Dynamic, Box<EvalAltResult>> {
        match self.0.borrow().props.get(name) {
            Some(value) => rhai::serde::to_dynamic(value),
            None => Ok(Dynamic::UNIT),
        }
    }

    fn set(&mut self, name: &str, value: Dynamic) -> Result<(), Box<EvalAltResult>> {
        let value: Value = rhai::serde::from_dynamic(&value)?;
        let mut state = self.0.borrow_mut();
        state.props.insert(name.to_string(), value.clone());
        let key = state.key.clone();
        state.effects.push(Effect::Set {
            key,
            name: name.to_string(),
            value,
        });
        Ok(())
    }

    fn post(
        &mut self,
        seconds: i64,
        name: &str,
        payload: Dynamic,
    ) -> Result<(), Box<EvalAltResult>> {
        let receiver = self.0.borrow().key.clone();
        self.post_to(receiver.as_str(), seconds, name, payload)
    }

    fn post_to(
        &mut self,
        receiver: &str,
        seconds: i64,
        name: &str,
        payload: Dynamic,
    ) -> Result<(), Box<EvalAltResult>> {
        if seconds < 0 {
            return Err(format!("cannot post {name} into the past").into());
        }
        let payload: Value = rhai::serde::from_dynamic(&payload)?;
        let mut state = self.0.borrow_mut();
        let event = Event::new(name, payload).from(&state.key);
        state.effects.push(Effect::Post {
            receiver: receiver.into(),
            delay_ms: seconds.saturating_mul(1000),
            event,
        });
        Ok(())
    }

    fn get_key(&mut self) -> String {
        self.0.borrow().key.to_string()
    }

    fn get_name(&mut self) -> String {
        self.0.borrow().name.clone()
    }
}

pub(crate) fn register(engine: &mut Engine) {
    engine
        .register_type_with_name::<Host>("Ctx")
        .register_get("key", Host::get_key)
        .register_get("name", Host::get_name)
        .register_fn("log", Host::log)
        .register_fn("say", Host::say)
        .register_fn("get", Host::get)
        .register_fn("set", Host::set)
        .register_fn("post", Host::post)
        .register_fn("post_to", Host::post_to);
}
