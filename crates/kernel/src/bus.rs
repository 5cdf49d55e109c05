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

use dimsum_common::model::EntityKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use tracing::info;

/// Something that happened, addressed by name. Scripts subscribe to events by name and receive
/// the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    #[serde(default)]
    pub source: Option<EntityKey>,
    #[serde(default)]
    pub payload: Value,
}

impl Event {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            source: None,
            payload,
        }
    }

    pub fn from(mut self, source: &EntityKey) -> Self {
        self.source = Some(source.clone());
        self
    }
}

/// Where completed requests publish their events. Subscribers live outside the kernel.
pub trait EventBus {
    fn publish(&self, event: &Event);
}

pub struct LoggingBus;

impl EventBus for LoggingBus {
    fn publish(&self, event: &Event) {
        info!(target: "dimsum::bus", name = %event.name, source = ?event.source, payload = %event.payload, "event");
    }
}

/// Keeps everything published, for hosts that drain events themselves and for tests.
#[derive(Default)]
pub struct CollectingBus {
    events: RefCell<Vec<Event>>,
}

impl CollectingBus {
    pub fn take(&self) -> Vec<Event> {
        self.events.take()
    }
}

impl EventBus for CollectingBus {
    fn publish(&self, event: &Event) {
        self.events.borrow_mut().push(event.clone());
    }
}
