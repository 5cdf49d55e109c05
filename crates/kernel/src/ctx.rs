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
use crate::tools::EntitySet;
use dimsum_common::model::EntityKey;
use std::collections::VecDeque;

/// Request-scoped state threaded through one command or one scheduler tick: who is acting, which
/// entities may react, and the events raised so far.
#[derive(Debug, Default)]
pub struct Ctx {
    pub person: Option<EntityKey>,
    pub entities: EntitySet,
    raised: VecDeque<Event>,
    said: Vec<Event>,
}

impl Ctx {
    pub fn new(person: Option<EntityKey>, entities: EntitySet) -> Self {
        Self {
            person,
            entities,
            raised: VecDeque::new(),
            said: vec![],
        }
    }

    /// Queue an event for publication and for delivery to the behaviors of this request.
    pub fn raise(&mut self, event: Event) {
        self.raised.push_back(event);
    }

    /// Queue an event for publication only. Behaviors never see these, so a handler that speaks
    /// cannot trigger itself.
    pub fn say(&mut self, event: Event) {
        self.said.push(event);
    }

    pub(crate) fn next_raised(&mut self) -> Option<Event> {
        self.raised.pop_front()
    }

    pub(crate) fn take_said(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.said)
    }

    pub fn pending(&self) -> usize {
        self.raised.len() + self.said.len()
    }
}
