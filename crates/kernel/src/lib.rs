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

//! The execution core: sessions (units of work over the entity graph), materialization of
//! entities out of storage, scripted entity behavior, and time-based delivery.

pub use crate::actions::{Action, Observation, Reply};
pub use crate::bus::{CollectingBus, Event, EventBus, LoggingBus};
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::ctx::Ctx;
pub use crate::domain::{Domain, DomainBuilder};
pub use crate::errors::SessionError;
pub use crate::materialize::{
    Lookup, Materialized, MigrateFn, ReachFn, default_reach, infinite_reach,
};
pub use crate::session::{
    SaveOutcome, SecurityContextFn, ServiceOutcome, Session, SessionState, acting_as,
};

pub mod actions;
mod bus;
mod clock;
pub mod config;
mod ctx;
mod domain;
pub mod dynamic;
mod errors;
pub mod grammar;
pub mod inbox;
mod materialize;
pub mod scheduling;
mod session;
pub mod testing;
pub mod tools;
pub mod well_known;
pub mod world;
