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

//! Scripted entity behavior.
//!
//! An entity's `behaviors` scope may carry rhai source. Running the top level of that source
//! registers handlers through the `ds` object:
//!
//! ```text
//! fn poke(ctx, args) { ctx.say("ouch"); "you poke it" }
//! fn landed(ctx, ev) { ctx.set("landed", true); }
//! fn tick(ctx) { ctx.log("tick"); }
//!
//! ds.language("poke {item}", "poke", "held");
//! ds.received("dropped", "landed");
//! ds.cron("*/5 * * * *", "tick");
//! ds.hook("hold", "refuse");
//! ```
//!
//! Handlers see a snapshot of their entity through `ctx` and never touch session state directly.
//! What they ask for comes back as [`Effect`]s, which the session applies once the call returns.

mod behavior;
mod calls;
mod compiler;
mod host;

pub use behavior::{Behavior, DynamicAction};
pub use calls::DynamicCall;
pub use compiler::{CompiledBehavior, Compiler, Condition, Handlers, LanguageHandler};
pub use host::{Effect, Host};

use dimsum_common::model::EntityKey;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DynamicError {
    #[error("behavior of {key} failed to compile: {message}")]
    Compile { key: EntityKey, message: String },
    #[error("{key}.{handler} raised: {message}")]
    Call {
        key: EntityKey,
        handler: String,
        message: String,
    },
}

impl DynamicError {
    pub fn key(&self) -> &EntityKey {
        match self {
            DynamicError::Compile { key, .. } | DynamicError::Call { key, .. } => key,
        }
    }
}
