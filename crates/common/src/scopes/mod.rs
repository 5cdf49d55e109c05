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

//! The built-in scopes the kernel knows how to interpret.

mod apparel;
mod behavior;
mod carryable;
mod occupyable;
mod ownership;
mod post;
mod world;

pub use apparel::{Apparel, Wearable};
pub use behavior::{Behavior, BehaviorCollection, BehaviorLog, Behaviors, DEFAULT_BEHAVIOR};
pub use carryable::{Carryable, Containing, Location};
pub use occupyable::{Occupyable, Occupying};
pub use ownership::Ownership;
pub use post::{Post, QueuedMessage};
pub use world::{Identifiers, WellKnown, well_known};
