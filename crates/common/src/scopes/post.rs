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

use crate::model::{Acls, EntityKey, Scope};
use serde::{Deserialize, Serialize};

/// A message waiting for its delivery time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedMessage {
    /// Milliseconds since the epoch.
    pub when: i64,
    pub entity_key: EntityKey,
    /// Serialized event.
    pub message: String,
}

/// Time-ordered delivery queue, kept on the post office entity. Anyone may post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub acls: Acls,
    #[serde(default)]
    pub queue: Vec<QueuedMessage>,
}

impl Default for Post {
    fn default() -> Self {
        Self {
            acls: Acls::everybody_writes(),
            queue: vec![],
        }
    }
}

impl Post {
    /// Messages due at the same time keep their enqueue order. An exact duplicate of a queued
    /// message is ignored. Returns whether the message was queued.
    pub fn enqueue(&mut self, message: QueuedMessage) -> bool {
        if self.queue.contains(&message) {
            return false;
        }
        let at = self.queue.partition_point(|m| m.when <= message.when);
        self.queue.insert(at, message);
        true
    }

    /// Remove and return everything due at or before `now`.
    pub fn dequeue(&mut self, now: i64) -> Vec<QueuedMessage> {
        let due = self.queue.partition_point(|m| m.when <= now);
        self.queue.drain(..due).collect()
    }

    pub fn peek(&self) -> Option<&QueuedMessage> {
        self.queue.first()
    }
}

impl Scope for Post {
    const NAME: &'static str = "post";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(when: i64, body: &str) -> QueuedMessage {
        QueuedMessage {
            when,
            entity_key: "x".into(),
            message: body.to_string(),
        }
    }

    #[test]
    fn test_ordered_by_time() {
        let mut post = Post::default();
        post.enqueue(message(30, "c"));
        post.enqueue(message(10, "a"));
        post.enqueue(message(20, "b"));
        post.enqueue(message(10, "a2"));
        let bodies: Vec<&str> = post.queue.iter().map(|m| m.message.as_str()).collect();
        assert_eq!(bodies, vec!["a", "a2", "b", "c"]);
    }

    #[test]
    fn test_duplicates_skipped() {
        let mut post = Post::default();
        assert!(post.enqueue(message(10, "a")));
        assert!(!post.enqueue(message(10, "a")));
        assert!(post.enqueue(message(11, "a")));
        assert_eq!(post.queue.len(), 2);
    }

    #[test]
    fn test_dequeue_due() {
        let mut post = Post::default();
        post.enqueue(message(10, "a"));
        post.enqueue(message(20, "b"));
        assert!(post.dequeue(5).is_empty());
        assert_eq!(post.dequeue(10).len(), 1);
        assert_eq!(post.peek().unwrap().message, "b");
        assert_eq!(post.dequeue(100).len(), 1);
        assert!(post.queue.is_empty());
    }
}
