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

//! Working out when the world next needs waking, from cron specs and queued messages.

use chrono::{DateTime, Utc};
use cron::Schedule;
use dimsum_common::model::EntityKey;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use tracing::{debug, warn};

/// One periodic trigger: an entity and the spec its behavior registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CronKey {
    pub entity_key: EntityKey,
    pub spec: String,
}

impl Display for CronKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@'{}'", self.entity_key, self.spec)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FutureTask {
    /// Every cron sharing the earliest upcoming instant.
    Cron {
        when: DateTime<Utc>,
        crons: Vec<CronKey>,
    },
    /// The head of the post office queue.
    Queued {
        when: DateTime<Utc>,
        entity_key: EntityKey,
        message: String,
    },
}

impl FutureTask {
    pub fn when(&self) -> DateTime<Utc> {
        match self {
            FutureTask::Cron { when, .. } | FutureTask::Queued { when, .. } => *when,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.when() <= now
    }

    /// Whichever of the two happens first. Crons win ties.
    pub fn earliest(a: Option<FutureTask>, b: Option<FutureTask>) -> Option<FutureTask> {
        match (a, b) {
            (Some(a), Some(b)) if b.when() < a.when() => Some(b),
            (Some(a), _) => Some(a),
            (None, b) => b,
        }
    }
}

/// Accepts both classic five field specs and the seconds-first form.
pub fn parse_schedule(spec: &str) -> Result<Schedule, cron::error::Error> {
    let spec = spec.trim();
    if spec.split_whitespace().count() == 5 {
        Schedule::from_str(&format!("0 {spec}"))
    } else {
        Schedule::from_str(spec)
    }
}

pub fn next_fire(spec: &str, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, cron::error::Error> {
    Ok(parse_schedule(spec)?.after(&after).next())
}

#[derive(Debug, Clone, Default)]
pub struct CronTab {
    crons: Vec<CronKey>,
}

impl CronTab {
    pub fn new(crons: Vec<CronKey>) -> Self {
        Self { crons }
    }

    /// The earliest next fire time after `now` with every cron that fires at that instant. Specs
    /// that fail to parse are skipped.
    pub fn get_future_task(&self, now: DateTime<Utc>) -> Option<FutureTask> {
        let mut earliest: Option<(DateTime<Utc>, Vec<CronKey>)> = None;
        for cron in &self.crons {
            let when = match next_fire(&cron.spec, now) {
                Ok(Some(when)) => when,
                Ok(None) => continue,
                Err(e) => {
                    warn!(%cron, "unparseable cron spec: {e}");
                    continue;
                }
            };
            match &mut earliest {
                Some((at, crons)) if when == *at => crons.push(cron.clone()),
                Some((at, _)) if when > *at => {}
                _ => earliest = Some((when, vec![cron.clone()])),
            }
            debug!(%cron, %when, "cron");
        }
        earliest.map(|(when, crons)| FutureTask::Cron { when, crons })
    }
}
