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

use crate::bus::{EventBus, LoggingBus};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::dynamic::Compiler;
use crate::materialize::MigrateFn;
use crate::scheduling::FutureTask;
use crate::session::Session;
use chrono::{DateTime, TimeDelta, Utc};
use dimsum_db::EntityStorage;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, info};

struct Inner {
    store: Arc<dyn EntityStorage>,
    config: Config,
    compiler: Compiler,
    clock: Rc<dyn Clock>,
    bus: Rc<dyn EventBus>,
    migrate: Option<Box<MigrateFn>>,
    scheduled: RefCell<Option<FutureTask>>,
}

/// Owns what outlives a session: storage, configuration, the compiled behavior cache and the
/// pending wake-up. Cheap to clone; clones share everything.
#[derive(Clone)]
pub struct Domain(Rc<Inner>);

pub struct DomainBuilder {
    store: Arc<dyn EntityStorage>,
    config: Config,
    clock: Rc<dyn Clock>,
    bus: Rc<dyn EventBus>,
    migrate: Option<Box<MigrateFn>>,
}

impl DomainBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn bus(mut self, bus: Rc<dyn EventBus>) -> Self {
        self.bus = bus;
        self
    }

    /// Rewrites stored entity JSON before it is decoded. Returns whether it changed anything.
    pub fn migrate(mut self, migrate: impl Fn(&mut serde_json::Value) -> bool + 'static) -> Self {
        self.migrate = Some(Box::new(migrate));
        self
    }

    pub fn build(self) -> Domain {
        let compiler = Compiler::new(&self.config.behavior);
        Domain(Rc::new(Inner {
            store: self.store,
            config: self.config,
            compiler,
            clock: self.clock,
            bus: self.bus,
            migrate: self.migrate,
            scheduled: RefCell::new(None),
        }))
    }
}

impl Domain {
    pub fn builder(store: Arc<dyn EntityStorage>) -> DomainBuilder {
        DomainBuilder {
            store,
            config: Config::default(),
            clock: Rc::new(SystemClock),
            bus: Rc::new(LoggingBus),
            migrate: None,
        }
    }

    pub fn new(store: Arc<dyn EntityStorage>, config: Config) -> Self {
        Self::builder(store).config(config).build()
    }

    pub fn session(&self) -> Session {
        Session::new(self.clone())
    }

    pub fn store(&self) -> &dyn EntityStorage {
        self.0.store.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.0.config
    }

    pub fn compiler(&self) -> &Compiler {
        &self.0.compiler
    }

    pub fn bus(&self) -> &dyn EventBus {
        self.0.bus.as_ref()
    }

    pub fn migration(&self) -> Option<&MigrateFn> {
        self.0.migrate.as_deref()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.0.clock.now()
    }

    pub fn scheduled(&self) -> Option<FutureTask> {
        self.0.scheduled.borrow().clone()
    }

    /// Offer the next thing that needs doing. A pending task that is strictly earlier, or the
    /// same task again, is kept. At a shared instant crons are merged, and a queued wake never
    /// displaces crons since servicing always drains the post office.
    pub fn schedule(&self, task: Option<FutureTask>) {
        let Some(task) = task else {
            return;
        };
        let mut scheduled = self.0.scheduled.borrow_mut();
        if let Some(pending) = scheduled.as_ref()
            && (pending.when() < task.when() || *pending == task)
        {
            debug!(pending = %pending.when(), offered = %task.when(), "keeping pending wake");
            return;
        }
        let task = match (scheduled.take(), task) {
            (
                Some(FutureTask::Cron { when, mut crons }),
                FutureTask::Cron {
                    when: offered,
                    crons: more,
                },
            ) if when == offered => {
                for cron in more {
                    if !crons.contains(&cron) {
                        crons.push(cron);
                    }
                }
                debug!(%when, crons = crons.len(), "merged crons");
                FutureTask::Cron { when, crons }
            }
            (Some(pending @ FutureTask::Cron { .. }), offered @ FutureTask::Queued { .. })
                if pending.when() == offered.when() =>
            {
                pending
            }
            (_, offered) => offered,
        };
        info!(when = %task.when(), "scheduled wake");
        *scheduled = Some(task);
    }

    /// Take the pending task if it is due.
    pub fn take_due(&self, now: DateTime<Utc>) -> Option<FutureTask> {
        let mut scheduled = self.0.scheduled.borrow_mut();
        match scheduled.as_ref() {
            Some(task) if task.is_due(now) => scheduled.take(),
            _ => None,
        }
    }

    /// How long a host may sleep before it should service the domain.
    pub fn next_wake(&self) -> Option<TimeDelta> {
        let when = self.0.scheduled.borrow().as_ref()?.when();
        let floor = TimeDelta::milliseconds(
            i64::try_from(self.0.config.scheduler.minimum_wake_ms).unwrap_or(i64::MAX),
        );
        Some((when - self.now()).max(floor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::scheduling::CronKey;
    use dimsum_db::InMemoryStorage;
    use pretty_assertions::assert_eq;

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + seconds, 0).unwrap_or_default()
    }

    fn cron(when: DateTime<Utc>, key: &str) -> FutureTask {
        FutureTask::Cron {
            when,
            crons: vec![CronKey {
                entity_key: key.into(),
                spec: "* * * * *".to_string(),
            }],
        }
    }

    fn domain(clock: Rc<ManualClock>) -> Domain {
        Domain::builder(Arc::new(InMemoryStorage::default()))
            .clock(clock)
            .build()
    }

    fn crons(task: Option<FutureTask>) -> Vec<String> {
        match task {
            Some(FutureTask::Cron { crons, .. }) => {
                crons.into_iter().map(|c| c.entity_key.to_string()).collect()
            }
            other => panic!("expected crons, got {other:?}"),
        }
    }

    fn queued(when: DateTime<Utc>, key: &str) -> FutureTask {
        FutureTask::Queued {
            when,
            entity_key: key.into(),
            message: "ping".to_string(),
        }
    }

    #[test]
    fn test_later_reschedules_ignored() {
        let clock = Rc::new(ManualClock::new(at(0)));
        let domain = domain(clock.clone());
        domain.schedule(Some(cron(at(60), "a")));
        domain.schedule(Some(cron(at(120), "b")));
        domain.schedule(Some(cron(at(60), "a")));
        assert_eq!(domain.scheduled(), Some(cron(at(60), "a")));

        domain.schedule(Some(cron(at(30), "d")));
        assert_eq!(domain.scheduled(), Some(cron(at(30), "d")));
    }

    #[test]
    fn test_crons_at_same_instant_merge() {
        let clock = Rc::new(ManualClock::new(at(0)));
        let domain = domain(clock.clone());
        domain.schedule(Some(cron(at(60), "a")));
        domain.schedule(Some(FutureTask::Cron {
            when: at(60),
            crons: vec![
                CronKey {
                    entity_key: "a".into(),
                    spec: "* * * * *".to_string(),
                },
                CronKey {
                    entity_key: "b".into(),
                    spec: "* * * * *".to_string(),
                },
            ],
        }));
        assert_eq!(crons(domain.scheduled()), vec!["a", "b"]);

        domain.schedule(Some(cron(at(60), "c")));
        assert_eq!(crons(domain.take_due(at(60))), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_queued_never_displaces_crons() {
        let clock = Rc::new(ManualClock::new(at(0)));
        let first = domain(clock.clone());
        first.schedule(Some(cron(at(60), "a")));
        first.schedule(Some(queued(at(60), "b")));
        assert_eq!(first.scheduled(), Some(cron(at(60), "a")));

        let second = domain(clock.clone());
        second.schedule(Some(queued(at(60), "b")));
        second.schedule(Some(cron(at(60), "a")));
        assert_eq!(second.scheduled(), Some(cron(at(60), "a")));
        second.schedule(Some(queued(at(45), "b")));
        assert_eq!(second.scheduled(), Some(queued(at(45), "b")));
    }

    #[test]
    fn test_take_due() {
        let clock = Rc::new(ManualClock::new(at(0)));
        let domain = domain(clock.clone());
        domain.schedule(Some(cron(at(60), "a")));
        assert_eq!(domain.take_due(clock.now()), None);
        assert_eq!(domain.next_wake(), Some(TimeDelta::seconds(60)));

        clock.advance(TimeDelta::seconds(61));
        assert_eq!(domain.next_wake(), Some(TimeDelta::milliseconds(100)));
        assert_eq!(domain.take_due(clock.now()), Some(cron(at(60), "a")));
        assert_eq!(domain.scheduled(), None);
    }
}
