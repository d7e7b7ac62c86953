//! Periodic daemon upkeep: policy file reload, log retention and live feed
//! statistics.
//!
//! `tick` is called after every message the daemon receives and on every idle
//! timeout. Each task runs when its own interval has elapsed, independent of
//! whether the last cycle produced events.

use std::time::{Duration, Instant};

use crate::feed::LiveFeed;
use crate::policy::{PolicyStore, PolicyWatcher};
use crate::storage::ViolationLogStore;

pub const POLICY_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const RETENTION_INTERVAL: Duration = Duration::from_secs(60);
pub const FEED_LOG_INTERVAL: Duration = Duration::from_secs(30);

/// What one `tick` did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HousekeepingReport {
    pub policy_reloaded: bool,
    pub retention_ran: bool,
    pub pruned: usize,
    pub feed_logged: bool,
}

pub struct Housekeeping {
    watcher: Option<PolicyWatcher>,
    retention: Duration,
    last_policy_poll: Instant,
    last_retention: Instant,
    last_feed_log: Instant,
}

impl Housekeeping {
    pub fn new(watcher: Option<PolicyWatcher>, retention: Duration, now: Instant) -> Self {
        Self {
            watcher,
            retention,
            last_policy_poll: now,
            last_retention: now,
            last_feed_log: now,
        }
    }

    pub fn watcher(&self) -> Option<&PolicyWatcher> {
        self.watcher.as_ref()
    }

    /// Poll the policy file now. Used at startup, before sources run.
    pub fn reload_policy(&mut self, policy: &PolicyStore) -> bool {
        let Some(watcher) = self.watcher.as_mut() else {
            return false;
        };
        match watcher.poll(policy) {
            Ok(reloaded) => reloaded,
            Err(e) => {
                log::warn!("policy reload failed: {}", e);
                false
            }
        }
    }

    pub fn tick<S: ViolationLogStore + ?Sized>(
        &mut self,
        now: Instant,
        wall_ms: u64,
        policy: &PolicyStore,
        store: &mut S,
        feed: &LiveFeed,
    ) -> HousekeepingReport {
        let mut report = HousekeepingReport::default();

        if now.saturating_duration_since(self.last_policy_poll) >= POLICY_POLL_INTERVAL {
            report.policy_reloaded = self.reload_policy(policy);
            self.last_policy_poll = now;
        }

        if now.saturating_duration_since(self.last_retention) >= RETENTION_INTERVAL {
            report.retention_ran = true;
            match store.enforce_retention(self.retention, wall_ms) {
                Ok(0) => {}
                Ok(removed) => {
                    log::info!("retention pruned {} violation logs", removed);
                    report.pruned = removed;
                }
                Err(e) => log::error!("retention failed: {}", e),
            }
            self.last_retention = now;
        }

        if now.saturating_duration_since(self.last_feed_log) >= FEED_LOG_INTERVAL {
            let stats = feed.stats();
            log::info!(
                "live feed: {} entries, {} violations, compliance {:.1}%",
                feed.len(),
                stats.total_violations,
                stats.compliance_rate
            );
            report.feed_logged = true;
            self.last_feed_log = now;
        }

        report
    }
}
