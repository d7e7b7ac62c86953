//! Violation event deduplication.
//!
//! Violations are rate-limited per (source, track id). Track ids come from an
//! external tracker and may be recycled after occlusion, so a key is a weak
//! reference: a new person inheriting an id also inherits its cooldown.

use std::collections::HashMap;
use std::time::Duration;

use crate::compliance::ComplianceVerdict;

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_KEYS: usize = 4096;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub source: String,
    pub track_id: u32,
}

#[derive(Debug)]
pub struct EventDeduplicator {
    cooldown_ms: u64,
    max_keys: usize,
    last_emitted: HashMap<DedupKey, u64>,
}

impl EventDeduplicator {
    pub fn new(cooldown: Duration, max_keys: usize) -> Self {
        Self {
            cooldown_ms: u64::try_from(cooldown.as_millis()).unwrap_or(u64::MAX),
            max_keys: max_keys.max(1),
            last_emitted: HashMap::new(),
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn len(&self) -> usize {
        self.last_emitted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_emitted.is_empty()
    }

    /// Violations from `verdicts` that should be persisted now.
    ///
    /// Compliant verdicts are never returned. A violation passes when its key
    /// is unseen or more than the cooldown has elapsed since the last one that
    /// passed; a clock that went backwards suppresses.
    pub fn admit(
        &mut self,
        source: &str,
        verdicts: &[ComplianceVerdict],
        now_ms: u64,
    ) -> Vec<ComplianceVerdict> {
        let mut out = Vec::new();
        for verdict in verdicts.iter().filter(|v| v.is_violation()) {
            let key = DedupKey {
                source: source.to_string(),
                track_id: verdict.track_id(),
            };
            let allowed = match self.last_emitted.get(&key) {
                None => true,
                Some(&last) => now_ms.checked_sub(last).is_some_and(|d| d > self.cooldown_ms),
            };
            if allowed {
                self.last_emitted.insert(key, now_ms);
                out.push(verdict.clone());
            } else {
                log::debug!(
                    "suppressed violation for {} track {} within cooldown",
                    source,
                    verdict.track_id()
                );
            }
        }
        if self.last_emitted.len() > self.max_keys {
            self.sweep(now_ms);
        }
        out
    }

    /// Drop keys whose cooldown has elapsed, then the oldest keys while the
    /// map is still over capacity. Returns the number of keys removed.
    pub fn sweep(&mut self, now_ms: u64) -> usize {
        let before = self.last_emitted.len();
        let cooldown_ms = self.cooldown_ms;
        self.last_emitted
            .retain(|_, &mut last| now_ms.saturating_sub(last) <= cooldown_ms);

        if self.last_emitted.len() > self.max_keys {
            let mut by_age: Vec<(DedupKey, u64)> = self
                .last_emitted
                .iter()
                .map(|(k, &v)| (k.clone(), v))
                .collect();
            by_age.sort_by_key(|(_, last)| *last);
            let excess = self.last_emitted.len() - self.max_keys;
            for (key, _) in by_age.into_iter().take(excess) {
                self.last_emitted.remove(&key);
            }
        }

        let removed = before - self.last_emitted.len();
        if removed > 0 {
            log::debug!("dedup sweep removed {} keys", removed);
        }
        removed
    }
}

impl Default for EventDeduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN, DEFAULT_MAX_KEYS)
    }
}
