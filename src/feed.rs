//! Transient live feed of recent verdicts.
//!
//! Holds every status, compliant included, for display only. Nothing here is
//! persisted.

use serde::Serialize;
use std::collections::VecDeque;

use crate::compliance::ComplianceVerdict;

pub const FEED_CAPACITY: usize = 50;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FeedEntry {
    pub source: String,
    #[serde(flatten)]
    pub verdict: ComplianceVerdict,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct FeedStats {
    pub total_violations: usize,
    /// Percentage of compliant entries, one decimal place.
    pub compliance_rate: f64,
}

#[derive(Debug)]
pub struct LiveFeed {
    capacity: usize,
    entries: VecDeque<FeedEntry>,
}

impl LiveFeed {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub fn push_cycle(&mut self, source: &str, verdicts: &[ComplianceVerdict]) {
        for verdict in verdicts {
            if self.entries.len() == self.capacity {
                self.entries.pop_front();
            }
            self.entries.push_back(FeedEntry {
                source: source.to_string(),
                verdict: verdict.clone(),
            });
        }
    }

    /// Entries newest first.
    pub fn recent(&self) -> Vec<FeedEntry> {
        self.entries.iter().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> FeedStats {
        let total = self.entries.len();
        let total_violations = self
            .entries
            .iter()
            .filter(|e| e.verdict.is_violation())
            .count();
        let compliance_rate = if total == 0 {
            100.0
        } else {
            let rate = (total - total_violations) as f64 * 100.0 / total as f64;
            (rate * 10.0).round() / 10.0
        };
        FeedStats {
            total_violations,
            compliance_rate,
        }
    }
}

impl Default for LiveFeed {
    fn default() -> Self {
        Self::new(FEED_CAPACITY)
    }
}
