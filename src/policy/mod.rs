//! Live-configurable compliance policy.
//!
//! The policy is process-wide state shared by every source pipeline. Writers
//! never mutate the live value: they clone it, apply the change, validate and
//! swap a new `Arc<Policy>` under the write lock. Readers take one snapshot per
//! cycle and therefore never observe a half-applied update.

mod watch;

pub use watch::{PolicyFile, PolicyWatcher};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::gear::{gear_names, GearCategory, GearSet};

pub const DEFAULT_GENERAL_CONFIDENCE: f32 = 0.63;

/// Confidence floors applied by the equipment filter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceThresholds {
    /// Floor for categories without an override, and for unrecognised labels.
    pub general: f32,
    /// Per-category overrides.
    pub per_category: BTreeMap<GearCategory, f32>,
}

impl ConfidenceThresholds {
    pub fn new(general: f32) -> Self {
        Self {
            general,
            per_category: BTreeMap::new(),
        }
    }

    /// Threshold for a category; `None` (unrecognised label) uses the general floor.
    pub fn threshold_for(&self, category: Option<GearCategory>) -> f32 {
        category
            .and_then(|category| self.per_category.get(&category).copied())
            .unwrap_or(self.general)
    }

    pub fn with_override(mut self, category: GearCategory, threshold: f32) -> Self {
        self.per_category.insert(category, threshold);
        self
    }

    fn validate(&self) -> Result<()> {
        validate_confidence("general confidence", self.general)?;
        for (category, threshold) in &self.per_category {
            validate_confidence(&format!("{} threshold", category), *threshold)?;
        }
        Ok(())
    }
}

impl Default for ConfidenceThresholds {
    /// Detector-tuned sensitivities: masks are small and score low.
    fn default() -> Self {
        Self::new(DEFAULT_GENERAL_CONFIDENCE)
            .with_override(GearCategory::Coverall, 0.50)
            .with_override(GearCategory::FaceShield, 0.50)
            .with_override(GearCategory::Gloves, 0.45)
            .with_override(GearCategory::Goggles, 0.50)
            .with_override(GearCategory::Mask, 0.30)
    }
}

/// One immutable version of the policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Monitoring toggle. When off, pipelines pass frames through untouched.
    pub active: bool,
    pub thresholds: ConfidenceThresholds,
    pub required_gear: GearSet,
    /// Incremented on every swap. Assigned by the store.
    #[serde(default)]
    pub version: u64,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            active: true,
            thresholds: ConfidenceThresholds::default(),
            required_gear: GearCategory::all(),
            version: 0,
        }
    }
}

impl Policy {
    pub fn validate(&self) -> Result<()> {
        self.thresholds.validate()
    }
}

fn validate_confidence(what: &str, value: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(anyhow!("{} must be within 0..=1 (got {})", what, value));
    }
    Ok(())
}

/// Shared handle to the current policy.
#[derive(Debug)]
pub struct PolicyStore {
    current: RwLock<Arc<Policy>>,
}

impl PolicyStore {
    pub fn new(policy: Policy) -> Result<Self> {
        policy.validate()?;
        Ok(Self {
            current: RwLock::new(Arc::new(policy)),
        })
    }

    /// Atomic snapshot of the current policy.
    pub fn snapshot(&self) -> Arc<Policy> {
        // The guarded value is only ever replaced whole, so a poisoned lock
        // still holds a complete policy.
        let guard = self
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    pub fn version(&self) -> u64 {
        self.snapshot().version
    }

    /// Replace the whole policy. Returns the new version.
    pub fn replace(&self, policy: Policy) -> Result<u64> {
        let next = self.update(move |current| *current = policy)?;
        Ok(next.version)
    }

    pub fn set_active(&self, active: bool) -> Result<()> {
        self.update(|policy| policy.active = active)?;
        log::info!("monitoring active: {}", active);
        Ok(())
    }

    /// Update the general confidence floor.
    pub fn set_confidence(&self, general: f32) -> Result<()> {
        self.update(|policy| policy.thresholds.general = general)?;
        log::info!("general confidence threshold: {:.2}", general);
        Ok(())
    }

    pub fn set_category_threshold(&self, category: GearCategory, threshold: f32) -> Result<()> {
        self.update(|policy| {
            policy.thresholds.per_category.insert(category, threshold);
        })?;
        log::info!("{} confidence threshold: {:.2}", category, threshold);
        Ok(())
    }

    /// Drop a per-category override so the general floor applies again.
    pub fn clear_category_threshold(&self, category: GearCategory) -> Result<()> {
        self.update(|policy| {
            policy.thresholds.per_category.remove(&category);
        })?;
        Ok(())
    }

    pub fn set_required_gear(&self, required: GearSet) -> Result<()> {
        let names = gear_names(&required);
        self.update(|policy| policy.required_gear = required)?;
        log::info!("required gear: [{}]", names.join(", "));
        Ok(())
    }

    /// Overlay a partial policy file on the current policy. The read and the
    /// swap happen under one write lock, so concurrent setters are not lost.
    pub fn apply_file(&self, file: &PolicyFile) -> Result<u64> {
        let next = self.try_update(|current| file.apply_to(current))?;
        Ok(next.version)
    }

    fn update(&self, apply: impl FnOnce(&mut Policy)) -> Result<Arc<Policy>> {
        self.try_update(|current| {
            let mut next = current.clone();
            apply(&mut next);
            Ok(next)
        })
    }

    /// Copy-on-write update: derive, validate, swap.
    fn try_update(&self, derive: impl FnOnce(&Policy) -> Result<Policy>) -> Result<Arc<Policy>> {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut next = derive(&**guard)?;
        next.validate()?;
        next.version = guard.version + 1;
        let next = Arc::new(next);
        *guard = Arc::clone(&next);
        Ok(next)
    }
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self {
            current: RwLock::new(Arc::new(Policy::default())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_take_precedence_over_general_floor() {
        let thresholds = ConfidenceThresholds::default();
        assert_eq!(thresholds.threshold_for(Some(GearCategory::Mask)), 0.30);
        assert_eq!(thresholds.threshold_for(Some(GearCategory::Gloves)), 0.45);
        assert_eq!(thresholds.threshold_for(None), DEFAULT_GENERAL_CONFIDENCE);

        let plain = ConfidenceThresholds::new(0.7);
        assert_eq!(plain.threshold_for(Some(GearCategory::Mask)), 0.7);
    }

    #[test]
    fn snapshots_are_not_affected_by_later_writes() {
        let store = PolicyStore::default();
        let before = store.snapshot();

        store
            .set_required_gear([GearCategory::Gloves].into_iter().collect())
            .unwrap();
        store.set_active(false).unwrap();

        assert_eq!(before.required_gear, GearCategory::all());
        assert!(before.active);

        let after = store.snapshot();
        assert_eq!(after.required_gear.len(), 1);
        assert!(!after.active);
        assert_eq!(after.version, before.version + 2);
    }

    #[test]
    fn invalid_updates_leave_policy_untouched() {
        let store = PolicyStore::default();
        let before = store.snapshot();

        assert!(store.set_confidence(1.5).is_err());
        assert!(store
            .set_category_threshold(GearCategory::Mask, -0.1)
            .is_err());

        assert_eq!(*store.snapshot(), *before);
    }

    #[test]
    fn clear_override_restores_general_floor() {
        let store = PolicyStore::default();
        store.set_confidence(0.8).unwrap();
        store.clear_category_threshold(GearCategory::Mask).unwrap();

        let policy = store.snapshot();
        assert_eq!(policy.thresholds.threshold_for(Some(GearCategory::Mask)), 0.8);
        assert_eq!(
            policy.thresholds.threshold_for(Some(GearCategory::Gloves)),
            0.45
        );
    }

    #[test]
    fn replace_bumps_version() {
        let store = PolicyStore::default();
        let version = store
            .replace(Policy {
                active: false,
                ..Policy::default()
            })
            .unwrap();
        assert_eq!(version, 1);
        assert!(!store.snapshot().active);

        let rejected = store.replace(Policy {
            thresholds: ConfidenceThresholds::new(2.0),
            ..Policy::default()
        });
        assert!(rejected.is_err());
        assert_eq!(store.version(), 1);
    }
}
