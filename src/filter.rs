//! Equipment confidence filter.
//!
//! Runs every cycle, including cache-reuse cycles, against the thresholds of
//! the current policy snapshot, so a threshold change applies on the next
//! frame without waiting for fresh inference.

use crate::gear::GearCategory;
use crate::observation::RawEquipmentObservation;
use crate::policy::ConfidenceThresholds;

/// Keep observations with `score >= threshold(category)`.
///
/// Unrecognised labels are judged against the general floor; association
/// drops them later. Input order is preserved.
pub fn filter_equipment(
    raw: &[RawEquipmentObservation],
    thresholds: &ConfidenceThresholds,
) -> Vec<RawEquipmentObservation> {
    raw.iter()
        .filter(|obs| {
            let category = GearCategory::normalize(&obs.label);
            obs.score >= thresholds.threshold_for(category)
        })
        .cloned()
        .collect()
}
