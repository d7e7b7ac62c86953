//! Compliance verdicts.
//!
//! A verdict is computed for every tracked person in every active cycle,
//! whether the observations are fresh or cached, against the required gear of
//! the policy snapshot taken for that cycle.

use serde::Serialize;
use std::fmt;

use crate::association::associate;
use crate::gear::GearSet;
use crate::observation::{PoseObservation, RawEquipmentObservation};
use crate::render::{DrawInstruction, GREEN, RED};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    Compliant,
    Violation,
}

impl ComplianceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ComplianceStatus::Compliant => "COMPLIANT",
            ComplianceStatus::Violation => "VIOLATION",
        }
    }
}

impl fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome for one person in one cycle. Immutable once built.
///
/// Fields are private so `missing` is always `required - detected` and
/// `status` always agrees with it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ComplianceVerdict {
    track_id: u32,
    timestamp_ms: u64,
    status: ComplianceStatus,
    detected: GearSet,
    missing: GearSet,
}

impl ComplianceVerdict {
    pub fn evaluate(
        track_id: u32,
        timestamp_ms: u64,
        detected: GearSet,
        required: &GearSet,
    ) -> Self {
        let missing: GearSet = required.difference(&detected).copied().collect();
        let status = if missing.is_empty() {
            ComplianceStatus::Compliant
        } else {
            ComplianceStatus::Violation
        };
        Self {
            track_id,
            timestamp_ms,
            status,
            detected,
            missing,
        }
    }

    pub fn track_id(&self) -> u32 {
        self.track_id
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    pub fn status(&self) -> ComplianceStatus {
        self.status
    }

    pub fn is_violation(&self) -> bool {
        self.status == ComplianceStatus::Violation
    }

    pub fn detected(&self) -> &GearSet {
        &self.detected
    }

    pub fn missing(&self) -> &GearSet {
        &self.missing
    }
}

/// Verdicts and overlay for one cycle.
#[derive(Clone, Debug, Default)]
pub struct CycleEvaluation {
    pub verdicts: Vec<ComplianceVerdict>,
    pub draw: Vec<DrawInstruction>,
}

/// Score every person against the filtered equipment and the required gear.
///
/// With no equipment (detector unavailable) every person is a violation
/// missing the full required set, unless nothing is required.
pub fn evaluate_cycle(
    poses: &[PoseObservation],
    equipment: &[RawEquipmentObservation],
    required: &GearSet,
    timestamp_ms: u64,
) -> CycleEvaluation {
    let mut out = CycleEvaluation::default();
    for pose in poses {
        let association = associate(pose, equipment);
        for attribution in &association.attributions {
            out.draw.push(DrawInstruction::new(
                attribution.bbox,
                GREEN,
                attribution.label.clone(),
            ));
        }

        let verdict =
            ComplianceVerdict::evaluate(pose.track_id, timestamp_ms, association.worn, required);
        let color = if verdict.is_violation() { RED } else { GREEN };
        out.draw.push(DrawInstruction::new(
            pose.bbox,
            color,
            format!("ID:{} {}", pose.track_id, verdict.status()),
        ));
        out.verdicts.push(verdict);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gear::{GearCategory, KP_LEFT_WRIST, KP_RIGHT_WRIST, POSE_KEYPOINT_COUNT};
    use crate::observation::{BBox, Point};

    fn set(items: &[GearCategory]) -> GearSet {
        items.iter().copied().collect()
    }

    fn gloved_worker() -> (PoseObservation, RawEquipmentObservation) {
        let mut keypoints = vec![None; POSE_KEYPOINT_COUNT];
        keypoints[KP_LEFT_WRIST] = Some(Point::new(20.0, 150.0));
        keypoints[KP_RIGHT_WRIST] = Some(Point::new(80.0, 150.0));
        let pose = PoseObservation {
            track_id: 4,
            bbox: BBox::new(0.0, 0.0, 100.0, 200.0),
            keypoints,
        };
        let gloves = RawEquipmentObservation {
            bbox: BBox::new(10.0, 140.0, 90.0, 160.0),
            label: "Gloves".to_string(),
            score: 0.9,
        };
        (pose, gloves)
    }

    #[test]
    fn missing_is_required_minus_detected() {
        use GearCategory::*;
        let cases = [
            (set(&[]), set(&[]), set(&[])),
            (set(&[Mask]), set(&[]), set(&[])),
            (set(&[]), set(&[Mask, Gloves]), set(&[Mask, Gloves])),
            (set(&[Mask, Coverall]), set(&[Mask, Gloves]), set(&[Gloves])),
            (set(&[Mask, Gloves]), set(&[Mask, Gloves]), set(&[])),
        ];
        for (detected, required, expected_missing) in cases {
            let verdict = ComplianceVerdict::evaluate(1, 0, detected.clone(), &required);
            assert_eq!(verdict.missing(), &expected_missing);
            assert_eq!(verdict.detected(), &detected);
            assert_eq!(verdict.is_violation(), !expected_missing.is_empty());
        }
    }

    #[test]
    fn gloved_worker_complies_when_only_gloves_required() {
        let (pose, gloves) = gloved_worker();
        let required = set(&[GearCategory::Gloves]);

        let eval = evaluate_cycle(&[pose], &[gloves], &required, 42);
        assert_eq!(eval.verdicts.len(), 1);
        let verdict = &eval.verdicts[0];
        assert_eq!(verdict.status(), ComplianceStatus::Compliant);
        assert_eq!(verdict.track_id(), 4);
        assert_eq!(verdict.timestamp_ms(), 42);
        assert!(verdict.detected().contains(&GearCategory::Gloves));

        assert_eq!(eval.draw.len(), 2);
        assert_eq!(eval.draw[0].label, "Gloves");
        assert_eq!(eval.draw[1].label, "ID:4 COMPLIANT");
        assert_eq!(eval.draw[1].color, GREEN);
    }

    #[test]
    fn no_equipment_means_everything_required_is_missing() {
        let (pose, _) = gloved_worker();
        let required = GearCategory::all();

        let eval = evaluate_cycle(&[pose], &[], &required, 0);
        let verdict = &eval.verdicts[0];
        assert_eq!(verdict.status(), ComplianceStatus::Violation);
        assert!(verdict.detected().is_empty());
        assert_eq!(verdict.missing(), &required);
        assert_eq!(eval.draw[0].color, RED);
        assert_eq!(eval.draw[0].label, "ID:4 VIOLATION");
    }

    #[test]
    fn no_people_means_no_verdicts() {
        let (_, gloves) = gloved_worker();
        let eval = evaluate_cycle(&[], &[gloves], &GearCategory::all(), 0);
        assert!(eval.verdicts.is_empty());
        assert!(eval.draw.is_empty());
    }

    #[test]
    fn status_serializes_in_upper_case() {
        let verdict = ComplianceVerdict::evaluate(1, 0, set(&[]), &set(&[GearCategory::Mask]));
        let json = serde_json::to_value(&verdict).unwrap();
        assert_eq!(json["status"], "VIOLATION");
        assert_eq!(json["missing"][0], "mask");
    }
}
