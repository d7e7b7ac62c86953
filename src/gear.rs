//! Protective-equipment catalogue.
//!
//! The canonical categories are a closed set. Detector labels are free-form
//! strings ("Face_Shield", "gloves-left", ...) and are folded onto a category
//! with `GearCategory::normalize`; labels that match no category are dropped
//! by the association step.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

// COCO-17 keypoint indices used by the pose model.
pub const KP_NOSE: usize = 0;
pub const KP_LEFT_EYE: usize = 1;
pub const KP_RIGHT_EYE: usize = 2;
pub const KP_LEFT_EAR: usize = 3;
pub const KP_RIGHT_EAR: usize = 4;
pub const KP_LEFT_SHOULDER: usize = 5;
pub const KP_RIGHT_SHOULDER: usize = 6;
pub const KP_LEFT_WRIST: usize = 9;
pub const KP_RIGHT_WRIST: usize = 10;
pub const KP_LEFT_HIP: usize = 11;
pub const KP_RIGHT_HIP: usize = 12;

/// Number of keypoints the pose model emits per person.
pub const POSE_KEYPOINT_COUNT: usize = 17;

/// Label emitted for detector class indices outside the equipment model's range.
pub const UNKNOWN_EQUIPMENT_LABEL: &str = "unknown";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GearCategory {
    Mask,
    Gloves,
    Coverall,
    Goggles,
    FaceShield,
}

/// Set of gear categories. Ordered so verdicts and logs are stable.
pub type GearSet = BTreeSet<GearCategory>;

/// Keyword match order. A label containing several keywords resolves to the first.
const MATCH_ORDER: [GearCategory; 5] = [
    GearCategory::Mask,
    GearCategory::Gloves,
    GearCategory::Coverall,
    GearCategory::Goggles,
    GearCategory::FaceShield,
];

impl GearCategory {
    pub fn all() -> GearSet {
        MATCH_ORDER.iter().copied().collect()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GearCategory::Mask => "mask",
            GearCategory::Gloves => "gloves",
            GearCategory::Coverall => "coverall",
            GearCategory::Goggles => "goggles",
            GearCategory::FaceShield => "face_shield",
        }
    }

    /// Fold a raw detector label onto a canonical category.
    ///
    /// Matching is by keyword after lower-casing and mapping `-` and spaces to `_`,
    /// so "Face Shield", "face-shield" and "Face_Shield" all resolve alike.
    pub fn normalize(label: &str) -> Option<Self> {
        let folded: String = label
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == '-' || c == ' ' { '_' } else { c })
            .collect();
        MATCH_ORDER
            .iter()
            .copied()
            .find(|category| folded.contains(category.as_str()))
    }

    /// Keypoints that must fall inside an equipment box for it to count as worn.
    pub fn diagnostic_keypoints(self) -> &'static [usize] {
        match self {
            GearCategory::Mask => &[KP_NOSE, KP_LEFT_EAR, KP_RIGHT_EAR],
            GearCategory::Goggles => &[KP_LEFT_EYE, KP_RIGHT_EYE],
            GearCategory::FaceShield => &[KP_NOSE, KP_LEFT_EYE, KP_RIGHT_EYE],
            GearCategory::Gloves => &[KP_LEFT_WRIST, KP_RIGHT_WRIST],
            GearCategory::Coverall => &[
                KP_LEFT_SHOULDER,
                KP_RIGHT_SHOULDER,
                KP_LEFT_HIP,
                KP_RIGHT_HIP,
            ],
        }
    }
}

impl fmt::Display for GearCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GearCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_lowercase();
        MATCH_ORDER
            .iter()
            .copied()
            .find(|category| category.as_str() == name)
            .ok_or_else(|| anyhow!("unknown gear category '{}'", s.trim()))
    }
}

/// Label for a class index of the equipment detection model.
pub fn equipment_label_for_class(class_id: u32) -> &'static str {
    match class_id {
        0 => "Coverall",
        1 => "Face_Shield",
        2 => "Gloves",
        3 => "Goggles",
        4 => "Mask",
        _ => UNKNOWN_EQUIPMENT_LABEL,
    }
}

/// Parse a list of canonical gear names. Empty entries are ignored.
pub fn parse_gear_list<S: AsRef<str>>(names: &[S]) -> Result<GearSet> {
    names
        .iter()
        .map(|name| name.as_ref().trim())
        .filter(|name| !name.is_empty())
        .map(GearCategory::from_str)
        .collect()
}

/// Canonical names of a gear set, in set order.
pub fn gear_names(set: &GearSet) -> Vec<String> {
    set.iter().map(|category| category.as_str().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_matches_detector_labels() {
        assert_eq!(GearCategory::normalize("Mask"), Some(GearCategory::Mask));
        assert_eq!(GearCategory::normalize("Gloves"), Some(GearCategory::Gloves));
        assert_eq!(
            GearCategory::normalize("Face_Shield"),
            Some(GearCategory::FaceShield)
        );
        assert_eq!(
            GearCategory::normalize("face shield"),
            Some(GearCategory::FaceShield)
        );
        assert_eq!(
            GearCategory::normalize("blue-coverall"),
            Some(GearCategory::Coverall)
        );
        assert_eq!(GearCategory::normalize("helmet"), None);
        assert_eq!(GearCategory::normalize(UNKNOWN_EQUIPMENT_LABEL), None);
    }

    #[test]
    fn normalize_prefers_first_keyword() {
        assert_eq!(
            GearCategory::normalize("goggles_and_mask"),
            Some(GearCategory::Mask)
        );
    }

    #[test]
    fn from_str_requires_canonical_name() {
        assert_eq!(
            "face_shield".parse::<GearCategory>().unwrap(),
            GearCategory::FaceShield
        );
        assert_eq!(" GLOVES ".parse::<GearCategory>().unwrap(), GearCategory::Gloves);
        assert!("Face Shield".parse::<GearCategory>().is_err());
        assert!("helmet".parse::<GearCategory>().is_err());
    }

    #[test]
    fn class_ids_map_to_labels() {
        assert_eq!(equipment_label_for_class(2), "Gloves");
        assert_eq!(equipment_label_for_class(1), "Face_Shield");
        assert_eq!(equipment_label_for_class(9), UNKNOWN_EQUIPMENT_LABEL);
        for id in 0..5 {
            assert!(GearCategory::normalize(equipment_label_for_class(id)).is_some());
        }
    }

    #[test]
    fn diagnostic_keypoints_are_in_pose_range() {
        for category in GearCategory::all() {
            assert!(!category.diagnostic_keypoints().is_empty());
            assert!(category
                .diagnostic_keypoints()
                .iter()
                .all(|&idx| idx < POSE_KEYPOINT_COUNT));
        }
    }

    #[test]
    fn parse_gear_list_skips_blanks() {
        let set = parse_gear_list(&["mask", " ", "gloves", "mask"]).unwrap();
        assert_eq!(gear_names(&set), vec!["mask", "gloves"]);
        assert!(parse_gear_list(&["mask", "boots"]).is_err());
    }
}
