//! Equipment-to-person association.
//!
//! An equipment item is worn by a person when its box overlaps the person box
//! and at least one of the category's diagnostic keypoints lies strictly inside
//! the equipment box. Attribution is not exclusive: in a crowded scene the same
//! item can be credited to every person that passes both tests.

use serde::Serialize;

use crate::gear::{GearCategory, GearSet};
use crate::observation::{BBox, PoseObservation, RawEquipmentObservation};

/// An equipment item credited to a person, kept for overlay rendering.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Attribution {
    pub category: GearCategory,
    pub bbox: BBox,
    pub label: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Association {
    pub worn: GearSet,
    pub attributions: Vec<Attribution>,
}

/// Anatomical test: any diagnostic keypoint present and strictly inside `equip_box`.
///
/// Keypoint indices past the end of the array are skipped.
pub fn keypoint_supports(
    equip_box: &BBox,
    pose: &PoseObservation,
    category: GearCategory,
) -> bool {
    category
        .diagnostic_keypoints()
        .iter()
        .filter_map(|&idx| pose.keypoint(idx))
        .any(|point| equip_box.contains_strict(point))
}

/// Gear worn by one person, given the already-filtered equipment list.
pub fn associate(pose: &PoseObservation, equipment: &[RawEquipmentObservation]) -> Association {
    let mut association = Association::default();
    for item in equipment {
        let Some(category) = GearCategory::normalize(&item.label) else {
            continue;
        };
        if !pose.bbox.overlaps(&item.bbox) {
            continue;
        }
        if !keypoint_supports(&item.bbox, pose, category) {
            continue;
        }
        association.worn.insert(category);
        association.attributions.push(Attribution {
            category,
            bbox: item.bbox,
            label: item.label.clone(),
        });
    }
    association
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gear::{KP_LEFT_WRIST, KP_NOSE, KP_RIGHT_WRIST, POSE_KEYPOINT_COUNT};
    use crate::observation::Point;

    fn person(track_id: u32, bbox: BBox, points: &[(usize, f32, f32)]) -> PoseObservation {
        let mut keypoints = vec![None; POSE_KEYPOINT_COUNT];
        for &(idx, x, y) in points {
            keypoints[idx] = Some(Point::new(x, y));
        }
        PoseObservation {
            track_id,
            bbox,
            keypoints,
        }
    }

    fn item(label: &str, bbox: BBox) -> RawEquipmentObservation {
        RawEquipmentObservation {
            bbox,
            label: label.to_string(),
            score: 0.9,
        }
    }

    #[test]
    fn gloves_over_wrists_are_worn() {
        let worker = person(
            1,
            BBox::new(0.0, 0.0, 100.0, 200.0),
            &[(KP_LEFT_WRIST, 20.0, 150.0), (KP_RIGHT_WRIST, 80.0, 150.0)],
        );
        let gloves = item("Gloves", BBox::new(10.0, 140.0, 90.0, 160.0));

        let result = associate(&worker, &[gloves]);
        assert!(result.worn.contains(&GearCategory::Gloves));
        assert_eq!(result.attributions.len(), 1);
        assert_eq!(result.attributions[0].label, "Gloves");
    }

    #[test]
    fn nearby_but_not_overlapping_item_is_ignored() {
        let worker = person(
            1,
            BBox::new(0.0, 0.0, 100.0, 200.0),
            &[(KP_LEFT_WRIST, 20.0, 150.0)],
        );
        // Touches the person box only along x = 100.
        let gloves = item("Gloves", BBox::new(100.0, 140.0, 150.0, 160.0));
        assert!(associate(&worker, &[gloves]).worn.is_empty());
    }

    #[test]
    fn overlapping_item_without_diagnostic_keypoint_is_ignored() {
        let worker = person(
            1,
            BBox::new(0.0, 0.0, 100.0, 200.0),
            &[(KP_NOSE, 50.0, 20.0)],
        );
        // Mask box overlaps the person but sits on the torso, away from nose and ears.
        let mask = item("Mask", BBox::new(30.0, 80.0, 70.0, 120.0));
        assert!(associate(&worker, &[mask]).worn.is_empty());
    }

    #[test]
    fn keypoint_on_equipment_edge_does_not_count() {
        let worker = person(
            1,
            BBox::new(0.0, 0.0, 100.0, 200.0),
            &[(KP_LEFT_WRIST, 10.0, 150.0)],
        );
        let gloves = item("Gloves", BBox::new(10.0, 140.0, 90.0, 160.0));
        assert!(associate(&worker, &[gloves]).worn.is_empty());
    }

    #[test]
    fn unrecognised_labels_are_dropped() {
        let worker = person(
            1,
            BBox::new(0.0, 0.0, 100.0, 200.0),
            &[(KP_NOSE, 50.0, 20.0)],
        );
        let helmet = item("helmet", BBox::new(30.0, 0.0, 70.0, 40.0));
        let result = associate(&worker, &[helmet]);
        assert!(result.worn.is_empty());
        assert!(result.attributions.is_empty());
    }

    #[test]
    fn duplicate_items_collapse_into_one_category() {
        let worker = person(
            1,
            BBox::new(0.0, 0.0, 100.0, 200.0),
            &[(KP_LEFT_WRIST, 20.0, 150.0), (KP_RIGHT_WRIST, 80.0, 150.0)],
        );
        let left = item("Gloves", BBox::new(10.0, 140.0, 30.0, 160.0));
        let right = item("Gloves", BBox::new(70.0, 140.0, 90.0, 160.0));

        let result = associate(&worker, &[left, right]);
        assert_eq!(result.worn.len(), 1);
        assert_eq!(result.attributions.len(), 2);
    }

    #[test]
    fn short_keypoint_arrays_are_tolerated() {
        let worker = PoseObservation {
            track_id: 3,
            bbox: BBox::new(0.0, 0.0, 100.0, 200.0),
            keypoints: vec![Some(Point::new(50.0, 20.0))],
        };
        let gloves = item("Gloves", BBox::new(10.0, 140.0, 90.0, 160.0));
        let mask = item("Mask", BBox::new(40.0, 10.0, 60.0, 30.0));

        let result = associate(&worker, &[gloves, mask]);
        assert_eq!(result.worn, GearSet::from([GearCategory::Mask]));
    }

    #[test]
    fn same_item_can_be_credited_to_two_people() {
        let shared = item("Gloves", BBox::new(90.0, 140.0, 110.0, 160.0));
        let left = person(
            1,
            BBox::new(0.0, 0.0, 100.0, 200.0),
            &[(KP_RIGHT_WRIST, 95.0, 150.0)],
        );
        let right = person(
            2,
            BBox::new(100.0, 0.0, 200.0, 200.0),
            &[(KP_LEFT_WRIST, 105.0, 150.0)],
        );

        assert!(associate(&left, std::slice::from_ref(&shared))
            .worn
            .contains(&GearCategory::Gloves));
        assert!(associate(&right, std::slice::from_ref(&shared))
            .worn
            .contains(&GearCategory::Gloves));
    }
}
