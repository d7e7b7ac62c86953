//! Perception adapter boundary.
//!
//! Pose tracking and equipment detection are external models. This module
//! defines the traits they plug in through and normalises their output into
//! observation types: missing track ids become 0, non-finite keypoints become
//! absent. An adapter without an equipment detector runs in demo mode, where
//! no gear can ever be detected.

mod backend;
pub mod backends;

pub use backend::{EquipmentDetector, PoseEstimator, RawPose};
pub use backends::{
    ReplayEquipmentDetector, ReplayLog, ReplayPoseEstimator, StubEquipmentDetector,
    StubPoseEstimator,
};

use anyhow::Result;
use std::sync::Arc;

use crate::frame::InferenceView;
use crate::observation::{BBox, Point, PoseObservation, RawEquipmentObservation};

/// Track id substituted when the tracker gives none (or an unusable one).
pub const DEFAULT_TRACK_ID: u32 = 0;

/// Observations from one inference cycle. Doubles as the per-source cache.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Perception {
    pub poses: Vec<PoseObservation>,
    /// Equipment as detected, not yet thresholded.
    pub equipment: Vec<RawEquipmentObservation>,
}

impl Perception {
    pub fn is_empty(&self) -> bool {
        self.poses.is_empty() && self.equipment.is_empty()
    }
}

pub struct PerceptionAdapter {
    pose: Box<dyn PoseEstimator>,
    equipment: Option<Box<dyn EquipmentDetector>>,
}

impl PerceptionAdapter {
    pub fn new(
        pose: Box<dyn PoseEstimator>,
        equipment: Option<Box<dyn EquipmentDetector>>,
    ) -> Self {
        if equipment.is_none() {
            log::warn!(
                "equipment detector unavailable; running in demo mode (pose tracking only, all required gear reported missing)"
            );
        }
        Self { pose, equipment }
    }

    /// Stub models; `equipment = false` leaves out the detector (demo mode).
    pub fn stub(equipment: bool) -> Self {
        let detector: Option<Box<dyn EquipmentDetector>> = if equipment {
            Some(Box::new(StubEquipmentDetector::new()))
        } else {
            None
        };
        Self::new(Box::new(StubPoseEstimator::new()), detector)
    }

    /// Models replaying a recorded detections log.
    pub fn replay(log: Arc<ReplayLog>, equipment: bool) -> Self {
        let detector: Option<Box<dyn EquipmentDetector>> = if equipment {
            Some(Box::new(ReplayEquipmentDetector::new(Arc::clone(&log))))
        } else {
            None
        };
        Self::new(Box::new(ReplayPoseEstimator::new(log)), detector)
    }

    pub fn is_demo_mode(&self) -> bool {
        self.equipment.is_none()
    }

    pub fn describe(&self) -> String {
        match &self.equipment {
            Some(equipment) => format!("pose={} equipment={}", self.pose.name(), equipment.name()),
            None => format!("pose={} equipment=none", self.pose.name()),
        }
    }

    pub fn warm_up(&mut self) -> Result<()> {
        if let Some(equipment) = self.equipment.as_mut() {
            equipment.warm_up()?;
        }
        Ok(())
    }

    /// Run both models on one frame.
    pub fn run_inference(&mut self, view: &InferenceView<'_>) -> Result<Perception> {
        let poses = self
            .pose
            .track(view)?
            .into_iter()
            .map(normalize_pose)
            .collect();
        let equipment = match self.equipment.as_mut() {
            Some(detector) => detector.detect(view)?,
            None => Vec::new(),
        };
        Ok(Perception { poses, equipment })
    }
}

/// Normalise a tracker pose into an observation.
pub fn normalize_pose(raw: RawPose) -> PoseObservation {
    let track_id = raw
        .track_id
        .and_then(|id| u32::try_from(id).ok())
        .unwrap_or(DEFAULT_TRACK_ID);
    let keypoints = raw
        .keypoints
        .into_iter()
        .map(|kp| {
            kp.filter(|[x, y]| x.is_finite() && y.is_finite())
                .map(|[x, y]| Point::new(x, y))
        })
        .collect();
    PoseObservation {
        track_id,
        bbox: BBox::from_xyxy(raw.bbox),
        keypoints,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;

    #[test]
    fn missing_or_invalid_track_ids_default_to_zero() {
        for id in [None, Some(-3), Some(i64::from(u32::MAX) + 1)] {
            let pose = normalize_pose(RawPose {
                track_id: id,
                bbox: [0.0, 0.0, 1.0, 1.0],
                keypoints: vec![],
            });
            assert_eq!(pose.track_id, DEFAULT_TRACK_ID);
        }
        let pose = normalize_pose(RawPose {
            track_id: Some(17),
            ..RawPose::default()
        });
        assert_eq!(pose.track_id, 17);
    }

    #[test]
    fn non_finite_keypoints_become_absent() {
        let pose = normalize_pose(RawPose {
            track_id: Some(1),
            bbox: [0.0, 0.0, 10.0, 10.0],
            keypoints: vec![Some([1.0, 2.0]), Some([f32::NAN, 2.0]), None],
        });
        assert_eq!(
            pose.keypoints,
            vec![Some(Point::new(1.0, 2.0)), None, None]
        );
    }

    #[test]
    fn adapter_without_detector_is_demo_mode() {
        let mut adapter = PerceptionAdapter::new(Box::new(StubPoseEstimator::new()), None);
        assert!(adapter.is_demo_mode());

        let frame = Frame::new(vec![0; 12], 640, 480, 1, 0);
        let perception = adapter.run_inference(&frame.inference_view()).unwrap();
        assert_eq!(perception.poses.len(), 1);
        assert!(perception.equipment.is_empty());
    }

    #[test]
    fn adapter_with_detector_reports_equipment() {
        let mut adapter = PerceptionAdapter::new(
            Box::new(StubPoseEstimator::new()),
            Some(Box::new(StubEquipmentDetector::new())),
        );
        assert!(!adapter.is_demo_mode());
        assert_eq!(adapter.describe(), "pose=stub equipment=stub");

        let frame = Frame::new(vec![0; 12], 640, 480, 1, 0);
        let perception = adapter.run_inference(&frame.inference_view()).unwrap();
        assert!(!perception.equipment.is_empty());
    }
}
