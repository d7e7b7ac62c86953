use anyhow::Result;

use crate::frame::InferenceView;
use crate::gear::{
    KP_LEFT_SHOULDER, KP_LEFT_WRIST, KP_NOSE, KP_RIGHT_HIP, KP_RIGHT_WRIST, POSE_KEYPOINT_COUNT,
};
use crate::observation::{BBox, Point, RawEquipmentObservation};
use crate::perception::backend::{EquipmentDetector, PoseEstimator, RawPose};

/// Keypoint positions as fractions of the person box, COCO order.
const BODY_LAYOUT: [(f32, f32); POSE_KEYPOINT_COUNT] = [
    (0.50, 0.08), // nose
    (0.45, 0.06), // left eye
    (0.55, 0.06), // right eye
    (0.40, 0.08), // left ear
    (0.60, 0.08), // right ear
    (0.30, 0.22), // left shoulder
    (0.70, 0.22), // right shoulder
    (0.22, 0.38), // left elbow
    (0.78, 0.38), // right elbow
    (0.18, 0.52), // left wrist
    (0.82, 0.52), // right wrist
    (0.38, 0.55), // left hip
    (0.62, 0.55), // right hip
    (0.38, 0.75), // left knee
    (0.62, 0.75), // right knee
    (0.38, 0.95), // left ankle
    (0.62, 0.95), // right ankle
];

const STUB_TRACK_ID: i64 = 1;

/// The single worker of the stub scene: centred, a quarter of the frame wide.
fn worker_box(width: u32, height: u32) -> BBox {
    let (w, h) = (width as f32, height as f32);
    BBox::new(w * 0.375, h * 0.15, w * 0.625, h * 0.85)
}

fn body_point(person: &BBox, index: usize) -> Point {
    let (fx, fy) = BODY_LAYOUT[index];
    Point::new(
        person.x1 + (person.x2 - person.x1) * fx,
        person.y1 + (person.y2 - person.y1) * fy,
    )
}

/// Box of half-extent (`fx`, `fy`) person-box fractions around a body point.
fn around(person: &BBox, center: Point, fx: f32, fy: f32) -> BBox {
    let dx = (person.x2 - person.x1) * fx;
    let dy = (person.y2 - person.y1) * fy;
    BBox::new(center.x - dx, center.y - dy, center.x + dx, center.y + dy)
}

/// Stub tracker: one worker standing still in the middle of the frame.
#[derive(Default)]
pub struct StubPoseEstimator;

impl StubPoseEstimator {
    pub fn new() -> Self {
        Self
    }
}

impl PoseEstimator for StubPoseEstimator {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn track(&mut self, view: &InferenceView<'_>) -> Result<Vec<RawPose>> {
        let person = worker_box(view.width(), view.height());
        let keypoints = (0..POSE_KEYPOINT_COUNT)
            .map(|idx| {
                let p = body_point(&person, idx);
                Some([p.x, p.y])
            })
            .collect();
        Ok(vec![RawPose {
            track_id: Some(STUB_TRACK_ID),
            bbox: [person.x1, person.y1, person.x2, person.y2],
            keypoints,
        }])
    }
}

/// Stub detector: the worker wears coverall, gloves and a mask, but no eye
/// protection, so a full requirement set reports goggles and face shield missing.
#[derive(Default)]
pub struct StubEquipmentDetector;

impl StubEquipmentDetector {
    pub fn new() -> Self {
        Self
    }
}

impl EquipmentDetector for StubEquipmentDetector {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, view: &InferenceView<'_>) -> Result<Vec<RawEquipmentObservation>> {
        let person = worker_box(view.width(), view.height());
        let shoulder = body_point(&person, KP_LEFT_SHOULDER);
        let hip = body_point(&person, KP_RIGHT_HIP);
        let coverall = BBox::new(shoulder.x - 4.0, shoulder.y - 4.0, hip.x + 4.0, hip.y + 4.0);

        Ok(vec![
            RawEquipmentObservation {
                bbox: coverall,
                label: "Coverall".to_string(),
                score: 0.82,
            },
            RawEquipmentObservation {
                bbox: around(&person, body_point(&person, KP_LEFT_WRIST), 0.06, 0.04),
                label: "Gloves".to_string(),
                score: 0.71,
            },
            RawEquipmentObservation {
                bbox: around(&person, body_point(&person, KP_RIGHT_WRIST), 0.06, 0.04),
                label: "Gloves".to_string(),
                score: 0.66,
            },
            RawEquipmentObservation {
                bbox: around(&person, body_point(&person, KP_NOSE), 0.08, 0.03),
                label: "Mask".to_string(),
                score: 0.44,
            },
        ])
    }
}
