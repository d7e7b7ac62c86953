//! Observation types produced by the perception adapter.

use serde::{Deserialize, Serialize};

/// Axis-aligned box in pixel coordinates, (x1, y1) top-left and (x2, y2) bottom-right.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn from_xyxy(xyxy: [f32; 4]) -> Self {
        Self::new(xyxy[0], xyxy[1], xyxy[2], xyxy[3])
    }

    /// True when the intersection has strictly positive extent on both axes.
    ///
    /// Boxes that only share an edge or a corner do not overlap.
    pub fn overlaps(&self, other: &BBox) -> bool {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        ix2 > ix1 && iy2 > iy1
    }

    /// Strict containment: a point on the boundary is outside.
    pub fn contains_strict(&self, point: Point) -> bool {
        self.x1 < point.x && point.x < self.x2 && self.y1 < point.y && point.y < self.y2
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// One tracked person for one inference cycle.
///
/// `track_id` comes from the external tracker and may be recycled after
/// occlusion or re-entry; treat it as a weak reference, not an identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseObservation {
    pub track_id: u32,
    pub bbox: BBox,
    /// Ordered COCO keypoints; `None` where the model saw nothing.
    pub keypoints: Vec<Option<Point>>,
}

impl PoseObservation {
    /// Keypoint at `index`, or `None` when absent or out of range.
    pub fn keypoint(&self, index: usize) -> Option<Point> {
        self.keypoints.get(index).copied().flatten()
    }
}

/// Equipment detection as emitted by the detector, before thresholding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawEquipmentObservation {
    pub bbox: BBox,
    pub label: String,
    pub score: f32,
}
