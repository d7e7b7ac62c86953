use anyhow::Result;
use serde::Deserialize;

use crate::frame::InferenceView;
use crate::observation::RawEquipmentObservation;

/// Pose as emitted by a tracker, before normalisation.
///
/// Trackers may omit ids on the first frames of a track, and emit `null`
/// for keypoints they could not place.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct RawPose {
    #[serde(default)]
    pub track_id: Option<i64>,
    pub bbox: [f32; 4],
    #[serde(default)]
    pub keypoints: Vec<Option<[f32; 2]>>,
}

/// Pose estimation + tracking model.
///
/// # Boundary
///
/// Implementations receive the frame pixels through `InferenceView` and must
/// not keep them past the call. Blocking on the model is allowed; the
/// pipeline has no timeout and a stalled backend stalls its source.
pub trait PoseEstimator: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Detect and track people in the frame.
    fn track(&mut self, view: &InferenceView<'_>) -> Result<Vec<RawPose>>;
}

/// Protective-equipment detection model.
pub trait EquipmentDetector: Send {
    fn name(&self) -> &'static str;

    fn detect(&mut self, view: &InferenceView<'_>) -> Result<Vec<RawEquipmentObservation>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
