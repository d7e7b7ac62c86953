//! Replay of recorded detections.
//!
//! A replay file is JSON lines, one record per frame number, as written by an
//! offline run of the pose and equipment models:
//!
//! ```text
//! {"frame": 1, "poses": [{"track_id": 3, "bbox": [0,0,100,200], "keypoints": [[50,20], null]}],
//!  "equipment": [{"bbox": [10,140,90,160], "label": "Gloves", "score": 0.9}]}
//! ```
//!
//! Equipment may carry a model `class_id` instead of a `label`. Frames with no
//! record produce no observations. Blank lines and `#` comments are skipped.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use crate::frame::InferenceView;
use crate::gear::{equipment_label_for_class, UNKNOWN_EQUIPMENT_LABEL};
use crate::observation::{BBox, RawEquipmentObservation};
use crate::perception::backend::{EquipmentDetector, PoseEstimator, RawPose};

#[derive(Debug, Deserialize)]
struct ReplayRecord {
    frame: u64,
    #[serde(default)]
    poses: Vec<RawPose>,
    #[serde(default)]
    equipment: Vec<RecordedEquipment>,
}

#[derive(Debug, Deserialize)]
struct RecordedEquipment {
    bbox: [f32; 4],
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    class_id: Option<u32>,
    score: f32,
}

impl RecordedEquipment {
    fn into_observation(self) -> RawEquipmentObservation {
        let label = match (self.label, self.class_id) {
            (Some(label), _) => label,
            (None, Some(class_id)) => equipment_label_for_class(class_id).to_string(),
            (None, None) => UNKNOWN_EQUIPMENT_LABEL.to_string(),
        };
        RawEquipmentObservation {
            bbox: BBox::from_xyxy(self.bbox),
            label,
            score: self.score,
        }
    }
}

#[derive(Debug, Default)]
struct ReplayFrame {
    poses: Vec<RawPose>,
    equipment: Vec<RawEquipmentObservation>,
}

/// Recorded detections indexed by frame number.
#[derive(Debug, Default)]
pub struct ReplayLog {
    frames: BTreeMap<u64, ReplayFrame>,
}

impl ReplayLog {
    pub fn open(path: &Path) -> Result<Arc<Self>> {
        let file = std::fs::File::open(path)
            .map_err(|e| anyhow!("failed to open replay file {}: {}", path.display(), e))?;
        let log = Self::from_reader(file)
            .map_err(|e| anyhow!("invalid replay file {}: {}", path.display(), e))?;
        Ok(Arc::new(log))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut frames = BTreeMap::new();
        for (idx, line) in BufReader::new(reader).lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let record: ReplayRecord = serde_json::from_str(trimmed)
                .map_err(|e| anyhow!("line {}: {}", idx + 1, e))?;
            let entry: &mut ReplayFrame = frames.entry(record.frame).or_default();
            entry.poses.extend(record.poses);
            entry.equipment.extend(
                record
                    .equipment
                    .into_iter()
                    .map(RecordedEquipment::into_observation),
            );
        }
        Ok(Self { frames })
    }

    /// Highest recorded frame number (0 when empty).
    pub fn last_frame(&self) -> u64 {
        self.frames.keys().next_back().copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn poses(&self, frame: u64) -> Vec<RawPose> {
        self.frames
            .get(&frame)
            .map(|f| f.poses.clone())
            .unwrap_or_default()
    }

    fn equipment(&self, frame: u64) -> Vec<RawEquipmentObservation> {
        self.frames
            .get(&frame)
            .map(|f| f.equipment.clone())
            .unwrap_or_default()
    }
}

/// Pose estimator serving recorded poses by frame sequence number.
pub struct ReplayPoseEstimator {
    log: Arc<ReplayLog>,
}

impl ReplayPoseEstimator {
    pub fn new(log: Arc<ReplayLog>) -> Self {
        Self { log }
    }
}

impl PoseEstimator for ReplayPoseEstimator {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn track(&mut self, view: &InferenceView<'_>) -> Result<Vec<RawPose>> {
        Ok(self.log.poses(view.seq()))
    }
}

/// Equipment detector serving recorded detections by frame sequence number.
pub struct ReplayEquipmentDetector {
    log: Arc<ReplayLog>,
}

impl ReplayEquipmentDetector {
    pub fn new(log: Arc<ReplayLog>) -> Self {
        Self { log }
    }
}

impl EquipmentDetector for ReplayEquipmentDetector {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn detect(&mut self, view: &InferenceView<'_>) -> Result<Vec<RawEquipmentObservation>> {
        Ok(self.log.equipment(view.seq()))
    }
}
