pub mod replay;
pub mod stub;

pub use replay::{ReplayEquipmentDetector, ReplayLog, ReplayPoseEstimator};
pub use stub::{StubEquipmentDetector, StubPoseEstimator};
