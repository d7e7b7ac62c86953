use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};

use ppe_sentinel::perception::RawPose;
use ppe_sentinel::{
    ComplianceStatus, EquipmentDetector, EventDeduplicator, Frame, FrameDecision,
    FrameSkipScheduler, GearCategory, GearSet, InferenceView, PerceptionAdapter, PolicyStore,
    PoseEstimator, RawEquipmentObservation, BBox, SourcePipeline,
};

/// One worker at (0,0)-(100,200) with both wrists at y=150.
fn worker() -> RawPose {
    let mut keypoints = vec![None; 17];
    keypoints[9] = Some([20.0, 150.0]);
    keypoints[10] = Some([80.0, 150.0]);
    RawPose {
        track_id: Some(5),
        bbox: [0.0, 0.0, 100.0, 200.0],
        keypoints,
    }
}

fn gloves(score: f32) -> RawEquipmentObservation {
    RawEquipmentObservation {
        bbox: BBox::new(10.0, 140.0, 90.0, 160.0),
        label: "Gloves".to_string(),
        score,
    }
}

/// Pose estimator that records which frames it was run on and can fail on demand.
struct ScriptedPose {
    calls: Arc<Mutex<Vec<u64>>>,
    fail_on: Option<u64>,
}

impl PoseEstimator for ScriptedPose {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn track(&mut self, view: &InferenceView<'_>) -> Result<Vec<RawPose>> {
        self.calls.lock().unwrap().push(view.seq());
        if self.fail_on == Some(view.seq()) {
            return Err(anyhow!("tracker lost frame {}", view.seq()));
        }
        Ok(vec![worker()])
    }
}

struct ScriptedEquipment {
    score: f32,
}

impl EquipmentDetector for ScriptedEquipment {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _view: &InferenceView<'_>) -> Result<Vec<RawEquipmentObservation>> {
        Ok(vec![gloves(self.score)])
    }
}

struct Harness {
    pipeline: SourcePipeline,
    policy: Arc<PolicyStore>,
    calls: Arc<Mutex<Vec<u64>>>,
}

fn harness(equipment: bool, fail_on: Option<u64>) -> Harness {
    let policy = Arc::new(PolicyStore::default());
    policy
        .set_required_gear(GearSet::from([GearCategory::Gloves]))
        .unwrap();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let detector: Option<Box<dyn EquipmentDetector>> = if equipment {
        Some(Box::new(ScriptedEquipment { score: 0.9 }))
    } else {
        None
    };
    let pipeline = SourcePipeline::new(
        "cam:test",
        FrameSkipScheduler::new(2),
        PerceptionAdapter::new(
            Box::new(ScriptedPose {
                calls: Arc::clone(&calls),
                fail_on,
            }),
            detector,
        ),
        EventDeduplicator::new(Duration::from_secs(10), 64),
        Arc::clone(&policy),
    );
    Harness {
        pipeline,
        policy,
        calls,
    }
}

fn frame(seq: u64, ts_ms: u64) -> Frame {
    Frame::new(vec![0; 3], 640, 480, seq, ts_ms)
}

#[test]
fn gloved_worker_is_compliant() {
    let mut h = harness(true, None);
    let report = h.pipeline.process_frame(&frame(1, 0));

    assert_eq!(report.verdicts.len(), 1);
    let verdict = &report.verdicts[0];
    assert_eq!(verdict.track_id(), 5);
    assert!(verdict.detected().contains(&GearCategory::Gloves));
    assert_eq!(verdict.status(), ComplianceStatus::Compliant);
    assert!(report.events.is_empty());
    // Green gloves box then green person box.
    assert_eq!(report.draw.len(), 2);
    assert_eq!(report.draw[1].label, "ID:5 COMPLIANT");
}

#[test]
fn demo_mode_reports_full_required_set_missing() {
    let mut h = harness(false, None);
    h.policy.set_required_gear(GearCategory::all()).unwrap();

    let report = h.pipeline.process_frame(&frame(1, 0));
    let verdict = &report.verdicts[0];
    assert_eq!(verdict.status(), ComplianceStatus::Violation);
    assert!(verdict.detected().is_empty());
    assert_eq!(verdict.missing(), &GearCategory::all());
    assert_eq!(report.events.len(), 1);
}

#[test]
fn skipped_frames_reuse_cache_and_rescore_against_policy() {
    let mut h = harness(true, None);

    let decisions: Vec<FrameDecision> = (1..=3)
        .map(|seq| {
            if seq == 2 {
                // Change between frames 1 and 2: mask now required too.
                h.policy
                    .set_required_gear(GearSet::from([GearCategory::Gloves, GearCategory::Mask]))
                    .unwrap();
            }
            let report = h.pipeline.process_frame(&frame(seq, seq * 33));
            if seq == 1 {
                assert_eq!(report.verdicts[0].status(), ComplianceStatus::Compliant);
            } else {
                assert_eq!(
                    report.verdicts[0].missing(),
                    &GearSet::from([GearCategory::Mask])
                );
            }
            report.decision
        })
        .collect();

    assert_eq!(
        decisions,
        vec![FrameDecision::Infer, FrameDecision::Reuse, FrameDecision::Infer]
    );
    for seq in 4..=9 {
        h.pipeline.process_frame(&frame(seq, seq * 33));
    }
    assert_eq!(*h.calls.lock().unwrap(), vec![1, 3, 6, 9]);
}

#[test]
fn threshold_raise_applies_to_cached_equipment_next_frame() {
    let mut h = harness(true, None);
    assert_eq!(
        h.pipeline.process_frame(&frame(1, 0)).verdicts[0].status(),
        ComplianceStatus::Compliant
    );

    h.policy
        .set_category_threshold(GearCategory::Gloves, 0.95)
        .unwrap();
    let report = h.pipeline.process_frame(&frame(2, 33));
    assert_eq!(report.decision, FrameDecision::Reuse);
    assert_eq!(report.verdicts[0].status(), ComplianceStatus::Violation);
}

#[test]
fn violations_are_rate_limited_per_track() {
    let mut h = harness(false, None);
    let events: Vec<usize> = [(1, 0), (2, 5_000), (3, 11_000)]
        .into_iter()
        .map(|(seq, ts)| h.pipeline.process_frame(&frame(seq, ts)).events.len())
        .collect();
    assert_eq!(events, vec![1, 0, 1]);
    assert_eq!(h.pipeline.stats().events, 2);
}

#[test]
fn monitoring_toggle_discards_stale_cache() {
    let mut h = harness(true, None);
    h.pipeline.process_frame(&frame(1, 0));

    h.policy.set_active(false).unwrap();
    let idle = h.pipeline.process_frame(&frame(2, 33));
    assert_eq!(idle.decision, FrameDecision::Idle);
    assert!(idle.verdicts.is_empty());
    assert!(idle.draw.is_empty());

    h.policy.set_active(true).unwrap();
    let resumed = h.pipeline.process_frame(&frame(3, 66));
    assert_eq!(resumed.decision, FrameDecision::Reuse);
    assert!(resumed.verdicts.is_empty());
}

#[test]
fn perception_failure_keeps_previous_observations() {
    let mut h = harness(true, Some(3));
    h.pipeline.process_frame(&frame(1, 0));
    h.pipeline.process_frame(&frame(2, 33));

    let report = h.pipeline.process_frame(&frame(3, 66));
    assert_eq!(report.decision, FrameDecision::Infer);
    assert_eq!(report.verdicts.len(), 1);
    assert_eq!(report.verdicts[0].status(), ComplianceStatus::Compliant);
    assert_eq!(h.pipeline.stats().inference_failures, 1);

    // The next cycle is unaffected.
    let next = h.pipeline.process_frame(&frame(4, 99));
    assert_eq!(next.verdicts.len(), 1);
}
