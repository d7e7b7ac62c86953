//! Per-source frame processing cycle.
//!
//! frame -> scheduler -> [perception | cache] -> filter -> association ->
//! compliance -> dedup. One `SourcePipeline` per video source; `&mut self`
//! keeps a source's cycles strictly ordered.

use std::sync::Arc;

use crate::compliance::{evaluate_cycle, ComplianceVerdict};
use crate::dedup::EventDeduplicator;
use crate::filter::filter_equipment;
use crate::frame::Frame;
use crate::perception::PerceptionAdapter;
use crate::policy::PolicyStore;
use crate::render::DrawInstruction;
use crate::scheduler::{FrameDecision, FrameSkipScheduler};

/// Outcome of one cycle.
#[derive(Clone, Debug)]
pub struct CycleReport {
    pub seq: u64,
    pub timestamp_ms: u64,
    pub decision: FrameDecision,
    /// Every verdict of the cycle, for the live feed.
    pub verdicts: Vec<ComplianceVerdict>,
    /// Violations that passed dedup and should be persisted.
    pub events: Vec<ComplianceVerdict>,
    pub draw: Vec<DrawInstruction>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames: u64,
    pub idle_frames: u64,
    pub inference_cycles: u64,
    pub inference_failures: u64,
    pub verdicts: u64,
    pub events: u64,
}

pub struct SourcePipeline {
    source_id: String,
    scheduler: FrameSkipScheduler,
    perception: PerceptionAdapter,
    dedup: EventDeduplicator,
    policy: Arc<PolicyStore>,
    stats: PipelineStats,
}

impl SourcePipeline {
    pub fn new(
        source_id: impl Into<String>,
        scheduler: FrameSkipScheduler,
        perception: PerceptionAdapter,
        dedup: EventDeduplicator,
        policy: Arc<PolicyStore>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            scheduler,
            perception,
            dedup,
            policy,
            stats: PipelineStats::default(),
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn perception(&self) -> &PerceptionAdapter {
        &self.perception
    }

    pub fn perception_mut(&mut self) -> &mut PerceptionAdapter {
        &mut self.perception
    }

    pub fn dedup_mut(&mut self) -> &mut EventDeduplicator {
        &mut self.dedup
    }

    /// Run one cycle. Never fails: a perception error is logged and the
    /// previous observations are scored instead.
    pub fn process_frame(&mut self, frame: &Frame) -> CycleReport {
        let policy = self.policy.snapshot();
        let timestamp_ms = frame.captured_at_ms;
        self.stats.frames += 1;

        let decision = self.scheduler.decide(policy.active);
        let mut report = CycleReport {
            seq: frame.seq,
            timestamp_ms,
            decision,
            verdicts: Vec::new(),
            events: Vec::new(),
            draw: Vec::new(),
        };

        match decision {
            FrameDecision::Idle => {
                self.stats.idle_frames += 1;
                return report;
            }
            FrameDecision::Infer => {
                self.stats.inference_cycles += 1;
                match self.perception.run_inference(&frame.inference_view()) {
                    Ok(perception) => self.scheduler.store(perception),
                    Err(e) => {
                        self.stats.inference_failures += 1;
                        log::warn!(
                            "{}: perception failed on frame {}, scoring cached observations: {}",
                            self.source_id,
                            frame.seq,
                            e
                        );
                    }
                }
            }
            FrameDecision::Reuse => {}
        }

        let cached = self.scheduler.cached();
        let equipment = filter_equipment(&cached.equipment, &policy.thresholds);
        let evaluation =
            evaluate_cycle(&cached.poses, &equipment, &policy.required_gear, timestamp_ms);

        report.events = self
            .dedup
            .admit(&self.source_id, &evaluation.verdicts, timestamp_ms);
        report.verdicts = evaluation.verdicts;
        report.draw = evaluation.draw;

        self.stats.verdicts += report.verdicts.len() as u64;
        self.stats.events += report.events.len() as u64;
        report
    }
}
