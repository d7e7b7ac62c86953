//! Offline analysis of a recorded detections file.
//!
//! Every recorded frame is run through one `SourcePipeline` to completion.
//! Cooldowns follow the recording's own timeline, anchored at the wall clock
//! when the analysis starts, so persisted rows carry real timestamps and age
//! out under the normal retention window.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use crate::compliance::ComplianceVerdict;
use crate::dedup::{EventDeduplicator, DEFAULT_COOLDOWN, DEFAULT_MAX_KEYS};
use crate::ingest::{SyntheticConfig, SyntheticSource};
use crate::perception::{PerceptionAdapter, ReplayLog};
use crate::pipeline::SourcePipeline;
use crate::policy::PolicyStore;
use crate::scheduler::{FrameSkipScheduler, DEFAULT_SKIP_FRAMES};
use crate::storage::ViolationLogStore;

const ANALYSIS_WIDTH: u32 = 1280;
const ANALYSIS_HEIGHT: u32 = 720;

#[derive(Clone, Debug)]
pub struct AnalysisSettings {
    pub skip_frames: u32,
    pub cooldown: Duration,
    /// Frame rate of the recording.
    pub fps: u32,
    /// Score recorded equipment; `false` runs in demo mode.
    pub equipment: bool,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            skip_frames: DEFAULT_SKIP_FRAMES,
            cooldown: DEFAULT_COOLDOWN,
            fps: 30,
            equipment: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AnalysisOutcome {
    pub frames: u64,
    pub inference_cycles: u64,
    /// Persisted violations in frame order.
    pub events: Vec<ComplianceVerdict>,
}

/// Run `replay` to completion under `policy`, appending violations to `store`
/// as `source_id`. `on_frame` receives the running event count after each frame.
pub fn analyze_recording<S: ViolationLogStore + ?Sized>(
    replay: Arc<ReplayLog>,
    source_id: &str,
    policy: Arc<PolicyStore>,
    settings: &AnalysisSettings,
    store: &mut S,
    mut on_frame: impl FnMut(usize),
) -> Result<AnalysisOutcome> {
    let total_frames = replay.last_frame();
    let mut pipeline = SourcePipeline::new(
        source_id,
        FrameSkipScheduler::new(settings.skip_frames),
        PerceptionAdapter::replay(replay, settings.equipment),
        EventDeduplicator::new(settings.cooldown, DEFAULT_MAX_KEYS),
        policy,
    );
    let mut source = SyntheticSource::new(SyntheticConfig {
        url: format!("stub://{}", source_id),
        target_fps: settings.fps,
        width: ANALYSIS_WIDTH,
        height: ANALYSIS_HEIGHT,
        frame_limit: Some(total_frames),
        start_ms: crate::now_ms()?,
        live_clock: false,
    })?;
    source.connect()?;

    let mut events = Vec::new();
    while let Some(frame) = source.next_frame()? {
        let report = pipeline.process_frame(&frame);
        if !report.events.is_empty() {
            store.append_verdicts(&report.events, source_id)?;
            events.extend(report.events);
        }
        on_frame(events.len());
    }

    let stats = pipeline.stats();
    Ok(AnalysisOutcome {
        frames: stats.frames,
        inference_cycles: stats.inference_cycles,
        events,
    })
}
