//! analyze_video - Run a recorded video's detections through the compliance engine
//!
//! Reads a JSON-lines file of per-frame pose and equipment detections (as
//! produced by an offline model run over the video), processes every frame to
//! completion with monitoring forced on, persists deduplicated violations under
//! `video:<file name>` and prints a JSON summary on stdout.

use anyhow::{anyhow, Result};
use clap::Parser;
use serde::Serialize;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ppe_sentinel::gear::parse_gear_list;
use ppe_sentinel::{
    analyze_recording, sanitize_source_name, AnalysisSettings, ComplianceVerdict, Policy,
    PolicyStore, ReplayLog, SqliteViolationLogStore,
};

#[path = "../ui.rs"]
mod ui;

/// Events included in the printed summary.
const SUMMARY_EVENT_LIMIT: usize = 50;

#[derive(Parser, Debug)]
#[command(
    name = "analyze_video",
    about = "Score a recorded detections file for PPE compliance and log violations"
)]
struct Args {
    /// JSON-lines file of recorded per-frame detections
    #[arg(long, value_name = "PATH")]
    replay: PathBuf,

    /// Name used for the source id (defaults to the replay file name)
    #[arg(long)]
    name: Option<String>,

    /// Path to the violation log SQLite DB
    #[arg(long, env = "SENTINEL_DB_PATH", default_value = "ppe_sentinel.db")]
    db_path: String,

    /// Frames of cached observations between inference runs
    #[arg(long, env = "SENTINEL_SKIP_FRAMES", default_value_t = 2)]
    skip_frames: u32,

    /// Minimum seconds between logged violations of the same person
    #[arg(long, env = "SENTINEL_COOLDOWN_SECS", default_value_t = 10)]
    cooldown_secs: u64,

    /// Required gear, comma separated (default: all)
    #[arg(long, env = "SENTINEL_REQUIRED_GEAR", value_delimiter = ',')]
    required_gear: Vec<String>,

    /// General confidence floor
    #[arg(long, env = "SENTINEL_CONFIDENCE")]
    confidence: Option<f32>,

    /// Frame rate of the recording (sets the virtual timeline)
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Ignore recorded equipment (pose only, demo mode)
    #[arg(long)]
    no_equipment: bool,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

#[derive(Serialize)]
struct EventSummary {
    source: String,
    #[serde(flatten)]
    verdict: ComplianceVerdict,
}

#[derive(Serialize)]
struct AnalysisSummary {
    source: String,
    total_frames: u64,
    inference_cycles: u64,
    events_logged: u64,
    events: Vec<EventSummary>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let name = match &args.name {
        Some(name) => name.clone(),
        None => args
            .replay
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("replay path has no file name"))?,
    };
    let source_id = sanitize_source_name("video", &name);

    let replay = {
        let _stage = ui.stage("Load recorded detections");
        ReplayLog::open(&args.replay)?
    };
    let mut store = {
        let _stage = ui.stage("Open database");
        SqliteViolationLogStore::open(&args.db_path)?
    };

    let mut policy = Policy {
        active: true,
        ..Policy::default()
    };
    if let Some(confidence) = args.confidence {
        policy.thresholds.general = confidence;
    }
    if !args.required_gear.is_empty() {
        policy.required_gear = parse_gear_list(&args.required_gear)?;
    }
    let policy = Arc::new(PolicyStore::new(policy)?);

    let settings = AnalysisSettings {
        skip_frames: args.skip_frames,
        cooldown: Duration::from_secs(args.cooldown_secs),
        fps: args.fps,
        equipment: !args.no_equipment,
    };
    let outcome = {
        let _stage = ui.stage("Process frames");
        let mut progress = ui.frames(replay.last_frame());
        let outcome = analyze_recording(
            replay,
            &source_id,
            policy,
            &settings,
            &mut store,
            |events| progress.tick(events as u64),
        )?;
        progress.finish();
        outcome
    };

    let summary = AnalysisSummary {
        source: source_id.clone(),
        total_frames: outcome.frames,
        inference_cycles: outcome.inference_cycles,
        events_logged: outcome.events.len() as u64,
        events: outcome
            .events
            .into_iter()
            .take(SUMMARY_EVENT_LIMIT)
            .map(|verdict| EventSummary {
                source: source_id.clone(),
                verdict,
            })
            .collect(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
