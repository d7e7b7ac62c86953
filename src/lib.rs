//! PPE Sentinel
//!
//! Fusion, caching and decision engine for protective-equipment compliance
//! monitoring. Two perception signals (pose tracking and equipment detection)
//! are fused into one verdict per tracked person per frame, and violations are
//! rate-limited before they are persisted.
//!
//! # Cycle
//!
//! Frame → `FrameSkipScheduler` → [`PerceptionAdapter` | cache] →
//! `filter_equipment` → `associate` → `evaluate_cycle` → `EventDeduplicator`
//! → `ViolationLogStore` / `LiveFeed`.
//!
//! `SourcePipeline` runs that cycle for one source. The `PolicyStore` is the
//! only state shared between sources.
//!
//! # Module Structure
//!
//! - `gear`, `observation`: equipment catalogue and perception data types
//! - `perception`: model boundary (traits, stub and replay backends)
//! - `scheduler`, `filter`, `association`, `compliance`, `dedup`: the core
//! - `policy`: hot-swappable policy with file reload
//! - `storage`, `feed`: persistence and the transient display buffer
//! - `config`, `ingest`: daemon configuration and frame sources
//! - `analysis`, `housekeeping`: offline recordings and daemon upkeep

use anyhow::{anyhow, Result};
use rand::RngCore;
use rusqlite::{Connection, OpenFlags};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

pub mod analysis;
pub mod association;
pub mod compliance;
pub mod config;
pub mod dedup;
pub mod feed;
pub mod filter;
pub mod frame;
pub mod gear;
pub mod housekeeping;
pub mod ingest;
pub mod observation;
pub mod perception;
pub mod pipeline;
pub mod policy;
pub mod render;
pub mod scheduler;
pub mod storage;

pub use analysis::{analyze_recording, AnalysisOutcome, AnalysisSettings};
pub use association::{associate, Association, Attribution};
pub use compliance::{evaluate_cycle, ComplianceStatus, ComplianceVerdict, CycleEvaluation};
pub use config::{SentinelConfig, SourceSettings};
pub use dedup::{DedupKey, EventDeduplicator};
pub use feed::{FeedEntry, FeedStats, LiveFeed, FEED_CAPACITY};
pub use filter::filter_equipment;
pub use frame::{Frame, InferenceView};
pub use gear::{GearCategory, GearSet};
pub use housekeeping::{Housekeeping, HousekeepingReport};
pub use ingest::{SyntheticConfig, SyntheticSource};
pub use observation::{BBox, Point, PoseObservation, RawEquipmentObservation};
pub use perception::{
    EquipmentDetector, Perception, PerceptionAdapter, PoseEstimator, ReplayEquipmentDetector,
    ReplayLog, ReplayPoseEstimator, StubEquipmentDetector, StubPoseEstimator,
};
pub use pipeline::{CycleReport, PipelineStats, SourcePipeline};
pub use policy::{ConfidenceThresholds, Policy, PolicyFile, PolicyStore, PolicyWatcher};
pub use render::{DrawInstruction, Rgb};
pub use scheduler::{FrameDecision, FrameSkipScheduler};
pub use storage::{
    GearSummary, InMemoryViolationLogStore, LogQuery, LogRecord, SqliteViolationLogStore,
    ViolationLogStore,
};

pub fn shared_memory_uri() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!(
        "file:ppe_sentinel_{:x}?mode=memory&cache=shared",
        u64::from_le_bytes(bytes)
    )
}

pub(crate) fn open_db_connection(db_path: &str) -> Result<Connection> {
    if db_path.starts_with("file:") {
        return Ok(Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        )?);
    }
    Ok(Connection::open(db_path)?)
}

/// Wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> Result<u64> {
    let elapsed = SystemTime::now().duration_since(UNIX_EPOCH)?;
    u64::try_from(elapsed.as_millis()).map_err(|_| anyhow!("system time out of range"))
}

// -------------------- Source identifiers --------------------

/// Source ids are `<kind>:<name>`, e.g. `cam:loading_dock` or `video:shift_2.mp4`.
pub fn validate_source_id(source_id: &str) -> Result<()> {
    static SOURCE_ID_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = SOURCE_ID_RE
        .get_or_init(|| regex::Regex::new(r"^[a-z0-9]+:[a-z0-9_.-]{1,96}$").unwrap());

    let sid = source_id.to_lowercase();
    if !re.is_match(&sid) {
        return Err(anyhow!(
            "source id must match ^[a-z0-9]+:[a-z0-9_.-]{{1,96}}$ (got {:?})",
            source_id
        ));
    }
    Ok(())
}

/// Build a valid source id from a free-form name (an uploaded file name, say).
pub fn sanitize_source_name(kind: &str, name: &str) -> String {
    let mut cleaned: String = name
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(96)
        .collect();
    if cleaned.is_empty() {
        cleaned.push_str("unnamed");
    }
    format!("{}:{}", kind, cleaned)
}
