use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::dedup::{DEFAULT_COOLDOWN, DEFAULT_MAX_KEYS};
use crate::gear::{parse_gear_list, GearCategory, GearSet};
use crate::ingest::SyntheticConfig;
use crate::perception::ReplayLog;
use crate::policy::{ConfidenceThresholds, Policy, DEFAULT_GENERAL_CONFIDENCE};
use crate::scheduler::DEFAULT_SKIP_FRAMES;

const DEFAULT_DB_PATH: &str = "ppe_sentinel.db";
const DEFAULT_SOURCE_ID: &str = "cam:main";
const DEFAULT_SOURCE_URL: &str = "stub://main_camera";
const DEFAULT_SOURCE_FPS: u32 = 10;
const DEFAULT_SOURCE_WIDTH: u32 = 1280;
const DEFAULT_SOURCE_HEIGHT: u32 = 720;
const DEFAULT_RETENTION_SECS: u64 = 60 * 60 * 24 * 30;

#[derive(Debug, Deserialize, Default)]
struct SentinelConfigFile {
    db_path: Option<String>,
    scheduler: Option<SchedulerConfigFile>,
    dedup: Option<DedupConfigFile>,
    policy: Option<PolicyConfigFile>,
    sources: Option<Vec<SourceConfigFile>>,
    retention: Option<RetentionConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SchedulerConfigFile {
    skip_frames: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DedupConfigFile {
    cooldown_secs: Option<u64>,
    max_keys: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct PolicyConfigFile {
    active: Option<bool>,
    confidence: Option<f32>,
    class_thresholds: Option<BTreeMap<String, f32>>,
    required_gear: Option<Vec<String>>,
    watch_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    id: Option<String>,
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    replay_path: Option<PathBuf>,
    equipment: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct RetentionConfigFile {
    seconds: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct SentinelConfig {
    pub db_path: String,
    pub skip_frames: u32,
    pub cooldown: Duration,
    pub dedup_max_keys: usize,
    pub policy: PolicySettings,
    pub sources: Vec<SourceSettings>,
    pub retention: Duration,
}

#[derive(Debug, Clone)]
pub struct PolicySettings {
    pub active: bool,
    pub confidence: f32,
    pub class_thresholds: BTreeMap<GearCategory, f32>,
    pub required_gear: GearSet,
    pub watch_path: Option<PathBuf>,
}

impl PolicySettings {
    pub fn initial_policy(&self) -> Policy {
        Policy {
            active: self.active,
            thresholds: ConfidenceThresholds {
                general: self.confidence,
                per_category: self.class_thresholds.clone(),
            },
            required_gear: self.required_gear.clone(),
            version: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub id: String,
    pub url: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
    /// Recorded detections served as perception output.
    pub replay_path: Option<PathBuf>,
    /// Run with an equipment detector; `false` is demo mode.
    pub equipment: bool,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            id: DEFAULT_SOURCE_ID.to_string(),
            url: DEFAULT_SOURCE_URL.to_string(),
            target_fps: DEFAULT_SOURCE_FPS,
            width: DEFAULT_SOURCE_WIDTH,
            height: DEFAULT_SOURCE_HEIGHT,
            replay_path: None,
            equipment: true,
        }
    }
}

impl SourceSettings {
    /// Frame source for the daemon. Frames carry the wall clock; a replay
    /// source ends after its last recorded frame.
    pub fn synthetic_config(&self, replay: Option<&ReplayLog>) -> Result<SyntheticConfig> {
        Ok(SyntheticConfig {
            url: self.url.clone(),
            target_fps: self.target_fps,
            width: self.width,
            height: self.height,
            frame_limit: replay.map(ReplayLog::last_frame),
            start_ms: crate::now_ms()?,
            live_clock: true,
        })
    }
}

impl SentinelConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SENTINEL_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SentinelConfigFile) -> Result<Self> {
        let db_path = file.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
        let skip_frames = file
            .scheduler
            .and_then(|scheduler| scheduler.skip_frames)
            .unwrap_or(DEFAULT_SKIP_FRAMES);
        let cooldown = file
            .dedup
            .as_ref()
            .and_then(|dedup| dedup.cooldown_secs)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_COOLDOWN);
        let dedup_max_keys = file
            .dedup
            .and_then(|dedup| dedup.max_keys)
            .unwrap_or(DEFAULT_MAX_KEYS);

        let policy_file = file.policy.unwrap_or_default();
        let defaults = ConfidenceThresholds::default();
        let class_thresholds = match policy_file.class_thresholds {
            Some(raw) => parse_class_thresholds(&raw)?,
            None => defaults.per_category,
        };
        let required_gear = match policy_file.required_gear {
            Some(names) => parse_gear_list(&names)?,
            None => GearCategory::all(),
        };
        let policy = PolicySettings {
            active: policy_file.active.unwrap_or(true),
            confidence: policy_file
                .confidence
                .unwrap_or(DEFAULT_GENERAL_CONFIDENCE),
            class_thresholds,
            required_gear,
            watch_path: policy_file.watch_path,
        };

        let sources = match file.sources {
            Some(sources) => sources.into_iter().map(source_from_file).collect(),
            None => vec![SourceSettings::default()],
        };
        let retention = Duration::from_secs(
            file.retention
                .and_then(|retention| retention.seconds)
                .unwrap_or(DEFAULT_RETENTION_SECS),
        );
        Ok(Self {
            db_path,
            skip_frames,
            cooldown,
            dedup_max_keys,
            policy,
            sources,
            retention,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("SENTINEL_DB_PATH") {
            if !path.trim().is_empty() {
                self.db_path = path;
            }
        }
        if let Ok(url) = std::env::var("SENTINEL_SOURCE_URL") {
            if !url.trim().is_empty() {
                match self.sources.first_mut() {
                    Some(source) => source.url = url,
                    None => self.sources.push(SourceSettings {
                        url,
                        ..SourceSettings::default()
                    }),
                }
            }
        }
        if let Ok(skip) = std::env::var("SENTINEL_SKIP_FRAMES") {
            self.skip_frames = skip
                .trim()
                .parse()
                .map_err(|_| anyhow!("SENTINEL_SKIP_FRAMES must be a non-negative integer"))?;
        }
        if let Ok(cooldown) = std::env::var("SENTINEL_COOLDOWN_SECS") {
            let seconds: u64 = cooldown.trim().parse().map_err(|_| {
                anyhow!("SENTINEL_COOLDOWN_SECS must be an integer number of seconds")
            })?;
            self.cooldown = Duration::from_secs(seconds);
        }
        if let Ok(confidence) = std::env::var("SENTINEL_CONFIDENCE") {
            self.policy.confidence = confidence
                .trim()
                .parse()
                .map_err(|_| anyhow!("SENTINEL_CONFIDENCE must be a number"))?;
        }
        if let Ok(gear) = std::env::var("SENTINEL_REQUIRED_GEAR") {
            self.policy.required_gear = parse_gear_list(&split_csv(&gear))?;
        }
        if let Ok(path) = std::env::var("SENTINEL_POLICY_PATH") {
            if !path.trim().is_empty() {
                self.policy.watch_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(retention) = std::env::var("SENTINEL_RETENTION_SECS") {
            let seconds: u64 = retention.trim().parse().map_err(|_| {
                anyhow!("SENTINEL_RETENTION_SECS must be an integer number of seconds")
            })?;
            self.retention = Duration::from_secs(seconds);
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(anyhow!("at least one source must be configured"));
        }
        for source in &mut self.sources {
            crate::validate_source_id(&source.id)?;
            source.id = source.id.to_lowercase();
            if source.target_fps == 0 {
                return Err(anyhow!("source {}: target_fps must be > 0", source.id));
            }
            if source.width == 0 || source.height == 0 {
                return Err(anyhow!("source {}: frame size must be non-zero", source.id));
            }
        }
        let mut ids: Vec<&str> = self.sources.iter().map(|s| s.id.as_str()).collect();
        ids.sort_unstable();
        if ids.windows(2).any(|pair| pair[0] == pair[1]) {
            return Err(anyhow!("source ids must be unique"));
        }

        self.policy.initial_policy().validate()?;

        if self.cooldown.is_zero() {
            return Err(anyhow!("dedup cooldown must be greater than zero"));
        }
        if self.dedup_max_keys == 0 {
            return Err(anyhow!("dedup max_keys must be greater than zero"));
        }
        if self.retention.as_secs() == 0 {
            return Err(anyhow!("retention must be greater than zero"));
        }
        Ok(())
    }
}

fn source_from_file(file: SourceConfigFile) -> SourceSettings {
    let defaults = SourceSettings::default();
    SourceSettings {
        id: file.id.unwrap_or(defaults.id),
        url: file.url.unwrap_or(defaults.url),
        target_fps: file.target_fps.unwrap_or(defaults.target_fps),
        width: file.width.unwrap_or(defaults.width),
        height: file.height.unwrap_or(defaults.height),
        replay_path: file.replay_path,
        equipment: file.equipment.unwrap_or(defaults.equipment),
    }
}

/// Parse `{gear name: threshold}` keyed by canonical gear names.
pub fn parse_class_thresholds(raw: &BTreeMap<String, f32>) -> Result<BTreeMap<GearCategory, f32>> {
    raw.iter()
        .map(|(name, threshold)| Ok((name.trim().parse::<GearCategory>()?, *threshold)))
        .collect()
}

fn read_config_file(path: &Path) -> Result<SentinelConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path.extension().is_some_and(|ext| ext == "toml");
    let cfg: SentinelConfigFile = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

pub fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
