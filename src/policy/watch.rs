use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::{ConfidenceThresholds, Policy, PolicyStore};
use crate::config::parse_class_thresholds;
use crate::gear::parse_gear_list;

/// Partial policy as written by operators. Absent fields keep their current value.
#[derive(Debug, Default, Deserialize)]
pub struct PolicyFile {
    pub active: Option<bool>,
    pub confidence: Option<f32>,
    pub class_thresholds: Option<BTreeMap<String, f32>>,
    pub required_gear: Option<Vec<String>>,
}

impl PolicyFile {
    pub fn read(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read policy file {}: {}", path.display(), e))?;
        let parsed: Result<Self> = if path.extension().is_some_and(|ext| ext == "toml") {
            toml::from_str(&raw).map_err(|e| anyhow!("{}", e))
        } else {
            serde_json::from_str(&raw).map_err(|e| anyhow!("{}", e))
        };
        parsed.map_err(|e| anyhow!("invalid policy file {}: {}", path.display(), e))
    }

    /// Overlay this file on `base`, producing a complete policy.
    pub fn apply_to(&self, base: &Policy) -> Result<Policy> {
        let mut next = base.clone();
        if let Some(active) = self.active {
            next.active = active;
        }
        if let Some(general) = self.confidence {
            next.thresholds.general = general;
        }
        if let Some(overrides) = &self.class_thresholds {
            next.thresholds = ConfidenceThresholds {
                general: next.thresholds.general,
                per_category: parse_class_thresholds(overrides)?,
            };
        }
        if let Some(required) = &self.required_gear {
            next.required_gear = parse_gear_list(required)?;
        }
        next.validate()?;
        Ok(next)
    }
}

/// Polls a policy file and swaps it into the store when it changes on disk.
pub struct PolicyWatcher {
    path: PathBuf,
    last_modified: Option<SystemTime>,
}

impl PolicyWatcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_modified: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply the file if its modification time moved. Returns true when the
    /// store was updated. A missing file is not an error: nothing to apply.
    pub fn poll(&mut self, store: &PolicyStore) -> Result<bool> {
        let modified = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.modified()?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                return Err(anyhow!(
                    "failed to stat policy file {}: {}",
                    self.path.display(),
                    e
                ))
            }
        };
        if self.last_modified == Some(modified) {
            return Ok(false);
        }
        // Record the mtime first so a broken file is reported once, not every poll.
        self.last_modified = Some(modified);

        let file = PolicyFile::read(&self.path)?;
        let version = store.apply_file(&file)?;
        log::info!(
            "policy reloaded from {} (version {})",
            self.path.display(),
            version
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gear::GearCategory;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_unspecified_fields() {
        let file = PolicyFile {
            required_gear: Some(vec!["gloves".to_string()]),
            ..PolicyFile::default()
        };
        let base = Policy::default();
        let next = file.apply_to(&base).unwrap();

        assert_eq!(next.required_gear.len(), 1);
        assert!(next.required_gear.contains(&GearCategory::Gloves));
        assert_eq!(next.thresholds, base.thresholds);
        assert_eq!(next.active, base.active);
    }

    #[test]
    fn class_thresholds_replace_overrides() {
        let file = PolicyFile {
            confidence: Some(0.5),
            class_thresholds: Some([("mask".to_string(), 0.2)].into_iter().collect()),
            ..PolicyFile::default()
        };
        let next = file.apply_to(&Policy::default()).unwrap();

        assert_eq!(next.thresholds.threshold_for(Some(GearCategory::Mask)), 0.2);
        assert_eq!(
            next.thresholds.threshold_for(Some(GearCategory::Gloves)),
            0.5
        );
    }

    #[test]
    fn rejects_unknown_gear_and_bad_thresholds() {
        let unknown = PolicyFile {
            required_gear: Some(vec!["boots".to_string()]),
            ..PolicyFile::default()
        };
        assert!(unknown.apply_to(&Policy::default()).is_err());

        let bad = PolicyFile {
            confidence: Some(3.0),
            ..PolicyFile::default()
        };
        assert!(bad.apply_to(&Policy::default()).is_err());
    }

    #[test]
    fn watcher_applies_file_once_per_change() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(br#"{"active": false, "required_gear": ["mask"]}"#)
            .unwrap();

        let store = PolicyStore::default();
        let mut watcher = PolicyWatcher::new(file.path());

        assert!(watcher.poll(&store).unwrap());
        let policy = store.snapshot();
        assert!(!policy.active);
        assert_eq!(policy.required_gear.len(), 1);

        assert!(!watcher.poll(&store).unwrap());
    }

    #[test]
    fn watcher_ignores_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = PolicyStore::default();
        let mut watcher = PolicyWatcher::new(dir.path().join("absent.json"));
        assert!(!watcher.poll(&store).unwrap());
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn reads_toml_policy_files() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(b"confidence = 0.4\nrequired_gear = [\"gloves\", \"goggles\"]\n")
            .unwrap();

        let parsed = PolicyFile::read(file.path()).unwrap();
        assert_eq!(parsed.confidence, Some(0.4));
        assert_eq!(parsed.required_gear.unwrap().len(), 2);
    }
}
