use anyhow::{anyhow, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::compliance::ComplianceVerdict;
use crate::gear::gear_names;

pub const DEFAULT_SEARCH_LIMIT: usize = 200;

/// Append-only log of persisted violations.
pub trait ViolationLogStore {
    /// Append one row per verdict. Returns the number of rows written.
    fn append_verdicts(&mut self, verdicts: &[ComplianceVerdict], source: &str) -> Result<usize>;

    /// Matching records, newest first.
    fn search(&self, query: &LogQuery) -> Result<Vec<LogRecord>>;

    /// Occurrences of each gear name across detected and missing lists.
    fn summary(&self) -> Result<GearSummary>;

    /// Delete records older than `retention` relative to `now_ms`.
    fn enforce_retention(&mut self, retention: Duration, now_ms: u64) -> Result<usize>;

    fn count(&self) -> Result<u64>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: i64,
    pub person_id: u32,
    pub timestamp_ms: u64,
    pub detected: Vec<String>,
    pub missing: Vec<String>,
    pub source: String,
}

impl LogRecord {
    fn mentions(&self, equipment: &str) -> bool {
        self.detected
            .iter()
            .chain(self.missing.iter())
            .any(|name| name == equipment)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogQuery {
    pub person_id: Option<u32>,
    pub start_ms: Option<u64>,
    pub end_ms: Option<u64>,
    /// Gear name matched against both detected and missing lists.
    pub equipment: Option<String>,
    pub limit: usize,
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            person_id: None,
            start_ms: None,
            end_ms: None,
            equipment: None,
            limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}

impl LogQuery {
    fn matches(&self, record: &LogRecord) -> bool {
        self.person_id.map_or(true, |id| record.person_id == id)
            && self.start_ms.map_or(true, |t| record.timestamp_ms >= t)
            && self.end_ms.map_or(true, |t| record.timestamp_ms <= t)
            && self
                .equipment
                .as_deref()
                .map_or(true, |name| record.mentions(name))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GearSummary {
    pub detected: BTreeMap<String, u64>,
    pub missing: BTreeMap<String, u64>,
}

fn to_sql_ts(ts_ms: u64) -> Result<i64> {
    i64::try_from(ts_ms).map_err(|_| anyhow!("timestamp exceeds i64 range"))
}

fn retention_cutoff(retention: Duration, now_ms: u64) -> u64 {
    let retention_ms = u64::try_from(retention.as_millis()).unwrap_or(u64::MAX);
    now_ms.saturating_sub(retention_ms)
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

pub struct SqliteViolationLogStore {
    conn: Connection,
}

impl SqliteViolationLogStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = crate::open_db_connection(db_path)?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS violation_logs (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              person_id INTEGER NOT NULL,
              timestamp_ms INTEGER NOT NULL,
              detected_json TEXT NOT NULL,
              missing_json TEXT NOT NULL,
              source TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_violation_logs_ts ON violation_logs(timestamp_ms);
            CREATE INDEX IF NOT EXISTS idx_violation_logs_person ON violation_logs(person_id);
            "#,
        )?;
        Ok(())
    }

    fn record_from_row(row: &rusqlite::Row<'_>) -> Result<LogRecord> {
        let id: i64 = row.get(0)?;
        let person_id: i64 = row.get(1)?;
        let timestamp_ms: i64 = row.get(2)?;
        let detected_json: String = row.get(3)?;
        let missing_json: String = row.get(4)?;
        let source: String = row.get(5)?;
        Ok(LogRecord {
            id,
            person_id: u32::try_from(person_id)
                .map_err(|_| anyhow!("corrupt violation log {}: person_id", id))?,
            timestamp_ms: u64::try_from(timestamp_ms)
                .map_err(|_| anyhow!("corrupt violation log {}: timestamp", id))?,
            detected: serde_json::from_str(&detected_json)
                .map_err(|e| anyhow!("corrupt violation log {}: detected: {}", id, e))?,
            missing: serde_json::from_str(&missing_json)
                .map_err(|e| anyhow!("corrupt violation log {}: missing: {}", id, e))?,
            source,
        })
    }
}

impl ViolationLogStore for SqliteViolationLogStore {
    fn append_verdicts(&mut self, verdicts: &[ComplianceVerdict], source: &str) -> Result<usize> {
        if verdicts.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO violation_logs(person_id, timestamp_ms, detected_json, missing_json, source)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )?;
            for verdict in verdicts {
                stmt.execute(params![
                    i64::from(verdict.track_id()),
                    to_sql_ts(verdict.timestamp_ms())?,
                    serde_json::to_string(&gear_names(verdict.detected()))?,
                    serde_json::to_string(&gear_names(verdict.missing()))?,
                    source,
                ])?;
            }
        }
        tx.commit()?;
        Ok(verdicts.len())
    }

    fn search(&self, query: &LogQuery) -> Result<Vec<LogRecord>> {
        let start = query.start_ms.map(to_sql_ts).transpose()?;
        let end = query.end_ms.map(to_sql_ts).transpose()?;
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, person_id, timestamp_ms, detected_json, missing_json, source
            FROM violation_logs
            WHERE (?1 IS NULL OR person_id = ?1)
              AND (?2 IS NULL OR timestamp_ms >= ?2)
              AND (?3 IS NULL OR timestamp_ms <= ?3)
              AND (?4 IS NULL
                   OR EXISTS (SELECT 1 FROM json_each(detected_json) WHERE value = ?4)
                   OR EXISTS (SELECT 1 FROM json_each(missing_json) WHERE value = ?4))
            ORDER BY timestamp_ms DESC, id DESC
            LIMIT ?5
            "#,
        )?;
        let mut rows = stmt.query(params![
            query.person_id.map(i64::from),
            start,
            end,
            query.equipment.as_deref(),
            i64::try_from(query.limit).unwrap_or(i64::MAX),
        ])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(Self::record_from_row(row)?);
        }
        Ok(out)
    }

    fn summary(&self) -> Result<GearSummary> {
        let mut summary = GearSummary::default();
        for (column, counts) in [
            ("detected_json", &mut summary.detected),
            ("missing_json", &mut summary.missing),
        ] {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT value, COUNT(*) FROM violation_logs, json_each(violation_logs.{}) GROUP BY value",
                column
            ))?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let name: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                counts.insert(name, u64::try_from(count).unwrap_or(0));
            }
        }
        Ok(summary)
    }

    fn enforce_retention(&mut self, retention: Duration, now_ms: u64) -> Result<usize> {
        let cutoff = to_sql_ts(retention_cutoff(retention, now_ms))?;
        let removed = self.conn.execute(
            "DELETE FROM violation_logs WHERE timestamp_ms < ?1",
            params![cutoff],
        )?;
        Ok(removed)
    }

    fn count(&self) -> Result<u64> {
        let count: Option<i64> = self
            .conn
            .query_row("SELECT COUNT(*) FROM violation_logs", [], |row| row.get(0))
            .optional()?;
        Ok(count.and_then(|c| u64::try_from(c).ok()).unwrap_or(0))
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct InMemoryViolationLogStore {
    records: Vec<LogRecord>,
    next_id: i64,
}

impl ViolationLogStore for InMemoryViolationLogStore {
    fn append_verdicts(&mut self, verdicts: &[ComplianceVerdict], source: &str) -> Result<usize> {
        for verdict in verdicts {
            self.next_id += 1;
            self.records.push(LogRecord {
                id: self.next_id,
                person_id: verdict.track_id(),
                timestamp_ms: verdict.timestamp_ms(),
                detected: gear_names(verdict.detected()),
                missing: gear_names(verdict.missing()),
                source: source.to_string(),
            });
        }
        Ok(verdicts.len())
    }

    fn search(&self, query: &LogQuery) -> Result<Vec<LogRecord>> {
        let mut out: Vec<LogRecord> = self
            .records
            .iter()
            .filter(|record| query.matches(record))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms).then(b.id.cmp(&a.id)));
        out.truncate(query.limit);
        Ok(out)
    }

    fn summary(&self) -> Result<GearSummary> {
        let mut summary = GearSummary::default();
        for record in &self.records {
            for name in &record.detected {
                *summary.detected.entry(name.clone()).or_default() += 1;
            }
            for name in &record.missing {
                *summary.missing.entry(name.clone()).or_default() += 1;
            }
        }
        Ok(summary)
    }

    fn enforce_retention(&mut self, retention: Duration, now_ms: u64) -> Result<usize> {
        let cutoff = retention_cutoff(retention, now_ms);
        let before = self.records.len();
        self.records.retain(|record| record.timestamp_ms >= cutoff);
        Ok(before - self.records.len())
    }

    fn count(&self) -> Result<u64> {
        Ok(self.records.len() as u64)
    }
}
