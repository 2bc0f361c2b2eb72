//! SQLite-backed knowledge repository.
//!
//! A single database file at `{root_dir}/sage.db` holds topic entries,
//! their history, run digests and the run audit table. Methods are
//! blocking; [`super::KnowledgeStore`] moves them onto the blocking pool.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, params};

use super::schema::{apply_schema, read_schema_version};
use super::types::{HistoryEntry, KnowledgeDelta, KnowledgeEntry, MasteryLevel, RunRecord};

/// Database filename within the knowledge root directory.
const DB_FILENAME: &str = "sage.db";

/// Errors from the knowledge store.
#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("lock poisoned: {0}")]
    Lock(String),

    /// The stored revision moved while a topic lock was held.
    #[error("revision conflict on {topic}: expected {expected}, found {found}")]
    Conflict {
        topic: String,
        expected: u64,
        found: u64,
    },

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("blocking task failed: {0}")]
    Task(String),
}

/// SQLite-backed knowledge repository.
///
/// Thread-safe via an internal `Mutex<Connection>`.
pub struct SqliteKnowledgeRepository {
    root: PathBuf,
    conn: Mutex<Connection>,
}

impl SqliteKnowledgeRepository {
    /// Open (or create) the database at `{root_dir}/sage.db`.
    pub fn new(root_dir: &Path) -> Result<Self, KnowledgeError> {
        std::fs::create_dir_all(root_dir).map_err(|e| KnowledgeError::Io(e.to_string()))?;
        let conn = Connection::open(root_dir.join(DB_FILENAME))?;
        apply_schema(&conn)?;
        Ok(Self {
            root: root_dir.to_path_buf(),
            conn: Mutex::new(conn),
        })
    }

    /// Returns the root directory path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read the current schema version from the database.
    pub fn schema_version(&self) -> Result<Option<u32>, KnowledgeError> {
        let conn = self.lock()?;
        Ok(read_schema_version(&conn)?)
    }

    /// Load the entry stored under `topic_key`, if any.
    pub fn load_entry(&self, topic_key: &str) -> Result<Option<KnowledgeEntry>, KnowledgeError> {
        let conn = self.lock()?;
        load_entry(&conn, topic_key)
    }

    /// Display form of the stored topic for `topic_key`, if any.
    pub fn stored_topic(&self, topic_key: &str) -> Result<Option<String>, KnowledgeError> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                "SELECT topic FROM knowledge_entries WHERE topic_key = ?1",
                params![topic_key],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Persist `merged` as the next revision of `topic_key`.
    ///
    /// Fails with [`KnowledgeError::Conflict`] unless the stored revision
    /// still equals `expected_revision`. New history rows and the delta's
    /// digest are written in the same transaction.
    pub fn commit(
        &self,
        topic_key: &str,
        expected_revision: u64,
        merged: &KnowledgeEntry,
        delta: &KnowledgeDelta,
    ) -> Result<(), KnowledgeError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        let found: u64 = tx
            .query_row(
                "SELECT revision FROM knowledge_entries WHERE topic_key = ?1",
                params![topic_key],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
            .map_or(0, |r| r as u64);
        if found != expected_revision {
            return Err(KnowledgeError::Conflict {
                topic: merged.topic.clone(),
                expected: expected_revision,
                found,
            });
        }

        let subtopics = serde_json::to_string(&merged.covered_subtopics)?;
        tx.execute(
            "INSERT INTO knowledge_entries \
             (topic_key, topic, mastery_level, covered_subtopics, last_updated, revision) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(topic_key) DO UPDATE SET \
             mastery_level = excluded.mastery_level, \
             covered_subtopics = excluded.covered_subtopics, \
             last_updated = excluded.last_updated, \
             revision = excluded.revision",
            params![
                topic_key,
                merged.topic,
                merged.mastery_level.as_str(),
                subtopics,
                merged.last_updated.map(|t| t.timestamp_micros()),
                merged.revision as i64,
            ],
        )?;

        for item in &merged.history {
            tx.execute(
                "INSERT OR IGNORE INTO knowledge_history (topic_key, run_id, at, summary_ref) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    topic_key,
                    item.run_id,
                    item.timestamp.timestamp_micros(),
                    item.summary_ref
                ],
            )?;
        }

        if let (Some(item), Some(digest)) = (&delta.history_entry, &delta.digest) {
            tx.execute(
                "INSERT OR IGNORE INTO summaries (id, topic_key, content, created_at) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    item.summary_ref,
                    topic_key,
                    digest,
                    delta.observed_at.timestamp_micros()
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Stored digest text for `summary_ref`.
    pub fn summary(&self, summary_ref: &str) -> Result<Option<String>, KnowledgeError> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                "SELECT content FROM summaries WHERE id = ?1",
                params![summary_ref],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Append an audit row for a finished run.
    pub fn insert_run(&self, topic_key: &str, record: &RunRecord) -> Result<(), KnowledgeError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO run_audit \
             (run_id, topic_key, topic, requested_count, started_at, ended_at, outcome, \
              selected_urls, source_failures, candidate_failures) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.run_id,
                topic_key,
                record.topic,
                record.requested_count as i64,
                record.started_at.timestamp_micros(),
                record.ended_at.timestamp_micros(),
                serde_json::to_string(&record.outcome)?,
                serde_json::to_string(&record.selected_urls)?,
                serde_json::to_string(&record.source_failures)?,
                serde_json::to_string(&record.candidate_failures)?,
            ],
        )?;
        Ok(())
    }

    /// Latest `limit` runs for `topic_key`, most recent first.
    pub fn recent_runs(
        &self,
        topic_key: &str,
        limit: usize,
    ) -> Result<Vec<RunRecord>, KnowledgeError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT run_id, topic, requested_count, started_at, ended_at, outcome, \
             selected_urls, source_failures, candidate_failures \
             FROM run_audit WHERE topic_key = ?1 \
             ORDER BY ended_at DESC, run_id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![topic_key, limit as i64], row_to_run)?;

        let mut runs = Vec::new();
        for r in rows {
            runs.push(r?);
        }
        Ok(runs)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, KnowledgeError> {
        self.conn
            .lock()
            .map_err(|e| KnowledgeError::Lock(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Row conversion helpers
// ---------------------------------------------------------------------------

fn load_entry(
    conn: &Connection,
    topic_key: &str,
) -> Result<Option<KnowledgeEntry>, KnowledgeError> {
    let entry = conn
        .query_row(
            "SELECT topic, mastery_level, covered_subtopics, last_updated, revision \
             FROM knowledge_entries WHERE topic_key = ?1",
            params![topic_key],
            row_to_entry,
        )
        .optional()?;
    let Some(mut entry) = entry else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT run_id, at, summary_ref FROM knowledge_history \
         WHERE topic_key = ?1 ORDER BY at ASC, run_id ASC",
    )?;
    let rows = stmt.query_map(params![topic_key], |row| {
        Ok(HistoryEntry {
            run_id: row.get(0)?,
            timestamp: from_micros(1, row.get(1)?)?,
            summary_ref: row.get(2)?,
        })
    })?;
    for r in rows {
        entry.history.push(r?);
    }
    Ok(Some(entry))
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<KnowledgeEntry> {
    let mastery: String = row.get(1)?;
    let subtopics: String = row.get(2)?;
    let last_updated: Option<i64> = row.get(3)?;
    let revision: i64 = row.get(4)?;

    Ok(KnowledgeEntry {
        topic: row.get(0)?,
        mastery_level: mastery
            .parse::<MasteryLevel>()
            .map_err(|e| conversion_error(1, Type::Text, e.into()))?,
        covered_subtopics: from_json::<BTreeSet<String>>(2, &subtopics)?,
        last_updated: last_updated.map(|m| from_micros(3, m)).transpose()?,
        history: Vec::new(),
        revision: revision as u64,
    })
}

fn row_to_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRecord> {
    let requested: i64 = row.get(2)?;
    let outcome: String = row.get(5)?;
    let selected: String = row.get(6)?;
    let source_failures: String = row.get(7)?;
    let candidate_failures: String = row.get(8)?;

    Ok(RunRecord {
        run_id: row.get(0)?,
        topic: row.get(1)?,
        requested_count: requested as usize,
        started_at: from_micros(3, row.get(3)?)?,
        ended_at: from_micros(4, row.get(4)?)?,
        outcome: from_json(5, &outcome)?,
        selected_urls: from_json(6, &selected)?,
        source_failures: from_json(7, &source_failures)?,
        candidate_failures: from_json(8, &candidate_failures)?,
    })
}

fn from_micros(idx: usize, micros: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros).ok_or_else(|| {
        conversion_error(idx, Type::Integer, format!("timestamp out of range: {micros}").into())
    })
}

fn from_json<T: serde::de::DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw).map_err(|e| conversion_error(idx, Type::Text, Box::new(e)))
}

fn conversion_error(
    idx: usize,
    ty: Type,
    err: Box<dyn std::error::Error + Send + Sync>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, err)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
