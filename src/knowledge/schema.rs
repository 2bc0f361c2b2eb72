//! SQLite DDL for the knowledge store.

use rusqlite::Connection;

use super::types::CURRENT_SCHEMA_VERSION;

/// Complete DDL for the knowledge database.
///
/// Uses `IF NOT EXISTS` throughout so `apply_schema` is idempotent.
pub(crate) const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- One row per topic, keyed by the case-folded topic.
CREATE TABLE IF NOT EXISTS knowledge_entries (
    topic_key         TEXT PRIMARY KEY,
    topic             TEXT NOT NULL,
    mastery_level     TEXT NOT NULL DEFAULT 'beginner',
    covered_subtopics TEXT NOT NULL DEFAULT '[]',  -- JSON array, sorted
    last_updated      INTEGER,                     -- epoch micros
    revision          INTEGER NOT NULL DEFAULT 0
);

-- Append-only study history.
CREATE TABLE IF NOT EXISTS knowledge_history (
    topic_key   TEXT NOT NULL REFERENCES knowledge_entries(topic_key),
    run_id      TEXT NOT NULL,
    at          INTEGER NOT NULL,                  -- epoch micros
    summary_ref TEXT NOT NULL,
    PRIMARY KEY (topic_key, run_id)
);

CREATE INDEX IF NOT EXISTS idx_history_at ON knowledge_history(topic_key, at);

-- Run digests referenced by knowledge_history.summary_ref.
CREATE TABLE IF NOT EXISTS summaries (
    id         TEXT PRIMARY KEY,
    topic_key  TEXT NOT NULL,
    content    TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

-- One row per finished run.
CREATE TABLE IF NOT EXISTS run_audit (
    run_id             TEXT PRIMARY KEY,
    topic_key          TEXT NOT NULL,
    topic              TEXT NOT NULL,
    requested_count    INTEGER NOT NULL,
    started_at         INTEGER NOT NULL,
    ended_at           INTEGER NOT NULL,
    outcome            TEXT NOT NULL,              -- JSON RunOutcome
    selected_urls      TEXT NOT NULL DEFAULT '[]',
    source_failures    TEXT NOT NULL DEFAULT '[]',
    candidate_failures TEXT NOT NULL DEFAULT '[]'
);

CREATE INDEX IF NOT EXISTS idx_audit_topic ON run_audit(topic_key, ended_at);
"#;

/// Apply the full schema and seed the version on a fresh database.
pub(crate) fn apply_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
        rusqlite::params![CURRENT_SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

/// Read the stored schema version, if any.
pub(crate) fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<u32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_meta WHERE key = 'schema_version'")?;
    let mut rows = stmt.query([])?;
    match rows.next()? {
        Some(row) => {
            let val: String = row.get(0)?;
            Ok(val.parse::<u32>().ok())
        }
        None => Ok(None),
    }
}
