//! Long-lived per-topic knowledge: mastery, covered subtopics and study history.
//!
//! The store is the only writer of [`KnowledgeEntry`] state. Entries are
//! created on first write, mutated only by merging a [`KnowledgeDelta`]
//! and never deleted.

pub mod schema;
pub mod sqlite;
pub mod store;
pub mod types;

pub use sqlite::{KnowledgeError, SqliteKnowledgeRepository};
pub use store::KnowledgeStore;
pub use types::{
    HistoryEntry, KnowledgeDelta, KnowledgeEntry, MasteryLevel, MasteryPolicy, RunOutcome,
    RunRecord, merge, normalize_topic, topic_key,
};
