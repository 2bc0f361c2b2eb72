//! Sage: federated study-material retrieval with a personal knowledge base.
//!
//! Given a topic, sage queries several independent sources at once, fetches
//! and cleans what they return, ranks the survivors against the topic,
//! summarizes the best few and records what was learned:
//! Sources → Fetch → Dedupe → Rank → Select → Summarize → Knowledge store
//!
//! # Architecture
//!
//! - **Retrieval** (`sage-search`): source adapters, fetcher, deduplication,
//!   ranking and selection under per-source, per-fetch and run deadlines
//! - **Summarization** ([`summarize`]): OpenAI-compatible provider behind a
//!   [`Summarizer`] trait with retry and re-chunking
//! - **Knowledge** ([`knowledge`]): SQLite-backed per-topic entries whose
//!   mastery never decreases and whose history only grows
//! - **Pipeline** ([`pipeline`]): one [`StudyPipeline::run`] per request,
//!   holding the topic lock from read to merge

pub mod config;
pub mod error;
pub mod knowledge;
pub mod pipeline;
pub mod sage_dirs;
pub mod summarize;

pub use config::SageConfig;
pub use error::{Result, SageError};
pub use knowledge::{KnowledgeEntry, KnowledgeStore, MasteryLevel};
pub use pipeline::{RunError, RunReport, StudyPipeline};
pub use summarize::{OpenAiSummarizer, Summarizer};
