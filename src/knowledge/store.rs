//! Async knowledge store with per-topic serialization.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use super::sqlite::{KnowledgeError, SqliteKnowledgeRepository};
use super::types::{
    KnowledgeDelta, KnowledgeEntry, MasteryPolicy, RunRecord, merge, normalize_topic, topic_key,
};

/// The only writer of knowledge entries.
///
/// Every read-modify-write goes through [`KnowledgeStore::with_topic_lock`],
/// which holds an async mutex for the topic from the read until the merge
/// is committed. Distinct topics proceed in parallel. A topic's lock is
/// dropped from the map once no task holds or waits on it.
pub struct KnowledgeStore {
    repo: Arc<SqliteKnowledgeRepository>,
    policy: MasteryPolicy,
    topic_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KnowledgeStore {
    /// Open (or create) the store under `root_dir`.
    pub fn open(root_dir: &Path, policy: MasteryPolicy) -> Result<Self, KnowledgeError> {
        let repo = SqliteKnowledgeRepository::new(root_dir)?;
        Ok(Self {
            repo: Arc::new(repo),
            policy,
            topic_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Mastery thresholds applied on every merge.
    pub fn policy(&self) -> MasteryPolicy {
        self.policy
    }

    /// Normalize `raw` and reuse the display form of an existing entry that
    /// matches it case-insensitively.
    pub async fn resolve_topic(&self, raw: &str) -> Result<String, KnowledgeError> {
        let normalized = normalize_topic(raw);
        let key = topic_key(&normalized);
        let stored = self.blocking(move |repo| repo.stored_topic(&key)).await?;
        Ok(stored.unwrap_or(normalized))
    }

    /// Current entry for `topic`, or an empty one if it was never written.
    pub async fn read(&self, topic: &str) -> Result<KnowledgeEntry, KnowledgeError> {
        let display = normalize_topic(topic);
        let key = topic_key(&display);
        let stored = self.blocking(move |repo| repo.load_entry(&key)).await?;
        Ok(stored.unwrap_or_else(|| KnowledgeEntry::empty(display)))
    }

    /// Merge `delta` into `topic` under the topic lock and return the new entry.
    pub async fn merge_write(
        &self,
        topic: &str,
        delta: KnowledgeDelta,
    ) -> Result<KnowledgeEntry, KnowledgeError> {
        let ((), entry) = self
            .with_topic_lock(topic, |_| async move {
                Ok::<_, KnowledgeError>(((), Some(delta)))
            })
            .await?;
        Ok(entry)
    }

    /// Run `f` on the current entry while holding the topic lock.
    ///
    /// `f` returns its result and an optional delta. A delta is merged and
    /// committed before the lock is released; an error from `f` leaves the
    /// store untouched. Returns `f`'s result with the entry as it stands
    /// when the lock is released.
    pub async fn with_topic_lock<F, Fut, R, E>(
        &self,
        topic: &str,
        f: F,
    ) -> Result<(R, KnowledgeEntry), E>
    where
        F: FnOnce(KnowledgeEntry) -> Fut,
        Fut: Future<Output = Result<(R, Option<KnowledgeDelta>), E>>,
        E: From<KnowledgeError>,
    {
        let key = topic_key(topic);
        let lease = self.lease(&key)?;
        let _guard = lease.lock.lock().await;

        let current = self.read(topic).await?;
        let expected = current.revision;
        let (result, delta) = f(current.clone()).await?;

        let Some(delta) = delta else {
            return Ok((result, current));
        };

        let merged = merge(&current, &delta, &self.policy);
        let commit_key = key.clone();
        self.blocking(move |repo| repo.commit(&commit_key, expected, &merged, &delta))
            .await?;
        tracing::debug!(revision = expected + 1, "knowledge entry committed");

        let after = self.read(topic).await?;
        Ok((result, after))
    }

    /// Append the audit record of a finished run.
    pub async fn record_run(&self, record: RunRecord) -> Result<(), KnowledgeError> {
        let key = topic_key(&record.topic);
        self.blocking(move |repo| repo.insert_run(&key, &record))
            .await
    }

    /// Latest `limit` runs for `topic`, most recent first.
    pub async fn recent_runs(
        &self,
        topic: &str,
        limit: usize,
    ) -> Result<Vec<RunRecord>, KnowledgeError> {
        let key = topic_key(topic);
        self.blocking(move |repo| repo.recent_runs(&key, limit))
            .await
    }

    /// Stored digest for a history entry's `summary_ref`.
    pub async fn summary(&self, summary_ref: &str) -> Result<Option<String>, KnowledgeError> {
        let id = summary_ref.to_owned();
        self.blocking(move |repo| repo.summary(&id)).await
    }

    fn lease(&self, key: &str) -> Result<TopicLease<'_>, KnowledgeError> {
        let mut locks = self
            .topic_locks
            .lock()
            .map_err(|e| KnowledgeError::Lock(e.to_string()))?;
        let lock = Arc::clone(locks.entry(key.to_owned()).or_default());
        Ok(TopicLease {
            locks: &self.topic_locks,
            key: key.to_owned(),
            lock,
        })
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, KnowledgeError>
    where
        T: Send + 'static,
        F: FnOnce(&SqliteKnowledgeRepository) -> Result<T, KnowledgeError> + Send + 'static,
    {
        let repo = Arc::clone(&self.repo);
        tokio::task::spawn_blocking(move || f(&repo))
            .await
            .map_err(|e| KnowledgeError::Task(e.to_string()))?
    }
}

/// A handle on one topic's lock. The map entry is removed when the last
/// lease for the topic goes away.
struct TopicLease<'a> {
    locks: &'a Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    key: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for TopicLease<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one here: nobody else is waiting.
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.key);
        }
    }
}
