//! Generation history.
//!
//! History is an append-only log of [`VideoMetadata`] records. The only
//! in-place change is bumping a parent's `remix_count`. Every read
//! recomputes expiry for the caller's `now`, so a stale `is_expired` flag on
//! disk is never trusted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};
use vchain_models::{JobId, VideoMetadata};

use crate::error::{HistoryError, HistoryResult};

/// Storage for generation history.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append a record. Remix records must reference a stored parent.
    async fn append(&self, record: VideoMetadata) -> HistoryResult<()>;

    /// Get one record with expiry recomputed for `now`.
    async fn get(&self, job_id: &JobId, now: DateTime<Utc>) -> HistoryResult<Option<VideoMetadata>>;

    /// All records, newest first, with expiry recomputed for `now`.
    async fn list(&self, now: DateTime<Utc>) -> HistoryResult<Vec<VideoMetadata>>;

    /// Delete a record. Returns whether one was removed.
    async fn delete(&self, job_id: &JobId) -> HistoryResult<bool>;

    /// Bump the remix count of `job_id`, returning the new count.
    async fn increment_remix_count(&self, job_id: &JobId) -> HistoryResult<u32>;

    /// Delete every record expired at `now`. Returns how many were removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> HistoryResult<usize>;
}

/// The record list and the rules every store applies to it.
#[derive(Debug, Default, Clone)]
struct HistoryLog {
    records: Vec<VideoMetadata>,
}

impl HistoryLog {
    fn position(&self, job_id: &JobId) -> Option<usize> {
        self.records.iter().position(|r| &r.job_id == job_id)
    }

    fn append(&mut self, record: VideoMetadata) -> HistoryResult<()> {
        if self.position(&record.job_id).is_some() {
            return Err(HistoryError::Duplicate(record.job_id));
        }
        if let Some(parent) = &record.remixed_from {
            if self.position(parent).is_none() {
                return Err(HistoryError::UnknownParent(parent.clone()));
            }
        }
        self.records.push(record);
        Ok(())
    }

    fn get(&self, job_id: &JobId, now: DateTime<Utc>) -> Option<VideoMetadata> {
        self.position(job_id)
            .map(|i| self.records[i].clone().refreshed(now))
    }

    fn list(&self, now: DateTime<Utc>) -> Vec<VideoMetadata> {
        let mut records: Vec<VideoMetadata> = self
            .records
            .iter()
            .cloned()
            .map(|r| r.refreshed(now))
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }

    fn delete(&mut self, job_id: &JobId) -> bool {
        match self.position(job_id) {
            Some(i) => {
                self.records.remove(i);
                true
            }
            None => false,
        }
    }

    fn increment_remix_count(&mut self, job_id: &JobId) -> HistoryResult<u32> {
        let i = self
            .position(job_id)
            .ok_or_else(|| HistoryError::NotFound(job_id.clone()))?;
        let record = &mut self.records[i];
        record.remix_count = record.remix_count.saturating_add(1);
        Ok(record.remix_count)
    }

    fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.records.len();
        self.records.retain(|r| !r.is_expired_at(now));
        before - self.records.len()
    }
}

/// Process-local history.
#[derive(Debug, Default)]
pub struct InMemoryHistory {
    log: Mutex<HistoryLog>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.log.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistory {
    async fn append(&self, record: VideoMetadata) -> HistoryResult<()> {
        self.log.lock().await.append(record)
    }

    async fn get(&self, job_id: &JobId, now: DateTime<Utc>) -> HistoryResult<Option<VideoMetadata>> {
        Ok(self.log.lock().await.get(job_id, now))
    }

    async fn list(&self, now: DateTime<Utc>) -> HistoryResult<Vec<VideoMetadata>> {
        Ok(self.log.lock().await.list(now))
    }

    async fn delete(&self, job_id: &JobId) -> HistoryResult<bool> {
        Ok(self.log.lock().await.delete(job_id))
    }

    async fn increment_remix_count(&self, job_id: &JobId) -> HistoryResult<u32> {
        self.log.lock().await.increment_remix_count(job_id)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> HistoryResult<usize> {
        Ok(self.log.lock().await.purge_expired(now))
    }
}

/// History persisted as a JSON array in one file.
///
/// Every operation reads the file, applies the change and writes it back
/// through a temporary file and rename, all under one lock.
#[derive(Debug)]
pub struct FileHistory {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> HistoryResult<HistoryLog> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(HistoryLog::default()),
            Ok(bytes) => Ok(HistoryLog {
                records: serde_json::from_slice(&bytes)?,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HistoryLog::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, log: &HistoryLog) -> HistoryResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(&log.records)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), records = log.records.len(), "History saved");
        Ok(())
    }

    /// Load, apply `change`, and save if it succeeded.
    async fn modify<T>(
        &self,
        change: impl FnOnce(&mut HistoryLog) -> HistoryResult<T>,
    ) -> HistoryResult<T> {
        let _guard = self.lock.lock().await;
        let mut log = self.load().await?;
        let out = change(&mut log)?;
        self.save(&log).await?;
        Ok(out)
    }

    async fn read(&self) -> HistoryResult<HistoryLog> {
        let _guard = self.lock.lock().await;
        self.load().await
    }
}

#[async_trait]
impl HistoryStore for FileHistory {
    async fn append(&self, record: VideoMetadata) -> HistoryResult<()> {
        self.modify(|log| log.append(record)).await
    }

    async fn get(&self, job_id: &JobId, now: DateTime<Utc>) -> HistoryResult<Option<VideoMetadata>> {
        Ok(self.read().await?.get(job_id, now))
    }

    async fn list(&self, now: DateTime<Utc>) -> HistoryResult<Vec<VideoMetadata>> {
        Ok(self.read().await?.list(now))
    }

    async fn delete(&self, job_id: &JobId) -> HistoryResult<bool> {
        self.modify(|log| Ok(log.delete(job_id))).await
    }

    async fn increment_remix_count(&self, job_id: &JobId) -> HistoryResult<u32> {
        self.modify(|log| log.increment_remix_count(job_id)).await
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> HistoryResult<usize> {
        let removed = self.modify(|log| Ok(log.purge_expired(now))).await?;
        if removed > 0 {
            info!(removed, path = %self.path.display(), "Purged expired history records");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use vchain_models::{GenerationParameters, ProviderKind, SegmentSeconds, VideoSize};

    fn record(id: &str, created_at: DateTime<Utc>) -> VideoMetadata {
        VideoMetadata::new(
            JobId::from(id),
            format!("local-{}", id),
            "prompt",
            ProviderKind::Hosted,
            GenerationParameters {
                seconds: SegmentSeconds::Eight,
                size: VideoSize::default(),
                model: "sora-2".into(),
            },
            created_at,
        )
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
    }

    async fn exercise(store: &dyn HistoryStore) {
        store.append(record("a", t0())).await.unwrap();
        store.append(record("b", t0() + Duration::hours(1))).await.unwrap();

        // Duplicate ids and dangling parents are rejected
        assert!(matches!(
            store.append(record("a", t0())).await,
            Err(HistoryError::Duplicate(_))
        ));
        let mut orphan = record("c", t0());
        orphan.remixed_from = Some(JobId::from("missing"));
        assert!(matches!(
            store.append(orphan).await,
            Err(HistoryError::UnknownParent(_))
        ));

        // Newest first, expiry recomputed at read time
        let listed = store.list(t0() + Duration::hours(24) + Duration::minutes(30)).await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|r| r.job_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert!(!listed[0].is_expired);
        assert!(listed[1].is_expired);

        assert_eq!(store.increment_remix_count(&JobId::from("a")).await.unwrap(), 1);
        assert_eq!(store.increment_remix_count(&JobId::from("a")).await.unwrap(), 2);
        assert!(matches!(
            store.increment_remix_count(&JobId::from("zzz")).await,
            Err(HistoryError::NotFound(_))
        ));

        let a = store.get(&JobId::from("a"), t0()).await.unwrap().unwrap();
        assert_eq!(a.remix_count, 2);
        assert!(!a.is_expired);

        assert_eq!(store.purge_expired(t0() + Duration::hours(24) + Duration::minutes(1)).await.unwrap(), 1);
        assert!(store.get(&JobId::from("a"), t0()).await.unwrap().is_none());

        assert!(store.delete(&JobId::from("b")).await.unwrap());
        assert!(!store.delete(&JobId::from("b")).await.unwrap());
        assert!(store.list(t0()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_history() {
        exercise(&InMemoryHistory::new()).await;
    }

    #[tokio::test]
    async fn test_file_history() {
        let dir = tempfile::tempdir().unwrap();
        exercise(&FileHistory::new(dir.path().join("nested").join("history.json"))).await;
    }

    #[tokio::test]
    async fn test_file_history_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        FileHistory::new(&path).append(record("a", t0())).await.unwrap();

        let reopened = FileHistory::new(&path);
        let listed = reopened.list(t0()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].job_id.as_str(), "a");

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"jobId\""));
    }

    #[tokio::test]
    async fn test_corrupt_file_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            FileHistory::new(&path).list(t0()).await,
            Err(HistoryError::Corrupt(_))
        ));
    }
}
