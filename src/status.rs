use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Entries older than this are dropped by `evict_expired`.
pub const DEFAULT_TTL_SECS: i64 = 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UploadStatus {
    Pending,
    Processing,
    Completed { records: usize, resolved: usize },
    Failed { error: String },
}

impl UploadStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, UploadStatus::Completed { .. } | UploadStatus::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusEntry {
    pub id: String,
    #[serde(flatten)]
    pub status: UploadStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-upload progress: created on submit, read on poll, evicted when done
/// or when the TTL runs out.
pub trait StatusStore: Send + Sync {
    /// Fails if `id` is already tracked.
    fn create(&self, id: &str) -> Result<()>;

    /// Fails if `id` is unknown (never created, or already evicted).
    fn update(&self, id: &str, status: UploadStatus) -> Result<()>;

    fn get(&self, id: &str) -> Option<StatusEntry>;

    fn evict(&self, id: &str) -> Option<StatusEntry>;

    /// Drop entries last touched before `now - ttl`; returns how many went.
    fn evict_expired(&self, now: DateTime<Utc>) -> usize;
}

pub struct MemoryStatusStore {
    entries: Mutex<HashMap<String, StatusEntry>>,
    ttl: Duration,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::with_ttl(Duration::seconds(DEFAULT_TTL_SECS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        MemoryStatusStore {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every tracked upload, ordered by id.
    pub fn snapshot(&self) -> Vec<StatusEntry> {
        let mut all: Vec<_> = self.lock().values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, StatusEntry>> {
        // a panic while holding the lock leaves the map itself intact
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Default for MemoryStatusStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusStore for MemoryStatusStore {
    fn create(&self, id: &str) -> Result<()> {
        let mut entries = self.lock();
        if entries.contains_key(id) {
            return Err(anyhow!("upload {} is already tracked", id));
        }
        let now = Utc::now();
        entries.insert(
            id.to_string(),
            StatusEntry {
                id: id.to_string(),
                status: UploadStatus::Pending,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(())
    }

    fn update(&self, id: &str, status: UploadStatus) -> Result<()> {
        let mut entries = self.lock();
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| anyhow!("unknown upload {}", id))?;
        entry.status = status;
        entry.updated_at = Utc::now();
        Ok(())
    }

    fn get(&self, id: &str) -> Option<StatusEntry> {
        self.lock().get(id).cloned()
    }

    fn evict(&self, id: &str) -> Option<StatusEntry> {
        self.lock().remove(id)
    }

    fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.ttl;
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, e| e.updated_at >= cutoff);
        before - entries.len()
    }
}
