//! Ephemeral file registry
//!
//! Produced media is addressed by a short numeric id (Telegram callback data
//! is limited to 64 bytes, far too small for file paths). Each entry lives for
//! a fixed TTL; a background task then forgets it and deletes the file.

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::core::config;
use crate::core::metrics::{EPHEMERAL_FILES_LIVE, EPHEMERAL_FILES_TOTAL};
use crate::core::{AppError, AppResult};
use crate::quota::AccountId;

pub type RegistryId = u64;

#[derive(Debug, Clone)]
pub struct EphemeralFile {
    pub id: RegistryId,
    pub owner: AccountId,
    pub path: PathBuf,
    pub deadline: Instant,
}

struct RegistryInner {
    entries: DashMap<RegistryId, EphemeralFile>,
    next_id: AtomicU64,
    ttl: Duration,
}

impl RegistryInner {
    async fn expire(&self, id: RegistryId) {
        if let Some((_, entry)) = self.entries.remove(&id) {
            EPHEMERAL_FILES_LIVE.dec();
            log::debug!("Ephemeral file {} expired: {}", id, entry.path.display());
            delete_file(&entry.path).await;
        }
    }
}

/// Cheap to clone; all clones share the same entries.
#[derive(Clone)]
pub struct FileRegistry {
    inner: Arc<RegistryInner>,
}

impl FileRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                entries: DashMap::new(),
                next_id: AtomicU64::new(1),
                ttl,
            }),
        }
    }

    pub fn from_config() -> Self {
        Self::new(config::files::ttl())
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Track `path` and schedule its deletion after the TTL.
    ///
    /// Must be called from inside a Tokio runtime.
    pub fn register(&self, owner: AccountId, path: impl Into<PathBuf>) -> RegistryId {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let path = path.into();
        let entry = EphemeralFile {
            id,
            owner,
            path: path.clone(),
            deadline: Instant::now() + self.inner.ttl,
        };
        self.inner.entries.insert(id, entry);
        EPHEMERAL_FILES_TOTAL.with_label_values(&["registered"]).inc();
        EPHEMERAL_FILES_LIVE.inc();
        log::info!("Registered ephemeral file {} for {}: {}", id, owner, path.display());

        let inner = Arc::clone(&self.inner);
        let ttl = self.inner.ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            inner.expire(id).await;
        });

        id
    }

    /// Path of a live entry.
    ///
    /// `NotFound` when the id is unknown, the TTL has passed, or the file is gone from disk.
    pub fn resolve(&self, id: RegistryId) -> AppResult<PathBuf> {
        let entry = self
            .inner
            .entries
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("file {}", id)))?;

        if Instant::now() >= entry.deadline {
            return Err(AppError::NotFound(format!("file {} expired", id)));
        }
        if !entry.path.exists() {
            return Err(AppError::NotFound(format!("file {} is missing on disk", id)));
        }
        Ok(entry.path)
    }

    /// Like [`resolve`](Self::resolve) but also checks ownership
    pub fn resolve_for(&self, owner: AccountId, id: RegistryId) -> AppResult<PathBuf> {
        let belongs = self.inner.entries.get(&id).map(|e| e.owner == owner).unwrap_or(false);
        if !belongs {
            return Err(AppError::NotFound(format!("file {}", id)));
        }
        self.resolve(id)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Delete every tracked file now. Called on shutdown.
    pub async fn purge_all(&self) -> usize {
        let ids: Vec<RegistryId> = self.inner.entries.iter().map(|e| *e.key()).collect();
        let count = ids.len();
        for id in ids {
            self.inner.expire(id).await;
        }
        if count > 0 {
            log::info!("Purged {} ephemeral files", count);
        }
        count
    }
}

async fn delete_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            EPHEMERAL_FILES_TOTAL.with_label_values(&["deleted"]).inc();
            log::info!("Deleted ephemeral file {}", path.display());
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("Ephemeral file {} already gone", path.display());
        }
        Err(e) => log::warn!("Failed to delete ephemeral file {}: {}", path.display(), e),
    }
}
