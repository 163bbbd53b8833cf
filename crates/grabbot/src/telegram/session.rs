//! Per-user conversation state
//!
//! Photos collected for `/convertpdf`, what the next text message is for,
//! and which forwarded support message belongs to which user. Lives in
//! memory only; a restart forgets it. Idle photo collections and old
//! support relays are aged out by [`SessionStore::spawn_sweeper`].

use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use grabcore::AccountId;

/// What the next plain text from a user should be used for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Awaiting {
    #[default]
    Nothing,
    TextPdf,
    Broadcast,
    Keyword,
}

#[derive(Debug, Default)]
struct Session {
    photos: Vec<PathBuf>,
    last_photo_at: Option<Instant>,
    awaiting: Awaiting,
}

impl Session {
    fn is_idle(&self) -> bool {
        self.photos.is_empty() && self.awaiting == Awaiting::Nothing
    }
}

/// How long collected state is kept
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    /// A photo collection untouched for this long is dropped and its files deleted
    pub photo_ttl: Duration,
    /// Forwarded support messages older than this can no longer be replied to
    pub support_ttl: Duration,
}

impl SessionLimits {
    pub fn from_config() -> Self {
        Self {
            photo_ttl: grabcore::config::files::photo_collection_ttl(),
            support_ttl: grabcore::config::files::support_relay_ttl(),
        }
    }
}

#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<AccountId, Session>,
    /// Message id of the copy sent to the admin -> original author
    support: DashMap<i32, (AccountId, Instant)>,
    limits: SessionLimits,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::with_limits(SessionLimits::from_config())
    }

    pub fn with_limits(limits: SessionLimits) -> Self {
        Self {
            sessions: DashMap::new(),
            support: DashMap::new(),
            limits,
        }
    }

    /// Returns how many photos are now collected
    pub fn add_photo(&self, id: AccountId, path: PathBuf) -> usize {
        let mut session = self.sessions.entry(id).or_default();
        session.photos.push(path);
        session.last_photo_at = Some(Instant::now());
        session.photos.len()
    }

    pub fn take_photos(&self, id: AccountId) -> Vec<PathBuf> {
        self.sessions
            .get_mut(&id)
            .map(|mut s| {
                s.last_photo_at = None;
                std::mem::take(&mut s.photos)
            })
            .unwrap_or_default()
    }

    pub fn set_awaiting(&self, id: AccountId, awaiting: Awaiting) {
        self.sessions.entry(id).or_default().awaiting = awaiting;
    }

    /// Read and clear the pending intent
    pub fn take_awaiting(&self, id: AccountId) -> Awaiting {
        self.sessions
            .get_mut(&id)
            .map(|mut s| std::mem::take(&mut s.awaiting))
            .unwrap_or_default()
    }

    pub fn remember_support(&self, admin_message_id: i32, author: AccountId) {
        self.support.insert(admin_message_id, (author, Instant::now()));
    }

    pub fn support_author(&self, admin_message_id: i32) -> Option<AccountId> {
        self.support.get(&admin_message_id).map(|entry| entry.0)
    }

    /// Drop photo collections idle since before `now - photo_ttl`, support
    /// relays older than `support_ttl`, and empty sessions.
    ///
    /// Returns the photo files that no session references any more.
    pub fn expire(&self, now: Instant) -> Vec<PathBuf> {
        let mut stale = Vec::new();
        for mut session in self.sessions.iter_mut() {
            let expired = session
                .last_photo_at
                .is_some_and(|at| now.saturating_duration_since(at) >= self.limits.photo_ttl);
            if expired {
                session.last_photo_at = None;
                stale.append(&mut session.photos);
            }
        }
        self.sessions.retain(|_, session| !session.is_idle());
        self.support
            .retain(|_, (_, at)| now.saturating_duration_since(*at) < self.limits.support_ttl);
        stale
    }

    /// Take every collected photo, for the shutdown cleanup
    pub fn drain_photos(&self) -> Vec<PathBuf> {
        let mut all = Vec::new();
        for mut session in self.sessions.iter_mut() {
            session.last_photo_at = None;
            all.append(&mut session.photos);
        }
        all
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Periodically run [`expire`](Self::expire) and delete the files it returns
    pub fn spawn_sweeper(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let stale = self.expire(Instant::now());
                if !stale.is_empty() {
                    log::info!("Dropping {} photos from idle collections", stale.len());
                    remove_photos(&stale).await;
                }
            }
        })
    }
}

/// Delete photo files, ignoring ones that are already gone
pub async fn remove_photos(paths: &[PathBuf]) -> usize {
    let mut removed = 0;
    for path in paths {
        match tokio::fs::remove_file(path).await {
            Ok(()) => removed += 1,
            Err(e) => log::debug!("Could not remove {}: {}", path.display(), e),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_photos_are_collected_and_taken_once() {
        let store = SessionStore::new();
        assert_eq!(store.add_photo(1, PathBuf::from("/tmp/a.jpg")), 1);
        assert_eq!(store.add_photo(1, PathBuf::from("/tmp/b.jpg")), 2);
        assert_eq!(store.add_photo(2, PathBuf::from("/tmp/c.jpg")), 1);

        assert_eq!(
            store.take_photos(1),
            vec![PathBuf::from("/tmp/a.jpg"), PathBuf::from("/tmp/b.jpg")]
        );
        assert!(store.take_photos(1).is_empty());
        assert_eq!(store.take_photos(2).len(), 1);
    }

    #[test]
    fn test_awaiting_is_cleared_on_read() {
        let store = SessionStore::new();
        assert_eq!(store.take_awaiting(5), Awaiting::Nothing);

        store.set_awaiting(5, Awaiting::TextPdf);
        assert_eq!(store.take_awaiting(5), Awaiting::TextPdf);
        assert_eq!(store.take_awaiting(5), Awaiting::Nothing);
    }

    fn limits() -> SessionLimits {
        SessionLimits {
            photo_ttl: Duration::from_secs(600),
            support_ttl: Duration::from_secs(3600),
        }
    }

    #[test]
    fn test_idle_photo_collections_expire() {
        let store = SessionStore::with_limits(limits());
        store.add_photo(1, PathBuf::from("/tmp/a.jpg"));
        store.add_photo(2, PathBuf::from("/tmp/b.jpg"));

        assert!(store.expire(Instant::now()).is_empty());
        assert_eq!(store.len(), 2);

        let later = Instant::now() + Duration::from_secs(601);
        let mut stale = store.expire(later);
        stale.sort();
        assert_eq!(stale, vec![PathBuf::from("/tmp/a.jpg"), PathBuf::from("/tmp/b.jpg")]);
        assert!(store.take_photos(1).is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn test_expire_keeps_pending_intent() {
        let store = SessionStore::with_limits(limits());
        store.set_awaiting(3, Awaiting::TextPdf);
        store.expire(Instant::now() + Duration::from_secs(601));
        assert_eq!(store.take_awaiting(3), Awaiting::TextPdf);
    }

    #[test]
    fn test_drain_photos_takes_everything() {
        let store = SessionStore::with_limits(limits());
        store.add_photo(1, PathBuf::from("/tmp/a.jpg"));
        store.add_photo(2, PathBuf::from("/tmp/b.jpg"));
        assert_eq!(store.drain_photos().len(), 2);
        assert!(store.drain_photos().is_empty());
    }

    #[test]
    fn test_old_support_relays_are_forgotten() {
        let store = SessionStore::with_limits(limits());
        store.remember_support(900, 42);
        store.expire(Instant::now() + Duration::from_secs(60));
        assert_eq!(store.support_author(900), Some(42));

        store.expire(Instant::now() + Duration::from_secs(3601));
        assert_eq!(store.support_author(900), None);
    }

    #[tokio::test]
    async fn test_remove_photos_deletes_files() {
        let dir = tempfile::tempdir().unwrap();
        let photo = dir.path().join("p.jpg");
        tokio::fs::write(&photo, b"jpeg").await.unwrap();
        let removed = remove_photos(&[photo.clone(), dir.path().join("missing.jpg")]).await;
        assert_eq!(removed, 1);
        assert!(!photo.exists());
    }

    #[test]
    fn test_support_relay_lookup() {
        let store = SessionStore::new();
        store.remember_support(900, 42);
        assert_eq!(store.support_author(900), Some(42));
        assert_eq!(store.support_author(901), None);
    }
}
