// src/security/session_store.rs
// In-memory per-peer session keys with TTL. Volatile: a restart empties it.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use super::cipher::SessionKey;
use crate::constants::short_id;
use crate::emit_session_event;
use crate::events::model::LogLevel;

/// Time source for expiry checks; swapped for [`ManualClock`] in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}

/// One established session. Immutable once stored; replacement swaps the `Arc`.
#[derive(Debug)]
pub struct Session {
    pub peer_id: String,
    pub key_id: String,
    pub key: SessionKey,
    pub created_at: Instant,
    pub ttl: Duration,
    pub rotation_eligible: bool,
    pub generation: u64,
}

impl Session {
    /// `None` when the TTL runs past what `Instant` can represent; such a
    /// session never expires.
    pub fn expires_at(&self) -> Option<Instant> {
        self.created_at.checked_add(self.ttl)
    }

    pub fn is_valid_at(&self, now: Instant) -> bool {
        self.expires_at().map_or(true, |deadline| now < deadline)
    }
}

/// Result of a successful [`SessionStore::try_put`].
#[derive(Debug)]
pub struct PutOutcome {
    pub session: Arc<Session>,
    /// An unexpired session for the same peer was overwritten.
    pub replaced: bool,
}

#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, Arc<Session>>>>,
    clock: Arc<dyn Clock>,
    generation: Arc<AtomicU64>,
    lookups: Arc<AtomicU64>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            clock,
            generation: Arc::new(AtomicU64::new(0)),
            lookups: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Create or replace the session for `peer_id`.
    pub fn put(&self, peer_id: &str, key_id: &str, key: SessionKey, ttl: Duration) -> Arc<Session> {
        match self.try_put(peer_id, key_id, key, ttl, true) {
            Ok(outcome) => outcome.session,
            Err(existing) => existing,
        }
    }

    /// Insert a session. When `replace_live` is false and an unexpired session
    /// already exists for the peer, nothing changes and the existing session is
    /// returned as the error.
    pub fn try_put(
        &self,
        peer_id: &str,
        key_id: &str,
        key: SessionKey,
        ttl: Duration,
        replace_live: bool,
    ) -> Result<PutOutcome, Arc<Session>> {
        let now = self.clock.now();
        let mut map = self.inner.write();
        let live = map.get(peer_id).filter(|s| s.is_valid_at(now)).cloned();
        if let Some(existing) = &live {
            if !replace_live {
                return Err(existing.clone());
            }
        }
        let session = Arc::new(Session {
            peer_id: peer_id.to_string(),
            key_id: key_id.to_string(),
            key,
            created_at: now,
            ttl,
            rotation_eligible: replace_live,
            generation: self.generation.fetch_add(1, Ordering::Relaxed) + 1,
        });
        map.insert(peer_id.to_string(), session.clone());
        Ok(PutOutcome {
            session,
            replaced: live.is_some(),
        })
    }

    /// Live session for the peer. Expired entries read as absent; the sweeper removes them.
    pub fn get(&self, peer_id: &str) -> Option<Arc<Session>> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let now = self.clock.now();
        self.inner
            .read()
            .get(peer_id)
            .filter(|s| s.is_valid_at(now))
            .cloned()
    }

    pub fn invalidate(&self, peer_id: &str) -> bool {
        let removed = self.inner.write().remove(peer_id).is_some();
        if removed {
            emit_session_event!(
                LogLevel::Info,
                "invalidated",
                Some(short_id(peer_id)),
                None
            );
        }
        removed
    }

    /// Remove `session` only if it is still the stored one for its peer.
    pub fn invalidate_session(&self, session: &Session) -> bool {
        let mut map = self.inner.write();
        let current = map
            .get(&session.peer_id)
            .map(|s| s.generation == session.generation)
            .unwrap_or(false);
        if current {
            map.remove(&session.peer_id);
            drop(map);
            emit_session_event!(
                LogLevel::Warn,
                "invalidated",
                Some(short_id(&session.peer_id)),
                Some("decryption failed".to_string())
            );
        }
        current
    }

    /// Drop expired sessions; returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut map = self.inner.write();
        let before = map.len();
        map.retain(|_, s| s.is_valid_at(now));
        before - map.len()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Number of `get` calls served.
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Periodic expiry sweep on its own task.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = store.sweep();
                if removed > 0 {
                    emit_session_event!(
                        LogLevel::Debug,
                        "sweep",
                        None,
                        Some(format!("removed={} remaining={}", removed, store.len()))
                    );
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (SessionStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (SessionStore::with_clock(clock.clone()), clock)
    }

    #[test]
    fn expired_reads_as_absent() {
        let (store, clock) = store();
        store.put("peer-a", "k1", SessionKey::generate(), Duration::from_secs(10));
        assert!(store.get("peer-a").is_some());
        clock.advance(Duration::from_secs(10));
        assert!(store.get("peer-a").is_none());
        assert_eq!(store.len(), 1);
        assert_eq!(store.sweep(), 1);
        assert!(store.is_empty());
        assert_eq!(store.lookups(), 2);
    }

    #[test]
    fn put_replaces_atomically() {
        let (store, _) = store();
        let first = store.put("peer-a", "k1", SessionKey::generate(), Duration::from_secs(60));
        let second = store.put("peer-a", "k2", SessionKey::generate(), Duration::from_secs(60));
        assert!(second.generation > first.generation);
        assert_eq!(store.get("peer-a").unwrap().key_id, "k2");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn refuses_live_replacement_when_asked() {
        let (store, clock) = store();
        store.put("peer-a", "k1", SessionKey::generate(), Duration::from_secs(5));
        let err = store
            .try_put("peer-a", "k2", SessionKey::generate(), Duration::from_secs(5), false)
            .unwrap_err();
        assert_eq!(err.key_id, "k1");
        clock.advance(Duration::from_secs(6));
        let ok = store
            .try_put("peer-a", "k2", SessionKey::generate(), Duration::from_secs(5), false)
            .unwrap();
        assert!(!ok.replaced);
    }

    #[test]
    fn stale_invalidation_keeps_newer_session() {
        let (store, _) = store();
        let old = store.put("peer-a", "k1", SessionKey::generate(), Duration::from_secs(60));
        store.put("peer-a", "k2", SessionKey::generate(), Duration::from_secs(60));
        assert!(!store.invalidate_session(&old));
        assert_eq!(store.get("peer-a").unwrap().key_id, "k2");
        let current = store.get("peer-a").unwrap();
        assert!(store.invalidate_session(&current));
        assert!(store.get("peer-a").is_none());
        assert!(!store.invalidate("peer-a"));
    }

    #[test]
    fn unrepresentable_ttl_never_expires() {
        let (store, clock) = store();
        let session = store.put("peer-a", "k1", SessionKey::generate(), Duration::MAX);
        assert!(session.expires_at().is_none());
        clock.advance(Duration::from_secs(100 * 365 * 24 * 3600));
        assert!(store.get("peer-a").is_some());
        assert_eq!(store.sweep(), 0);
    }
}
