// src/security/replay.rs
// Key-exchange nonce cache: a nonce may be used once per window.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::session_store::Clock;

/// Hard cap so a flood of unique nonces cannot grow memory without bound.
const MAX_TRACKED_NONCES: usize = 100_000;

/// Nonces by first-seen time plus the same entries in arrival order, so
/// expiry and eviction only ever touch the oldest end.
#[derive(Default)]
struct Seen {
    at: HashMap<String, Instant>,
    order: VecDeque<(Instant, String)>,
}

impl Seen {
    fn expire(&mut self, now: Instant, window: Duration) -> usize {
        let mut removed = 0;
        while let Some((at, _)) = self.order.front() {
            if now.saturating_duration_since(*at) < window {
                break;
            }
            if let Some((at, nonce)) = self.order.pop_front() {
                removed += self.forget(&nonce, at);
            }
        }
        removed
    }

    fn evict_oldest(&mut self) {
        while let Some((at, nonce)) = self.order.pop_front() {
            if self.forget(&nonce, at) == 1 {
                return;
            }
        }
    }

    // Only drops the map entry that this queue slot was recorded for.
    fn forget(&mut self, nonce: &str, at: Instant) -> usize {
        match self.at.get(nonce) {
            Some(recorded) if *recorded == at => {
                self.at.remove(nonce);
                1
            }
            _ => 0,
        }
    }
}

#[derive(Clone)]
pub struct NonceCache {
    seen: Arc<Mutex<Seen>>,
    window: Duration,
    clock: Arc<dyn Clock>,
    max_tracked: usize,
}

impl NonceCache {
    pub fn new(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self::with_limit(window, clock, MAX_TRACKED_NONCES)
    }

    pub fn with_limit(window: Duration, clock: Arc<dyn Clock>, max_tracked: usize) -> Self {
        Self {
            seen: Arc::new(Mutex::new(Seen::default())),
            window,
            clock,
            max_tracked: max_tracked.max(1),
        }
    }

    /// Record `nonce`; false if it was already recorded within the window.
    pub fn check_and_insert(&self, nonce: &str) -> bool {
        let now = self.clock.now();
        let mut seen = self.seen.lock();
        seen.expire(now, self.window);
        if seen.at.contains_key(nonce) {
            return false;
        }
        // Still full of live entries: the oldest gives way.
        if seen.at.len() >= self.max_tracked {
            seen.evict_oldest();
        }
        seen.at.insert(nonce.to_string(), now);
        seen.order.push_back((now, nonce.to_string()));
        true
    }

    /// Forget nonces older than the window.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        self.seen.lock().expire(now, self.window)
    }

    pub fn len(&self) -> usize {
        self.seen.lock().at.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.lock().at.is_empty()
    }
}
