// src/challenge.rs
// Decrypt -> dispatch -> encrypt for one challenge.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use zeroize::Zeroizing;

use crate::backend::{InferenceBackend, InferenceOutput, InferenceTask};
use crate::constants::short_id;
use crate::error::ChallengeError;
use crate::events::dispatcher;
use crate::events::model::{ChallengeEvent, LogEvent, LogLevel};
use crate::security::{Clock, Direction, NodeIdentity, SessionStore};

const ALERT_WINDOW: Duration = Duration::from_secs(60);
/// Peers tracked at once by the re-handshake counter.
const MAX_TRACKED_PEERS: usize = 10_000;

/// Encrypted reply plus the key id it was sealed under.
#[derive(Debug)]
pub struct ChallengeReply {
    pub ciphertext: Vec<u8>,
    pub key_id: String,
}

/// Counts re-handshake signals per peer over a sliding minute.
pub struct RehandshakeTracker {
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
    threshold: u32,
    clock: Arc<dyn Clock>,
}

impl RehandshakeTracker {
    pub fn new(threshold: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            hits: Mutex::new(HashMap::new()),
            threshold,
            clock,
        }
    }

    /// Record one signal; returns true exactly when the peer crosses the threshold.
    pub fn record(&self, peer: &str) -> bool {
        let now = self.clock.now();
        let mut hits = self.hits.lock();
        if hits.len() >= MAX_TRACKED_PEERS && !hits.contains_key(peer) {
            hits.retain(|_, q| {
                q.back()
                    .map(|t| now.saturating_duration_since(*t) < ALERT_WINDOW)
                    .unwrap_or(false)
            });
        }
        let q = hits.entry(peer.to_string()).or_default();
        while let Some(front) = q.front() {
            if now.saturating_duration_since(*front) >= ALERT_WINDOW {
                q.pop_front();
            } else {
                break;
            }
        }
        q.push_back(now);
        q.len() == self.threshold as usize + 1
    }

    pub fn count(&self, peer: &str) -> usize {
        self.hits.lock().get(peer).map(VecDeque::len).unwrap_or(0)
    }
}

pub struct ChallengeProcessor {
    identity: Arc<NodeIdentity>,
    store: SessionStore,
    backend: Arc<dyn InferenceBackend>,
    tracker: RehandshakeTracker,
}

impl ChallengeProcessor {
    pub fn new(
        identity: Arc<NodeIdentity>,
        store: SessionStore,
        backend: Arc<dyn InferenceBackend>,
        rehandshake_alert_threshold: u32,
    ) -> Self {
        let tracker = RehandshakeTracker::new(rehandshake_alert_threshold, store.clock().clone());
        Self {
            identity,
            store,
            backend,
            tracker,
        }
    }

    pub fn backend(&self) -> &Arc<dyn InferenceBackend> {
        &self.backend
    }

    pub fn tracker(&self) -> &RehandshakeTracker {
        &self.tracker
    }

    /// Missing, expired, mismatched and undecryptable sessions all produce the
    /// same [`ChallengeError::RequiresHandshake`].
    pub async fn process(
        &self,
        peer_id: Option<&str>,
        key_id: Option<&str>,
        ciphertext: &[u8],
    ) -> Result<ChallengeReply, ChallengeError> {
        let peer = peer_id
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or(ChallengeError::MissingPeer)?;

        let session = match self.store.get(peer) {
            Some(s) => s,
            None => return Err(self.requires_handshake(peer, "no live session")),
        };
        if let Some(claimed) = key_id.map(str::trim).filter(|k| !k.is_empty()) {
            if claimed != session.key_id {
                return Err(self.requires_handshake(peer, "key id mismatch"));
            }
        }

        let plaintext = match session.key.open(Direction::Request, &session.key_id, ciphertext) {
            Ok(pt) => Zeroizing::new(pt),
            Err(e) => {
                self.store.invalidate_session(&session);
                return Err(self.requires_handshake(peer, &format!("decryption failed: {e}")));
            }
        };

        let task: InferenceTask = serde_json::from_slice(&plaintext).map_err(|e| {
            emit_challenge(
                peer,
                LogLevel::Warn,
                "invalid_task",
                Some(&session.key_id),
                None,
                Some(e.to_string()),
            );
            ChallengeError::InvalidTask(e.to_string())
        })?;

        let started = Instant::now();
        let result = self.backend.run_task(&task).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(response_text) => {
                let output = InferenceOutput {
                    response_text,
                    response_time_ms: elapsed_ms,
                    metadata: task.metadata,
                };
                let body = serde_json::to_vec(&output)
                    .map_err(|e| ChallengeError::Internal(e.to_string()))?;
                let ciphertext = session.key.seal(Direction::Reply, &session.key_id, &body)?;
                emit_challenge(
                    peer,
                    LogLevel::Info,
                    "completed",
                    Some(&session.key_id),
                    Some(elapsed_ms),
                    None,
                );
                Ok(ChallengeReply {
                    ciphertext,
                    key_id: session.key_id.clone(),
                })
            }
            Err(e) => {
                emit_challenge(
                    peer,
                    LogLevel::Error,
                    "inference_failed",
                    Some(&session.key_id),
                    Some(elapsed_ms),
                    Some(e.to_string()),
                );
                let body = serde_json::json!({ "error": e.to_string() }).to_string();
                let encrypted_body = session
                    .key
                    .seal(Direction::Reply, &session.key_id, body.as_bytes())?;
                Err(ChallengeError::Inference {
                    encrypted_body,
                    key_id: session.key_id.clone(),
                })
            }
        }
    }

    fn requires_handshake(&self, peer: &str, reason: &str) -> ChallengeError {
        emit_challenge(
            peer,
            LogLevel::Debug,
            "requires_handshake",
            None,
            None,
            Some(reason.to_string()),
        );
        if self.tracker.record(peer) {
            emit_challenge(
                peer,
                LogLevel::Warn,
                "rehandshake_alert",
                None,
                None,
                Some(format!(
                    "more than {} handshake signals in {}s",
                    self.tracker.threshold,
                    ALERT_WINDOW.as_secs()
                )),
            );
        }
        ChallengeError::RequiresHandshake {
            public_key: self.identity.public_key().to_string(),
        }
    }
}

fn emit_challenge(
    peer: &str,
    level: LogLevel,
    action: &str,
    key_id: Option<&str>,
    elapsed_ms: Option<u64>,
    detail: Option<String>,
) {
    let meta = dispatcher::meta("challenge", level);
    dispatcher::emit(LogEvent::Challenge(ChallengeEvent {
        meta,
        peer: short_id(peer),
        action: action.to_string(),
        key_id: key_id.map(short_id),
        elapsed_ms,
        detail,
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::ManualClock;

    #[test]
    fn tracker_fires_once_per_window() {
        let clock = Arc::new(ManualClock::new());
        let tracker = RehandshakeTracker::new(2, clock.clone());
        assert!(!tracker.record("peer-a"));
        assert!(!tracker.record("peer-a"));
        assert!(tracker.record("peer-a"));
        assert!(!tracker.record("peer-a"));
        assert!(!tracker.record("peer-b"));
        clock.advance(Duration::from_secs(61));
        assert!(!tracker.record("peer-a"));
        assert_eq!(tracker.count("peer-a"), 1);
    }
}
