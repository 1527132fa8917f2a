// src/security/handshake.rs
// Public key publication and session key submission.

use base64::Engine;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::cipher::{SessionKey, KEY_LEN};
use super::identity::NodeIdentity;
use super::replay::NonceCache;
use super::session_store::SessionStore;
use crate::config::SessionSettings;
use crate::constants::{short_id, KEY_TRANSPORT_ALGORITHM};
use crate::error::KeyExchangeError;
use crate::events::dispatcher;
use crate::events::model::{HandshakeEvent, HandshakeOutcome, LogEvent, LogLevel};
use crate::network::message::{
    HandshakeRequired, KeyExchangeRequest, KeyExchangeResponse, PublicKeyResponse,
};

const MAX_KEY_ID_LEN: usize = 128;

pub struct HandshakeController {
    identity: Arc<NodeIdentity>,
    store: SessionStore,
    nonces: NonceCache,
    settings: SessionSettings,
}

impl HandshakeController {
    pub fn new(identity: Arc<NodeIdentity>, store: SessionStore, settings: SessionSettings) -> Self {
        let nonces = NonceCache::new(settings.handshake_timeout, store.clock().clone());
        Self {
            identity,
            store,
            nonces,
            settings,
        }
    }

    /// Step one. Identical for the whole process lifetime.
    pub fn public_key_response(&self) -> PublicKeyResponse {
        PublicKeyResponse {
            public_key: self.identity.public_key().to_string(),
            algorithm: KEY_TRANSPORT_ALGORITHM.to_string(),
            fingerprint: self.identity.fingerprint().to_string(),
        }
    }

    /// Body of every 401 re-handshake signal.
    pub fn requires_handshake(&self) -> HandshakeRequired {
        HandshakeRequired::new(self.identity.public_key())
    }

    /// Step two: open the sealed session key and install it for `peer_id`.
    pub fn submit_session_key(
        &self,
        peer_id: Option<&str>,
        req: &KeyExchangeRequest,
    ) -> Result<KeyExchangeResponse, KeyExchangeError> {
        let peer = match peer_id.map(str::trim).filter(|p| !p.is_empty()) {
            Some(p) => p,
            None => {
                emit_handshake(
                    "unknown",
                    None,
                    HandshakeOutcome::Rejected,
                    "missing peer",
                    false,
                    None,
                );
                return Err(KeyExchangeError::MissingPeer);
            }
        };
        match self.install(peer, req) {
            Ok((replaced, ttl_secs)) => {
                emit_handshake(
                    peer,
                    Some(&req.symmetric_key_uuid),
                    HandshakeOutcome::Accepted,
                    if replaced { "rotated" } else { "established" },
                    replaced,
                    Some(ttl_secs),
                );
                Ok(KeyExchangeResponse::accepted(ttl_secs))
            }
            Err(e) => {
                emit_handshake(
                    peer,
                    Some(&req.symmetric_key_uuid),
                    HandshakeOutcome::Rejected,
                    &e.to_string(),
                    false,
                    None,
                );
                Err(e)
            }
        }
    }

    fn install(&self, peer: &str, req: &KeyExchangeRequest) -> Result<(bool, u64), KeyExchangeError> {
        let key_id = req.symmetric_key_uuid.trim();
        if key_id.is_empty()
            || key_id.len() > MAX_KEY_ID_LEN
            || !key_id.chars().all(|c| c.is_ascii_graphic())
        {
            return Err(KeyExchangeError::Malformed(
                "symmetric_key_uuid must be 1-128 printable characters".into(),
            ));
        }
        if req.nonce.trim().is_empty() {
            return Err(KeyExchangeError::Malformed("nonce is required".into()));
        }
        let sealed = base64::engine::general_purpose::STANDARD
            .decode(req.encrypted_symmetric_key.trim())
            .map_err(|e| KeyExchangeError::Malformed(format!("encrypted_symmetric_key: {e}")))?;
        if !self.nonces.check_and_insert(&req.nonce) {
            return Err(KeyExchangeError::Replay);
        }
        let raw = zeroize::Zeroizing::new(self.identity.decrypt(&sealed)?);
        let key = SessionKey::from_slice(&raw).ok_or(KeyExchangeError::InvalidKeyLength {
            expected: KEY_LEN,
            actual: raw.len(),
        })?;
        let ttl = self.settings.key_ttl;
        let outcome = self
            .store
            .try_put(peer, key_id, key, ttl, self.settings.enable_key_rotation)
            .map_err(|_| KeyExchangeError::RotationDisabled)?;
        Ok((outcome.replaced, ttl.as_secs()))
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn identity(&self) -> &Arc<NodeIdentity> {
        &self.identity
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Forget handshake nonces once they leave the replay window.
    pub fn spawn_nonce_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let nonces = self.nonces.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                nonces.sweep();
            }
        })
    }
}

fn emit_handshake(
    peer: &str,
    key_id: Option<&str>,
    outcome: HandshakeOutcome,
    reason: &str,
    replaced_existing: bool,
    ttl_secs: Option<u64>,
) {
    let level = match outcome {
        HandshakeOutcome::Accepted => LogLevel::Info,
        HandshakeOutcome::Rejected => LogLevel::Warn,
    };
    let mut meta = dispatcher::meta("handshake", level);
    meta.corr_id = Some(dispatcher::correlation_id());
    dispatcher::emit(LogEvent::Handshake(HandshakeEvent {
        meta,
        peer: short_id(peer),
        key_id: key_id.map(short_id),
        outcome,
        reason: reason.to_string(),
        replaced_existing,
        ttl_secs,
    }));
}
