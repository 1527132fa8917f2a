// src/node.rs
// Responder facade: one identity, one store, one admission gate per process.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::admission::{AdmissionGate, ReadinessPoller};
use crate::backend::InferenceBackend;
use crate::challenge::{ChallengeProcessor, ChallengeReply};
use crate::config::{AdmissionSettings, Config, SessionSettings};
use crate::emit_system_event;
use crate::error::{AdmissionError, ChallengeError, KeyExchangeError};
use crate::events::model::LogLevel;
use crate::network::message::{
    AvailabilityResponse, KeyExchangeRequest, KeyExchangeResponse, PublicKeyResponse,
};
use crate::security::{Clock, HandshakeController, NodeIdentity, SessionStore, SystemClock};

pub struct FiberNode {
    node_id: String,
    handshake: HandshakeController,
    processor: ChallengeProcessor,
    admission: AdmissionGate,
    admission_settings: AdmissionSettings,
}

/// Handles of the tasks started by [`FiberNode::spawn_background`].
pub struct BackgroundTasks {
    pub readiness: JoinHandle<()>,
    pub session_sweeper: JoinHandle<()>,
    pub nonce_sweeper: JoinHandle<()>,
}

impl BackgroundTasks {
    pub fn abort(&self) {
        self.readiness.abort();
        self.session_sweeper.abort();
        self.nonce_sweeper.abort();
    }
}

impl FiberNode {
    pub fn new(
        node_id: impl Into<String>,
        backend: Arc<dyn InferenceBackend>,
        session: SessionSettings,
        admission: AdmissionSettings,
    ) -> Self {
        Self::with_clock(node_id, backend, session, admission, Arc::new(SystemClock))
    }

    /// Fresh identity and empty store, reading time from `clock`.
    pub fn with_clock(
        node_id: impl Into<String>,
        backend: Arc<dyn InferenceBackend>,
        session: SessionSettings,
        admission: AdmissionSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let identity = Arc::new(NodeIdentity::generate());
        let store = SessionStore::with_clock(clock);
        let processor = ChallengeProcessor::new(
            identity.clone(),
            store.clone(),
            backend,
            session.rehandshake_alert_threshold,
        );
        let handshake = HandshakeController::new(identity, store, session);
        Self {
            node_id: node_id.into(),
            handshake,
            processor,
            admission: AdmissionGate::from_settings(&admission),
            admission_settings: admission,
        }
    }

    pub fn from_config(
        cfg: &Config,
        node_id: impl Into<String>,
        backend: Arc<dyn InferenceBackend>,
    ) -> Self {
        Self::new(
            node_id,
            backend,
            SessionSettings::from_config(cfg),
            AdmissionSettings::from_config(cfg),
        )
    }

    pub fn public_key(&self) -> Result<PublicKeyResponse, AdmissionError> {
        self.admission.check_ready()?;
        Ok(self.handshake.public_key_response())
    }

    pub fn submit_session_key(
        &self,
        peer_id: Option<&str>,
        req: &KeyExchangeRequest,
    ) -> Result<KeyExchangeResponse, KeyExchangeError> {
        self.admission.check_ready()?;
        self.handshake.submit_session_key(peer_id, req)
    }

    /// Admission first; the permit is held until the reply is built.
    pub async fn submit_challenge(
        &self,
        peer_id: Option<&str>,
        key_id: Option<&str>,
        ciphertext: &[u8],
    ) -> Result<ChallengeReply, ChallengeError> {
        let _permit = self.admission.admit()?;
        self.processor.process(peer_id, key_id, ciphertext).await
    }

    pub fn availability(&self) -> AvailabilityResponse {
        let ready = self.admission.readiness().is_ready();
        let limiter = self.admission.limiter();
        let in_flight = limiter.in_flight();
        AvailabilityResponse {
            available: ready && in_flight < limiter.max(),
            ready,
            in_flight,
            max_in_flight: limiter.max(),
        }
    }

    pub fn readiness_poller(&self) -> ReadinessPoller {
        ReadinessPoller::new(
            self.admission.readiness().clone(),
            self.processor.backend().clone(),
            self.admission_settings.readiness_poll_interval,
            self.admission_settings.health_check_timeout,
        )
    }

    /// Start the readiness poller and both sweepers.
    pub fn spawn_background(&self) -> BackgroundTasks {
        let settings = self.handshake.settings();
        let nonce_sweep = settings.handshake_timeout.max(Duration::from_secs(1));
        emit_system_event!(
            "node",
            LogLevel::Info,
            "background_start",
            Some(format!(
                "poll={}s sweep={}s backend={}",
                self.admission_settings.readiness_poll_interval.as_secs(),
                settings.sweep_interval.as_secs(),
                self.processor.backend().name()
            ))
        );
        BackgroundTasks {
            readiness: self.readiness_poller().spawn(),
            session_sweeper: self.store().spawn_sweeper(settings.sweep_interval),
            nonce_sweeper: self.handshake.spawn_nonce_sweeper(nonce_sweep),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn identity(&self) -> &Arc<NodeIdentity> {
        self.handshake.identity()
    }

    pub fn store(&self) -> &SessionStore {
        self.handshake.store()
    }

    pub fn admission(&self) -> &AdmissionGate {
        &self.admission
    }

    pub fn handshake(&self) -> &HandshakeController {
        &self.handshake
    }

    pub fn processor(&self) -> &ChallengeProcessor {
        &self.processor
    }
}
