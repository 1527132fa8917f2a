#![allow(dead_code)]

use base64::Engine;
use std::sync::Arc;
use std::time::Duration;

use fiber_node::backend::{InferenceTask, MockBackend};
use fiber_node::config::{AdmissionSettings, SessionSettings};
use fiber_node::network::KeyExchangeRequest;
use fiber_node::security::{seal_for, Direction, ManualClock, SessionKey};
use fiber_node::FiberNode;

pub struct Harness {
    pub node: Arc<FiberNode>,
    pub backend: Arc<MockBackend>,
    pub clock: Arc<ManualClock>,
}

pub fn session_settings(ttl_secs: u64) -> SessionSettings {
    SessionSettings {
        key_ttl: Duration::from_secs(ttl_secs),
        ..SessionSettings::default()
    }
}

pub fn admission_settings(max: usize) -> AdmissionSettings {
    AdmissionSettings {
        max_concurrent_requests: max,
        ..AdmissionSettings::default()
    }
}

/// Node on a manual clock; `ready` flips the readiness gate without a poller.
pub fn harness(backend: MockBackend, session: SessionSettings, max: usize, ready: bool) -> Harness {
    let backend = Arc::new(backend);
    let clock = Arc::new(ManualClock::new());
    let node = Arc::new(FiberNode::with_clock(
        "test-node",
        backend.clone(),
        session,
        admission_settings(max),
        clock.clone(),
    ));
    node.admission().readiness().mark(ready);
    Harness {
        node,
        backend,
        clock,
    }
}

pub fn ready_harness() -> Harness {
    harness(MockBackend::new(), session_settings(3600), 10, true)
}

pub fn key_request(public_key: &str, key: &SessionKey, key_id: &str) -> KeyExchangeRequest {
    let sealed = seal_for(public_key, key.as_bytes()).unwrap();
    KeyExchangeRequest {
        encrypted_symmetric_key: base64::engine::general_purpose::STANDARD.encode(sealed),
        symmetric_key_uuid: key_id.to_string(),
        timestamp: None,
        nonce: uuid::Uuid::new_v4().to_string(),
        signature: None,
        peer_id: None,
    }
}

/// Full two-step handshake for `peer`; returns the session key and its id.
pub fn establish(node: &FiberNode, peer: &str) -> (SessionKey, String) {
    let pk = node.public_key().unwrap().public_key;
    let key = SessionKey::generate();
    let key_id = format!("key-{}", uuid::Uuid::new_v4());
    let resp = node
        .submit_session_key(Some(peer), &key_request(&pk, &key, &key_id))
        .unwrap();
    assert!(resp.success);
    (key, key_id)
}

/// Challenge body as a requester would send it under `key_id`.
pub fn sealed_task(key: &SessionKey, key_id: &str, prompt: &str) -> Vec<u8> {
    let body = serde_json::to_vec(&InferenceTask::new(prompt)).unwrap();
    key.seal(Direction::Request, key_id, &body).unwrap()
}

pub fn sealed_request(key: &SessionKey, key_id: &str, plaintext: &[u8]) -> Vec<u8> {
    key.seal(Direction::Request, key_id, plaintext).unwrap()
}

pub fn open_reply(key: &SessionKey, key_id: &str, sealed: &[u8]) -> Vec<u8> {
    key.open(Direction::Reply, key_id, sealed).unwrap()
}
