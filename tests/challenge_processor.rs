mod common;

use axum::http::StatusCode;
use fiber_node::backend::MockBackend;
use fiber_node::error::ChallengeError;
use fiber_node::security::SessionKey;

use common::{
    establish, harness, open_reply, ready_harness, sealed_request, sealed_task, session_settings,
};

fn assert_rehandshake(err: ChallengeError, expected_pk: &str) {
    assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    match err {
        ChallengeError::RequiresHandshake { public_key } => assert_eq!(public_key, expected_pk),
        other => panic!("expected re-handshake signal, got {:?}", other),
    }
}

#[tokio::test]
async fn unknown_peer_gets_rehandshake_not_server_error() {
    let h = ready_harness();
    let pk = h.node.public_key().unwrap().public_key;
    let err = h
        .node
        .submit_challenge(Some("B"), None, &sealed_task(&SessionKey::generate(), "k0", "hi"))
        .await
        .unwrap_err();
    assert_rehandshake(err, &pk);
    assert_eq!(h.backend.calls(), 0);
}

#[tokio::test]
async fn tampered_ciphertext_invalidates_session() {
    let h = ready_harness();
    let pk = h.node.public_key().unwrap().public_key;
    let (key, key_id) = establish(&h.node, "A");

    let mut c = sealed_task(&key, &key_id, "payload");
    let mid = c.len() / 2;
    c[mid] ^= 0x80;
    let err = h
        .node
        .submit_challenge(Some("A"), Some(&key_id), &c)
        .await
        .unwrap_err();
    assert_rehandshake(err, &pk);
    assert!(h.node.store().get("A").is_none());

    // A well-formed ciphertext under the old key is now refused too
    let err = h
        .node
        .submit_challenge(Some("A"), Some(&key_id), &sealed_task(&key, &key_id, "fresh"))
        .await
        .unwrap_err();
    assert_rehandshake(err, &pk);
    assert_eq!(h.backend.calls(), 0);
}

#[tokio::test]
async fn truncated_body_is_indistinguishable_from_missing_session() {
    let h = ready_harness();
    let (_, key_id) = establish(&h.node, "A");
    let truncated = h
        .node
        .submit_challenge(Some("A"), Some(&key_id), &[0u8; 8])
        .await
        .unwrap_err();
    let missing = h
        .node
        .submit_challenge(Some("nobody"), None, &[0u8; 8])
        .await
        .unwrap_err();
    assert_eq!(truncated.to_string(), missing.to_string());
    assert_eq!(truncated.status_code(), missing.status_code());
}

#[tokio::test]
async fn key_id_mismatch_signals_rehandshake_without_eviction() {
    let h = ready_harness();
    let (key, key_id) = establish(&h.node, "A");
    let err = h
        .node
        .submit_challenge(
            Some("A"),
            Some("some-other-key"),
            &sealed_task(&key, &key_id, "x"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ChallengeError::RequiresHandshake { .. }));
    assert_eq!(h.node.store().get("A").unwrap().key_id, key_id);
}

#[tokio::test]
async fn inference_failure_is_encrypted_under_session_key() {
    let h = ready_harness();
    let (key, key_id) = establish(&h.node, "A");
    h.backend.set_failing(true);
    let err = h
        .node
        .submit_challenge(Some("A"), None, &sealed_task(&key, &key_id, "x"))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    match err {
        ChallengeError::Inference {
            encrypted_body,
            key_id: reply_key,
        } => {
            assert_eq!(reply_key, key_id);
            let body: serde_json::Value =
                serde_json::from_slice(&open_reply(&key, &key_id, &encrypted_body)).unwrap();
            assert!(body["error"].as_str().unwrap().contains("mock backend"));
        }
        other => panic!("expected inference error, got {:?}", other),
    }
    // Session survives a backend failure
    assert!(h.node.store().get("A").is_some());
    assert_eq!(h.node.admission().limiter().in_flight(), 0);
}

#[tokio::test]
async fn authentic_non_task_plaintext_is_bad_request() {
    let h = ready_harness();
    let (key, key_id) = establish(&h.node, "A");
    let c = sealed_request(&key, &key_id, b"definitely not json");
    let err = h.node.submit_challenge(Some("A"), None, &c).await.unwrap_err();
    assert!(matches!(err, ChallengeError::InvalidTask(_)));
    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    assert!(h.node.store().get("A").is_some());
}

#[tokio::test]
async fn missing_peer_is_bad_request() {
    let h = ready_harness();
    let err = h.node.submit_challenge(None, None, b"x").await.unwrap_err();
    assert!(matches!(err, ChallengeError::MissingPeer));
}

#[tokio::test]
async fn test_mode_backend_returns_canned_reply_with_metadata() {
    let h = harness(MockBackend::test_mode(), session_settings(3600), 10, true);
    let (key, key_id) = establish(&h.node, "A");
    let mut task = fiber_node::backend::InferenceTask::new("anything");
    task.metadata = Some(serde_json::json!({"round": 7}));
    let c = sealed_request(&key, &key_id, &serde_json::to_vec(&task).unwrap());
    let reply = h.node.submit_challenge(Some("A"), None, &c).await.unwrap();
    let out: fiber_node::backend::InferenceOutput =
        serde_json::from_slice(&open_reply(&key, &key_id, &reply.ciphertext)).unwrap();
    assert!(out.response_text.starts_with("[TEST MODE]"));
    assert_eq!(out.metadata, Some(serde_json::json!({"round": 7})));
    assert!(out.response_time_ms >= 10);
}

#[tokio::test]
async fn repeated_rehandshakes_are_counted_per_peer() {
    let h = ready_harness();
    for _ in 0..5 {
        let _ = h.node.submit_challenge(Some("noisy"), None, b"x").await;
    }
    let _ = h.node.submit_challenge(Some("quiet"), None, b"x").await;
    assert_eq!(h.node.processor().tracker().count("noisy"), 5);
    assert_eq!(h.node.processor().tracker().count("quiet"), 1);
}

#[tokio::test]
async fn reflected_reply_is_not_accepted_as_a_request() {
    let h = ready_harness();
    let pk = h.node.public_key().unwrap().public_key;
    let (key, key_id) = establish(&h.node, "A");
    let reply = h
        .node
        .submit_challenge(Some("A"), Some(&key_id), &sealed_task(&key, &key_id, "once"))
        .await
        .unwrap();

    let err = h
        .node
        .submit_challenge(Some("A"), Some(&key_id), &reply.ciphertext)
        .await
        .unwrap_err();
    assert_rehandshake(err, &pk);
    assert_eq!(h.backend.calls(), 1);
}
