mod common;

use std::sync::Arc;
use std::time::Duration;

use fiber_node::backend::MockBackend;
use fiber_node::error::{AdmissionError, ChallengeError, KeyExchangeError};
use fiber_node::security::SessionKey;

use common::{establish, harness, key_request, sealed_task, session_settings};

#[tokio::test]
async fn not_ready_rejects_before_touching_sessions() {
    let h = harness(MockBackend::new(), session_settings(3600), 10, false);

    assert_eq!(
        h.node.public_key().unwrap_err(),
        AdmissionError::BackendNotReady
    );
    let pk = h.node.identity().public_key().to_string();
    let err = h
        .node
        .submit_session_key(Some("A"), &key_request(&pk, &SessionKey::generate(), "k1"))
        .unwrap_err();
    assert!(matches!(
        err,
        KeyExchangeError::Admission(AdmissionError::BackendNotReady)
    ));
    assert_eq!(err.status_code().as_u16(), 503);

    let err = h
        .node
        .submit_challenge(Some("A"), None, b"anything")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ChallengeError::Admission(AdmissionError::BackendNotReady)
    ));
    assert_eq!(err.status_code().as_u16(), 503);

    assert_eq!(h.node.store().lookups(), 0);
    assert!(h.node.store().is_empty());
    assert_eq!(h.node.admission().limiter().in_flight(), 0);
    assert_eq!(h.backend.calls(), 0);
}

#[tokio::test]
async fn readiness_loss_rejects_live_session_without_lookup() {
    let h = harness(MockBackend::new(), session_settings(3600), 10, true);
    let (key, key_id) = establish(&h.node, "A");
    let lookups = h.node.store().lookups();

    h.node.admission().readiness().mark(false);
    let body = sealed_task(&key, &key_id, "while down");
    let err = h
        .node
        .submit_challenge(Some("A"), Some(&key_id), &body)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ChallengeError::Admission(AdmissionError::BackendNotReady)
    ));
    assert_eq!(err.status_code().as_u16(), 503);
    assert_eq!(h.node.store().lookups(), lookups);
    assert_eq!(h.backend.calls(), 0);
    assert_eq!(h.node.store().len(), 1);

    // The session survives the outage and serves once the gate reopens
    h.node.admission().readiness().mark(true);
    let reply = h
        .node
        .submit_challenge(Some("A"), Some(&key_id), &body)
        .await
        .unwrap();
    assert_eq!(reply.key_id, key_id);
    assert_eq!(h.backend.calls(), 1);
}

#[tokio::test]
async fn readiness_poller_opens_gate_after_first_healthy_check() {
    let h = harness(
        MockBackend::new().healthy_after(1),
        session_settings(3600),
        10,
        false,
    );
    let poller = h.node.readiness_poller();
    assert!(!poller.poll_once().await);
    assert!(h.node.public_key().is_err());
    assert!(poller.poll_once().await);
    assert!(h.node.public_key().is_ok());

    h.backend.set_healthy(false);
    assert!(!poller.poll_once().await);
    assert!(!h.node.availability().ready);
}

#[tokio::test]
async fn spawned_poller_checks_immediately() {
    let h = harness(MockBackend::new(), session_settings(3600), 10, false);
    let handle = h.node.readiness_poller().spawn();
    for _ in 0..50 {
        if h.node.admission().readiness().is_ready() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(h.node.admission().readiness().is_ready());
    handle.abort();
}

#[tokio::test]
async fn limit_n_admits_n_and_rejects_the_extra_one() {
    const N: usize = 3;
    let h = harness(
        MockBackend::new().with_latency(Duration::from_millis(300)),
        session_settings(3600),
        N,
        true,
    );
    let (key, key_id) = establish(&h.node, "A");

    let mut handles = Vec::new();
    for i in 0..=N {
        let node = Arc::clone(&h.node);
        let body = sealed_task(&key, &key_id, &format!("task {i}"));
        handles.push(tokio::spawn(async move {
            node.submit_challenge(Some("A"), None, &body).await
        }));
    }

    let mut ok = 0;
    let mut limited = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(ChallengeError::Admission(AdmissionError::ConcurrencyLimitExceeded { limit })) => {
                assert_eq!(limit, N);
                limited += 1;
            }
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }
    assert_eq!(ok, N);
    assert_eq!(limited, 1);
    assert_eq!(h.node.admission().limiter().in_flight(), 0);
    assert_eq!(h.node.admission().limiter().rejected(), 1);
}

#[tokio::test]
async fn cancelled_request_releases_its_slot() {
    let h = harness(
        MockBackend::new().with_latency(Duration::from_secs(30)),
        session_settings(3600),
        1,
        true,
    );
    let (key, key_id) = establish(&h.node, "A");
    let node = Arc::clone(&h.node);
    let body = sealed_task(&key, &key_id, "slow");
    let task = tokio::spawn(async move { node.submit_challenge(Some("A"), None, &body).await });

    for _ in 0..50 {
        if h.node.admission().limiter().in_flight() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(h.node.admission().limiter().in_flight(), 1);
    assert!(!h.node.availability().available);

    // Client disconnect drops the handler future
    task.abort();
    let _ = task.await;
    assert_eq!(h.node.admission().limiter().in_flight(), 0);
    assert!(h.node.availability().available);
}
