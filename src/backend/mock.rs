// src/backend/mock.rs
// In-process backend: echo, canned test-mode replies, and knobs for tests.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use super::{InferenceBackend, InferenceTask};
use crate::error::InferenceError;

const TEST_MODE_PHRASES: &[&str] = &[
    "The quick brown fox jumps over the lazy dog.",
    "In a galaxy far, far away, there exists infinite possibilities.",
    "The ocean waves crash against the shore with rhythmic precision.",
    "Mountains stand tall as silent witnesses to time's passage.",
    "Stars twinkle in the night sky like distant dreams.",
    "Knowledge is the key that unlocks the doors of understanding.",
    "Desert sands shift endlessly under the relentless sun.",
    "Rivers flow ceaselessly toward the vast and waiting sea.",
    "Artificial intelligence continues to evolve and transform our world.",
    "Machine learning systems progressively develop and reshape human society.",
    "Quantum mechanics reveals the mysterious nature of reality.",
    "Subatomic physics uncovers the enigmatic essence of existence.",
    "Time marches forward, leaving transformation in its wake.",
    "The passage of years brings inevitable change to all things.",
];

pub struct MockBackend {
    test_mode: bool,
    healthy: AtomicBool,
    /// Health checks that report unhealthy before the first success.
    unhealthy_polls: AtomicU32,
    failing: AtomicBool,
    latency: Duration,
    calls: AtomicU64,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            test_mode: false,
            healthy: AtomicBool::new(true),
            unhealthy_polls: AtomicU32::new(0),
            failing: AtomicBool::new(false),
            latency: Duration::ZERO,
            calls: AtomicU64::new(0),
        }
    }

    /// Canned `[TEST MODE]` replies after ~10 ms.
    pub fn test_mode() -> Self {
        Self {
            test_mode: true,
            latency: Duration::from_millis(10),
            ..Self::new()
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Report unhealthy for the first `polls` health checks.
    pub fn healthy_after(self, polls: u32) -> Self {
        self.unhealthy_polls.store(polls, Ordering::SeqCst);
        self
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of tasks that reached the backend.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn health_check(&self) -> bool {
        let pending = self
            .unhealthy_polls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        !pending && self.healthy.load(Ordering::SeqCst)
    }

    async fn run_task(&self, task: &InferenceTask) -> Result<String, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(InferenceError::Request("mock backend set to fail".into()));
        }
        if self.test_mode {
            let phrase = TEST_MODE_PHRASES
                .choose(&mut rand::thread_rng())
                .copied()
                .unwrap_or_default();
            return Ok(format!(
                "[TEST MODE] Inference request received successfully. Test mode is enabled - no actual inference was performed. {phrase}"
            ));
        }
        Ok(format!("echo: {}", task.prompt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn healthy_after_counts_polls() {
        let b = MockBackend::new().healthy_after(2);
        assert!(!b.health_check().await);
        assert!(!b.health_check().await);
        assert!(b.health_check().await);
        b.set_healthy(false);
        assert!(!b.health_check().await);
    }

    #[tokio::test]
    async fn echo_and_test_mode() {
        let b = MockBackend::new();
        assert_eq!(b.run_task(&InferenceTask::new("hi")).await.unwrap(), "echo: hi");
        let t = MockBackend::test_mode();
        let out = t.run_task(&InferenceTask::new("hi")).await.unwrap();
        assert!(out.starts_with("[TEST MODE]"));
        assert_eq!(b.calls() + t.calls(), 2);
    }

    #[tokio::test]
    async fn failing_backend_errors() {
        let b = MockBackend::new();
        b.set_failing(true);
        assert!(b.run_task(&InferenceTask::new("x")).await.is_err());
    }
}
