// src/admission/readiness.rs
// Backend readiness flag and the poller that drives it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::backend::InferenceBackend;
use crate::events::dispatcher;
use crate::events::model::{LogEvent, LogLevel, ReadinessEvent};

/// Process-wide `not_ready | ready` cell. Starts not ready.
#[derive(Clone, Default)]
pub struct ReadinessGate {
    ready: Arc<AtomicBool>,
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Set the state; returns the previous one.
    pub fn mark(&self, ready: bool) -> bool {
        self.ready.swap(ready, Ordering::AcqRel)
    }
}

fn label(ready: bool) -> &'static str {
    if ready {
        "ready"
    } else {
        "not_ready"
    }
}

pub struct ReadinessPoller {
    gate: ReadinessGate,
    backend: Arc<dyn InferenceBackend>,
    interval: Duration,
    timeout: Duration,
}

impl ReadinessPoller {
    pub fn new(
        gate: ReadinessGate,
        backend: Arc<dyn InferenceBackend>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            gate,
            backend,
            interval,
            timeout,
        }
    }

    /// One health check. Only state changes are logged.
    pub async fn poll_once(&self) -> bool {
        let healthy = matches!(
            tokio::time::timeout(self.timeout, self.backend.health_check()).await,
            Ok(true)
        );
        let was = self.gate.mark(healthy);
        if was != healthy {
            let level = if healthy { LogLevel::Info } else { LogLevel::Warn };
            let mut meta = dispatcher::meta("readiness", level);
            meta.corr_id = Some(dispatcher::correlation_id());
            dispatcher::emit(LogEvent::Readiness(ReadinessEvent {
                meta,
                from: label(was).to_string(),
                to: label(healthy).to_string(),
                detail: Some(format!("backend={}", self.backend.name())),
            }));
        }
        healthy
    }

    /// Poll forever on its own task; the first check runs immediately.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.poll_once().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;

    #[tokio::test]
    async fn follows_backend_health_both_ways() {
        let backend = Arc::new(MockBackend::new().healthy_after(1));
        let gate = ReadinessGate::new();
        let poller = ReadinessPoller::new(
            gate.clone(),
            backend.clone(),
            Duration::from_secs(5),
            Duration::from_secs(1),
        );
        assert!(!poller.poll_once().await);
        assert!(!gate.is_ready());
        assert!(poller.poll_once().await);
        assert!(gate.is_ready());
        backend.set_healthy(false);
        assert!(!poller.poll_once().await);
        assert!(!gate.is_ready());
    }
}
