//! Request admission: backend readiness first, then the concurrency limit.
//!
//! Both checks run before any session lookup or decryption. Rejections are
//! counted on every occurrence but logged only on the first and every 100th.

pub mod limiter;
pub mod readiness;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub use limiter::{ConcurrencyLimiter, InFlightPermit};
pub use readiness::{ReadinessGate, ReadinessPoller};

use crate::config::AdmissionSettings;
use crate::error::AdmissionError;
use crate::events::dispatcher;
use crate::events::model::{AdmissionEvent, AdmissionGateKind, LogEvent, LogLevel};

const LOG_EVERY_N_REJECTIONS: u64 = 100;

#[derive(Clone)]
pub struct AdmissionGate {
    readiness: ReadinessGate,
    limiter: ConcurrencyLimiter,
    not_ready_rejections: Arc<AtomicU64>,
}

impl AdmissionGate {
    pub fn new(readiness: ReadinessGate, limiter: ConcurrencyLimiter) -> Self {
        Self {
            readiness,
            limiter,
            not_ready_rejections: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn from_settings(settings: &AdmissionSettings) -> Self {
        Self::new(
            ReadinessGate::new(),
            ConcurrencyLimiter::new(settings.max_concurrent_requests),
        )
    }

    /// Readiness only; used by the handshake endpoints.
    pub fn check_ready(&self) -> Result<(), AdmissionError> {
        if self.readiness.is_ready() {
            return Ok(());
        }
        let total = self.not_ready_rejections.fetch_add(1, Ordering::Relaxed) + 1;
        if should_log(total) {
            self.emit(AdmissionGateKind::Readiness, "rejected_not_ready", total);
        }
        Err(AdmissionError::BackendNotReady)
    }

    /// Both gates; the returned permit holds a concurrency slot.
    pub fn admit(&self) -> Result<InFlightPermit, AdmissionError> {
        self.check_ready()?;
        self.limiter.try_acquire().map_err(|e| {
            let total = self.limiter.rejected();
            if should_log(total) {
                self.emit(AdmissionGateKind::Concurrency, "rejected_at_capacity", total);
            }
            e
        })
    }

    pub fn readiness(&self) -> &ReadinessGate {
        &self.readiness
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    fn emit(&self, gate: AdmissionGateKind, action: &str, rejected_total: u64) {
        let meta = dispatcher::meta("admission", LogLevel::Warn);
        dispatcher::emit(LogEvent::Admission(AdmissionEvent {
            meta,
            gate,
            action: action.to_string(),
            in_flight: self.limiter.in_flight(),
            limit: self.limiter.max(),
            rejected_total,
        }));
    }
}

fn should_log(total: u64) -> bool {
    total == 1 || total % LOG_EVERY_N_REJECTIONS == 0
}
