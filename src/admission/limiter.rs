// src/admission/limiter.rs
// Bounded in-flight counter. No queueing: at the limit a request is refused.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::AdmissionError;

#[derive(Clone)]
pub struct ConcurrencyLimiter {
    in_flight: Arc<AtomicUsize>,
    max: usize,
    rejected: Arc<AtomicU64>,
}

impl ConcurrencyLimiter {
    pub fn new(max: usize) -> Self {
        Self {
            in_flight: Arc::new(AtomicUsize::new(0)),
            max,
            rejected: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Reserve a slot. Check and increment are one CAS, so N+1 racing
    /// callers against a limit of N admit exactly N.
    pub fn try_acquire(&self) -> Result<InFlightPermit, AdmissionError> {
        let max = self.max;
        match self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            }) {
            Ok(_) => Ok(InFlightPermit {
                in_flight: self.in_flight.clone(),
            }),
            Err(_) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                Err(AdmissionError::ConcurrencyLimitExceeded { limit: max })
            }
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// Total rejections since start.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

/// Held for the lifetime of one admitted request. Releases its slot on drop,
/// which also covers cancelled handlers and unwinding.
#[derive(Debug)]
pub struct InFlightPermit {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for InFlightPermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_then_release() {
        let limiter = ConcurrencyLimiter::new(2);
        let a = limiter.try_acquire().unwrap();
        let _b = limiter.try_acquire().unwrap();
        assert_eq!(
            limiter.try_acquire().unwrap_err(),
            AdmissionError::ConcurrencyLimitExceeded { limit: 2 }
        );
        assert_eq!(limiter.rejected(), 1);
        drop(a);
        assert_eq!(limiter.in_flight(), 1);
        assert!(limiter.try_acquire().is_ok());
    }

    #[test]
    fn permit_released_on_panic() {
        let limiter = ConcurrencyLimiter::new(1);
        let l = limiter.clone();
        let res = std::panic::catch_unwind(move || {
            let _permit = l.try_acquire().unwrap();
            panic!("dispatch blew up");
        });
        assert!(res.is_err());
        assert_eq!(limiter.in_flight(), 0);
    }
}
