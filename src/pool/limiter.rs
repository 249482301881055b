//! Admission control in front of the channel pool
//!
//! The limiter bounds the number of attempts in flight independently of pool
//! capacity. A rejected attempt never touches the network. Each admitted
//! attempt holds an [`AdmissionPermit`] until it finishes; the permit records
//! whether the attempt succeeded or its outcome should be ignored.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Admission error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    #[error("Too many operations in flight (limit {limit})")]
    LimitExceeded { limit: usize },
}

/// Limiter statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdmissionStats {
    pub in_flight: usize,
    pub admitted: u64,
    pub rejected: u64,
    pub succeeded: u64,
    pub ignored: u64,
}

/// Bounds concurrent attempts. A limit of 0 admits everything.
#[derive(Debug, Default)]
pub struct AdmissionLimiter {
    limit: usize,
    /// `None` when unlimited
    permits: Option<Arc<Semaphore>>,
    in_flight: AtomicUsize,
    admitted: AtomicU64,
    rejected: AtomicU64,
    succeeded: AtomicU64,
    ignored: AtomicU64,
}

impl AdmissionLimiter {
    pub fn new(limit: usize) -> Arc<Self> {
        let permits = (limit > 0).then(|| Arc::new(Semaphore::new(limit.min(Semaphore::MAX_PERMITS))));
        Arc::new(Self {
            limit,
            permits,
            ..Default::default()
        })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Admit one attempt or reject it immediately
    pub fn try_acquire(self: &Arc<Self>) -> Result<AdmissionPermit, AdmissionError> {
        let permit = match &self.permits {
            Some(permits) => match Arc::clone(permits).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    self.rejected.fetch_add(1, Ordering::Relaxed);
                    debug!(limit = self.limit, "Admission rejected");
                    return Err(AdmissionError::LimitExceeded { limit: self.limit });
                }
            },
            None => None,
        };

        self.in_flight.fetch_add(1, Ordering::AcqRel);
        self.admitted.fetch_add(1, Ordering::Relaxed);
        Ok(AdmissionPermit {
            limiter: Arc::clone(self),
            _permit: permit,
            recorded: false,
        })
    }

    pub fn stats(&self) -> AdmissionStats {
        AdmissionStats {
            in_flight: self.in_flight.load(Ordering::Acquire),
            admitted: self.admitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
        }
    }
}

/// One admitted attempt. Dropping it without an outcome counts as ignored.
#[derive(Debug)]
pub struct AdmissionPermit {
    limiter: Arc<AdmissionLimiter>,
    _permit: Option<OwnedSemaphorePermit>,
    recorded: bool,
}

impl AdmissionPermit {
    pub fn success(mut self) {
        self.limiter.succeeded.fetch_add(1, Ordering::Relaxed);
        self.recorded = true;
    }

    pub fn ignore(mut self) {
        self.limiter.ignored.fetch_add(1, Ordering::Relaxed);
        self.recorded = true;
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        if !self.recorded {
            self.limiter.ignored.fetch_add(1, Ordering::Relaxed);
        }
        self.limiter.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_is_enforced() {
        let limiter = AdmissionLimiter::new(2);
        let a = limiter.try_acquire().unwrap();
        let b = limiter.try_acquire().unwrap();
        assert_eq!(
            limiter.try_acquire().unwrap_err(),
            AdmissionError::LimitExceeded { limit: 2 }
        );

        a.success();
        let c = limiter.try_acquire().unwrap();
        b.ignore();
        drop(c);

        let stats = limiter.stats();
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.admitted, 3);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.ignored, 2);
    }

    #[test]
    fn test_zero_limit_is_unbounded() {
        let limiter = AdmissionLimiter::new(0);
        let permits: Vec<_> = (0..1000).map(|_| limiter.try_acquire().unwrap()).collect();
        assert_eq!(limiter.stats().in_flight, 1000);
        drop(permits);
        assert_eq!(limiter.stats().in_flight, 0);
    }

    #[test]
    fn test_permits_return_to_the_semaphore() {
        let limiter = AdmissionLimiter::new(1);
        for _ in 0..10 {
            let permit = limiter.try_acquire().unwrap();
            assert!(limiter.try_acquire().is_err());
            permit.success();
        }
        let stats = limiter.stats();
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.succeeded, 10);
        assert_eq!(stats.rejected, 10);
    }

    #[test]
    fn test_concurrent_admission_never_exceeds_limit() {
        let limiter = AdmissionLimiter::new(4);
        let peak = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let peak = Arc::clone(&peak);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        if let Ok(permit) = limiter.try_acquire() {
                            peak.fetch_max(limiter.stats().in_flight, Ordering::SeqCst);
                            permit.ignore();
                        }
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 4);
        assert_eq!(limiter.stats().in_flight, 0);
    }
}
