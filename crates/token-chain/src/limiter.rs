//! Run-wide cap on in-flight stage tasks.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Default)]
struct LimiterStats {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

/// Counting semaphore shared by every stage of a run.
///
/// Slots are only handed out as [`LimiterPermit`] guards, so a slot returns
/// to the pool whenever the guard is dropped, including on early returns,
/// cancellation and panics.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    stats: Arc<LimiterStats>,
}

impl ConcurrencyLimiter {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            stats: Arc::new(LimiterStats::default()),
        }
    }

    /// Wait for a free slot.
    ///
    /// Only fails if the limiter was closed.
    pub async fn acquire(&self) -> Result<LimiterPermit, AcquireError> {
        let permit = self.semaphore.clone().acquire_owned().await?;
        let now = self.stats.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.stats.peak.fetch_max(now, Ordering::AcqRel);
        Ok(LimiterPermit {
            _permit: permit,
            stats: self.stats.clone(),
        })
    }

    /// Wake all waiters with an error and refuse further acquisitions.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn in_flight(&self) -> usize {
        self.stats.in_flight.load(Ordering::Acquire)
    }

    /// Highest number of simultaneously held permits seen so far.
    pub fn peak(&self) -> usize {
        self.stats.peak.load(Ordering::Acquire)
    }
}

/// A held slot. Dropping it releases the slot.
#[derive(Debug)]
pub struct LimiterPermit {
    _permit: OwnedSemaphorePermit,
    stats: Arc<LimiterStats>,
}

impl Drop for LimiterPermit {
    fn drop(&mut self) {
        self.stats.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::task::JoinSet;

    #[tokio::test(start_paused = true)]
    async fn peak_never_exceeds_capacity() {
        let limiter = ConcurrencyLimiter::new(2);
        let mut tasks = JoinSet::new();

        for _ in 0..6 {
            let permit = limiter.acquire().await.unwrap();
            tasks.spawn(async move {
                let _permit = permit;
                tokio::time::sleep(Duration::from_millis(50)).await;
            });
        }
        while tasks.join_next().await.is_some() {}

        assert_eq!(limiter.peak(), 2);
        assert_eq!(limiter.in_flight(), 0);
        assert_eq!(limiter.available(), 2);
    }

    #[tokio::test]
    async fn slot_is_released_when_task_panics() {
        let limiter = ConcurrencyLimiter::new(1);
        let permit = limiter.acquire().await.unwrap();

        let handle = tokio::spawn(async move {
            let _permit = permit;
            panic!("boom");
        });
        assert!(handle.await.unwrap_err().is_panic());

        assert_eq!(limiter.available(), 1);
        assert_eq!(limiter.in_flight(), 0);
        let _again = limiter.acquire().await.unwrap();
    }

    #[tokio::test]
    async fn closed_limiter_rejects_waiters() {
        let limiter = ConcurrencyLimiter::new(1);
        let _held = limiter.acquire().await.unwrap();
        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire().await.is_err() })
        };
        limiter.close();
        assert!(waiter.await.unwrap());
    }
}
