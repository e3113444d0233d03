//! Global concurrency gate.
//!
//! A [`ConcurrencyGate`] hands out at most `limit` permits at a time. Callers
//! past the limit wait in FIFO order; nothing is ever rejected. Permits are
//! RAII guards, so a slot is returned when the handler finishes, panics, or
//! is cancelled.
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GateError {
    #[error("concurrency limit must be greater than 0")]
    ZeroLimit,
    #[error("concurrency limit {0} exceeds the maximum of {max}", max = Semaphore::MAX_PERMITS)]
    LimitTooLarge(usize),
}

/// Counting semaphore shared by every request passing the throttle layer.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl ConcurrencyGate {
    pub fn new(limit: usize) -> Result<Self, GateError> {
        if limit == 0 {
            return Err(GateError::ZeroLimit);
        }
        if limit > Semaphore::MAX_PERMITS {
            return Err(GateError::LimitTooLarge(limit));
        }
        Ok(Self {
            permits: Arc::new(Semaphore::new(limit)),
            capacity: limit,
        })
    }

    /// Wait for a free slot. The slot is released when the permit drops.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        // The semaphore is owned here and never closed.
        match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => unreachable!("concurrency gate semaphore closed"),
        }
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_zero_limit_is_rejected() {
        assert_eq!(ConcurrencyGate::new(0).unwrap_err(), GateError::ZeroLimit);
    }

    #[tokio::test]
    async fn test_permit_is_returned_on_drop() {
        let gate = ConcurrencyGate::new(2).unwrap();
        let first = gate.acquire().await;
        let _second = gate.acquire().await;
        assert_eq!(gate.available(), 0);

        drop(first);
        assert_eq!(gate.available(), 1);
        assert_eq!(gate.capacity(), 2);
    }

    #[tokio::test]
    async fn test_waiters_block_until_a_slot_frees() {
        let gate = ConcurrencyGate::new(1).unwrap();
        let held = gate.acquire().await;

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move {
                let _permit = gate.acquire().await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(gate.available(), 1);
    }

    #[tokio::test]
    async fn test_permit_is_released_when_task_panics() {
        let gate = ConcurrencyGate::new(1).unwrap();
        let task = {
            let gate = gate.clone();
            tokio::spawn(async move {
                let _permit = gate.acquire().await;
                panic!("handler failed");
            })
        };

        assert!(task.await.is_err());
        assert_eq!(gate.available(), 1);
    }
}
