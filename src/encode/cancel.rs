use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use super::EncodeError;

/// Shared flag checked at every cooperative yield point of an encode.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Yields the thread and checks for cancellation every `every` ticks.
#[derive(Debug)]
pub struct CooperativeYield {
    every: usize,
    ticks: usize,
    cancel: CancelToken,
}

impl CooperativeYield {
    pub fn new(every: usize, cancel: CancelToken) -> Self {
        Self {
            every: every.max(1),
            ticks: 0,
            cancel,
        }
    }

    /// Count one unit of work; `Err(EncodeError::Cancelled)` once the token
    /// has been tripped and a yield point is reached.
    pub fn tick(&mut self) -> Result<(), EncodeError> {
        self.ticks += 1;
        if self.ticks % self.every != 0 {
            return Ok(());
        }
        std::thread::yield_now();
        self.check()
    }

    /// Check the token without yielding.
    pub fn check(&self) -> Result<(), EncodeError> {
        if self.cancel.is_cancelled() {
            Err(EncodeError::Cancelled)
        } else {
            Ok(())
        }
    }
}
