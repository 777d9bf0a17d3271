use super::{Semaphore, SemaphorePermit};

/// Async exclusive lock with FIFO fairness.
///
/// Unlike `tokio::sync::Mutex` this does not own data; it is a pure
/// exclusion primitive whose guard is held across a critical section chosen
/// by the caller. Waiters are granted the lock in arrival order.
#[derive(Debug, Clone)]
pub struct Mutex {
    sem: Semaphore,
}

/// Guard returned by [`Mutex::acquire`]. Dropping it releases the lock.
#[derive(Debug)]
pub struct MutexGuard {
    _permit: SemaphorePermit,
}

impl Mutex {
    pub fn new() -> Self {
        Self {
            sem: Semaphore::new(1),
        }
    }

    /// Acquire the lock, suspending until the caller is the sole holder.
    pub async fn acquire(&self) -> MutexGuard {
        MutexGuard {
            _permit: self.sem.acquire().await,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.sem.active_count() > 0
    }

    /// Number of callers suspended waiting for the lock.
    pub fn queue_len(&self) -> usize {
        self.sem.queue_len()
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}
