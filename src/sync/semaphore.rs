use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::oneshot;

/// Async counting semaphore with FIFO waiter handoff.
///
/// Up to `limit` permits may be held at once. When the semaphore is full,
/// `acquire` suspends and waiters are granted permits in arrival order: the
/// releasing side hands its slot to the head waiter directly instead of
/// returning it to a shared pool.
#[derive(Debug, Clone)]
pub struct Semaphore {
    inner: Arc<SemaphoreInner>,
}

#[derive(Debug)]
struct SemaphoreInner {
    limit: usize,
    state: StdMutex<SemaphoreState>,
}

#[derive(Debug)]
struct SemaphoreState {
    active: usize,
    waiters: VecDeque<oneshot::Sender<()>>,
}

/// Permit returned by [`Semaphore::acquire`]. Dropping it releases the slot.
#[derive(Debug)]
pub struct SemaphorePermit {
    inner: Arc<SemaphoreInner>,
}

impl Semaphore {
    /// Create a semaphore admitting at most `limit` concurrent holders.
    ///
    /// # Panics
    ///
    /// Panics if `limit` is zero.
    pub fn new(limit: usize) -> Self {
        assert!(limit > 0, "semaphore limit must be at least 1");
        Self {
            inner: Arc::new(SemaphoreInner {
                limit,
                state: StdMutex::new(SemaphoreState {
                    active: 0,
                    waiters: VecDeque::new(),
                }),
            }),
        }
    }

    /// Acquire a permit, suspending until one is available.
    pub async fn acquire(&self) -> SemaphorePermit {
        loop {
            let rx = {
                let mut state = self.inner.state.lock().expect("semaphore state poisoned");
                if state.active < self.inner.limit && state.waiters.is_empty() {
                    state.active += 1;
                    return SemaphorePermit {
                        inner: self.inner.clone(),
                    };
                }
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                rx
            };

            if rx.await.is_ok() {
                // The releasing side handed its slot over; the active count
                // was never decremented, so nothing to add here.
                return SemaphorePermit {
                    inner: self.inner.clone(),
                };
            }
            // Grant was lost (sender dropped without sending); queue again.
        }
    }

    /// Number of permits currently held.
    pub fn active_count(&self) -> usize {
        self.inner.state.lock().expect("semaphore state poisoned").active
    }

    /// Number of callers suspended in [`acquire`](Self::acquire).
    pub fn queue_len(&self) -> usize {
        self.inner
            .state
            .lock()
            .expect("semaphore state poisoned")
            .waiters
            .len()
    }

    /// True when no permit is held and no waiter is queued.
    pub fn is_idle(&self) -> bool {
        let state = self.inner.state.lock().expect("semaphore state poisoned");
        state.active == 0 && state.waiters.is_empty()
    }

    /// The configured permit limit.
    pub fn limit(&self) -> usize {
        self.inner.limit
    }
}

impl Drop for SemaphorePermit {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock().expect("semaphore state poisoned");
        // Hand the slot to the first waiter that is still listening. A
        // waiter whose acquire future was dropped while queued must not
        // consume the grant.
        while let Some(tx) = state.waiters.pop_front() {
            if tx.send(()).is_ok() {
                return;
            }
        }
        state.active -= 1;
    }
}
