//! Bounded-concurrency primitives.
//!
//! Provides the lock-only [`Mutex`] and counting [`Semaphore`] used by the
//! rate limiter and the work pool. Both grant waiters in strict arrival
//! order: a released slot is handed directly to the head of the queue, so a
//! late acquirer can never barge past one that is already waiting.
//!
//! Release is RAII — dropping the returned guard/permit releases the slot,
//! which makes double-release unrepresentable and covers every exit path.

mod mutex;
mod semaphore;

pub use mutex::{Mutex, MutexGuard};
pub use semaphore::{Semaphore, SemaphorePermit};
