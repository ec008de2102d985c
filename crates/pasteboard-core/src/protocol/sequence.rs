//! Lock-free monotonically increasing counter.
//!
//! Used for frame sequence numbers on IPC and peer-link connections and for
//! the sequence ids of published clipboard change events.
//!
//! # Why an atomic? (for beginners)
//!
//! Many connection tasks may ask for the next number at the same moment.
//! `fetch_add` on an `AtomicU64` reads, increments and writes back in one
//! indivisible step, so no two callers ever receive the same value and no
//! lock is needed.

use std::sync::atomic::{AtomicU64, Ordering};

/// A thread-safe counter handing out consecutive `u64` values.
///
/// Wraps from `u64::MAX` to 0 without panicking.
///
/// # Examples
///
/// ```rust
/// use pasteboard_core::protocol::SequenceCounter;
///
/// let counter = SequenceCounter::starting_at(1);
/// assert_eq!(counter.next(), 1);
/// assert_eq!(counter.next(), 2);
/// ```
#[derive(Debug)]
pub struct SequenceCounter {
    inner: AtomicU64,
}

impl SequenceCounter {
    /// Creates a counter whose first value is 0.
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Creates a counter whose first value is `first`.
    pub fn starting_at(first: u64) -> Self {
        Self {
            inner: AtomicU64::new(first),
        }
    }

    /// Returns the next value and advances the counter.
    ///
    /// `Relaxed` is enough: the value orders messages, it does not publish
    /// other memory.
    pub fn next(&self) -> u64 {
        self.inner.fetch_add(1, Ordering::Relaxed)
    }

    /// The value the next call to [`next`](Self::next) will return.
    pub fn current(&self) -> u64 {
        self.inner.load(Ordering::Relaxed)
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}
