//! Millisecond clock shared by the tick-driven services
//!
//! Services keep their timers as a wrapping `u32` millisecond counter, the
//! same shape a microcontroller `millis()` has. All comparisons go through
//! [`elapsed_ms`] and [`deadline_reached`] so a counter wrap (~49.7 days)
//! never stalls a timer.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

/// Source of the wrapping millisecond counter
pub trait Clock: Send + Sync {
    /// Current counter value in milliseconds (wraps at `u32::MAX`)
    fn now_ms(&self) -> u32;
}

/// Milliseconds elapsed from `since` to `now`, wraparound-safe
pub fn elapsed_ms(now: u32, since: u32) -> u32 {
    now.wrapping_sub(since)
}

/// `true` once `now` has reached or passed `deadline`
///
/// Uses the signed difference of the two counters, so it stays correct as
/// long as the deadline is less than ~24.8 days away.
pub fn deadline_reached(now: u32, deadline: u32) -> bool {
    (now.wrapping_sub(deadline) as i32) >= 0
}

/// Monotonic clock backed by [`Instant`]
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock whose counter starts at zero now
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u32 {
        // Truncation is the wrap.
        self.origin.elapsed().as_millis() as u32
    }
}

/// Manually driven clock for tests and simulations
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU32,
}

impl ManualClock {
    /// Create a clock starting at `start_ms`
    pub fn new(start_ms: u32) -> Self {
        Self {
            now: AtomicU32::new(start_ms),
        }
    }

    /// Set the counter to an absolute value
    pub fn set(&self, now_ms: u32) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    /// Advance the counter, wrapping at `u32::MAX`
    pub fn advance(&self, delta_ms: u32) {
        let now = self.now.load(Ordering::SeqCst);
        self.now.store(now.wrapping_add(delta_ms), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u32 {
        self.now.load(Ordering::SeqCst)
    }
}
