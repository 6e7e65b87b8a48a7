//! Time sources for the control context
//!
//! The transport derives position from wall-clock time. Production code uses
//! the system's monotonic clock; tests and offline simulation step a manual
//! clock explicitly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Monotonic time source, in seconds since an arbitrary origin
pub trait Clock: Send {
    fn now(&self) -> f64;
}

/// Monotonic system clock
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
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
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Clock advanced by hand; clones share the same time
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock reading zero
    pub fn new() -> Self {
        Self::starting_at(0.0)
    }

    pub fn starting_at(seconds: f64) -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(seconds.to_bits())),
        }
    }

    /// Move time forward; negative steps are ignored
    pub fn advance(&self, seconds: f64) {
        if seconds > 0.0 {
            self.set(self.now() + seconds);
        }
    }

    pub fn set(&self, seconds: f64) {
        self.bits.store(seconds.to_bits(), Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new();
        let handle = clock.clone();
        handle.advance(1.5);
        assert_eq!(clock.now(), 1.5);
    }

    #[test]
    fn test_manual_clock_ignores_negative_steps() {
        let clock = ManualClock::starting_at(2.0);
        clock.advance(-1.0);
        assert_eq!(clock.now(), 2.0);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
