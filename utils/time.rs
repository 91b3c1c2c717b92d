//! Time utilities
//!
//! Tick sources and deadlines. Timeouts are given in milliseconds and
//! converted once into an absolute tick deadline; the polling loops then
//! only compare the current tick count against it.

use ::core::sync::atomic::{AtomicU64, Ordering};

use crate::{Error, Result};

/// Monotonic tick source
pub trait Clock {
    /// Current tick count
    fn now(&self) -> u64;

    /// Ticks per second
    fn tick_hz(&self) -> u64;

    /// Convert milliseconds to ticks, rounding up
    fn ms_to_ticks(&self, ms: u32) -> u64 {
        let ticks = (ms as u128 * self.tick_hz() as u128 + 999) / 1000;
        u64::try_from(ticks).unwrap_or(u64::MAX >> 1)
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> u64 {
        (**self).now()
    }

    fn tick_hz(&self) -> u64 {
        (**self).tick_hz()
    }

    fn ms_to_ticks(&self, ms: u32) -> u64 {
        (**self).ms_to_ticks(ms)
    }
}

/// Absolute expiry point on a [`Clock`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    expire: u64,
}

impl Deadline {
    /// Deadline `ms` milliseconds from now
    pub fn after<C: Clock + ?Sized>(clock: &C, ms: u32) -> Self {
        let ticks = clock.ms_to_ticks(ms).min(u64::MAX >> 1);
        Self {
            expire: clock.now().wrapping_add(ticks),
        }
    }

    /// Deadline at an absolute tick count
    pub const fn at(expire: u64) -> Self {
        Self { expire }
    }

    /// Tick count at which the deadline expires
    pub const fn expire(&self) -> u64 {
        self.expire
    }

    /// True once `now` has reached the deadline
    ///
    /// Wrap-safe as long as the two values are less than half the counter
    /// range apart.
    pub const fn expired(&self, now: u64) -> bool {
        now.wrapping_sub(self.expire) as i64 >= 0
    }

    /// Check the deadline against `clock`
    pub fn is_expired<C: Clock + ?Sized>(&self, clock: &C) -> bool {
        self.expired(clock.now())
    }
}

/// Architectural counter of the executing CPU
#[derive(Debug, Clone, Copy)]
pub struct CounterClock {
    tick_hz: u64,
}

impl CounterClock {
    /// Counter running at `tick_hz`
    pub const fn new(tick_hz: u64) -> Self {
        Self { tick_hz }
    }

    /// Use the frequency reported by the hardware, falling back to `default_hz`
    ///
    /// Fails with [`Error::InvalidConfig`] when the architecture has no
    /// counter or the resulting rate is zero, since deadlines on such a
    /// clock would never expire.
    pub fn detect(default_hz: u64) -> Result<Self> {
        if !super::has_counter() {
            log::error!("no architectural counter to time hwspinlock waits");
            return Err(Error::InvalidConfig);
        }

        match super::timestamp_frequency().unwrap_or(default_hz) {
            0 => {
                log::error!("architectural counter rate unknown");
                Err(Error::InvalidConfig)
            }
            hz => Ok(Self::new(hz)),
        }
    }
}

impl Clock for CounterClock {
    fn now(&self) -> u64 {
        super::get_timestamp()
    }

    fn tick_hz(&self) -> u64 {
        self.tick_hz
    }
}

/// Software clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    ticks: AtomicU64,
    tick_hz: u64,
}

impl ManualClock {
    /// Clock starting at `start`
    pub const fn new(start: u64, tick_hz: u64) -> Self {
        Self {
            ticks: AtomicU64::new(start),
            tick_hz,
        }
    }

    /// Move the clock forward
    pub fn advance(&self, ticks: u64) {
        self.ticks.fetch_add(ticks, Ordering::SeqCst);
    }

    /// Jump to an absolute tick count
    pub fn set(&self, ticks: u64) {
        self.ticks.store(ticks, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    fn tick_hz(&self) -> u64 {
        self.tick_hz
    }
}

/// Software clock that advances by a fixed step on every read
///
/// Each poll iteration reads the clock once, so a deadline of `n` ticks
/// expires after a predictable number of iterations.
#[derive(Debug)]
pub struct SteppingClock {
    ticks: AtomicU64,
    step: u64,
    tick_hz: u64,
}

impl SteppingClock {
    /// Clock starting at `start` and moving `step` ticks per read
    pub const fn new(start: u64, step: u64, tick_hz: u64) -> Self {
        Self {
            ticks: AtomicU64::new(start),
            step,
            tick_hz,
        }
    }

    /// Current value without advancing
    pub fn peek(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> u64 {
        self.ticks.fetch_add(self.step, Ordering::SeqCst)
    }

    fn tick_hz(&self) -> u64 {
        self.tick_hz
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(1000, 0, 0 ; "zero timeout")]
    #[test_case(1000, 5, 5 ; "one tick per ms")]
    #[test_case(24_000_000, 1, 24_000 ; "24MHz counter")]
    #[test_case(100, 1, 1 ; "rounds up")]
    #[test_case(100, 15, 2 ; "rounds up partial")]
    fn test_ms_to_ticks(hz: u64, ms: u32, ticks: u64) {
        assert_eq!(ManualClock::new(0, hz).ms_to_ticks(ms), ticks);
    }

    #[test]
    fn test_deadline_expiry() {
        let clock = ManualClock::new(100, 1000);
        let deadline = Deadline::after(&clock, 10);
        assert_eq!(deadline.expire(), 110);
        assert!(!deadline.is_expired(&clock));
        clock.advance(9);
        assert!(!deadline.is_expired(&clock));
        clock.advance(1);
        assert!(deadline.is_expired(&clock));
    }

    #[test]
    fn test_deadline_zero_is_expired() {
        let clock = ManualClock::new(7, 1000);
        assert!(Deadline::after(&clock, 0).is_expired(&clock));
    }

    #[test]
    fn test_deadline_wraparound() {
        let clock = ManualClock::new(u64::MAX - 2, 1000);
        let deadline = Deadline::after(&clock, 5);
        assert_eq!(deadline.expire(), 2);
        assert!(!deadline.is_expired(&clock));
        clock.advance(4);
        assert!(!deadline.is_expired(&clock));
        clock.advance(1);
        assert!(deadline.is_expired(&clock));
    }

    #[test]
    fn test_stepping_clock() {
        let clock = SteppingClock::new(10, 3, 1000);
        assert_eq!(clock.now(), 10);
        assert_eq!(clock.now(), 13);
        assert_eq!(clock.peek(), 16);
    }

    #[cfg(any(target_arch = "aarch64", target_arch = "riscv64", target_arch = "x86_64"))]
    #[test]
    fn test_counter_clock_detect() {
        let clock = CounterClock::detect(24_000_000).unwrap();
        let hz = crate::utils::timestamp_frequency().unwrap_or(24_000_000);
        assert_eq!(clock.tick_hz(), hz);

        // A 2ms deadline on the real counter must expire, and not early.
        let start = std::time::Instant::now();
        let deadline = Deadline::after(&clock, 2);
        while !deadline.is_expired(&clock) {
            assert!(start.elapsed() < std::time::Duration::from_secs(3));
            ::core::hint::spin_loop();
        }
        if crate::utils::timestamp_frequency().is_some() {
            assert!(start.elapsed() >= std::time::Duration::from_millis(1));
        }
    }

    #[cfg(not(any(target_arch = "aarch64", target_arch = "riscv64", target_arch = "x86_64")))]
    #[test]
    fn test_counter_clock_detect_without_counter() {
        assert_eq!(CounterClock::detect(24_000_000).unwrap_err(), Error::InvalidConfig);
    }
}
