//! sunxi-hwspinlock - Hardware spinlock driver for Allwinner sun6i/AR100
//!
//! The sun6i SoC carries a block of hardware arbitration registers shared
//! between the main Cortex cluster and the AR100 low-power coprocessor.
//! This crate couples every register with a local interrupt-safe spinlock
//! and exposes a timeout-bounded acquire/release API over the whole table.

#![cfg_attr(not(test), no_std)]

// Core modules
pub mod config;

// Interrupt control, local locks and power management
pub mod core;

// Device drivers
pub mod drivers;

// Timing and barrier helpers
pub mod utils;

pub use config::HwSpinlockConfig;
pub use drivers::hwspinlock::{
    HwSpinlockGuard, HwSpinlockTable, MmioRegisterBank, RegisterBank, SimulatedRegisterBank,
    Sun6iHwSpinlocks,
};
pub use utils::time::{Clock, CounterClock, Deadline, ManualClock, SteppingClock};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common error type for the hardware spinlock driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Lock id outside the table
    InvalidIndex(usize),
    /// Local spinlock could not be taken before the deadline
    LocalTimeout(usize),
    /// Hardware register never read FREE before the deadline
    HardwareTimeout(usize),
    /// Table used before `init()`
    NotInitialized,
    /// Register layout or tick rate is unusable
    InvalidConfig,
    /// No room left in a fixed-capacity registry
    RegistryFull,
}

impl Error {
    /// Linux errno equivalent, negated
    pub const fn errno(self) -> i32 {
        match self {
            Error::InvalidIndex(_) | Error::InvalidConfig => -22,
            Error::LocalTimeout(_) => -16,
            Error::HardwareTimeout(_) => -110,
            Error::NotInitialized => -19,
            Error::RegistryFull => -28,
        }
    }
}

impl ::core::fmt::Display for Error {
    fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
        match self {
            Error::InvalidIndex(id) => write!(f, "invalid hwspinlock id [{}]", id),
            Error::LocalTimeout(id) => write!(f, "local spinlock {} busy", id),
            Error::HardwareTimeout(id) => write!(f, "hwspinlock {} timed out", id),
            Error::NotInitialized => f.write_str("hwspinlock table not initialized"),
            Error::InvalidConfig => f.write_str("invalid hwspinlock configuration"),
            Error::RegistryFull => f.write_str("registry full"),
        }
    }
}

/// Result type alias
pub type Result<T> = ::core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(Error::InvalidIndex(40).errno(), -22);
        assert_eq!(Error::LocalTimeout(1).errno(), -16);
        assert_eq!(Error::HardwareTimeout(1).errno(), -110);
        assert_eq!(Error::NotInitialized.errno(), -19);
        assert_eq!(Error::InvalidConfig.errno(), -22);
        assert_eq!(Error::RegistryFull.errno(), -28);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(Error::InvalidIndex(33).to_string(), "invalid hwspinlock id [33]");
        assert_eq!(Error::HardwareTimeout(2).to_string(), "hwspinlock 2 timed out");
    }
}
