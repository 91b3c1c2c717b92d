//! Synchronization primitives
//!
//! Local (single cluster) locks used in front of the hardware arbitration
//! registers.

pub mod spinlock;

pub use spinlock::{IrqSpinLock, RawSpinLock};
