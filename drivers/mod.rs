//! Device drivers module
//!
//! Drivers for the SoC blocks this crate manages.

pub mod hwspinlock;
