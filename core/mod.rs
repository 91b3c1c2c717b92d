//! Core driver support
//!
//! Interrupt state handling, the local spinlocks that serialize contexts
//! on the same cluster, and the standby coordination used around
//! low-power transitions.

pub mod irq;
pub mod pm;
pub mod sync;

/// Number of the CPU executing the caller
#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub fn cpu_id() -> usize {
    use tock_registers::interfaces::Readable;
    aarch64_cpu::registers::MPIDR_EL1.get() as usize & 0xFF
}

/// Number of the CPU executing the caller
#[cfg(not(all(target_arch = "aarch64", target_os = "none")))]
pub fn cpu_id() -> usize {
    0
}
