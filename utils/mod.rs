//! Utility functions
//!
//! Memory barriers, the architectural counter and tick/deadline helpers
//! used by the polling loops.

pub mod time;

// The counter backends below are all readable from user mode on a hosted
// OS, so they are picked by architecture alone.
cfg_if::cfg_if! {
    if #[cfg(target_arch = "aarch64")] {
        mod arch {
            use aarch64_cpu::registers::{CNTFRQ_EL0, CNTVCT_EL0};
            use tock_registers::interfaces::Readable;

            pub const HAS_COUNTER: bool = true;

            #[inline]
            pub fn rmb() {
                unsafe { ::core::arch::asm!("dmb ld", options(nostack, preserves_flags)) };
            }

            #[inline]
            pub fn wmb() {
                unsafe { ::core::arch::asm!("dmb st", options(nostack, preserves_flags)) };
            }

            #[inline]
            pub fn mb() {
                unsafe { ::core::arch::asm!("dmb sy", options(nostack, preserves_flags)) };
            }

            #[inline]
            pub fn counter() -> u64 {
                CNTVCT_EL0.get()
            }

            #[inline]
            pub fn counter_hz() -> Option<u64> {
                match CNTFRQ_EL0.get() {
                    0 => None,
                    hz => Some(hz),
                }
            }
        }
    } else if #[cfg(target_arch = "riscv64")] {
        mod arch {
            pub const HAS_COUNTER: bool = true;

            #[inline]
            pub fn rmb() {
                unsafe { ::core::arch::asm!("fence ir, ir", options(nostack)) };
            }

            #[inline]
            pub fn wmb() {
                unsafe { ::core::arch::asm!("fence ow, ow", options(nostack)) };
            }

            #[inline]
            pub fn mb() {
                unsafe { ::core::arch::asm!("fence iorw, iorw", options(nostack)) };
            }

            #[inline]
            pub fn counter() -> u64 {
                riscv::register::time::read() as u64
            }

            // timebase-frequency lives in the device tree
            #[inline]
            pub fn counter_hz() -> Option<u64> {
                None
            }
        }
    } else if #[cfg(target_arch = "x86_64")] {
        mod arch {
            use ::core::arch::x86_64::{__cpuid, __get_cpuid_max, _rdtsc};
            use ::core::sync::atomic::{fence, Ordering};

            pub const HAS_COUNTER: bool = true;

            #[inline]
            pub fn rmb() {
                fence(Ordering::Acquire);
            }

            #[inline]
            pub fn wmb() {
                fence(Ordering::Release);
            }

            #[inline]
            pub fn mb() {
                fence(Ordering::SeqCst);
            }

            #[inline]
            pub fn counter() -> u64 {
                unsafe { _rdtsc() }
            }

            // CPUID leaf 0x15 gives the TSC/crystal ratio, leaf 0x16 the
            // base clock in MHz. Many hypervisors report neither.
            pub fn counter_hz() -> Option<u64> {
                let (max_leaf, _) = unsafe { __get_cpuid_max(0) };

                if max_leaf >= 0x15 {
                    let tsc = unsafe { __cpuid(0x15) };
                    if tsc.eax != 0 && tsc.ebx != 0 && tsc.ecx != 0 {
                        return Some(u64::from(tsc.ecx) * u64::from(tsc.ebx) / u64::from(tsc.eax));
                    }
                }
                if max_leaf >= 0x16 {
                    let mhz = unsafe { __cpuid(0x16) }.eax & 0xFFFF;
                    if mhz != 0 {
                        return Some(u64::from(mhz) * 1_000_000);
                    }
                }
                None
            }
        }
    } else {
        mod arch {
            use ::core::sync::atomic::{fence, Ordering};

            pub const HAS_COUNTER: bool = false;

            #[inline]
            pub fn rmb() {
                fence(Ordering::Acquire);
            }

            #[inline]
            pub fn wmb() {
                fence(Ordering::Release);
            }

            #[inline]
            pub fn mb() {
                fence(Ordering::SeqCst);
            }

            #[inline]
            pub fn counter() -> u64 {
                0
            }

            #[inline]
            pub fn counter_hz() -> Option<u64> {
                None
            }
        }
    }
}

/// Read memory barrier
#[inline]
pub fn rmb() {
    arch::rmb()
}

/// Write memory barrier
#[inline]
pub fn wmb() {
    arch::wmb()
}

/// Full memory barrier
#[inline]
pub fn mb() {
    arch::mb()
}

/// True if this architecture has a free-running counter behind
/// [`get_timestamp`]
#[inline]
pub const fn has_counter() -> bool {
    arch::HAS_COUNTER
}

/// Read the free-running architectural counter
///
/// Returns 0 when [`has_counter`] is false; use a software clock there.
#[inline]
pub fn get_timestamp() -> u64 {
    arch::counter()
}

/// Frequency of [`get_timestamp`], if the architecture reports it
#[inline]
pub fn timestamp_frequency() -> Option<u64> {
    arch::counter_hz()
}

/// Busy-wait hint for polling loops
#[inline]
pub fn cpu_relax() {
    ::core::hint::spin_loop();
}
