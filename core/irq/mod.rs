//! Local interrupt state
//!
//! Saving and restoring the interrupt mask of the executing CPU. On
//! bare-metal targets this touches the architectural mask bits; hosted
//! builds (unit tests, host-side simulation) get a no-op backend.

/// Interrupt state captured by [`local_irq_save`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IrqFlags(usize);

impl IrqFlags {
    /// Wrap a raw architectural value
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    /// Raw architectural value
    pub const fn raw(self) -> usize {
        self.0
    }
}

cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "aarch64", target_os = "none"))] {
        mod arch {
            use aarch64_cpu::registers::DAIF;
            use tock_registers::interfaces::{Readable, Writeable};

            #[inline]
            pub fn save() -> usize {
                let flags = DAIF.get() as usize;
                // Mask IRQ only, FIQ stays with the secure side
                unsafe { ::core::arch::asm!("msr daifset, #2", options(nomem, nostack)) };
                flags
            }

            #[inline]
            pub fn restore(flags: usize) {
                DAIF.set(flags as u64);
            }
        }
    } else if #[cfg(all(target_arch = "riscv64", target_os = "none"))] {
        mod arch {
            use riscv::register::sstatus;

            #[inline]
            pub fn save() -> usize {
                let enabled = sstatus::read().sie();
                unsafe { sstatus::clear_sie() };
                enabled as usize
            }

            #[inline]
            pub fn restore(flags: usize) {
                if flags != 0 {
                    unsafe { sstatus::set_sie() };
                }
            }
        }
    } else if #[cfg(all(target_arch = "x86_64", target_os = "none"))] {
        mod arch {
            use x86_64::instructions::interrupts;

            #[inline]
            pub fn save() -> usize {
                let enabled = interrupts::are_enabled();
                interrupts::disable();
                enabled as usize
            }

            #[inline]
            pub fn restore(flags: usize) {
                if flags != 0 {
                    interrupts::enable();
                }
            }
        }
    } else {
        mod arch {
            #[inline]
            pub fn save() -> usize {
                0
            }

            #[inline]
            pub fn restore(_flags: usize) {}
        }
    }
}

/// Disable local interrupts and return the previous state
#[inline]
pub fn local_irq_save() -> IrqFlags {
    IrqFlags(arch::save())
}

/// Restore a state returned by [`local_irq_save`]
#[inline]
pub fn local_irq_restore(flags: IrqFlags) {
    arch::restore(flags.0)
}
