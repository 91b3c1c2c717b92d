//! Hardware spinlock register access
//!
//! The lock table never touches addresses directly; it goes through a
//! [`RegisterBank`]. [`MmioRegisterBank`] talks to the real block,
//! [`SimulatedRegisterBank`] keeps the registers in memory for host-side
//! testing and simulation.

use ::core::ptr::NonNull;
use ::core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use volatile::VolatilePtr;

use crate::config::{HwSpinlockConfig, HWSPINLOCK_FREE, HWSPINLOCK_TAKEN};
use crate::utils;

/// Access to the per-lock arbitration registers
pub trait RegisterBank {
    /// Read the lock register for `id`
    fn read(&self, id: usize) -> u32;

    /// Write the lock register for `id`
    fn write(&self, id: usize, value: u32);

    /// Bitmap of taken locks, if the block can report it without acquiring
    fn taken_mask(&self) -> Option<u32> {
        None
    }
}

impl<B: RegisterBank + ?Sized> RegisterBank for &B {
    fn read(&self, id: usize) -> u32 {
        (**self).read(id)
    }

    fn write(&self, id: usize, value: u32) {
        (**self).write(id, value)
    }

    fn taken_mask(&self) -> Option<u32> {
        (**self).taken_mask()
    }
}

/// Memory-mapped spinlock block
///
/// On sun6i a read of a lock register that returns FREE also claims the
/// lock in hardware; the register only goes back to FREE on a write of 0.
#[derive(Debug)]
pub struct MmioRegisterBank {
    config: HwSpinlockConfig,
}

impl MmioRegisterBank {
    /// Create a register bank over the block described by `config`
    ///
    /// # Safety
    /// `config.base` must be a valid, device-mapped (uncached) virtual
    /// address of the spinlock block for the lifetime of the bank, and the
    /// caller must not index past the registers the block implements.
    pub const unsafe fn new(config: HwSpinlockConfig) -> Self {
        Self { config }
    }

    /// Layout used by this bank
    pub fn config(&self) -> &HwSpinlockConfig {
        &self.config
    }

    fn reg(&self, addr: usize) -> VolatilePtr<'_, u32> {
        // SAFETY: the constructor contract guarantees `addr` lies inside the
        // mapped block; lock and status registers are never at address 0.
        unsafe { VolatilePtr::new(NonNull::new_unchecked(addr as *mut u32)) }
    }
}

impl RegisterBank for MmioRegisterBank {
    fn read(&self, id: usize) -> u32 {
        let value = self.reg(self.config.lock_reg_addr(id)).read();
        utils::rmb();
        value
    }

    fn write(&self, id: usize, value: u32) {
        utils::mb();
        self.reg(self.config.lock_reg_addr(id)).write(value);
    }

    fn taken_mask(&self) -> Option<u32> {
        let value = self.reg(self.config.status_reg_addr()).read();
        utils::rmb();
        Some(value)
    }
}

#[allow(clippy::declare_interior_mutable_const)]
const FREE_REG: AtomicU32 = AtomicU32::new(HWSPINLOCK_FREE);

/// In-memory register bank
///
/// Counts every access made through [`RegisterBank`] so tests can check
/// which paths touched the hardware. [`SimulatedRegisterBank::claiming`]
/// reproduces the sun6i read-to-claim behaviour atomically.
#[derive(Debug)]
pub struct SimulatedRegisterBank<const N: usize> {
    regs: [AtomicU32; N],
    claim_on_read: bool,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl<const N: usize> SimulatedRegisterBank<N> {
    /// Plain registers: reads never change state
    pub const fn new() -> Self {
        Self {
            regs: [FREE_REG; N],
            claim_on_read: false,
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// Registers that claim a FREE lock on read, like the sun6i block
    pub const fn claiming() -> Self {
        Self {
            regs: [FREE_REG; N],
            claim_on_read: true,
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// Current register value, without counting or claiming
    pub fn peek(&self, id: usize) -> u32 {
        self.regs[id].load(Ordering::SeqCst)
    }

    /// Force a register value, as another processing unit would
    pub fn preset(&self, id: usize, value: u32) {
        self.regs[id].store(value, Ordering::SeqCst);
    }

    /// Number of reads through [`RegisterBank::read`]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of writes through [`RegisterBank::write`]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Reset the access counters
    pub fn reset_counters(&self) {
        self.reads.store(0, Ordering::SeqCst);
        self.writes.store(0, Ordering::SeqCst);
    }
}

impl<const N: usize> Default for SimulatedRegisterBank<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RegisterBank for SimulatedRegisterBank<N> {
    fn read(&self, id: usize) -> u32 {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let reg = &self.regs[id];
        if self.claim_on_read {
            match reg.compare_exchange(
                HWSPINLOCK_FREE,
                HWSPINLOCK_TAKEN,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(prev) | Err(prev) => prev,
            }
        } else {
            reg.load(Ordering::Acquire)
        }
    }

    fn write(&self, id: usize, value: u32) {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.regs[id].store(value, Ordering::Release);
    }

    fn taken_mask(&self) -> Option<u32> {
        let mask = self
            .regs
            .iter()
            .take(32)
            .enumerate()
            .filter(|(_, reg)| reg.load(Ordering::Acquire) != HWSPINLOCK_FREE)
            .fold(0u32, |mask, (id, _)| mask | (1 << id));
        Some(mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_bank() {
        let bank = SimulatedRegisterBank::<4>::new();
        assert_eq!(bank.read(2), HWSPINLOCK_FREE);
        bank.write(2, HWSPINLOCK_TAKEN);
        assert_eq!(bank.read(2), HWSPINLOCK_TAKEN);
        assert_eq!(bank.peek(2), HWSPINLOCK_TAKEN);
        assert_eq!(bank.reads(), 2);
        assert_eq!(bank.writes(), 1);

        bank.reset_counters();
        assert_eq!(bank.reads(), 0);
        assert_eq!(bank.writes(), 0);
    }

    #[test]
    fn test_claiming_bank() {
        let bank = SimulatedRegisterBank::<4>::claiming();
        assert_eq!(bank.read(1), HWSPINLOCK_FREE);
        assert_eq!(bank.peek(1), HWSPINLOCK_TAKEN);
        assert_eq!(bank.read(1), HWSPINLOCK_TAKEN);
        bank.write(1, HWSPINLOCK_FREE);
        assert_eq!(bank.peek(1), HWSPINLOCK_FREE);
    }

    #[test]
    fn test_taken_mask() {
        let bank = SimulatedRegisterBank::<8>::new();
        assert_eq!(bank.taken_mask(), Some(0));
        bank.preset(0, HWSPINLOCK_TAKEN);
        bank.preset(5, HWSPINLOCK_TAKEN);
        assert_eq!(bank.taken_mask(), Some(0b10_0001));
        assert_eq!(bank.reads(), 0);
    }

    #[test]
    fn test_bank_by_reference() {
        let bank = SimulatedRegisterBank::<2>::new();
        let by_ref = &bank;
        by_ref.write(0, 7);
        assert_eq!(RegisterBank::read(&by_ref, 0), 7);
        assert_eq!(bank.writes(), 1);
    }

    #[test]
    fn test_mmio_bank_over_memory() {
        // Back the register block with ordinary memory
        let mut block = [0u32; 0x200 / 4];
        let base = block.as_mut_ptr() as usize;
        let bank = unsafe { MmioRegisterBank::new(HwSpinlockConfig::sun6i(base)) };

        bank.write(3, HWSPINLOCK_TAKEN);
        assert_eq!(bank.read(3), HWSPINLOCK_TAKEN);
        assert_eq!(block[(0x100 + 3 * 4) / 4], HWSPINLOCK_TAKEN);

        block[0x10 / 4] = 0b1000;
        assert_eq!(bank.taken_mask(), Some(0b1000));
    }
}
