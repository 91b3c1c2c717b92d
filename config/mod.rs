//! Configuration management
//!
//! Register layout and timing constants for the sun6i hardware spinlock
//! block, plus the runtime description handed to the MMIO register bank.

use crate::{Error, Result};

/// Number of hardware spinlock registers on sun6i
pub const HWSPINLOCK_NUM: usize = 32;

/// Physical base of the spinlock block
pub const HWSPINLOCK_PBASE: usize = 0x01C1_8000;

/// Status bitmap register (read does not acquire)
pub const HWSPINLOCK_STATUS_OFFSET: usize = 0x010;

/// First lock register
pub const HWSPINLOCK_LOCK_OFFSET: usize = 0x100;

/// Distance between two lock registers
pub const HWSPINLOCK_LOCK_STRIDE: usize = 4;

/// Register value of an unowned lock
pub const HWSPINLOCK_FREE: u32 = 0;

/// Register value of an owned lock
pub const HWSPINLOCK_TAKEN: u32 = 1;

/// Default tick rate used to turn millisecond timeouts into ticks
pub const DEFAULT_TICK_HZ: u64 = 24_000_000;

/// Hardware spinlock block description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwSpinlockConfig {
    /// Virtual base address of the register block
    pub base: usize,
    /// Offset of lock register 0 from `base`
    pub lock_offset: usize,
    /// Distance between consecutive lock registers
    pub stride: usize,
    /// Offset of the status bitmap register from `base`
    pub status_offset: usize,
    /// Tick source frequency
    pub tick_hz: u64,
}

impl Default for HwSpinlockConfig {
    fn default() -> Self {
        Self::sun6i(HWSPINLOCK_PBASE)
    }
}

impl HwSpinlockConfig {
    /// sun6i layout mapped at `base`
    pub const fn sun6i(base: usize) -> Self {
        Self {
            base,
            lock_offset: HWSPINLOCK_LOCK_OFFSET,
            stride: HWSPINLOCK_LOCK_STRIDE,
            status_offset: HWSPINLOCK_STATUS_OFFSET,
            tick_hz: DEFAULT_TICK_HZ,
        }
    }

    /// Override the tick frequency
    pub const fn with_tick_hz(mut self, tick_hz: u64) -> Self {
        self.tick_hz = tick_hz;
        self
    }

    /// Address of the lock register for `id`
    pub const fn lock_reg_addr(&self, id: usize) -> usize {
        self.base + self.lock_offset + id * self.stride
    }

    /// Address of the status bitmap register
    pub const fn status_reg_addr(&self) -> usize {
        self.base + self.status_offset
    }

    /// Address of the lock register for `id`, or `None` if it overflows
    pub fn checked_lock_reg_addr(&self, id: usize) -> Option<usize> {
        self.base
            .checked_add(self.lock_offset)?
            .checked_add(id.checked_mul(self.stride)?)
    }

    /// Check that the layout can be used for 32-bit register access
    ///
    /// Every one of the [`HWSPINLOCK_NUM`] lock registers and the status
    /// register must be word aligned and fit in the address space.
    pub fn validate(&self) -> Result<()> {
        let word = ::core::mem::size_of::<u32>();

        if self.stride < word || self.stride % word != 0 {
            log::error!("hwspinlock stride {:#x} is not a multiple of the register width", self.stride);
            return Err(Error::InvalidConfig);
        }

        let last_end = self
            .checked_lock_reg_addr(HWSPINLOCK_NUM - 1)
            .and_then(|addr| addr.checked_add(word - 1));
        let status_end = self
            .base
            .checked_add(self.status_offset)
            .and_then(|addr| addr.checked_add(word - 1));
        if last_end.is_none() || status_end.is_none() {
            log::error!("hwspinlock registers at base {:#x} overflow the address space", self.base);
            return Err(Error::InvalidConfig);
        }

        // Both sums were just checked
        if self.lock_reg_addr(0) % word != 0 || self.status_reg_addr() % word != 0 {
            log::error!("hwspinlock registers at base {:#x} are unaligned", self.base);
            return Err(Error::InvalidConfig);
        }
        if self.tick_hz == 0 {
            log::error!("hwspinlock tick rate must be non-zero");
            return Err(Error::InvalidConfig);
        }

        Ok(())
    }
}
