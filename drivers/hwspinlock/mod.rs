//! Hardware spinlock driver
//!
//! Mutual exclusion between the main cluster and the AR100 coprocessor
//! over the sun6i hardware spinlock block.
//!
//! Every lock id pairs a local [`IrqSpinLock`] with one hardware
//! arbitration register. Acquisition always takes the local lock first
//! and only then polls the register, and release clears the register
//! before dropping the local lock. Local contexts therefore never wait
//! on the hardware while another local context is also waiting on it.
//!
//! ## Usage
//!
//! ```
//! use sunxi_hwspinlock::{HwSpinlockTable, ManualClock, SimulatedRegisterBank};
//!
//! let table: HwSpinlockTable<_, _, 4> =
//!     HwSpinlockTable::new(SimulatedRegisterBank::<4>::new(), ManualClock::new(0, 1000));
//! table.init().unwrap();
//!
//! table.lock_timeout(2, 10).unwrap();
//! // critical section shared with the coprocessor
//! table.unlock(2).unwrap();
//! ```

mod regs;

pub use regs::{MmioRegisterBank, RegisterBank, SimulatedRegisterBank};

use ::core::marker::PhantomData;
use ::core::sync::atomic::{AtomicBool, Ordering};

use crate::config::{HwSpinlockConfig, HWSPINLOCK_FREE, HWSPINLOCK_NUM, HWSPINLOCK_TAKEN};
use crate::core::cpu_id;
use crate::core::pm::StandbyOps;
use crate::core::sync::IrqSpinLock;
use crate::utils::cpu_relax;
use crate::utils::time::{Clock, CounterClock, Deadline};
use crate::{Error, Result};

/// Per-id lock descriptor
///
/// The hardware register itself lives in the [`RegisterBank`] and is
/// addressed by the descriptor's position in the table.
struct HwSpinlock {
    /// Serializes local contexts; also holds the saved interrupt state
    local: IrqSpinLock,
}

#[allow(clippy::declare_interior_mutable_const)]
const UNLOCKED: HwSpinlock = HwSpinlock {
    local: IrqSpinLock::new(),
};

/// Table of hardware spinlocks
///
/// `N` is the number of arbitration registers the table manages. The
/// platform keeps one instance for the whole system and hands out
/// references to the drivers that share locks with the coprocessor.
pub struct HwSpinlockTable<R, C, const N: usize = HWSPINLOCK_NUM> {
    locks: [HwSpinlock; N],
    bank: R,
    clock: C,
    initialized: AtomicBool,
}

/// The sun6i table over the real register block
pub type Sun6iHwSpinlocks = HwSpinlockTable<MmioRegisterBank, CounterClock, HWSPINLOCK_NUM>;

impl Sun6iHwSpinlocks {
    /// Table over the block described by `config`
    ///
    /// The counter is trusted to tick at `config.tick_hz`. Use
    /// [`from_config`](Self::from_config) to have both checked.
    ///
    /// # Safety
    /// Same contract as [`MmioRegisterBank::new`].
    pub const unsafe fn sun6i(config: HwSpinlockConfig) -> Self {
        Self::new(MmioRegisterBank::new(config), CounterClock::new(config.tick_hz))
    }

    /// Validate `config` and build the table over it
    ///
    /// The counter rate reported by the CPU takes precedence over
    /// `config.tick_hz`. Fails with [`Error::InvalidConfig`] on targets
    /// without an architectural counter.
    ///
    /// # Safety
    /// Same contract as [`MmioRegisterBank::new`].
    pub unsafe fn from_config(config: HwSpinlockConfig) -> Result<Self> {
        config.validate()?;
        let clock = CounterClock::detect(config.tick_hz)?;
        log::debug!(
            "hwspinlock: block at {:#x}, lock regs at {:#x} stride {}, counter at {} Hz",
            config.base,
            config.lock_reg_addr(0),
            config.stride,
            clock.tick_hz()
        );
        Ok(Self::new(MmioRegisterBank::new(config), clock))
    }
}

impl<R, C, const N: usize> HwSpinlockTable<R, C, N> {
    /// Create a table; it must still be [`init`](Self::init)ed before use
    pub const fn new(bank: R, clock: C) -> Self {
        Self {
            locks: [UNLOCKED; N],
            bank,
            clock,
            initialized: AtomicBool::new(false),
        }
    }

    /// Number of locks in the table
    pub const fn num_locks(&self) -> usize {
        N
    }

    /// True once [`init`](Self::init) has run
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Register bank backing the table
    pub fn bank(&self) -> &R {
        &self.bank
    }

    /// Tick source used for deadlines
    pub fn clock(&self) -> &C {
        &self.clock
    }
}

impl<R: RegisterBank, C: Clock, const N: usize> HwSpinlockTable<R, C, N> {
    /// Initialize every local lock to the unlocked state
    ///
    /// Must run once before any lock or unlock call. Further calls are
    /// ignored so that locks held at that point are not torn down.
    pub fn init(&self) -> Result<()> {
        if self.is_initialized() {
            log::warn!("hwspinlock: table already initialized");
            return Ok(());
        }

        for lock in self.locks.iter() {
            lock.local.reinit();
        }
        self.initialized.store(true, Ordering::Release);

        log::info!("hwspinlock: {} locks initialized", N);
        Ok(())
    }

    /// Tear down the table
    ///
    /// Nothing is allocated, so there is nothing to release.
    pub fn exit(&self) -> Result<()> {
        log::debug!("hwspinlock: exit");
        Ok(())
    }

    /// Acquire lock `id`, giving up after `timeout` milliseconds
    ///
    /// On success the local lock stays held, with local interrupts masked,
    /// until [`unlock`](Self::unlock) is called for the same id. On any
    /// error neither the local lock nor the hardware register is held.
    pub fn lock_timeout(&self, id: usize, timeout: u32) -> Result<()> {
        let lock = self.descriptor(id, "trylock")?;
        let deadline = Deadline::after(&self.clock, timeout);

        // Is the lock already taken by another context on this cluster?
        while !lock.local.try_lock_irqsave() {
            if deadline.is_expired(&self.clock) {
                log::error!("hwspinlock {}: local spinlock busy on cpu {}", id, cpu_id());
                return Err(Error::LocalTimeout(id));
            }
            cpu_relax();
        }

        while self.bank.read(id) != HWSPINLOCK_FREE {
            if deadline.is_expired(&self.clock) {
                lock.local.unlock_irqrestore();
                log::error!("hwspinlock {}: timed out waiting for remote owner", id);
                return Err(Error::HardwareTimeout(id));
            }
            cpu_relax();
        }
        self.bank.write(id, HWSPINLOCK_TAKEN);

        Ok(())
    }

    /// Acquire lock `id` and return a guard that unlocks it on drop
    pub fn lock_timeout_guarded(&self, id: usize, timeout: u32) -> Result<HwSpinlockGuard<'_, R, C, N>> {
        self.lock_timeout(id, timeout)?;
        Ok(HwSpinlockGuard {
            table: self,
            id,
            _not_send: PhantomData,
        })
    }

    /// Release lock `id`
    ///
    /// The caller must hold the lock through a successful
    /// [`lock_timeout`](Self::lock_timeout); releasing a lock held by
    /// someone else frees it in hardware under their feet.
    pub fn unlock(&self, id: usize) -> Result<()> {
        let lock = self.descriptor(id, "unlock")?;

        self.bank.write(id, HWSPINLOCK_FREE);
        lock.local.unlock_irqrestore();

        Ok(())
    }

    /// Prepare for standby
    ///
    /// Register values are left untouched: a lock held across the
    /// transition must still read TAKEN afterwards.
    pub fn standby_suspend(&self) -> Result<()> {
        let held = self
            .locks
            .iter()
            .enumerate()
            .filter(|(_, lock)| lock.local.is_locked())
            .inspect(|(id, _)| log::warn!("hwspinlock {}: held locally across standby", id))
            .count();

        let taken = self.report_taken();

        log::info!(
            "hwspinlock: standby suspend, {} held locally, {} taken in hardware",
            held,
            taken
        );
        Ok(())
    }

    /// Return from standby
    pub fn standby_resume(&self) -> Result<()> {
        log::info!("hwspinlock: standby resume");
        Ok(())
    }

    /// True if a local context currently holds lock `id`
    pub fn is_locked_locally(&self, id: usize) -> Result<bool> {
        Ok(self.descriptor(id, "query")?.local.is_locked())
    }

    /// Warn about every register the status bitmap reports TAKEN
    ///
    /// Banks that cannot read the bitmap without acquiring report nothing.
    fn report_taken(&self) -> usize {
        let mask = match self.bank.taken_mask() {
            Some(mask) => mask,
            None => return 0,
        };

        (0..N.min(u32::BITS as usize))
            .filter(|id| mask & (1 << id) != 0)
            .inspect(|id| log::warn!("hwspinlock {}: taken in hardware across standby", id))
            .count()
    }

    fn descriptor(&self, id: usize, op: &str) -> Result<&HwSpinlock> {
        let lock = self.locks.get(id).ok_or_else(|| {
            log::error!("invalid hwspinlock id [{}] for {}", id, op);
            Error::InvalidIndex(id)
        })?;

        if !self.is_initialized() {
            log::error!("hwspinlock {}: {} before init", id, op);
            return Err(Error::NotInitialized);
        }

        Ok(lock)
    }
}

impl<R: RegisterBank, C: Clock, const N: usize> StandbyOps for HwSpinlockTable<R, C, N> {
    fn name(&self) -> &'static str {
        "hwspinlock"
    }

    fn standby_suspend(&self) -> Result<()> {
        HwSpinlockTable::standby_suspend(self)
    }

    fn standby_resume(&self) -> Result<()> {
        HwSpinlockTable::standby_resume(self)
    }
}

/// Held hardware spinlock, released on drop
///
/// The guard carries the interrupt state of the CPU that took the lock,
/// so it must be dropped on that CPU and is not `Send`.
pub struct HwSpinlockGuard<'a, R: RegisterBank, C: Clock, const N: usize> {
    table: &'a HwSpinlockTable<R, C, N>,
    id: usize,
    _not_send: PhantomData<*const ()>,
}

impl<R: RegisterBank, C: Clock, const N: usize> HwSpinlockGuard<'_, R, C, N> {
    /// Lock id held by this guard
    pub fn id(&self) -> usize {
        self.id
    }
}

impl<R: RegisterBank, C: Clock, const N: usize> Drop for HwSpinlockGuard<'_, R, C, N> {
    fn drop(&mut self) {
        // The id was validated when the guard was created
        let _ = self.table.unlock(self.id);
    }
}
