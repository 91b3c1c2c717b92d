//! Local spinlocks
//!
//! [`RawSpinLock`] is a bare test-and-set lock. [`IrqSpinLock`] wraps it
//! with the interrupt state captured while the lock is held, so the
//! holder can run with local interrupts masked and restore them on
//! release.

use ::core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::core::irq::{self, IrqFlags};

/// A raw spinlock without associated data
pub struct RawSpinLock {
    locked: AtomicBool,
}

impl RawSpinLock {
    /// Create a new raw spinlock
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    /// Try to acquire the lock
    pub fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Release the lock
    pub fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    /// Check if the lock is held
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }
}

impl Default for RawSpinLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Spinlock that keeps local interrupts masked while held
pub struct IrqSpinLock {
    lock: RawSpinLock,
    /// Interrupt state of the holder before it took the lock
    flags: AtomicUsize,
}

impl IrqSpinLock {
    /// Create a new unlocked spinlock
    pub const fn new() -> Self {
        Self {
            lock: RawSpinLock::new(),
            flags: AtomicUsize::new(0),
        }
    }

    /// Put the lock back into the unlocked state
    ///
    /// Only valid while no context can be holding or contending for it.
    pub fn reinit(&self) {
        self.flags.store(0, Ordering::Relaxed);
        self.lock.unlock();
    }

    /// Mask local interrupts and try to take the lock once
    ///
    /// On failure the interrupt state is restored before returning, so a
    /// caller that keeps retrying gives pending interrupts a window
    /// between attempts.
    pub fn try_lock_irqsave(&self) -> bool {
        let flags = irq::local_irq_save();
        if self.lock.try_lock() {
            self.flags.store(flags.raw(), Ordering::Relaxed);
            true
        } else {
            irq::local_irq_restore(flags);
            false
        }
    }

    /// Release the lock and restore the interrupt state saved at acquisition
    pub fn unlock_irqrestore(&self) {
        let flags = IrqFlags::from_raw(self.flags.load(Ordering::Relaxed));
        self.lock.unlock();
        irq::local_irq_restore(flags);
    }

    /// Check if the lock is held
    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }
}

impl Default for IrqSpinLock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_spinlock() {
        let lock = RawSpinLock::new();
        assert!(!lock.is_locked());
        assert!(lock.try_lock());
        assert!(lock.is_locked());
        assert!(!lock.try_lock());
        lock.unlock();
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_irq_spinlock_trylock() {
        let lock = IrqSpinLock::new();
        assert!(lock.try_lock_irqsave());
        assert!(!lock.try_lock_irqsave());
        lock.unlock_irqrestore();
        assert!(!lock.is_locked());
        assert!(lock.try_lock_irqsave());
        lock.unlock_irqrestore();
    }

    #[test]
    fn test_irq_spinlock_reinit() {
        let lock = IrqSpinLock::new();
        assert!(lock.try_lock_irqsave());
        lock.reinit();
        assert!(!lock.is_locked());
        assert!(lock.try_lock_irqsave());
        lock.unlock_irqrestore();
    }

    #[test]
    fn test_raw_spinlock_contention() {
        let lock = RawSpinLock::new();
        let counter = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..1000 {
                        while !lock.try_lock() {
                            ::core::hint::spin_loop();
                        }
                        let v = counter.load(Ordering::Relaxed);
                        counter.store(v + 1, Ordering::Relaxed);
                        lock.unlock();
                    }
                });
            }
        });

        assert_eq!(counter.load(Ordering::Relaxed), 4000);
    }
}
