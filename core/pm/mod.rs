//! Standby power management
//!
//! Drivers that must take part in a low-power transition implement
//! [`StandbyOps`] and are registered with a [`StandbyCoordinator`], which
//! the platform calls around standby entry and exit.

use heapless::Vec;

use crate::{Error, Result};

/// Hooks run around a standby transition
pub trait StandbyOps {
    /// Name used in log messages
    fn name(&self) -> &'static str;

    /// Called before the system enters standby
    fn standby_suspend(&self) -> Result<()>;

    /// Called after the system leaves standby
    fn standby_resume(&self) -> Result<()>;
}

/// Fixed-capacity list of standby hooks
pub struct StandbyCoordinator<'a, const M: usize> {
    hooks: Vec<&'a dyn StandbyOps, M>,
}

impl<'a, const M: usize> StandbyCoordinator<'a, M> {
    /// Create an empty coordinator
    pub const fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Add a hook; suspend runs hooks in registration order
    pub fn register(&mut self, ops: &'a dyn StandbyOps) -> Result<()> {
        self.hooks.push(ops).map_err(|_| {
            log::error!("standby: no room to register {}", ops.name());
            Error::RegistryFull
        })?;
        log::debug!("standby: registered {}", ops.name());
        Ok(())
    }

    /// Number of registered hooks
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// True if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Suspend every hook in registration order
    ///
    /// If a hook fails, the hooks already suspended are resumed in reverse
    /// order and the failure is returned.
    pub fn suspend_all(&self) -> Result<()> {
        for (idx, ops) in self.hooks.iter().enumerate() {
            if let Err(err) = ops.standby_suspend() {
                log::error!("standby: suspend of {} failed: {}", ops.name(), err);
                for done in self.hooks[..idx].iter().rev() {
                    if let Err(err) = done.standby_resume() {
                        log::warn!("standby: rollback resume of {} failed: {}", done.name(), err);
                    }
                }
                return Err(err);
            }
        }

        log::info!("standby: {} hooks suspended", self.hooks.len());
        Ok(())
    }

    /// Resume every hook in reverse registration order
    ///
    /// All hooks are resumed even if one fails; the first failure is
    /// returned.
    pub fn resume_all(&self) -> Result<()> {
        let mut result = Ok(());

        for ops in self.hooks.iter().rev() {
            if let Err(err) = ops.standby_resume() {
                log::error!("standby: resume of {} failed: {}", ops.name(), err);
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }

        log::info!("standby: {} hooks resumed", self.hooks.len());
        result
    }
}

impl<const M: usize> Default for StandbyCoordinator<'_, M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder<'a> {
        name: &'static str,
        fail_suspend: bool,
        fail_resume: bool,
        events: &'a Mutex<std::vec::Vec<(&'static str, &'static str)>>,
    }

    impl<'a> Recorder<'a> {
        fn new(
            name: &'static str,
            events: &'a Mutex<std::vec::Vec<(&'static str, &'static str)>>,
        ) -> Self {
            Self {
                name,
                fail_suspend: false,
                fail_resume: false,
                events,
            }
        }
    }

    impl StandbyOps for Recorder<'_> {
        fn name(&self) -> &'static str {
            self.name
        }

        fn standby_suspend(&self) -> Result<()> {
            self.events.lock().unwrap().push(("suspend", self.name));
            if self.fail_suspend {
                Err(Error::InvalidConfig)
            } else {
                Ok(())
            }
        }

        fn standby_resume(&self) -> Result<()> {
            self.events.lock().unwrap().push(("resume", self.name));
            if self.fail_resume {
                Err(Error::NotInitialized)
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_suspend_resume_order() {
        let events = Mutex::new(std::vec::Vec::new());
        let a = Recorder::new("a", &events);
        let b = Recorder::new("b", &events);

        let mut pm: StandbyCoordinator<'_, 4> = StandbyCoordinator::new();
        pm.register(&a).unwrap();
        pm.register(&b).unwrap();
        assert_eq!(pm.len(), 2);

        pm.suspend_all().unwrap();
        pm.resume_all().unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            [("suspend", "a"), ("suspend", "b"), ("resume", "b"), ("resume", "a")]
        );
    }

    #[test]
    fn test_suspend_failure_rolls_back() {
        let events = Mutex::new(std::vec::Vec::new());
        let a = Recorder::new("a", &events);
        let b = Recorder::new("b", &events);
        let mut c = Recorder::new("c", &events);
        c.fail_suspend = true;

        let mut pm: StandbyCoordinator<'_, 4> = StandbyCoordinator::new();
        pm.register(&a).unwrap();
        pm.register(&b).unwrap();
        pm.register(&c).unwrap();

        assert_eq!(pm.suspend_all(), Err(Error::InvalidConfig));
        assert_eq!(
            *events.lock().unwrap(),
            [
                ("suspend", "a"),
                ("suspend", "b"),
                ("suspend", "c"),
                ("resume", "b"),
                ("resume", "a"),
            ]
        );
    }

    #[test]
    fn test_resume_reports_first_error() {
        let events = Mutex::new(std::vec::Vec::new());
        let mut a = Recorder::new("a", &events);
        a.fail_resume = true;
        let b = Recorder::new("b", &events);

        let mut pm: StandbyCoordinator<'_, 2> = StandbyCoordinator::new();
        pm.register(&a).unwrap();
        pm.register(&b).unwrap();

        assert_eq!(pm.resume_all(), Err(Error::NotInitialized));
        assert_eq!(events.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_register_full() {
        let events = Mutex::new(std::vec::Vec::new());
        let a = Recorder::new("a", &events);
        let b = Recorder::new("b", &events);

        let mut pm: StandbyCoordinator<'_, 1> = StandbyCoordinator::new();
        assert!(pm.is_empty());
        pm.register(&a).unwrap();
        assert_eq!(pm.register(&b), Err(Error::RegistryFull));
    }
}
