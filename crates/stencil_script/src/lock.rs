//! Exclusive execution lock
//!
//! The cached entry points live inside the lock, so the only way to reach
//! them is through an [`ExecutionGuard`]. Holding a guard is also what
//! entitles a thread to run code inside the embedded runtime. Guards release
//! on drop, including on early-return error paths.
//!
//! Acquisition blocks with no timeout: a script that never returns keeps
//! every other caller waiting.

use parking_lot::{Mutex, MutexGuard};

use crate::cache::CachedModule;

#[derive(Default)]
pub(crate) struct ExecutionLock {
    slot: Mutex<Option<CachedModule>>,
}

/// Scoped ownership of the execution lock.
pub(crate) struct ExecutionGuard<'a> {
    slot: MutexGuard<'a, Option<CachedModule>>,
}

impl ExecutionLock {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Block until no other thread is inside the runtime.
    pub(crate) fn acquire(&self) -> ExecutionGuard<'_> {
        ExecutionGuard {
            slot: self.slot.lock(),
        }
    }

    pub(crate) fn is_locked(&self) -> bool {
        self.slot.is_locked()
    }
}

impl ExecutionGuard<'_> {
    pub(crate) fn cached(&self) -> Option<&CachedModule> {
        self.slot.as_ref()
    }

    /// Commit a fully resolved module, handing back whatever it replaces.
    pub(crate) fn install(&mut self, module: CachedModule) -> Option<CachedModule> {
        self.slot.replace(module)
    }

    pub(crate) fn take(&mut self) -> Option<CachedModule> {
        self.slot.take()
    }
}
