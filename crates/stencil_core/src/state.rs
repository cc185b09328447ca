//! Process-wide runtime state
//!
//! One [`ProcessRuntimeState`] exists per process in production (owned by the
//! global bridge), but it is an ordinary value so tests can create as many
//! independent instances as they like and assert on them directly.
//!
//! Reads are lock-free. Writers must hold either the lifecycle init lock
//! (runtime flags, pid, finalize marker) or the execution lock (cache flag).

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use serde::Serialize;

/// Pid value meaning "no process has initialized the runtime".
const NO_PID: u32 = 0;

/// Initialization flags shared by the lifecycle, cache and call layers.
#[derive(Debug, Default)]
pub struct ProcessRuntimeState {
    runtime_initialized: AtomicBool,
    cache_initialized: AtomicBool,
    finalized: AtomicBool,
    init_pid: AtomicU32,
}

/// Point-in-time copy of [`ProcessRuntimeState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateSnapshot {
    pub runtime_initialized: bool,
    pub cache_initialized: bool,
    pub finalized: bool,
    pub init_pid: Option<u32>,
}

impl ProcessRuntimeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_runtime_initialized(&self) -> bool {
        self.runtime_initialized.load(Ordering::Acquire)
    }

    pub fn is_cache_initialized(&self) -> bool {
        self.cache_initialized.load(Ordering::Acquire)
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }

    /// Pid of the process that initialized the runtime, if any.
    pub fn init_pid(&self) -> Option<u32> {
        match self.init_pid.load(Ordering::Acquire) {
            NO_PID => None,
            pid => Some(pid),
        }
    }

    /// Record that `pid` started (or adopted) the runtime.
    pub fn record_runtime_initialized(&self, pid: u32) {
        self.init_pid.store(pid, Ordering::Release);
        self.runtime_initialized.store(true, Ordering::Release);
    }

    pub fn set_cache_initialized(&self, initialized: bool) {
        self.cache_initialized.store(initialized, Ordering::Release);
    }

    /// Mark a finalization in progress.
    ///
    /// Returns `false` if another finalizer already set the marker.
    pub fn begin_finalize(&self) -> bool {
        self.finalized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Return every flag to "uninitialized" and forget the owning pid.
    pub fn reset(&self) {
        self.cache_initialized.store(false, Ordering::Release);
        self.runtime_initialized.store(false, Ordering::Release);
        self.init_pid.store(NO_PID, Ordering::Release);
        self.finalized.store(false, Ordering::Release);
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            runtime_initialized: self.is_runtime_initialized(),
            cache_initialized: self.is_cache_initialized(),
            finalized: self.is_finalized(),
            init_pid: self.init_pid(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uninitialized() {
        let state = ProcessRuntimeState::new();
        assert_eq!(
            state.snapshot(),
            StateSnapshot {
                runtime_initialized: false,
                cache_initialized: false,
                finalized: false,
                init_pid: None,
            }
        );
    }

    #[test]
    fn records_owner_pid() {
        let state = ProcessRuntimeState::new();
        state.record_runtime_initialized(4242);
        assert!(state.is_runtime_initialized());
        assert_eq!(state.init_pid(), Some(4242));
    }

    #[test]
    fn finalize_marker_is_exclusive() {
        let state = ProcessRuntimeState::new();
        assert!(state.begin_finalize());
        assert!(!state.begin_finalize());
        state.reset();
        assert!(state.begin_finalize());
    }

    #[test]
    fn reset_clears_everything() {
        let state = ProcessRuntimeState::new();
        state.record_runtime_initialized(7);
        state.set_cache_initialized(true);
        state.reset();
        assert!(!state.is_runtime_initialized());
        assert!(!state.is_cache_initialized());
        assert_eq!(state.init_pid(), None);
    }

    #[test]
    fn snapshot_serializes() {
        let state = ProcessRuntimeState::new();
        state.record_runtime_initialized(12);
        let json = serde_json::to_string(&state.snapshot()).unwrap();
        assert_eq!(
            json,
            r#"{"runtime_initialized":true,"cache_initialized":false,"finalized":false,"init_pid":12}"#
        );
    }
}
