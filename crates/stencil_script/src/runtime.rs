//! Script runtime management
//!
//! Owns the embedded QuickJS instance and its process-level lifecycle.
//!
//! The runtime is started at most once per [`ScriptRuntime`] and then stays
//! resident: `finalize` only tears down the cache layer and the flags, and a
//! later `initialize` re-adopts the same instance. Two locks are involved and
//! they are always taken in the same order:
//!
//! 1. the init lock, for runtime flag transitions (initialize/finalize/reset);
//! 2. the execution lock, for anything that runs script code or touches
//!    cached handles.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use rquickjs::convert::Coerced;
use rquickjs::{Context, Runtime};
use stencil_core::{BridgeError, ForkPolicy, ModuleSource, ProcessRuntimeState, Result, RuntimeOptions};

use crate::cache::CachedModule;
use crate::ffi;
use crate::loader::ModuleCatalog;
use crate::lock::{ExecutionGuard, ExecutionLock};

/// A started QuickJS runtime with its single context.
pub(crate) struct Engine {
    #[allow(dead_code)] // Kept alive for context lifetime
    runtime: Runtime,
    pub(crate) context: Context,
    pub(crate) catalog: ModuleCatalog,
}

impl Engine {
    fn start(options: &RuntimeOptions, modules: &ModuleSource) -> Result<Self> {
        let catalog = ModuleCatalog::collect(modules)?;

        let runtime = Runtime::new().map_err(|e| BridgeError::RuntimeStart(e.to_string()))?;
        if let Some(limit) = options.memory_limit {
            runtime.set_memory_limit(limit);
        }
        if let Some(size) = options.max_stack_size {
            runtime.set_max_stack_size(size);
        }
        if let Some(threshold) = options.gc_threshold {
            runtime.set_gc_threshold(threshold);
        }

        let (resolver, loader) = catalog.loader();
        runtime.set_loader(resolver, loader);

        let context = Context::full(&runtime).map_err(|e| BridgeError::RuntimeStart(e.to_string()))?;
        context
            .with(|ctx| ffi::install_console(&ctx))
            .map_err(|e| BridgeError::RuntimeStart(format!("failed to install console: {e}")))?;

        Ok(Self {
            runtime,
            context,
            catalog,
        })
    }
}

/// Lifecycle owner for the embedded runtime.
pub struct ScriptRuntime {
    state: Arc<ProcessRuntimeState>,
    options: RuntimeOptions,
    modules: ModuleSource,
    init_lock: Mutex<()>,
    execution: ExecutionLock,
    engine: OnceCell<Engine>,
    pid_source: fn() -> u32,
}

impl ScriptRuntime {
    pub fn new(options: RuntimeOptions, modules: ModuleSource) -> Self {
        Self::with_state(Arc::new(ProcessRuntimeState::new()), options, modules)
    }

    pub fn with_state(
        state: Arc<ProcessRuntimeState>,
        options: RuntimeOptions,
        modules: ModuleSource,
    ) -> Self {
        Self {
            state,
            options,
            modules,
            init_lock: Mutex::new(()),
            execution: ExecutionLock::new(),
            engine: OnceCell::new(),
            pid_source: std::process::id,
        }
    }

    /// Replace the source of "current process id" used for fork detection.
    pub fn with_pid_source(mut self, pid_source: fn() -> u32) -> Self {
        self.pid_source = pid_source;
        self
    }

    pub fn state(&self) -> &Arc<ProcessRuntimeState> {
        &self.state
    }

    /// Whether the QuickJS instance has ever been started.
    pub fn is_started(&self) -> bool {
        self.engine.get().is_some()
    }

    /// Whether some thread currently holds the execution lock.
    pub fn is_executing(&self) -> bool {
        self.execution.is_locked()
    }

    /// Start (or re-adopt) the runtime for the current process.
    pub fn initialize(&self) -> Result<()> {
        let _init = self.init_lock.lock();
        let current = (self.pid_source)();

        if self.state.is_runtime_initialized() {
            match self.state.init_pid() {
                Some(owner) if owner != current => {
                    if !self.adopt_after_fork(owner, current) {
                        return Ok(());
                    }
                }
                _ => {
                    tracing::debug!(pid = current, "Runtime already initialized in this process");
                    return Ok(());
                }
            }
        }

        let first_start = !self.is_started();
        self.engine
            .get_or_try_init(|| Engine::start(&self.options, &self.modules))
            .inspect_err(|e| tracing::error!(error = %e, "Failed to start embedded runtime"))?;
        self.state.record_runtime_initialized(current);

        if first_start {
            tracing::info!(pid = current, "Embedded runtime started");
        } else {
            tracing::info!(pid = current, "Embedded runtime re-adopted");
        }
        Ok(())
    }

    /// Returns `true` when the caller should continue with a fresh start.
    fn adopt_after_fork(&self, owner: u32, current: u32) -> bool {
        match self.options.fork_policy {
            ForkPolicy::Warn => {
                tracing::warn!(
                    init_pid = owner,
                    current_pid = current,
                    "Runtime was initialized by a different process; keeping inherited state"
                );
                false
            }
            ForkPolicy::Reinitialize => {
                tracing::warn!(
                    init_pid = owner,
                    current_pid = current,
                    "Runtime was initialized by a different process; dropping cached handles"
                );
                self.release_cache();
                self.state.reset();
                true
            }
        }
    }

    /// Tear down the cache layer and reset every flag.
    ///
    /// The QuickJS instance itself stays resident for the life of this value.
    pub fn finalize(&self) {
        let _init = self.init_lock.lock();
        if !self.state.begin_finalize() {
            tracing::debug!("Finalize already in progress, skipping");
            return;
        }

        self.release_cache();
        self.state.reset();
        tracing::info!("Runtime finalized; embedded runtime stays resident");
    }

    /// Release cached handles and return every flag to "uninitialized".
    pub(crate) fn reset(&self) {
        let _init = self.init_lock.lock();
        self.release_cache();
        self.state.reset();
        tracing::debug!("Runtime state reset");
    }

    /// Drop the cached module (if any) and clear the cache flag.
    ///
    /// Returns whether anything was released.
    pub(crate) fn release_cache(&self) -> bool {
        let mut guard = self.execution.acquire();
        let released = match guard.take() {
            Some(module) => {
                tracing::debug!(module = module.module_name(), "Releasing cached entry points");
                self.release(module);
                true
            }
            None => false,
        };
        self.state.set_cache_initialized(false);
        released
    }

    /// Free retained handles inside the runtime.
    ///
    /// Callers must hold the execution lock.
    pub(crate) fn release(&self, module: CachedModule) {
        match self.engine.get() {
            Some(engine) => engine.context.with(move |_ctx| drop(module)),
            None => drop(module),
        }
    }

    pub(crate) fn engine(&self) -> Result<&Engine> {
        if !self.state.is_runtime_initialized() {
            return Err(BridgeError::RuntimeNotInitialized);
        }
        self.engine.get().ok_or(BridgeError::RuntimeNotInitialized)
    }

    pub(crate) fn execution(&self) -> ExecutionGuard<'_> {
        self.execution.acquire()
    }

    /// Evaluate a script snippet and return its result coerced to text.
    pub fn evaluate(&self, source: &str) -> Result<String> {
        let engine = self.engine()?;
        let _guard = self.execution.acquire();

        engine.context.with(|ctx| {
            ctx.eval::<Coerced<String>, _>(source)
                .map(|text| text.0)
                .map_err(|e| BridgeError::Raised {
                    entry_point: "<eval>".to_string(),
                    reason: ffi::describe_error(&ctx, e),
                })
        })
    }
}

impl Drop for ScriptRuntime {
    fn drop(&mut self) {
        // Handles must go before the runtime that owns them.
        if let Some(module) = self.execution.acquire().take() {
            self.release(module);
        }
    }
}
