//! Host-facing bridge
//!
//! [`Bridge`] ties the lifecycle, the entry point cache and the call bridge
//! together behind the operations a host process uses. A process normally
//! owns exactly one, installed through [`install`] and reached through
//! [`global`]; tests build independent instances with [`Bridge::new`].

use std::sync::Arc;

use once_cell::sync::OnceCell;
use stencil_core::{BridgeConfig, ProcessRuntimeState, Result, Selector, StateSnapshot};

use crate::bridge::CallBridge;
use crate::cache::EntryPointCache;
use crate::runtime::ScriptRuntime;

static GLOBAL: OnceCell<Bridge> = OnceCell::new();

/// Install the process-wide bridge, or return the one already installed.
///
/// `config` is ignored when a bridge already exists.
pub fn install(config: BridgeConfig) -> &'static Bridge {
    let mut created = false;
    let bridge = GLOBAL.get_or_init(|| {
        created = true;
        Bridge::new(config)
    });
    if !created {
        tracing::debug!("Process bridge already installed");
    }
    bridge
}

/// The process-wide bridge, if [`install`] has run.
pub fn global() -> Option<&'static Bridge> {
    GLOBAL.get()
}

pub struct Bridge {
    config: BridgeConfig,
    runtime: Arc<ScriptRuntime>,
    cache: EntryPointCache,
    calls: CallBridge,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self::with_state(config, Arc::new(ProcessRuntimeState::new()))
    }

    /// Build a bridge around an existing state object.
    pub fn with_state(config: BridgeConfig, state: Arc<ProcessRuntimeState>) -> Self {
        let runtime = ScriptRuntime::with_state(state, config.runtime.clone(), config.modules.clone());
        Self::from_runtime(config, runtime)
    }

    /// Build a bridge around a preconfigured runtime.
    ///
    /// The runtime's own options and module source take precedence over the
    /// ones in `config`.
    pub fn from_runtime(config: BridgeConfig, runtime: ScriptRuntime) -> Self {
        let runtime = Arc::new(runtime);
        let cache = EntryPointCache::new(
            Arc::clone(&runtime),
            config.entry_points.clone(),
            config.module.clone(),
        );
        let calls = CallBridge::new(Arc::clone(&runtime), config.entry_points.clone());
        Self {
            config,
            runtime,
            cache,
            calls,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn runtime(&self) -> &Arc<ScriptRuntime> {
        &self.runtime
    }

    pub fn state(&self) -> StateSnapshot {
        self.runtime.state().snapshot()
    }

    pub fn initialize_runtime(&self) -> Result<()> {
        self.runtime.initialize()
    }

    pub fn initialize_cache(&self, module: &str) -> Result<()> {
        self.cache.init_cache(module)
    }

    /// Start the runtime and cache the configured module.
    pub fn initialize(&self) -> Result<()> {
        self.initialize_runtime()?;
        self.initialize_cache(&self.config.module)
    }

    pub fn call<'a>(&self, selector: Selector, request: impl Into<Option<&'a str>>) -> Result<String> {
        self.calls.call(selector, request)
    }

    pub fn render(&self, request: &str) -> Result<String> {
        self.call(Selector::Render, request)
    }

    pub fn lookup(&self, request: &str) -> Result<String> {
        self.call(Selector::Lookup, request)
    }

    pub fn clear_caches(&self) -> Result<String> {
        self.cache.clear()
    }

    pub fn cleanup(&self) {
        self.cache.cleanup();
    }

    /// Drop everything and rebuild the runtime flags and the cache for the
    /// most recently cached module.
    pub fn reinitialize(&self) -> Result<()> {
        let module = self.cache.module();
        tracing::info!(module = %module, "Reinitializing bridge");

        self.runtime.reset();
        self.runtime
            .initialize()
            .inspect_err(|e| tracing::error!(error = %e, "Failed to re-initialize runtime"))?;
        self.cache
            .init_cache(&module)
            .inspect_err(|e| tracing::error!(module = %module, error = %e, "Failed to re-initialize entry point cache"))
    }

    /// Release the cache and reset the lifecycle flags.
    pub fn finalize(&self) {
        self.runtime.finalize();
    }
}
