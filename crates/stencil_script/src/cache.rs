//! Entry point cache
//!
//! Evaluates one module, resolves its render and lookup exports, and retains
//! them so every call can skip the lookup. Resolution is all-or-nothing:
//! handles are resolved as plain context-bound values first and only turned
//! into retained [`Persistent`] handles once every export checks out. An
//! early return drops the locals, which releases them.

use std::sync::Arc;

use parking_lot::Mutex;
use rquickjs::{Ctx, Function, Module, Object, Persistent, Value};
use stencil_core::{BridgeError, EntryPointNames, Result, Selector};

use crate::ffi;
use crate::loader::ModuleCatalog;
use crate::runtime::ScriptRuntime;

/// Retained handles for one evaluated module.
///
/// The namespace and both entry points are always present together.
pub struct CachedModule {
    module: String,
    handles: Handles,
}

struct Handles {
    namespace: Persistent<Object<'static>>,
    render: Persistent<Function<'static>>,
    lookup: Persistent<Function<'static>>,
}

// SAFETY: a `CachedModule` only lives in the execution lock's slot or in a
// local of a thread holding that lock, so at most one thread reaches the
// handles at a time. Every clone, restore and drop of a handle happens
// inside `Context::with`, which also holds the runtime's own lock.
unsafe impl Send for Handles {}
unsafe impl Sync for Handles {}

impl CachedModule {
    pub fn module_name(&self) -> &str {
        &self.module
    }

    /// Must be called inside `Context::with` while holding the execution lock.
    pub(crate) fn restore_entry_point<'js>(&self, ctx: &Ctx<'js>, selector: Selector) -> rquickjs::Result<Function<'js>> {
        let handle = match selector {
            Selector::Render => &self.handles.render,
            Selector::Lookup => &self.handles.lookup,
        };
        handle.clone().restore(ctx)
    }

    /// Must be called inside `Context::with` while holding the execution lock.
    pub(crate) fn restore_namespace<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Object<'js>> {
        self.handles.namespace.clone().restore(ctx)
    }
}

/// Resolves and owns the module's entry points.
pub struct EntryPointCache {
    runtime: Arc<ScriptRuntime>,
    names: EntryPointNames,
    /// Last module requested; rebuilt on reinitialize.
    module: Mutex<String>,
}

impl EntryPointCache {
    pub fn new(runtime: Arc<ScriptRuntime>, names: EntryPointNames, module: impl Into<String>) -> Self {
        Self {
            runtime,
            names,
            module: Mutex::new(module.into()),
        }
    }

    pub fn entry_points(&self) -> &EntryPointNames {
        &self.names
    }

    pub fn module(&self) -> String {
        self.module.lock().clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.runtime.state().is_cache_initialized()
    }

    /// Evaluate `module` and retain its entry points.
    ///
    /// Succeeds immediately if the cache is already initialized.
    pub fn init_cache(&self, module: &str) -> Result<()> {
        let state = self.runtime.state();
        if !state.is_runtime_initialized() {
            tracing::error!(module, "Cannot initialize entry point cache before the runtime");
            return Err(BridgeError::RuntimeNotInitialized);
        }
        let engine = self.runtime.engine()?;

        let mut guard = self.runtime.execution();
        if state.is_cache_initialized() {
            tracing::debug!(
                module,
                cached = guard.cached().map(CachedModule::module_name),
                "Entry point cache already initialized"
            );
            return Ok(());
        }

        let names = &self.names;
        let catalog = &engine.catalog;
        let resolved = engine.context.with(|ctx| resolve_module(&ctx, catalog, module, names));
        let cached = resolved.inspect_err(|e| {
            tracing::error!(module, error = %e, "Failed to initialize entry point cache");
        })?;

        if let Some(stale) = guard.install(cached) {
            tracing::warn!(module = stale.module_name(), "Replacing handles left behind by a cleared flag");
            self.runtime.release(stale);
        }
        state.set_cache_initialized(true);
        *self.module.lock() = module.to_string();

        tracing::info!(
            module,
            render = %self.names.render,
            lookup = %self.names.lookup,
            "Entry point cache initialized"
        );
        Ok(())
    }

    /// Run the module's maintenance entry point and return its text.
    ///
    /// Meant for resetting script-side caches between tests.
    pub fn clear(&self) -> Result<String> {
        if !self.is_initialized() {
            return Err(BridgeError::CacheNotInitialized);
        }
        let engine = self.runtime.engine()?;
        let Some(name) = self.names.maintenance() else {
            return Err(BridgeError::MaintenanceUnavailable(
                "no maintenance entry point configured".to_string(),
            ));
        };

        let guard = self.runtime.execution();
        let cached = guard.cached().ok_or(BridgeError::CacheSlotEmpty)?;
        let module = cached.module_name();

        let result = engine.context.with(|ctx| {
            let namespace = cached.restore_namespace(&ctx).map_err(|e| BridgeError::StaleHandle {
                entry_point: module.to_string(),
                reason: e.to_string(),
            })?;
            let clear = resolve_entry_point(&namespace, module, name)
                .map_err(|e| BridgeError::MaintenanceUnavailable(e.to_string()))?;
            let value: Value = clear.call(()).map_err(|e| BridgeError::Raised {
                entry_point: name.to_string(),
                reason: ffi::describe_error(&ctx, e),
            })?;
            ffi::decode_text(name, value)
        });

        match &result {
            Ok(message) => tracing::info!(module, message = %message, "Script caches cleared"),
            Err(e) => tracing::error!(module, error = %e, "Failed to clear script caches"),
        }
        result
    }

    /// Release every retained handle. A no-op when already clean.
    pub fn cleanup(&self) {
        if self.runtime.release_cache() {
            tracing::info!("Entry point cache cleaned up");
        } else {
            tracing::debug!("Entry point cache already clean");
        }
    }
}

fn resolve_module(ctx: &Ctx<'_>, catalog: &ModuleCatalog, module: &str, names: &EntryPointNames) -> Result<CachedModule> {
    let namespace = evaluate_namespace(ctx, catalog, module)?;
    let render = resolve_entry_point(&namespace, module, &names.render)?;
    let lookup = resolve_entry_point(&namespace, module, &names.lookup)?;

    Ok(CachedModule {
        module: module.to_string(),
        handles: Handles {
            namespace: Persistent::save(ctx, namespace),
            render: Persistent::save(ctx, render),
            lookup: Persistent::save(ctx, lookup),
        },
    })
}

/// Declare `module` from its catalog source under its own name and evaluate
/// it to completion.
///
/// Each call yields a fresh module instance. Imports made by the module
/// itself go through the runtime loader, relative to `module`.
fn evaluate_namespace<'js>(ctx: &Ctx<'js>, catalog: &ModuleCatalog, module: &str) -> Result<Object<'js>> {
    let source = catalog.source(module).ok_or_else(|| BridgeError::ModuleImport {
        module: module.to_string(),
        reason: "not found in any module source".to_string(),
    })?;
    let import_error = |e: rquickjs::Error| BridgeError::ModuleImport {
        module: module.to_string(),
        reason: ffi::describe_error(ctx, e),
    };

    let (evaluated, completion) = Module::declare(ctx.clone(), module, source)
        .map_err(import_error)?
        .eval()
        .map_err(import_error)?;
    completion.finish::<()>().map_err(import_error)?;
    evaluated.namespace().map_err(import_error)
}

fn resolve_entry_point<'js>(namespace: &Object<'js>, module: &str, name: &str) -> Result<Function<'js>> {
    let value: Value = namespace.get(name).map_err(|e| BridgeError::ModuleImport {
        module: module.to_string(),
        reason: e.to_string(),
    })?;

    if value.is_undefined() {
        return Err(BridgeError::EntryPointMissing {
            module: module.to_string(),
            name: name.to_string(),
        });
    }

    value.into_function().ok_or_else(|| BridgeError::NotInvocable {
        module: module.to_string(),
        name: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use stencil_core::{ModuleSource, RuntimeOptions};

    const GOOD: &str = r#"
        let cleared = 0;
        export function render_chat_template(request) { return "render:" + request; }
        export function get_model_chat_template(request) { return "lookup:" + request; }
        export function clear_caches() { cleared += 1; return "cleared " + cleared; }
    "#;
    const MISSING_LOOKUP: &str = r#"
        export function render_chat_template(request) { return request; }
    "#;
    const LOOKUP_NOT_CALLABLE: &str = r#"
        export function render_chat_template(request) { return request; }
        export const get_model_chat_template = 42;
    "#;
    const THROWS_ON_IMPORT: &str = r#"
        throw new Error("module init failed");
    "#;

    fn cache_with(modules: &[(&str, &str)]) -> EntryPointCache {
        let mut source = ModuleSource::default();
        for (name, code) in modules {
            source.inline.insert(name.to_string(), code.to_string());
        }
        let runtime = Arc::new(ScriptRuntime::new(RuntimeOptions::default(), source));
        runtime.initialize().unwrap();
        EntryPointCache::new(runtime, EntryPointNames::default(), "good")
    }

    #[test]
    fn requires_runtime() {
        let runtime = Arc::new(ScriptRuntime::new(RuntimeOptions::default(), ModuleSource::default()));
        let cache = EntryPointCache::new(runtime, EntryPointNames::default(), "good");
        assert!(matches!(cache.init_cache("good"), Err(BridgeError::RuntimeNotInitialized)));
    }

    #[test]
    fn resolves_both_entry_points() {
        let cache = cache_with(&[("good", GOOD)]);
        cache.init_cache("good").unwrap();
        assert!(cache.is_initialized());

        let guard = cache.runtime.execution();
        assert_eq!(guard.cached().map(CachedModule::module_name), Some("good"));
    }

    #[test]
    fn init_is_idempotent() {
        let cache = cache_with(&[("good", GOOD), ("other", GOOD)]);
        cache.init_cache("good").unwrap();
        cache.init_cache("other").unwrap();
        assert_eq!(cache.module(), "good");
    }

    #[test]
    fn missing_entry_point_leaves_cache_empty() {
        let cache = cache_with(&[("partial", MISSING_LOOKUP)]);
        let err = cache.init_cache("partial").unwrap_err();

        assert!(matches!(err, BridgeError::EntryPointMissing { ref name, .. } if name == "get_model_chat_template"));
        assert!(!cache.is_initialized());
        assert!(cache.runtime.execution().cached().is_none());
    }

    #[test]
    fn non_callable_entry_point_is_rejected() {
        let cache = cache_with(&[("bad", LOOKUP_NOT_CALLABLE)]);
        let err = cache.init_cache("bad").unwrap_err();

        assert!(matches!(err, BridgeError::NotInvocable { .. }));
        assert!(!cache.is_initialized());
    }

    #[test]
    fn import_failures_carry_script_error() {
        let cache = cache_with(&[("throws", THROWS_ON_IMPORT)]);
        let err = cache.init_cache("throws").unwrap_err();
        assert!(matches!(err, BridgeError::ModuleImport { .. }));
        assert!(err.to_string().contains("module init failed"), "{err}");

        let err = cache.init_cache("nowhere").unwrap_err();
        assert!(matches!(err, BridgeError::ModuleImport { .. }));
    }

    #[test]
    fn clear_invokes_maintenance_entry_point() {
        let cache = cache_with(&[("good", GOOD)]);
        assert!(matches!(cache.clear(), Err(BridgeError::CacheNotInitialized)));

        cache.init_cache("good").unwrap();
        assert_eq!(cache.clear().unwrap(), "cleared 1");
        assert_eq!(cache.clear().unwrap(), "cleared 2");
    }

    #[test]
    fn clear_without_maintenance_export_fails() {
        let cache = cache_with(&[("partial", LOOKUP_NOT_CALLABLE.replace("= 42", "= (x) => x").as_str())]);
        cache.init_cache("partial").unwrap();
        let err = cache.clear().unwrap_err();
        assert!(matches!(err, BridgeError::MaintenanceUnavailable(_)));
    }

    #[test]
    fn fresh_runtimes_resolve_reliably() {
        for round in 0..150 {
            let cache = cache_with(&[("good", GOOD)]);
            cache
                .init_cache("good")
                .unwrap_or_else(|e| panic!("round {round}: {e}"));
            cache.cleanup();
            cache
                .init_cache("good")
                .unwrap_or_else(|e| panic!("round {round} after cleanup: {e}"));
            assert!(cache.is_initialized());
        }
    }

    #[test]
    fn modules_can_import_each_other_by_name() {
        let cache = cache_with(&[
            ("helpers", "export const prefix = 'via helpers:';"),
            (
                "composed",
                "import { prefix } from 'helpers';\n\
                 export const render_chat_template = (r) => prefix + r;\n\
                 export const get_model_chat_template = (r) => r;",
            ),
        ]);
        cache.init_cache("composed").unwrap();

        let calls = crate::bridge::CallBridge::new(Arc::clone(&cache.runtime), EntryPointNames::default());
        assert_eq!(calls.call(Selector::Render, "x").unwrap(), "via helpers:x");
    }

    #[test]
    fn cleanup_is_repeatable() {
        let cache = cache_with(&[("good", GOOD)]);
        cache.init_cache("good").unwrap();

        cache.cleanup();
        cache.cleanup();
        assert!(!cache.is_initialized());
        assert!(cache.runtime.execution().cached().is_none());

        cache.init_cache("good").unwrap();
        assert!(cache.is_initialized());
    }
}
