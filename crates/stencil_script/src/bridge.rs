//! Call bridge
//!
//! Marshals one text argument into a cached entry point and copies the text
//! result back out, all under the execution lock.

use std::sync::Arc;

use rquickjs::Value;
use stencil_core::{BridgeError, EntryPointNames, Result, Selector};

use crate::ffi;
use crate::runtime::ScriptRuntime;

pub struct CallBridge {
    runtime: Arc<ScriptRuntime>,
    names: EntryPointNames,
}

impl CallBridge {
    pub fn new(runtime: Arc<ScriptRuntime>, names: EntryPointNames) -> Self {
        Self { runtime, names }
    }

    /// Invoke the entry point behind `selector` with `request`.
    ///
    /// This is a single attempt: a failure is reported and returned, never
    /// retried. The calling thread blocks until the lock is free and the
    /// script returns; there is no timeout and no way to cancel.
    pub fn call<'a>(&self, selector: Selector, request: impl Into<Option<&'a str>>) -> Result<String> {
        self.invoke(selector, request.into()).inspect_err(|e| {
            tracing::error!(
                %selector,
                entry_point = self.names.name(selector),
                kind = ?e.kind(),
                error = %e,
                "Call failed"
            );
        })
    }

    fn invoke(&self, selector: Selector, request: Option<&str>) -> Result<String> {
        let request = request.ok_or(BridgeError::MissingInput)?;
        if request.is_empty() {
            return Err(BridgeError::EmptyInput);
        }

        let engine = self.runtime.engine()?;
        if !self.runtime.state().is_cache_initialized() {
            return Err(BridgeError::CacheNotInitialized);
        }

        let entry_point = self.names.name(selector);
        let guard = self.runtime.execution();
        // A cleanup may have run between the flag check and taking the lock.
        if !self.runtime.state().is_cache_initialized() {
            return Err(BridgeError::CacheNotInitialized);
        }
        let cached = guard.cached().ok_or(BridgeError::CacheSlotEmpty)?;

        let response = engine.context.with(|ctx| {
            let function = cached.restore_entry_point(&ctx, selector).map_err(|e| BridgeError::StaleHandle {
                entry_point: entry_point.to_string(),
                reason: e.to_string(),
            })?;
            let argument = ffi::encode_text(&ctx, request)?;
            let value: Value = function.call((argument,)).map_err(|e| BridgeError::Raised {
                entry_point: entry_point.to_string(),
                reason: ffi::describe_error(&ctx, e),
            })?;
            ffi::decode_text(entry_point, value)
        })?;
        drop(guard);

        tracing::debug!(
            %selector,
            entry_point,
            request_bytes = request.len(),
            response_bytes = response.len(),
            "Call completed"
        );
        Ok(response)
    }
}
