//! Stencil Scripting Bridge
//!
//! Drives template logic that lives in an embedded QuickJS runtime.
//!
//! ## Architecture
//!
//! - **Lifecycle:** [`ScriptRuntime`] starts the runtime once per process and
//!   keeps it resident; finalize/reinitialize only reset the layers above it.
//! - **Cache:** [`EntryPointCache`] evaluates one module and retains its render
//!   and lookup exports, all-or-nothing.
//! - **Calls:** [`CallBridge`] passes one string in and copies one string out
//!   while holding the execution lock.
//! - **Host:** [`Bridge`] exposes the host-facing operations; [`install`] and
//!   [`global`] manage the process-wide instance.
//!
//! ```ignore
//! use stencil_core::BridgeConfig;
//!
//! let bridge = stencil_script::install(BridgeConfig::default().with_search_path("templates"));
//! bridge.initialize()?;
//! let rendered = bridge.render(r#"{"messages":[{"role":"user","content":"Hi"}]}"#)?;
//! ```

pub mod bridge;
pub mod cache;
pub mod ffi;
pub mod host;
pub mod loader;
mod lock;
pub mod runtime;

pub use bridge::CallBridge;
pub use cache::{CachedModule, EntryPointCache};
pub use host::{global, install, Bridge};
pub use loader::ModuleCatalog;
pub use runtime::ScriptRuntime;

pub use rquickjs;
