//! Stencil Core
//!
//! Shared vocabulary for the template bridge:
//! - Error taxonomy surfaced by every bridge operation
//! - Process-wide runtime state (init flags + owning pid)
//! - Entry point selectors
//! - Configuration types

pub mod config;
pub mod error;
pub mod selector;
pub mod state;

pub use config::{BridgeConfig, DEFAULT_MODULE, EntryPointNames, ForkPolicy, ModuleSource, RuntimeOptions};
pub use error::{BridgeError, ErrorKind, Result};
pub use selector::Selector;
pub use state::{ProcessRuntimeState, StateSnapshot};

/// Bridge version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
