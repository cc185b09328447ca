//! Error taxonomy shared by every bridge operation

use thiserror::Error;

/// Result alias used across the bridge crates.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Coarse classification of a [`BridgeError`].
///
/// Hosts usually only need the kind to pick a recovery path: retry the call,
/// `cleanup` + `initialize_cache`, or a full `reinitialize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The runtime or the entry point cache is not ready.
    Initialization,
    /// The request text was absent or empty.
    Validation,
    /// Text could not cross the host/runtime boundary.
    Marshal,
    /// The entry point ran but produced no usable result.
    Invocation,
    /// A cached handle is no longer usable.
    State,
}

/// Errors produced by the runtime lifecycle, the entry point cache and the
/// call bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("embedded runtime is not initialized")]
    RuntimeNotInitialized,

    #[error("entry point cache is not initialized")]
    CacheNotInitialized,

    #[error("failed to start embedded runtime: {0}")]
    RuntimeStart(String),

    #[error("failed to import module '{module}': {reason}")]
    ModuleImport { module: String, reason: String },

    #[error("module '{module}' does not export entry point '{name}'")]
    EntryPointMissing { module: String, name: String },

    #[error("entry point '{name}' in module '{module}' is not invocable")]
    NotInvocable { module: String, name: String },

    #[error("request text is missing")]
    MissingInput,

    #[error("request text is empty")]
    EmptyInput,

    #[error("failed to encode request text: {0}")]
    Encode(String),

    #[error("failed to decode result of '{entry_point}': {reason}")]
    Decode { entry_point: String, reason: String },

    #[error("entry point '{entry_point}' raised: {reason}")]
    Raised { entry_point: String, reason: String },

    #[error("entry point '{entry_point}' returned no result")]
    NoResult { entry_point: String },

    #[error("maintenance entry point unavailable: {0}")]
    MaintenanceUnavailable(String),

    #[error("cached handle for '{entry_point}' is no longer usable: {reason}")]
    StaleHandle { entry_point: String, reason: String },

    #[error("cache is marked initialized but holds no handles")]
    CacheSlotEmpty,
}

impl BridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::RuntimeNotInitialized
            | BridgeError::CacheNotInitialized
            | BridgeError::RuntimeStart(_)
            | BridgeError::ModuleImport { .. }
            | BridgeError::EntryPointMissing { .. }
            | BridgeError::NotInvocable { .. } => ErrorKind::Initialization,
            BridgeError::MissingInput | BridgeError::EmptyInput => ErrorKind::Validation,
            BridgeError::Encode(_) | BridgeError::Decode { .. } => ErrorKind::Marshal,
            BridgeError::Raised { .. }
            | BridgeError::NoResult { .. }
            | BridgeError::MaintenanceUnavailable(_) => ErrorKind::Invocation,
            BridgeError::StaleHandle { .. } | BridgeError::CacheSlotEmpty => ErrorKind::State,
        }
    }
}
