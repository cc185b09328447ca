//! Stencil Services Layer
//!
//! Host-side plumbing around the bridge: settings files, environment
//! overrides and log output.

pub mod diagnostics;
pub mod settings;

pub use diagnostics::init_logging;
pub use settings::{LoggingSettings, Settings, SettingsError};

/// Bring up logging for a host process.
///
/// Call once, before the bridge is installed.
pub fn init_services(settings: &Settings) -> Result<(), SettingsError> {
    init_logging(&settings.logging)?;
    tracing::info!(
        version = stencil_core::VERSION,
        module = %settings.bridge.module,
        "Services initialized"
    );
    Ok(())
}
