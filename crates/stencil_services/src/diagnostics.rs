//! Log output

use tracing_subscriber::EnvFilter;

use crate::settings::{LoggingSettings, SettingsError};

/// Environment variable that overrides the configured filter.
pub const LOG_ENV: &str = "STENCIL_LOG";

/// Install the global `tracing` subscriber, writing to stderr.
///
/// `STENCIL_LOG` wins over `settings.filter` when set. Fails if the filter
/// does not parse or a subscriber is already installed.
pub fn init_logging(settings: &LoggingSettings) -> Result<(), SettingsError> {
    let filter = build_filter(std::env::var(LOG_ENV).ok().as_deref(), &settings.filter)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| SettingsError::Logging(e.to_string()))
}

fn build_filter(from_env: Option<&str>, configured: &str) -> Result<EnvFilter, SettingsError> {
    let directives = from_env.filter(|s| !s.trim().is_empty()).unwrap_or(configured);
    EnvFilter::try_new(directives).map_err(|e| SettingsError::Logging(format!("invalid log filter '{directives}': {e}")))
}
