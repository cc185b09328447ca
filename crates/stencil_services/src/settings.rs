//! Settings management
//!
//! Host settings come from an optional TOML file, then environment
//! overrides, then whatever the command line sets on top:
//!
//! ```toml
//! [bridge]
//! module = "chat_template"
//!
//! [bridge.modules]
//! search_paths = ["templates"]
//!
//! [bridge.runtime]
//! memory_limit = 67108864
//! fork_policy = "reinitialize"
//!
//! [logging]
//! filter = "stencil=debug"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use stencil_core::BridgeConfig;
use thiserror::Error;

/// Overrides `bridge.module`.
pub const MODULE_ENV: &str = "STENCIL_MODULE";
/// Prepended to `bridge.modules.search_paths`, in platform path-list syntax.
pub const MODULE_PATH_ENV: &str = "STENCIL_MODULE_PATH";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings from {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to initialize logging: {0}")]
    Logging(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bridge: BridgeConfig,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directives.
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    ///
    /// Relative module search paths are taken relative to the file's
    /// directory.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut settings = Self::from_toml_str(&text)?;

        if let Some(base) = path.parent() {
            for dir in &mut settings.bridge.modules.search_paths {
                if dir.is_relative() {
                    *dir = base.join(&*dir);
                }
            }
        }
        tracing::debug!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `STENCIL_MODULE` and `STENCIL_MODULE_PATH` from the process
    /// environment.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var_os(key));
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<std::ffi::OsString>) {
        if let Some(module) = var(MODULE_ENV).and_then(|v| v.into_string().ok()) {
            if !module.is_empty() {
                self.bridge.module = module;
            }
        }

        if let Some(paths) = var(MODULE_PATH_ENV) {
            let mut search_paths: Vec<PathBuf> = std::env::split_paths(&paths)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
            search_paths.append(&mut self.bridge.modules.search_paths);
            self.bridge.modules.search_paths = search_paths;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::ffi::OsString;
    use stencil_core::{ForkPolicy, DEFAULT_MODULE};

    #[test]
    fn empty_document_gives_defaults() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.bridge.module, DEFAULT_MODULE);
        assert_eq!(settings.logging.filter, "info");
    }

    #[test]
    fn parses_nested_sections() {
        let settings = Settings::from_toml_str(
            r#"
            [bridge]
            module = "templates"

            [bridge.entry_points]
            render = "render"

            [bridge.runtime]
            memory_limit = 1048576
            fork_policy = "reinitialize"

            [logging]
            filter = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(settings.bridge.module, "templates");
        assert_eq!(settings.bridge.entry_points.render, "render");
        assert_eq!(settings.bridge.entry_points.lookup, "get_model_chat_template");
        assert_eq!(settings.bridge.runtime.memory_limit, Some(1_048_576));
        assert_eq!(settings.bridge.runtime.fork_policy, ForkPolicy::Reinitialize);
        assert_eq!(settings.logging.filter, "debug");
    }

    #[test]
    fn rejects_bad_types() {
        let err = Settings::from_toml_str("[bridge]\nmodule = 3").unwrap_err();
        assert!(matches!(err, SettingsError::Parse(_)));
    }

    #[test]
    fn load_resolves_relative_search_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stencil.toml");
        std::fs::write(
            &path,
            "[bridge.modules]\nsearch_paths = [\"templates\", \"/opt/shared\"]\n",
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(
            settings.bridge.modules.search_paths,
            vec![dir.path().join("templates"), PathBuf::from("/opt/shared")]
        );
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Settings::load(Path::new("/no/such/stencil.toml")).unwrap_err();
        assert!(matches!(err, SettingsError::Read { .. }));
        assert!(err.to_string().contains("/no/such/stencil.toml"));
    }

    #[test]
    fn environment_overrides_module_and_prepends_paths() {
        let mut settings = Settings::default();
        settings.bridge.modules.search_paths.push(PathBuf::from("/from/file"));

        let joined = std::env::join_paths(["/env/a", "/env/b"]).unwrap();
        let vars: HashMap<&str, OsString> = HashMap::from([
            (MODULE_ENV, OsString::from("custom")),
            (MODULE_PATH_ENV, joined),
        ]);
        settings.apply_vars(|key| vars.get(key).cloned());

        assert_eq!(settings.bridge.module, "custom");
        assert_eq!(
            settings.bridge.modules.search_paths,
            vec![
                PathBuf::from("/env/a"),
                PathBuf::from("/env/b"),
                PathBuf::from("/from/file")
            ]
        );
    }

    #[test]
    fn empty_module_variable_is_ignored() {
        let mut settings = Settings::default();
        settings.apply_vars(|key| (key == MODULE_ENV).then(OsString::new));
        assert_eq!(settings.bridge.module, DEFAULT_MODULE);
    }
}
