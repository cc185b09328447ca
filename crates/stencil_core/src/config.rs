//! Bridge configuration
//!
//! Plain serde types so the services layer can embed them in its settings
//! file and tests can build them inline.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::selector::Selector;

/// Module the bridge imports when no other name is requested.
pub const DEFAULT_MODULE: &str = "chat_template";

/// Everything needed to start the runtime and populate the entry point cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Module imported by `initialize_cache` and `reinitialize`.
    pub module: String,
    pub entry_points: EntryPointNames,
    pub modules: ModuleSource,
    pub runtime: RuntimeOptions,
}

impl BridgeConfig {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            ..Self::default()
        }
    }

    pub fn with_inline_module(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.modules.inline.insert(name.into(), source.into());
        self
    }

    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.modules.search_paths.push(path.into());
        self
    }

    pub fn with_entry_points(mut self, entry_points: EntryPointNames) -> Self {
        self.entry_points = entry_points;
        self
    }

    pub fn with_runtime(mut self, runtime: RuntimeOptions) -> Self {
        self.runtime = runtime;
        self
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            module: DEFAULT_MODULE.to_string(),
            entry_points: EntryPointNames::default(),
            modules: ModuleSource::default(),
            runtime: RuntimeOptions::default(),
        }
    }
}

/// Exported function names resolved from the module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryPointNames {
    pub render: String,
    pub lookup: String,
    /// Cache-reset hook; an empty name disables it.
    pub maintenance: Option<String>,
}

impl EntryPointNames {
    pub fn name(&self, selector: Selector) -> &str {
        match selector {
            Selector::Render => &self.render,
            Selector::Lookup => &self.lookup,
        }
    }

    pub fn maintenance(&self) -> Option<&str> {
        self.maintenance.as_deref().filter(|name| !name.is_empty())
    }
}

impl Default for EntryPointNames {
    fn default() -> Self {
        Self {
            render: "render_chat_template".to_string(),
            lookup: "get_model_chat_template".to_string(),
            maintenance: Some("clear_caches".to_string()),
        }
    }
}

/// Where module sources come from.
///
/// Inline modules win over files with the same name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleSource {
    /// Directories searched for `<name>.js`.
    pub search_paths: Vec<PathBuf>,
    /// Module name -> source text.
    pub inline: BTreeMap<String, String>,
}

impl ModuleSource {
    pub fn is_empty(&self) -> bool {
        self.search_paths.is_empty() && self.inline.is_empty()
    }
}

/// Knobs applied when the runtime is first started.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeOptions {
    /// Heap limit in bytes.
    pub memory_limit: Option<usize>,
    /// Native stack limit in bytes.
    pub max_stack_size: Option<usize>,
    /// Allocation volume (bytes) between GC runs.
    pub gc_threshold: Option<usize>,
    pub fork_policy: ForkPolicy,
}

/// What `initialize` does when the runtime was set up by a different pid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForkPolicy {
    /// Log a warning and keep the inherited state.
    #[default]
    Warn,
    /// Drop cached handles and adopt the runtime for the current pid.
    Reinitialize,
}
