//! Module resolution for the embedded runtime
//!
//! Module sources are collected once, when the runtime starts: inline
//! modules from configuration first, then every `.js`/`.mjs` file found
//! directly under each search path. Earlier entries shadow later ones.
//! Modules are addressed by bare name (`chat_template`, not
//! `./chat_template.js`), including imports between modules.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use rquickjs::loader::{BuiltinLoader, BuiltinResolver};
use stencil_core::{BridgeError, ModuleSource, Result};

const MODULE_EXTENSIONS: [&str; 2] = ["js", "mjs"];

/// Snapshot of every module the runtime can import.
#[derive(Debug, Default)]
pub struct ModuleCatalog {
    modules: BTreeMap<String, String>,
}

impl ModuleCatalog {
    pub fn collect(source: &ModuleSource) -> Result<Self> {
        let mut modules = source.inline.clone();

        for dir in &source.search_paths {
            scan_dir(dir, &mut modules)?;
        }

        tracing::debug!(count = modules.len(), "Module catalog collected");
        Ok(Self { modules })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    pub fn source(&self, name: &str) -> Option<&str> {
        self.modules.get(name).map(String::as_str)
    }

    /// Build the resolver/loader pair installed on the runtime, used for
    /// imports made by scripts themselves.
    pub(crate) fn loader(&self) -> (BuiltinResolver, BuiltinLoader) {
        self.modules.iter().fold(
            (BuiltinResolver::default(), BuiltinLoader::default()),
            |(resolver, loader), (name, source)| {
                (resolver.with_module(name.as_str()), loader.with_module(name.as_str(), source.as_str()))
            },
        )
    }
}

fn scan_dir(dir: &Path, modules: &mut BTreeMap<String, String>) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|e| {
        BridgeError::RuntimeStart(format!("cannot read module path {}: {e}", dir.display()))
    })?;

    for entry in entries {
        let path = entry
            .map_err(|e| BridgeError::RuntimeStart(format!("{}: {e}", dir.display())))?
            .path();

        let is_module = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| MODULE_EXTENSIONS.contains(&ext));
        if !is_module || !path.is_file() {
            continue;
        }

        let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
            tracing::warn!(path = %path.display(), "Skipping module with non UTF-8 name");
            continue;
        };
        if modules.contains_key(name) {
            tracing::debug!(module = name, path = %path.display(), "Module shadowed by earlier source");
            continue;
        }

        let source = fs::read_to_string(&path).map_err(|e| {
            BridgeError::RuntimeStart(format!("cannot read module {}: {e}", path.display()))
        })?;
        modules.insert(name.to_string(), source);
    }

    Ok(())
}
