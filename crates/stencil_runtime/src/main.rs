//! Stencil Runtime
//!
//! Command line host for the template bridge: loads settings, boots the
//! embedded runtime once and forwards a single request to it.

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use stencil_core::Selector;
use stencil_script::Bridge;
use stencil_services::Settings;

#[derive(Parser)]
#[command(name = "stencil", version, about = "Render chat templates through an embedded script runtime")]
struct Cli {
    /// Settings file (TOML)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Module exporting the entry points
    #[arg(long)]
    module: Option<String>,

    /// Extra directory to load script modules from; searched before configured paths
    #[arg(long = "module-path")]
    module_paths: Vec<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a chat from a JSON request
    Render {
        /// Read the request from a file instead of stdin
        #[arg(long, short)]
        input: Option<PathBuf>,
    },
    /// Look up a model's chat template from a JSON request
    Lookup {
        #[arg(long, short)]
        input: Option<PathBuf>,
    },
    /// Run the module's maintenance entry point
    ClearCaches,
    /// Print the lifecycle state as JSON
    Status,
    /// Evaluate a script snippet in the runtime
    Eval { source: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    settings.apply_env();
    if let Some(module) = &cli.module {
        settings.bridge.module = module.clone();
    }
    if !cli.module_paths.is_empty() {
        let mut search_paths = cli.module_paths.clone();
        search_paths.append(&mut settings.bridge.modules.search_paths);
        settings.bridge.modules.search_paths = search_paths;
    }

    stencil_services::init_services(&settings)?;

    let bridge = stencil_script::install(settings.bridge);
    bridge
        .initialize()
        .with_context(|| format!("failed to initialize module '{}'", bridge.config().module))?;
    tracing::debug!(state = ?bridge.state(), "Bridge ready");

    let outcome = run(bridge, cli.command);
    bridge.finalize();

    println!("{}", outcome?);
    Ok(())
}

fn run(bridge: &Bridge, command: Command) -> Result<String> {
    let output = match command {
        Command::Render { input } => bridge.call(Selector::Render, read_request(input)?.as_str())?,
        Command::Lookup { input } => bridge.call(Selector::Lookup, read_request(input)?.as_str())?,
        Command::ClearCaches => bridge.clear_caches()?,
        Command::Status => serde_json::to_string_pretty(&bridge.state())?,
        Command::Eval { source } => bridge.runtime().evaluate(&source)?,
    };
    Ok(output)
}

fn read_request(input: Option<PathBuf>) -> Result<String> {
    match input {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read request from {}", path.display())),
        None => {
            let mut request = String::new();
            std::io::stdin()
                .read_to_string(&mut request)
                .context("failed to read request from stdin")?;
            Ok(request)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_global_overrides() {
        let cli = Cli::try_parse_from([
            "stencil",
            "--module",
            "custom",
            "--module-path",
            "/a",
            "--module-path",
            "/b",
            "render",
            "--input",
            "req.json",
        ])
        .unwrap();

        assert_eq!(cli.module.as_deref(), Some("custom"));
        assert_eq!(cli.module_paths, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        assert!(matches!(cli.command, Command::Render { input: Some(ref p) } if p == &PathBuf::from("req.json")));
    }

    #[test]
    fn parses_maintenance_subcommands() {
        let cli = Cli::try_parse_from(["stencil", "clear-caches"]).unwrap();
        assert!(matches!(cli.command, Command::ClearCaches));

        let cli = Cli::try_parse_from(["stencil", "eval", "1 + 1"]).unwrap();
        assert!(matches!(cli.command, Command::Eval { ref source } if source == "1 + 1"));
    }

    #[test]
    fn run_dispatches_to_bridge() {
        let config = stencil_core::BridgeConfig::new("cli_test").with_inline_module(
            "cli_test",
            "export const render_chat_template = (r) => 'R' + r; \
             export const get_model_chat_template = (r) => 'L' + r; \
             export const clear_caches = () => 'done';",
        );
        let bridge = Bridge::new(config);
        bridge.initialize().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let request = dir.path().join("request.json");
        std::fs::write(&request, "x").unwrap();

        let render = run(&bridge, Command::Render { input: Some(request.clone()) }).unwrap();
        assert_eq!(render, "Rx");
        let lookup = run(&bridge, Command::Lookup { input: Some(request) }).unwrap();
        assert_eq!(lookup, "Lx");
        assert_eq!(run(&bridge, Command::ClearCaches).unwrap(), "done");
        assert_eq!(run(&bridge, Command::Eval { source: "6 * 7".into() }).unwrap(), "42");
        assert!(run(&bridge, Command::Status).unwrap().contains("\"cache_initialized\": true"));
    }
}
