//! Command-line interface for pyfleet.
//!
//! `pyfleet pyenv <name> [action]` and `pyfleet ikaaro <name> [action]` run an
//! action, or list the actions available for the entity's target when no
//! action is given. `pyfleet config` shows the loaded registry.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::adapters::{HttpProber, SystemConnector};
use crate::config::{self, paths, Registry, RunOptions};
use crate::core::{ActionStatus, EntityKind, Orchestrator, RunContext};

/// pyfleet - Deploy Python environments and ikaaro instances
#[derive(Parser, Debug)]
#[command(name = "pyfleet")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (overrides discovery)
    #[arg(short, long, global = true, env = "PYFLEET_CONFIG")]
    pub config: Option<PathBuf>,

    /// Never contact remote hosts
    #[arg(long, global = true)]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Act on a Python environment
    Pyenv {
        /// Section name
        name: String,

        /// Action to run (lists the available actions if omitted)
        action: Option<String>,
    },

    /// Act on an ikaaro instance
    Ikaaro {
        /// Section name
        name: String,

        /// Action to run (lists the available actions if omitted)
        action: Option<String>,
    },

    /// Show the loaded configuration
    Config {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let registry = config::load_registry(self.config.as_deref())?;
        let options = RunOptions {
            offline: self.offline,
        };

        match self.command {
            Commands::Pyenv { name, action } => {
                run_entity(&registry, options, EntityKind::PyEnv, &name, action.as_deref()).await
            }
            Commands::Ikaaro { name, action } => {
                run_entity(&registry, options, EntityKind::Ikaaro, &name, action.as_deref()).await
            }
            Commands::Config { json } => show_config(&registry, json),
        }
    }
}

/// Run an action, or list the available ones
async fn run_entity(
    registry: &Registry,
    options: RunOptions,
    kind: EntityKind,
    name: &str,
    action: Option<&str>,
) -> Result<()> {
    let connector = SystemConnector;
    let prober = HttpProber::new();
    let cache_dir = paths::cache_dir()?;
    let ctx = RunContext::new(registry, &connector, &prober, cache_dir).with_options(options);
    let orchestrator = Orchestrator::new(ctx);

    let Some(action) = action else {
        let actions = orchestrator
            .actions(kind, name)
            .with_context(|| format!("Failed to list actions of {} '{}'", kind, name))?;
        println!("Available actions for {} '{}':", kind, name);
        let width = actions.iter().map(|a| a.name.len()).max().unwrap_or(0);
        for info in actions {
            println!("  {:width$}  {}", info.name, info.title, width = width);
        }
        return Ok(());
    };

    let status = orchestrator
        .run(kind, name, action)
        .await
        .with_context(|| format!("{} '{}': action '{}' failed", kind, name, action))?;

    if status == ActionStatus::Unavailable {
        eprintln!(
            "Action '{}' is not available for {} '{}' on this target",
            action, kind, name
        );
    }
    Ok(())
}

/// Print the registry, section by section
fn show_config(registry: &Registry, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(registry).context("Failed to serialize configuration")?
        );
        return Ok(());
    }

    println!(
        "Config file: {}",
        registry
            .source()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none)".to_string())
    );
    println!("Cache:       {}", paths::cache_dir()?.display());

    for section in registry.sections() {
        println!();
        println!("[{} {}]", section.kind, section.name);
        for (key, value) in &section.options {
            println!("  {} = {}", key, value);
        }
    }

    Ok(())
}
