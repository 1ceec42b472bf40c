//! Shimload CLI - plan shim loads against a host profile.
//!
//! The CLI runs the orchestrator offline: it fetches payloads, analyzes
//! them, and prints which capabilities a host described by a list of
//! globals would need, in load and activation order. Nothing is executed.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};

mod commands;
mod config_bridge;
mod profile;
mod theme;

use commands::{catalog, config, plan};

/// Shimload - feature-detecting shim loader
#[derive(Parser)]
#[command(name = "shimload")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Pretty)]
    format: OutputFormat,

    /// Use this config file on top of the defaults instead of the discovered layers
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// How command results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Human-readable
    Pretty,
    /// Machine-readable JSON
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute which capabilities a run would load
    Plan(PlanArgs),

    /// List the built-in capabilities and whether the profile needs them
    Catalog {
        /// Global path the host provides natively (repeatable)
        #[arg(short, long = "global")]
        globals: Vec<String>,
    },

    /// View and check configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Arguments of `shimload plan`.
#[derive(Args, Debug, Default)]
pub(crate) struct PlanArgs {
    /// Payload to analyze and execute (URL or local file, repeatable)
    #[arg(short, long = "execute")]
    pub(crate) execute: Vec<String>,

    /// Payload to analyze only (repeatable)
    #[arg(short, long = "analyze-only")]
    pub(crate) analyze_only: Vec<String>,

    /// Load this capability whenever the host lacks it (repeatable)
    #[arg(long = "always")]
    pub(crate) always: Vec<String>,

    /// Never load this capability on the strength of analysis (repeatable)
    #[arg(long = "never")]
    pub(crate) never: Vec<String>,

    /// Skip payload analysis
    #[arg(long)]
    pub(crate) no_analyze: bool,

    /// Base URL for relative locators
    #[arg(long, env = "SHIMLOAD_BASE_URL")]
    pub(crate) base_url: Option<String>,

    /// Global path the host provides natively (repeatable)
    #[arg(short, long = "global")]
    pub(crate) globals: Vec<String>,

    /// Read run options from a TOML or JSON file
    #[arg(long)]
    pub(crate) options: Option<PathBuf>,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the resolved configuration with source annotations
    Show {
        /// toml or json
        #[arg(short, long, default_value = "toml")]
        format: String,
        /// Only this section
        #[arg(short, long)]
        section: Option<String>,
    },
    /// Validate the configuration
    Validate,
    /// List the files and variables consulted
    Paths,
}

/// Resolve the configuration `plan` and `catalog` run against.
fn load_config(explicit: Option<&Path>) -> shimload_config::ConfigResult<shimload_config::Config> {
    match explicit {
        Some(path) => shimload_config::loader::load_file(path),
        None => {
            let workspace_root = std::env::current_dir().ok();
            shimload_config::Config::load(workspace_root.as_deref()).map(|resolved| resolved.config)
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = load_config(cli.config.as_deref());

    let logging = match &loaded {
        Ok(config) => {
            let mut log_config = config_bridge::to_log_config(config);
            if cli.verbose {
                "debug".clone_into(&mut log_config.level);
            }
            shimload_telemetry::setup_logging(&log_config)
        },
        Err(_) if cli.verbose => {
            shimload_telemetry::setup_logging(&shimload_telemetry::LogConfig::new("debug"))
        },
        Err(_) => shimload_telemetry::setup_default_logging(),
    };
    if let Err(e) = logging {
        eprintln!("Failed to initialize logging: {e}");
    }

    match cli.command {
        Commands::Config { command } => match command {
            ConfigCommands::Show { format, section } => {
                config::show_config(&format, section.as_deref())?;
            },
            ConfigCommands::Validate => config::validate_config()?,
            ConfigCommands::Paths => config::show_paths()?,
        },
        Commands::Plan(args) => {
            plan::run_plan(args, &loaded?, cli.format).await?;
        },
        Commands::Catalog { globals } => {
            catalog::show_catalog(&loaded?, &globals, cli.format)?;
        },
    }

    Ok(())
}
