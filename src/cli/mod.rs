//! cli
//!
//! Command-line interface for tierprops.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Install the tracing subscriber
//! - Resolve configuration into a [`StoreRegistry`]
//! - Delegate to command handlers
//!
//! # Architecture
//!
//! The CLI layer is thin. Handlers receive a [`Context`] holding the
//! registry and only call [`crate::store::PropertyStore`] operations.

pub mod args;
pub mod commands;

pub use args::{Cli, Shell};

use std::process::ExitCode;

use anyhow::{Context as _, Result};
use tracing_subscriber::EnvFilter;

use crate::core::config::Config;
use crate::core::types::ProcessName;
use crate::registry::{RegistrySettings, StoreRegistry};

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "TPROPS_LOG";

/// Shared state for command handlers.
#[derive(Debug)]
pub struct Context {
    /// Registry opening the stores named on the command line.
    pub registry: StoreRegistry,
    /// Suppress informational output.
    pub quiet: bool,
}

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`. The returned code is
/// `SUCCESS`, or `1` when a `get` found no value.
pub fn run() -> Result<ExitCode> {
    let cli = Cli::parse_args();
    init_tracing(cli.debug);

    if let args::Command::Completion { shell } = cli.command {
        commands::completion(shell)?;
        return Ok(ExitCode::SUCCESS);
    }

    let ctx = build_context(&cli)?;
    commands::dispatch(cli.command, &ctx)
}

/// Resolve configuration and global flags into a [`Context`].
pub fn build_context(cli: &Cli) -> Result<Context> {
    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(root) = &cli.root {
        config = config.with_root(root.clone());
    }
    if let Some(process) = &cli.process {
        let process = ProcessName::new(process.as_str()).context("Invalid --process")?;
        config = config.with_process(process);
    }

    let settings = RegistrySettings::from_config(&config).context("Failed to resolve configuration")?;
    tracing::debug!(
        config = ?config.loaded_from(),
        root = %settings.root.display(),
        process = %settings.process,
        "configuration resolved"
    );

    Ok(Context {
        registry: StoreRegistry::new(settings),
        quiet: cli.quiet,
    })
}

/// Install the stderr subscriber. `TPROPS_LOG` wins over `--debug`.
fn init_tracing(debug: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "warn" }));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
