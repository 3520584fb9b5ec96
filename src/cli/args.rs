//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--config <path>`: Configuration file to load
//! - `--root <dir>`: Store root, overriding the configuration
//! - `--process <name>`: Process name used for secure tier ownership
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Minimal output

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::core::types::Tier;

/// tprops - Inspect and edit tiered property stores
#[derive(Parser, Debug)]
#[command(name = "tprops")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to $TPROPS_CONFIG, then the user config dir)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory holding the stores
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Act as this process when checking secure tier ownership
    #[arg(long, global = true, value_name = "NAME")]
    pub process: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the value of a key
    #[command(
        long_about = "Print the effective value of a key.\n\n\
            The stored value wins; otherwise the tier default is printed. \
            Exits with status 1 when the key has neither.",
        after_help = "\
EXAMPLES:
    tprops get main first_launch
    tprops get main first_launch --bool
    tprops get main retries --int"
    )]
    Get {
        /// Store name
        store: String,

        /// Key to read
        key: String,

        /// Print the value as a boolean; non-boolean values count as absent
        #[arg(long = "bool", conflicts_with = "as_int")]
        as_bool: bool,

        /// Print the value as an integer; non-integer values count as absent
        #[arg(long = "int")]
        as_int: bool,
    },

    /// Set one or more keys in a single write
    #[command(after_help = "\
EXAMPLES:
    tprops set main first_launch=false
    tprops set main server_url=https://example.com retries=5")]
    Set {
        /// Store name
        store: String,

        /// Entries to upsert
        #[arg(required = true, value_name = "KEY=VALUE", value_parser = parse_assignment)]
        entries: Vec<(String, String)>,
    },

    /// Remove stored values so defaults apply again
    Unset {
        /// Store name
        store: String,

        /// Keys to remove
        #[arg(required = true, value_name = "KEY")]
        keys: Vec<String>,
    },

    /// List effective values by tier
    #[command(
        long_about = "List effective values (defaults overlaid with stored values).\n\n\
            Without --tier every readable tier is listed; the secure tier is \
            skipped unless this process owns it."
    )]
    List {
        /// Store name
        store: String,

        /// Only list this tier (shared, device, secure)
        #[arg(long)]
        tier: Option<Tier>,

        /// Emit JSON
        #[arg(long)]
        json: bool,
    },

    /// Announce an out-of-band change so every process reloads
    #[command(
        long_about = "Bump the store revision and reload all tiers.\n\n\
            Run this after replacing a tier file by other means (for example a \
            sync agent delivering the shared tier)."
    )]
    Signal {
        /// Store name
        store: String,
    },

    /// Delete the device and secure tiers
    Clear {
        /// Store name
        store: String,
    },

    /// Print the current revision
    Revision {
        /// Store name
        store: String,
    },

    /// Print the installation identifier (secure owner only)
    InstallationId {
        /// Store name
        store: String,
    },

    /// Generate shell completion scripts
    #[command(after_help = "\
EXAMPLES:
    # Bash
    tprops completion bash > /etc/bash_completion.d/tprops

    # Zsh
    tprops completion zsh > \"${fpath[1]}/_tprops\"")]
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completion
#[derive(clap::ValueEnum, Debug, Clone, Copy)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

/// Parse a `KEY=VALUE` argument. The value may be empty or contain `=`.
fn parse_assignment(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        Some(_) => Err("key must not be empty".to_string()),
        None => Err(format!("expected KEY=VALUE, got '{}'", arg)),
    }
}
