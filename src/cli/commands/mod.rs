//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Opens the named store through the registry
//! 2. Calls one store operation
//! 3. Formats and displays output
//!
//! Values go to stdout; diagnostics go to stderr through tracing.

mod completion;
mod maintenance;
mod read;
mod write;

pub use completion::completion;
pub use maintenance::{clear, installation_id, revision, signal};
pub use read::{get, list, GetFormat};
pub use write::{set, unset};

use std::process::ExitCode;

use anyhow::{Context as _, Result};
use std::sync::Arc;

use super::args::Command;
use super::Context;
use crate::store::PropertyStore;

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<ExitCode> {
    let done = |result: Result<()>| result.map(|()| ExitCode::SUCCESS);

    match command {
        Command::Get {
            store,
            key,
            as_bool,
            as_int,
        } => {
            let format = if as_bool {
                GetFormat::Bool
            } else if as_int {
                GetFormat::Integer
            } else {
                GetFormat::Raw
            };
            read::get(ctx, &store, &key, format)
        }
        Command::Set { store, entries } => done(write::set(ctx, &store, entries)),
        Command::Unset { store, keys } => done(write::unset(ctx, &store, keys)),
        Command::List { store, tier, json } => done(read::list(ctx, &store, tier, json)),
        Command::Signal { store } => done(maintenance::signal(ctx, &store)),
        Command::Clear { store } => done(maintenance::clear(ctx, &store)),
        Command::Revision { store } => done(maintenance::revision(ctx, &store)),
        Command::InstallationId { store } => done(maintenance::installation_id(ctx, &store)),
        Command::Completion { shell } => done(completion::completion(shell)),
    }
}

/// Open `name` through the registry.
fn open_store(ctx: &Context, name: &str) -> Result<Arc<PropertyStore>> {
    ctx.registry
        .get_store(name)
        .with_context(|| format!("Failed to open store '{}'", name))
}
