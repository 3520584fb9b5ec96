//! signal, clear, revision and installation-id commands

use anyhow::{Context as _, Result};

use super::open_store;
use crate::cli::Context;

/// Bump the revision so every process reloads.
pub fn signal(ctx: &Context, store_name: &str) -> Result<()> {
    let store = open_store(ctx, store_name)?;
    store
        .signal_external_change()
        .with_context(|| format!("Failed to signal store '{}'", store_name))?;

    if !ctx.quiet {
        println!("Signalled '{}' (revision {})", store_name, store.revision()?);
    }
    Ok(())
}

/// Delete the device and secure tiers.
pub fn clear(ctx: &Context, store_name: &str) -> Result<()> {
    let store = open_store(ctx, store_name)?;
    store
        .clear()
        .with_context(|| format!("Failed to clear store '{}'", store_name))?;

    if !ctx.quiet {
        if store.has_secure_access() {
            println!("Cleared device and secure tiers of '{}'", store_name);
        } else {
            println!("Cleared device tier of '{}'", store_name);
        }
    }
    Ok(())
}

/// Print the current revision.
pub fn revision(ctx: &Context, store_name: &str) -> Result<()> {
    let store = open_store(ctx, store_name)?;
    println!("{}", store.revision()?);
    Ok(())
}

/// Print the installation identifier.
pub fn installation_id(ctx: &Context, store_name: &str) -> Result<()> {
    let store = open_store(ctx, store_name)?;
    let id = store
        .installation_id()
        .with_context(|| format!("Failed to read installation id of '{}'", store_name))?;
    println!("{}", id);
    Ok(())
}
