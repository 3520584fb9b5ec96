//! set and unset commands - Apply changes in a single write

use anyhow::{Context as _, Result};

use super::open_store;
use crate::cli::Context;

/// Upsert `entries` in one coordinated write.
pub fn set(ctx: &Context, store_name: &str, entries: Vec<(String, String)>) -> Result<()> {
    let store = open_store(ctx, store_name)?;
    let count = entries.len();

    store
        .set_many(entries.into_iter().map(|(k, v)| (k, Some(v))))
        .with_context(|| format!("Failed to update store '{}'", store_name))?;

    if !ctx.quiet {
        println!("Set {} key(s) in '{}'", count, store_name);
    }
    Ok(())
}

/// Remove the stored values of `keys` in one coordinated write.
pub fn unset(ctx: &Context, store_name: &str, keys: Vec<String>) -> Result<()> {
    let store = open_store(ctx, store_name)?;
    let count = keys.len();

    store
        .set_many(keys.into_iter().map(|k| (k, None::<String>)))
        .with_context(|| format!("Failed to update store '{}'", store_name))?;

    if !ctx.quiet {
        println!("Unset {} key(s) in '{}'", count, store_name);
    }
    Ok(())
}
