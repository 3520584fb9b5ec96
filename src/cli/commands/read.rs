//! get and list commands - Print effective values

use std::collections::BTreeMap;
use std::process::ExitCode;

use anyhow::{Context as _, Result};

use super::open_store;
use crate::cli::Context;
use crate::core::types::Tier;
use crate::store::PropertyMap;

/// How `get` interprets the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetFormat {
    /// Print the string as stored.
    Raw,
    /// Print `true` or `false`; anything else counts as absent.
    Bool,
    /// Print a signed integer; anything else counts as absent.
    Integer,
}

/// Print the value of `key`. Exit code 1 when absent.
pub fn get(ctx: &Context, store: &str, key: &str, format: GetFormat) -> Result<ExitCode> {
    let store = open_store(ctx, store)?;
    let read = || format!("Failed to read '{}'", key);

    let value = match format {
        GetFormat::Raw => store.get(key).with_context(read)?,
        GetFormat::Bool => store.get_bool(key).with_context(read)?.map(|b| b.to_string()),
        GetFormat::Integer => store
            .get_integer(key)
            .with_context(read)?
            .map(|n| n.to_string()),
    };

    match value {
        Some(value) => {
            println!("{}", value);
            Ok(ExitCode::SUCCESS)
        }
        None => {
            if !ctx.quiet {
                eprintln!("{}: not set", key);
            }
            Ok(ExitCode::from(1))
        }
    }
}

/// Print effective values of one tier or of every readable tier.
pub fn list(ctx: &Context, store: &str, tier: Option<Tier>, json: bool) -> Result<()> {
    let store = open_store(ctx, store)?;

    let tiers: Vec<Tier> = match tier {
        Some(tier) => vec![tier],
        None => Tier::ALL
            .into_iter()
            .filter(|t| *t != Tier::Secure || store.has_secure_access())
            .collect(),
    };

    let mut listing: Vec<(Tier, PropertyMap)> = Vec::new();
    for tier in tiers {
        let entries = store
            .entries(tier)
            .with_context(|| format!("Failed to list {} tier", tier))?;
        listing.push((tier, entries));
    }

    if json {
        let by_name: BTreeMap<&str, &PropertyMap> =
            listing.iter().map(|(t, e)| (t.as_str(), e)).collect();
        let rendered = serde_json::to_string_pretty(&by_name).context("Failed to render JSON")?;
        println!("{}", rendered);
        return Ok(());
    }

    for (i, (tier, entries)) in listing.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("[{}]", tier);
        for (key, value) in entries {
            println!("{} = {}", key, value);
        }
    }
    Ok(())
}
