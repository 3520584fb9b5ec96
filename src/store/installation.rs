//! store::installation
//!
//! Installation identifier, generated once per store name.
//!
//! The identifier is the suffix of an `install.<id>` marker in the secure
//! directory. Creation is not locked: when two processes race, both markers
//! survive and everyone reads the lexicographically smallest one. Losing
//! markers are never deleted, so a winner can never disappear and be
//! recreated under a different id.

use std::fs::{self, OpenOptions};
use std::io;

use tracing::{debug, info};
use uuid::Uuid;

use crate::core::paths::{StorePaths, INSTALLATION_PREFIX};

/// Read the canonical installation id, creating one if none exists.
pub fn read_or_create(paths: &StorePaths) -> io::Result<String> {
    if let Some(id) = canonical(paths)? {
        return Ok(id);
    }

    paths.ensure_secure_dir()?;
    let id = Uuid::new_v4().to_string();
    match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(paths.installation_marker(&id))
    {
        Ok(_) => info!(store = %paths.name(), id = %id, "created installation id"),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
        Err(e) => return Err(e),
    }

    // Another process may have won the race in the meantime.
    canonical(paths)?.ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "installation marker vanished")
    })
}

/// Lexicographically smallest installation id on disk, if any.
pub fn canonical(paths: &StorePaths) -> io::Result<Option<String>> {
    let entries = match fs::read_dir(paths.installation_dir()) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut ids = Vec::new();
    for entry in entries {
        let entry = entry?;
        if let Some(id) = entry
            .file_name()
            .to_str()
            .and_then(|n| n.strip_prefix(INSTALLATION_PREFIX))
            .filter(|id| !id.is_empty())
        {
            ids.push(id.to_string());
        }
    }

    if ids.len() > 1 {
        debug!(store = %paths.name(), count = ids.len(), "several installation markers, using smallest");
    }
    Ok(ids.into_iter().min())
}
