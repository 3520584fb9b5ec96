//! store::revision
//!
//! On-disk revision counter.
//!
//! The revision of a store is the hex suffix of the `rev.<hex>` marker in
//! its device directory. Reading it is a directory listing and takes no
//! lock, which makes it the cheap staleness check in front of every read.
//! Bumping it requires the store lock.
//!
//! # Invariants
//!
//! - No marker means revision 0
//! - With several markers present (a crash between creating the new marker
//!   and removing the old one) the largest wins
//! - A bump never produces a revision at or below any marker on disk, and
//!   never removes a marker newer than the one it wrote

use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;

use tracing::debug;

use crate::core::paths::{StorePaths, REVISION_PREFIX};

/// Revision currently recorded in `dir`.
///
/// # Errors
///
/// Returns an error if the directory exists but cannot be listed.
pub fn current_revision(dir: &Path) -> io::Result<u64> {
    Ok(markers(dir)?.into_iter().map(|(rev, _)| rev).max().unwrap_or(0))
}

/// Write the marker for the next revision and remove the older markers.
///
/// The next revision is one past the larger of `current` and the largest
/// marker on disk, so the revision never moves backwards even when the
/// caller's view is stale.
///
/// Must be called with the store lock held. Stale marker removal is
/// best-effort.
pub fn bump(paths: &StorePaths, current: u64) -> io::Result<u64> {
    let dir = paths.revision_dir();
    let on_disk = current_revision(&dir)?;
    if on_disk > current {
        debug!(store = %paths.name(), current, on_disk, "bumping past a newer marker");
    }
    let next = current.max(on_disk).saturating_add(1);
    let marker = paths.revision_marker(next);

    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&marker)?;

    for (rev, path) in markers(&dir)? {
        if rev >= next {
            continue;
        }
        if let Err(e) = fs::remove_file(&path) {
            debug!(marker = %path.display(), error = %e, "cannot remove stale revision marker");
        }
    }

    debug!(store = %paths.name(), revision = next, "revision bumped");
    Ok(next)
}

/// Every parseable revision marker in `dir`.
fn markers(dir: &Path) -> io::Result<Vec<(u64, std::path::PathBuf)>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(suffix) = name.to_str().and_then(|n| n.strip_prefix(REVISION_PREFIX)) else {
            continue;
        };
        if let Ok(rev) = u64::from_str_radix(suffix, 16) {
            found.push((rev, entry.path()));
        }
    }
    Ok(found)
}
