//! store::codec
//!
//! Reading and writing tier files.
//!
//! # Format
//!
//! A tier file is a flat TOML table of string keys to string values:
//!
//! ```toml
//! first_launch = "false"
//! "ui.theme" = "dark"
//! ```
//!
//! # Read failures
//!
//! A missing file is the normal first-run state and is not reported. Any
//! other I/O or parse failure is logged and returned as a [`LoadIssue`];
//! in both cases the tier loads as empty so the store keeps working on
//! defaults.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::core::ops::replace::{list_backups, restore_backup};
use crate::core::types::Tier;

/// Key/value contents of one tier.
pub type PropertyMap = BTreeMap<String, String>;

/// A non-fatal problem seen while loading a tier file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadIssue {
    /// Tier whose file could not be loaded.
    pub tier: Tier,
    /// The offending file.
    pub path: PathBuf,
    /// What went wrong.
    pub message: String,
}

/// Parse tier file contents.
pub fn parse(contents: &str) -> Result<PropertyMap, toml::de::Error> {
    toml::from_str(contents)
}

/// Serialize tier contents.
pub fn serialize(map: &PropertyMap) -> Result<String, toml::ser::Error> {
    toml::to_string(map)
}

/// Load a tier file, finishing an interrupted replace if needed.
///
/// Must be called with the store lock held: recovery renames files.
pub(crate) fn load_tier(tier: Tier, path: &Path) -> (PropertyMap, Option<LoadIssue>) {
    let issue = |message: String| LoadIssue {
        tier,
        path: path.to_path_buf(),
        message,
    };

    match read_map(path) {
        Ok(map) => (map, None),
        Err(ReadFailure::Missing) => match recover(path) {
            Some(map) => (map, None),
            None => {
                debug!(%tier, path = %path.display(), "tier file not created yet");
                (PropertyMap::new(), None)
            }
        },
        Err(ReadFailure::Io(e)) => {
            warn!(%tier, path = %path.display(), error = %e, "cannot read tier file, treating as empty");
            (PropertyMap::new(), Some(issue(format!("cannot read: {}", e))))
        }
        Err(ReadFailure::Parse(e)) => {
            warn!(%tier, path = %path.display(), error = %e, "cannot parse tier file, treating as empty");
            (PropertyMap::new(), Some(issue(format!("cannot parse: {}", e))))
        }
    }
}

enum ReadFailure {
    Missing,
    Io(io::Error),
    Parse(toml::de::Error),
}

fn read_map(path: &Path) -> Result<PropertyMap, ReadFailure> {
    let contents = fs::read_to_string(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            ReadFailure::Missing
        } else {
            ReadFailure::Io(e)
        }
    })?;
    parse(&contents).map_err(ReadFailure::Parse)
}

/// Put the first parseable backup back under `path`.
fn recover(path: &Path) -> Option<PropertyMap> {
    let backups = match list_backups(path) {
        Ok(backups) => backups,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot list backups");
            return None;
        }
    };

    for backup in backups {
        let Ok(map) = read_map(&backup) else {
            debug!(backup = %backup.display(), "skipping unreadable backup");
            continue;
        };
        match restore_backup(&backup, path) {
            Ok(()) => {
                info!(path = %path.display(), backup = %backup.display(), "recovered tier file from backup");
                return Some(map);
            }
            Err(e) => {
                warn!(backup = %backup.display(), error = %e, "cannot restore backup");
                return Some(map);
            }
        }
    }

    None
}
