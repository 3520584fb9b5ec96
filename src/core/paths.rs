//! core::paths
//!
//! Centralized path routing for store locations.
//!
//! # Architecture
//!
//! All on-disk locations of a store are computed here so that every
//! cooperating process agrees on the layout. No code outside this module
//! should join file names onto a store directory.
//!
//! # Storage Layout
//!
//! Each store lives under `<root>/<store>/`:
//! - `shared/properties.toml` - Shared (syncable) tier
//! - `device/properties.toml` - Device tier
//! - `device/rev.<hex>` - Revision marker
//! - `device/lock` - Lock marker hosting the OS advisory lock
//! - `secure/properties.toml` - Secure tier (owner only)
//! - `secure/install.<id>` - Installation identifier marker
//!
//! # Example
//!
//! ```
//! use tierprops::core::paths::StorePaths;
//! use tierprops::core::types::{StoreName, Tier};
//! use std::path::PathBuf;
//!
//! let paths = StorePaths::new(PathBuf::from("/data"), StoreName::new("main").unwrap());
//!
//! assert_eq!(
//!     paths.tier_file(Tier::Device),
//!     PathBuf::from("/data/main/device/properties.toml")
//! );
//! assert_eq!(paths.revision_marker(26), PathBuf::from("/data/main/device/rev.1a"));
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::core::types::{StoreName, Tier};

/// File name of every tier's properties file.
pub const PROPERTIES_FILE: &str = "properties.toml";

/// File name prefix of revision markers.
pub const REVISION_PREFIX: &str = "rev.";

/// File name prefix of installation identifier markers.
pub const INSTALLATION_PREFIX: &str = "install.";

/// File name of the lock marker.
pub const LOCK_FILE: &str = "lock";

/// Centralized path routing for one store.
///
/// # Invariants
///
/// - The revision marker and lock marker live in the device directory
/// - Secure files never live outside the secure directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    root: PathBuf,
    name: StoreName,
}

impl StorePaths {
    /// Create paths for `name` under the store `root`.
    pub fn new(root: PathBuf, name: StoreName) -> Self {
        Self { root, name }
    }

    /// The store root shared by all store names.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The store name these paths belong to.
    pub fn name(&self) -> &StoreName {
        &self.name
    }

    /// Directory holding everything for this store name.
    ///
    /// This is `<root>/<name>/`.
    pub fn store_dir(&self) -> PathBuf {
        self.root.join(self.name.as_str())
    }

    /// Directory of a tier.
    ///
    /// This is `<root>/<name>/<tier>/`.
    pub fn tier_dir(&self, tier: Tier) -> PathBuf {
        self.store_dir().join(tier.as_str())
    }

    /// Current properties file of a tier.
    pub fn tier_file(&self, tier: Tier) -> PathBuf {
        self.tier_dir(tier).join(PROPERTIES_FILE)
    }

    /// Directory scanned for revision markers.
    pub fn revision_dir(&self) -> PathBuf {
        self.tier_dir(Tier::Device)
    }

    /// Marker file for a given revision, with a lowercase hex suffix.
    pub fn revision_marker(&self, revision: u64) -> PathBuf {
        self.revision_dir()
            .join(format!("{}{:x}", REVISION_PREFIX, revision))
    }

    /// Lock marker hosting the OS advisory lock.
    ///
    /// This is `<root>/<name>/device/lock`.
    pub fn lock_path(&self) -> PathBuf {
        self.tier_dir(Tier::Device).join(LOCK_FILE)
    }

    /// Directory scanned for installation identifier markers.
    pub fn installation_dir(&self) -> PathBuf {
        self.tier_dir(Tier::Secure)
    }

    /// Marker file for an installation identifier.
    pub fn installation_marker(&self, id: &str) -> PathBuf {
        self.installation_dir()
            .join(format!("{}{}", INSTALLATION_PREFIX, id))
    }

    /// Ensure the shared and device directories exist.
    ///
    /// The secure directory is created only by the owning process through
    /// [`StorePaths::ensure_secure_dir`].
    ///
    /// # Errors
    ///
    /// Returns an IO error if directory creation fails.
    pub fn ensure_dirs(&self) -> io::Result<()> {
        fs::create_dir_all(self.tier_dir(Tier::Shared))?;
        fs::create_dir_all(self.tier_dir(Tier::Device))?;
        Ok(())
    }

    /// Ensure the secure directory exists, restricted to the owner on unix.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the directory cannot be created or restricted.
    pub fn ensure_secure_dir(&self) -> io::Result<()> {
        let dir = self.tier_dir(Tier::Secure);
        fs::create_dir_all(&dir)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&dir, fs::Permissions::from_mode(0o700))?;
        }

        Ok(())
    }
}
