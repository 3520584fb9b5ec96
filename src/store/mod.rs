//! store
//!
//! The synchronized property store.
//!
//! # Architecture
//!
//! A [`PropertyStore`] caches the three tiers of one store name in an
//! immutable [`Snapshot`]. Every read first lists the revision marker
//! (no lock). When the marker moved, the store takes its [`StoreLock`] and
//! reloads all tiers; otherwise the cached snapshot answers directly.
//!
//! Writes always run under the lock:
//!
//! 1. Reload if another process moved the revision
//! 2. Apply the changes to copies of the affected tiers, skipping no-ops
//! 3. Bump the revision marker
//! 4. Replace each changed tier file (see [`crate::core::ops::replace`])
//! 5. Swap in a new snapshot
//!
//! # Invariants
//!
//! - A key's tier is fixed by the [`KeyClassifier`] built at construction
//! - Snapshots are replaced whole, never mutated
//! - The secure tier is only read or written when the current process is
//!   the store's secure owner
//! - Defaults overlay stored values at read time; removing a stored value
//!   makes the default visible again
//!
//! # Example
//!
//! ```ignore
//! use tierprops::store::PropertyStore;
//!
//! let store = registry.get_store("main")?;
//!
//! if store.get_bool("first_launch")? == Some(true) {
//!     store.set_many([("first_launch", Some("false"))])?;
//! }
//! ```

pub mod codec;
#[cfg(any(test, feature = "test_hooks"))]
pub mod hooks;
pub mod installation;
pub mod revision;
pub mod snapshot;

pub use codec::{LoadIssue, PropertyMap};
pub use snapshot::{KeyClassifier, Snapshot};

use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::config::StoreDefinition;
use crate::core::ops::lock::{LockError, LockPolicy, StoreLock};
use crate::core::ops::replace::{
    list_backups, replace_file, replace_private_file, temp_path, ReplaceError,
};
use crate::core::paths::StorePaths;
use crate::core::types::{ProcessName, StoreName, Tier};

/// Why one tier could not be written.
#[derive(Debug, Error)]
pub enum TierWriteError {
    #[error("cannot serialize: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("cannot prepare directory: {0}")]
    Directory(io::Error),

    #[error(transparent)]
    Replace(#[from] ReplaceError),
}

/// A tier whose file kept its previous contents.
#[derive(Debug)]
pub struct TierWriteFailure {
    /// The tier that failed.
    pub tier: Tier,
    /// What failed.
    pub error: TierWriteError,
}

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The secure tier belongs to another process.
    #[error("permission denied: {what} of store '{store}' belongs to another process")]
    PermissionDenied { store: StoreName, what: String },

    /// The store lock could not be acquired.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// The revision marker could not be read or written.
    #[error("failed to update revision of store '{store}': {source}")]
    Revision { store: StoreName, source: io::Error },

    /// Some dirty tiers were not persisted. Tiers not listed were committed.
    #[error("failed to persist {}", describe_failures(.failures))]
    Persist { failures: Vec<TierWriteFailure> },

    /// A tier file could not be deleted.
    #[error("failed to delete {}: {source}", .path.display())]
    Delete { path: PathBuf, source: io::Error },

    /// The installation identifier could not be read or created.
    #[error("failed to read installation id: {0}")]
    Installation(io::Error),
}

fn describe_failures(failures: &[TierWriteFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} tier ({})", f.tier, f.error))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Tiered property store for one store name.
///
/// One instance per store name per process, handed out by
/// [`crate::registry::StoreRegistry`].
pub struct PropertyStore {
    paths: StorePaths,
    definition: StoreDefinition,
    classifier: KeyClassifier,
    secure_access: bool,
    lock: StoreLock,
    snapshot: RwLock<Arc<Snapshot>>,
    load_issues: Mutex<Vec<LoadIssue>>,
    installation_id: Mutex<Option<String>>,
    #[cfg(any(test, feature = "test_hooks"))]
    write_hook: RwLock<Option<hooks::WriteHook>>,
}

impl fmt::Debug for PropertyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyStore")
            .field("name", self.paths.name())
            .field("root", &self.paths.root())
            .field("secure_access", &self.secure_access)
            .field("revision", &self.snapshot.read().revision())
            .finish_non_exhaustive()
    }
}

impl PropertyStore {
    /// Open the store described by `definition` and load its tiers.
    ///
    /// `process` decides access to the secure tier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Lock`] if the initial load cannot take the lock.
    /// Unreadable tier files are not errors; see [`PropertyStore::load_issues`].
    pub fn open(
        paths: StorePaths,
        definition: StoreDefinition,
        process: &ProcessName,
        policy: LockPolicy,
    ) -> Result<Self, StoreError> {
        let classifier = KeyClassifier::new(&definition);
        let secure_access = definition.is_secure_owner(process);
        let lock = StoreLock::new(paths.lock_path(), policy);

        let store = Self {
            paths,
            definition,
            classifier,
            secure_access,
            lock,
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            load_issues: Mutex::new(Vec::new()),
            installation_id: Mutex::new(None),
            #[cfg(any(test, feature = "test_hooks"))]
            write_hook: RwLock::new(None),
        };

        {
            let _guard = store.lock.acquire()?;
            let revision = store.disk_revision()?;
            store.load_snapshot(revision);
        }

        debug!(store = %store.name(), process = %process, secure_access, "store opened");
        Ok(store)
    }

    /// Name of this store.
    pub fn name(&self) -> &StoreName {
        self.paths.name()
    }

    /// On-disk locations of this store.
    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    /// Whether the current process owns the secure tier.
    pub fn has_secure_access(&self) -> bool {
        self.secure_access
    }

    /// Tier of `key`.
    pub fn tier_of(&self, key: &str) -> Tier {
        self.classifier.tier_of(key)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Value of `key`: the stored value, else the tier default, else `None`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::PermissionDenied`] for a secure key outside the owner
    /// - [`StoreError::Lock`] if a needed reload cannot take the lock
    pub fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let tier = self.tier_of(key);
        self.check_access(tier, || format!("key '{}'", key))?;

        let snapshot = self.current_snapshot()?;
        Ok(snapshot
            .tier(tier)
            .get(key)
            .or_else(|| self.definition.defaults(tier).get(key))
            .cloned())
    }

    /// Value of `key` as a boolean.
    ///
    /// `"true"` and `"false"` in any ASCII case; anything else is `None`.
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, StoreError> {
        Ok(self.get(key)?.and_then(|v| parse_bool(&v)))
    }

    /// Value of `key` as a signed integer; `None` when missing or malformed.
    pub fn get_integer(&self, key: &str) -> Result<Option<i64>, StoreError> {
        Ok(self.get(key)?.and_then(|v| v.trim().parse().ok()))
    }

    /// Whether `key` has an explicitly stored value.
    ///
    /// A key that only has a default is not contained.
    pub fn contains_key(&self, key: &str) -> Result<bool, StoreError> {
        let tier = self.tier_of(key);
        self.check_access(tier, || format!("key '{}'", key))?;
        Ok(self.current_snapshot()?.tier(tier).contains_key(key))
    }

    /// Effective contents of one tier: defaults overlaid with stored values.
    pub fn entries(&self, tier: Tier) -> Result<PropertyMap, StoreError> {
        self.check_access(tier, || format!("{} tier", tier))?;
        let snapshot = self.current_snapshot()?;

        let mut merged: PropertyMap = self
            .definition
            .defaults(tier)
            .iter()
            .filter(|(key, _)| self.tier_of(key) == tier)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        merged.extend(
            snapshot
                .tier(tier)
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        Ok(merged)
    }

    /// Revision of the snapshot answering reads, after the staleness check.
    pub fn revision(&self) -> Result<u64, StoreError> {
        Ok(self.current_snapshot()?.revision())
    }

    /// Problems seen on the most recent reload.
    pub fn load_issues(&self) -> Vec<LoadIssue> {
        self.load_issues.lock().clone()
    }

    /// Canonical installation identifier, created on first use.
    ///
    /// # Errors
    ///
    /// [`StoreError::PermissionDenied`] outside the secure owner.
    pub fn installation_id(&self) -> Result<String, StoreError> {
        if !self.secure_access {
            return Err(self.denied("installation id".to_string()));
        }

        let mut cached = self.installation_id.lock();
        if let Some(id) = cached.as_ref() {
            return Ok(id.clone());
        }

        let id = installation::read_or_create(&self.paths).map_err(StoreError::Installation)?;
        *cached = Some(id.clone());
        Ok(id)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Upsert a single key.
    pub fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.set_many([(key, Some(value))])
    }

    /// Remove a single key's stored value.
    pub fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.set_many([(key, None::<&str>)])
    }

    /// Apply several changes as one coordinated write.
    ///
    /// `Some(value)` upserts, `None` removes. Tiers without an actual change
    /// are not rewritten; when nothing changes the revision does not move.
    ///
    /// # Errors
    ///
    /// - [`StoreError::PermissionDenied`] if any entry is a secure key and this
    ///   process is not the owner; nothing is changed
    /// - [`StoreError::Lock`] if the lock cannot be acquired
    /// - [`StoreError::Revision`] if the revision marker cannot be read or
    ///   written; no tier file was touched
    /// - [`StoreError::Persist`] listing the tiers whose files kept their
    ///   previous contents; other tiers were committed
    pub fn set_many<I, K, V>(&self, entries: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = (K, Option<V>)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entries: Vec<(String, Tier, Option<String>)> = entries
            .into_iter()
            .map(|(key, value)| {
                let key = key.into();
                let tier = self.tier_of(&key);
                (key, tier, value.map(Into::into))
            })
            .collect();

        if let Some((key, tier, _)) = entries.iter().find(|(_, tier, _)| !self.may_access(*tier)) {
            warn!(store = %self.name(), key = %key, %tier, "rejected write to secure tier");
            return Err(self.denied(format!("key '{}'", key)));
        }
        if entries.iter().any(|(_, tier, _)| *tier == Tier::Secure) {
            self.ensure_installation();
        }

        let _guard = self.lock.acquire()?;
        let base = self.reload_locked()?;

        let mut next: [Option<PropertyMap>; 3] = Default::default();
        for (key, tier, value) in entries {
            let slot = &mut next[tier.index()];
            let current = slot.as_ref().unwrap_or_else(|| base.tier(tier));
            let changed = match &value {
                Some(v) => current.get(&key) != Some(v),
                None => current.contains_key(&key),
            };
            if !changed {
                continue;
            }

            let map = slot.get_or_insert_with(|| base.tier(tier).clone());
            match value {
                Some(v) => {
                    map.insert(key, v);
                }
                None => {
                    map.remove(&key);
                }
            }
        }

        // Changes that cancelled out within the batch.
        for tier in Tier::ALL {
            if next[tier.index()].as_ref() == Some(base.tier(tier)) {
                next[tier.index()] = None;
            }
        }

        let dirty: Vec<Tier> = Tier::ALL
            .into_iter()
            .filter(|t| next[t.index()].is_some())
            .collect();
        if dirty.is_empty() {
            debug!(store = %self.name(), "no changes to persist");
            return Ok(());
        }

        let revision = self.bump_revision(base.revision())?;

        let mut failures = Vec::new();
        for tier in &dirty {
            if let Some(map) = &next[tier.index()] {
                if let Err(error) = self.write_tier(*tier, map) {
                    warn!(store = %self.name(), %tier, error = %error, "tier write failed");
                    failures.push(TierWriteFailure { tier: *tier, error });
                }
            }
        }
        for failure in &failures {
            next[failure.tier.index()] = None;
        }

        *self.snapshot.write() = Arc::new(base.with_tiers(revision, next));
        info!(store = %self.name(), revision, tiers = ?dirty, failed = failures.len(), "persisted");

        if failures.is_empty() {
            Ok(())
        } else {
            Err(StoreError::Persist { failures })
        }
    }

    /// Bump the revision and reload every tier from disk.
    ///
    /// Call after another party replaced the shared tier file, so that every
    /// process notices on its next read.
    pub fn signal_external_change(&self) -> Result<(), StoreError> {
        let _guard = self.lock.acquire()?;
        let current = self.disk_revision()?;
        let revision = self.bump_revision(current)?;
        self.load_snapshot(revision);
        info!(store = %self.name(), revision, "external change signalled");
        Ok(())
    }

    /// Delete the device and secure tier files and fall back to defaults.
    ///
    /// The shared tier is left alone. The secure file is only deleted by the
    /// secure owner.
    pub fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.lock.acquire()?;

        for tier in [Tier::Device, Tier::Secure] {
            if !self.may_access(tier) {
                continue;
            }
            let path = self.paths.tier_file(tier);
            remove_if_present(&path)?;

            // Stale leftovers must not be mistaken for an interrupted write.
            remove_if_present(&temp_path(&path))?;
            if let Ok(backups) = list_backups(&path) {
                for backup in backups {
                    remove_if_present(&backup)?;
                }
            }
        }

        let current = self.disk_revision()?;
        let revision = self.bump_revision(current)?;
        self.load_snapshot(revision);
        info!(store = %self.name(), revision, "store cleared");
        Ok(())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn may_access(&self, tier: Tier) -> bool {
        tier != Tier::Secure || self.secure_access
    }

    fn check_access(&self, tier: Tier, what: impl FnOnce() -> String) -> Result<(), StoreError> {
        if !self.may_access(tier) {
            return Err(self.denied(what()));
        }
        if tier == Tier::Secure {
            self.ensure_installation();
        }
        Ok(())
    }

    fn denied(&self, what: String) -> StoreError {
        StoreError::PermissionDenied {
            store: self.name().clone(),
            what,
        }
    }

    /// Create the installation id on first secure access; failures are logged.
    fn ensure_installation(&self) {
        if let Err(e) = self.installation_id() {
            warn!(store = %self.name(), error = %e, "cannot establish installation id");
        }
    }

    /// Snapshot answering reads, reloaded first if the marker moved.
    fn current_snapshot(&self) -> Result<Arc<Snapshot>, StoreError> {
        let cached = self.snapshot.read().clone();
        match revision::current_revision(&self.paths.revision_dir()) {
            Ok(on_disk) if on_disk == cached.revision() => Ok(cached),
            Ok(on_disk) => {
                debug!(store = %self.name(), cached = cached.revision(), on_disk, "snapshot stale");
                let _guard = self.lock.acquire()?;
                self.reload_locked()
            }
            Err(e) => {
                warn!(store = %self.name(), error = %e, "cannot check revision, using cached snapshot");
                Ok(cached)
            }
        }
    }

    /// Reload if the revision moved. Caller holds the lock.
    ///
    /// The revision is read again here: a writer may have advanced it
    /// between the lock-free check and the lock acquisition. An unreadable
    /// revision is an error; the cached snapshot may be stale.
    fn reload_locked(&self) -> Result<Arc<Snapshot>, StoreError> {
        let cached = self.snapshot.read().clone();
        let revision = self.disk_revision()?;
        if revision == cached.revision() {
            Ok(cached)
        } else {
            Ok(self.load_snapshot(revision))
        }
    }

    /// Read every tier and install the result. Caller holds the lock.
    fn load_snapshot(&self, revision: u64) -> Arc<Snapshot> {
        let mut issues = Vec::new();
        let mut load = |tier: Tier| -> PropertyMap {
            if !self.may_access(tier) {
                return PropertyMap::new();
            }
            let (mut map, issue) = codec::load_tier(tier, &self.paths.tier_file(tier));
            issues.extend(issue);
            let foreign = self.classifier.retain_own(tier, &mut map);
            if foreign > 0 {
                debug!(store = %self.name(), %tier, foreign, "ignored keys classified in another tier");
            }
            map
        };

        let snapshot = Arc::new(Snapshot::new(
            revision,
            load(Tier::Shared),
            load(Tier::Device),
            load(Tier::Secure),
        ));

        *self.load_issues.lock() = issues;
        *self.snapshot.write() = Arc::clone(&snapshot);
        debug!(store = %self.name(), revision, "snapshot loaded");
        snapshot
    }

    fn disk_revision(&self) -> Result<u64, StoreError> {
        revision::current_revision(&self.paths.revision_dir()).map_err(|source| {
            StoreError::Revision {
                store: self.name().clone(),
                source,
            }
        })
    }

    fn bump_revision(&self, current: u64) -> Result<u64, StoreError> {
        revision::bump(&self.paths, current).map_err(|source| StoreError::Revision {
            store: self.name().clone(),
            source,
        })
    }

    fn write_tier(&self, tier: Tier, map: &PropertyMap) -> Result<(), TierWriteError> {
        let path = self.paths.tier_file(tier);
        let contents = codec::serialize(map)?;

        if tier == Tier::Secure {
            self.paths
                .ensure_secure_dir()
                .map_err(TierWriteError::Directory)?;
        } else {
            fs::create_dir_all(self.paths.tier_dir(tier)).map_err(TierWriteError::Directory)?;
        }

        #[cfg(any(test, feature = "test_hooks"))]
        self.fire_hook(tier, hooks::WritePhase::Begin);

        let result = if tier == Tier::Secure {
            replace_private_file(&path, contents.as_bytes())
        } else {
            replace_file(&path, contents.as_bytes())
        };

        #[cfg(any(test, feature = "test_hooks"))]
        self.fire_hook(tier, hooks::WritePhase::End);

        result.map_err(TierWriteError::from)
    }

    /// Install a hook called around every tier file replace.
    #[cfg(any(test, feature = "test_hooks"))]
    pub fn set_write_hook(&self, hook: hooks::WriteHook) {
        *self.write_hook.write() = Some(hook);
    }

    /// Remove the write hook.
    #[cfg(any(test, feature = "test_hooks"))]
    pub fn clear_write_hook(&self) {
        *self.write_hook.write() = None;
    }

    #[cfg(any(test, feature = "test_hooks"))]
    fn fire_hook(&self, tier: Tier, phase: hooks::WritePhase) {
        let hook = self.write_hook.read().clone();
        if let Some(hook) = hook {
            hook(tier, phase);
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn remove_if_present(path: &std::path::Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StoreError::Delete {
            path: path.to_path_buf(),
            source,
        }),
    }
}
