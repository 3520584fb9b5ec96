//! registry
//!
//! Process-wide source of [`PropertyStore`] instances.
//!
//! # Design
//!
//! A [`StoreRegistry`] is an explicit context object: build one at startup
//! from [`RegistrySettings`] and pass it (or an `Arc` of it) to whoever needs
//! stores. It hands out exactly one store per name, so every caller in the
//! process shares one cache and one in-process mutex per store.
//!
//! Definitions come from the configuration file and from
//! [`StoreRegistry::register`]. A name with no definition opens with empty
//! defaults and no secure owner.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::config::{Config, ConfigError, StoreDefinition};
use crate::core::ops::lock::LockPolicy;
use crate::core::paths::StorePaths;
use crate::core::types::{ProcessName, StoreName, TypeError};
use crate::store::{PropertyStore, StoreError};

/// Errors from the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    InvalidName(#[from] TypeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to create directories for store '{name}' under {}: {source}", .root.display())]
    Directory {
        name: StoreName,
        root: PathBuf,
        source: io::Error,
    },

    #[error("store '{0}' is already open; register it before first use")]
    AlreadyOpen(StoreName),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Everything a registry needs to open stores.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    /// Directory holding one subdirectory per store.
    pub root: PathBuf,
    /// Name of the current process, compared with secure owners.
    pub process: ProcessName,
    /// Lock retry policy for every store.
    pub lock_policy: LockPolicy,
    /// Store definitions by name.
    pub definitions: BTreeMap<String, StoreDefinition>,
}

impl RegistrySettings {
    /// Settings with no definitions and the default lock policy.
    pub fn new(root: PathBuf, process: ProcessName) -> Self {
        Self {
            root,
            process,
            lock_policy: LockPolicy::default(),
            definitions: BTreeMap::new(),
        }
    }

    /// Settings resolved from a loaded configuration.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            root: config.root()?,
            process: config.process()?,
            lock_policy: config.lock_policy(),
            definitions: config.stores().clone(),
        })
    }

    /// Builder-style addition of a store definition.
    pub fn with_store(mut self, name: impl Into<String>, definition: StoreDefinition) -> Self {
        self.definitions.insert(name.into(), definition);
        self
    }
}

/// Hands out one [`PropertyStore`] per store name.
#[derive(Debug)]
pub struct StoreRegistry {
    root: PathBuf,
    process: ProcessName,
    lock_policy: LockPolicy,
    definitions: Mutex<BTreeMap<String, StoreDefinition>>,
    stores: Mutex<HashMap<StoreName, Arc<PropertyStore>>>,
}

impl StoreRegistry {
    /// Create a registry. No store is opened until requested.
    pub fn new(settings: RegistrySettings) -> Self {
        debug!(
            root = %settings.root.display(),
            process = %settings.process,
            stores = settings.definitions.len(),
            "store registry created"
        );
        Self {
            root: settings.root,
            process: settings.process,
            lock_policy: settings.lock_policy,
            definitions: Mutex::new(settings.definitions),
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// Root directory of all stores.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Name of the current process.
    pub fn process(&self) -> &ProcessName {
        &self.process
    }

    /// Add or replace the definition of `name`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::AlreadyOpen`] if the store was already handed out:
    /// its key classification is fixed for the life of the instance.
    pub fn register(&self, name: &str, definition: StoreDefinition) -> Result<(), RegistryError> {
        let name = StoreName::new(name)?;
        definition.validate()?;

        if self.stores.lock().contains_key(&name) {
            return Err(RegistryError::AlreadyOpen(name));
        }
        self.definitions
            .lock()
            .insert(name.as_str().to_string(), definition);
        Ok(())
    }

    /// Names with a definition, sorted.
    pub fn defined_stores(&self) -> Vec<String> {
        self.definitions.lock().keys().cloned().collect()
    }

    /// The store named `name`, opening it on first request.
    ///
    /// Creates the store's directories; the secure directory only when this
    /// process is the secure owner.
    pub fn get_store(&self, name: &str) -> Result<Arc<PropertyStore>, RegistryError> {
        let name = StoreName::new(name)?;

        let mut stores = self.stores.lock();
        if let Some(store) = stores.get(&name) {
            return Ok(Arc::clone(store));
        }

        let definition = self
            .definitions
            .lock()
            .get(name.as_str())
            .cloned()
            .unwrap_or_default();

        let paths = StorePaths::new(self.root.clone(), name.clone());
        let directory_error = |source| RegistryError::Directory {
            name: name.clone(),
            root: self.root.clone(),
            source,
        };
        paths.ensure_dirs().map_err(directory_error)?;
        if definition.is_secure_owner(&self.process) {
            paths.ensure_secure_dir().map_err(directory_error)?;
        }

        let store = Arc::new(PropertyStore::open(
            paths,
            definition,
            &self.process,
            self.lock_policy,
        )?);
        info!(store = %name, process = %self.process, "store opened");
        stores.insert(name, Arc::clone(&store));
        Ok(store)
    }
}
