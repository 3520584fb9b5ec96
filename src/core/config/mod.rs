//! core::config
//!
//! Configuration schema and loading.
//!
//! # Overview
//!
//! The configuration names the store root, the identity of the current
//! process and the definition (tier defaults, secure owner) of every store.
//!
//! # Precedence
//!
//! The first existing file wins:
//! 1. Explicit path (the `--config` flag); must exist
//! 2. `$TPROPS_CONFIG` if set
//! 3. `$XDG_CONFIG_HOME/tierprops/config.toml`
//! 4. `~/.tierprops/config.toml`
//!
//! With no file, built-in defaults apply: root `~/.tierprops/stores` and the
//! process name derived from the executable. CLI flags override the file
//! through [`Config::with_root`] and [`Config::with_process`].
//!
//! # Example
//!
//! ```no_run
//! use tierprops::core::config::Config;
//!
//! let config = Config::load(None).unwrap();
//! println!("Root: {}", config.root().unwrap().display());
//! println!("Process: {}", config.process().unwrap());
//! ```

pub mod schema;

pub use schema::{FileConfig, LockConfig, StoreDefinition};

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::core::ops::lock::LockPolicy;
use crate::core::types::ProcessName;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "TPROPS_CONFIG";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    #[error("home directory not found")]
    NoHomeDir,
}

/// Loaded configuration with overrides applied.
#[derive(Debug, Clone, Default)]
pub struct Config {
    file: FileConfig,
    loaded_from: Option<PathBuf>,
    root_override: Option<PathBuf>,
    process_override: Option<ProcessName>,
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// # Errors
    ///
    /// Returns an error if `explicit` is given but unreadable, or if the
    /// located file cannot be parsed or validated. A missing file at a
    /// non-explicit location is not an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_path(path);
        }

        let located = Self::locate(
            std::env::var_os(CONFIG_ENV).map(PathBuf::from),
            std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from),
            dirs::home_dir(),
        );

        match located {
            Some(path) => Self::from_path(&path),
            None => {
                debug!("no config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Pick the first existing candidate file.
    fn locate(
        env_path: Option<PathBuf>,
        xdg_home: Option<PathBuf>,
        home: Option<PathBuf>,
    ) -> Option<PathBuf> {
        let candidates = [
            env_path,
            xdg_home.map(|p| p.join("tierprops").join("config.toml")),
            home.map(|p| p.join(".tierprops").join("config.toml")),
        ];

        candidates.into_iter().flatten().find(|p| p.is_file())
    }

    /// Read, parse and validate a config file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let file: FileConfig = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        file.validate()?;

        debug!(path = %path.display(), stores = file.stores.len(), "loaded config");
        Ok(Self {
            file,
            loaded_from: Some(path.to_path_buf()),
            ..Default::default()
        })
    }

    /// Build a configuration directly from parsed contents.
    pub fn from_file_config(file: FileConfig) -> Result<Self, ConfigError> {
        file.validate()?;
        Ok(Self {
            file,
            ..Default::default()
        })
    }

    /// Override the store root.
    pub fn with_root(mut self, root: PathBuf) -> Self {
        self.root_override = Some(root);
        self
    }

    /// Override the process identity.
    pub fn with_process(mut self, process: ProcessName) -> Self {
        self.process_override = Some(process);
        self
    }

    // =========================================================================
    // Accessor methods with precedence
    // =========================================================================

    /// Directory holding every store.
    ///
    /// Defaults to `~/.tierprops/stores`.
    pub fn root(&self) -> Result<PathBuf, ConfigError> {
        if let Some(root) = self.root_override.as_ref().or(self.file.root.as_ref()) {
            return Ok(root.clone());
        }
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".tierprops").join("stores"))
    }

    /// Identity of the current process.
    ///
    /// Defaults to the executable's file stem.
    pub fn process(&self) -> Result<ProcessName, ConfigError> {
        if let Some(process) = &self.process_override {
            return Ok(process.clone());
        }
        match &self.file.process {
            Some(name) => {
                ProcessName::new(name.as_str()).map_err(|e| ConfigError::InvalidValue(e.to_string()))
            }
            None => Ok(ProcessName::from_current_exe()),
        }
    }

    /// Lock retry budget.
    pub fn lock_policy(&self) -> LockPolicy {
        self.file
            .lock
            .as_ref()
            .map(LockConfig::policy)
            .unwrap_or_default()
    }

    /// Store definitions by name.
    pub fn stores(&self) -> &BTreeMap<String, StoreDefinition> {
        &self.file.stores
    }

    /// Path of the loaded config file, if any.
    pub fn loaded_from(&self) -> Option<&Path> {
        self.loaded_from.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn locate_prefers_env_path() {
        let temp = TempDir::new().unwrap();
        let env_path = temp.path().join("env.toml");
        let xdg = temp.path().join("xdg");
        write(&env_path, "");
        write(&xdg.join("tierprops/config.toml"), "");

        let found = Config::locate(Some(env_path.clone()), Some(xdg), None);
        assert_eq!(found, Some(env_path));
    }

    #[test]
    fn locate_skips_missing_candidates() {
        let temp = TempDir::new().unwrap();
        let home = temp.path().join("home");
        write(&home.join(".tierprops/config.toml"), "");

        let found = Config::locate(
            Some(temp.path().join("missing.toml")),
            Some(temp.path().join("no-xdg")),
            Some(home.clone()),
        );
        assert_eq!(found, Some(home.join(".tierprops/config.toml")));
    }

    #[test]
    fn locate_none_when_nothing_exists() {
        let temp = TempDir::new().unwrap();
        assert!(Config::locate(None, Some(temp.path().to_path_buf()), None).is_none());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let result = Config::load(Some(&temp.path().join("absent.toml")));
        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }

    #[test]
    fn from_path_reads_values() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        write(
            &path,
            r#"
            root = "/data/stores"
            process = "launcher"

            [stores.main.device]
            first_launch = "true"
            "#,
        );

        let config = Config::from_path(&path).unwrap();
        assert_eq!(config.root().unwrap(), PathBuf::from("/data/stores"));
        assert_eq!(config.process().unwrap().as_str(), "launcher");
        assert_eq!(config.stores()["main"].device["first_launch"], "true");
        assert_eq!(config.loaded_from(), Some(path.as_path()));
    }

    #[test]
    fn parse_error_names_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        write(&path, "root = [unclosed");

        match Config::from_path(&path) {
            Err(ConfigError::ParseError { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected ParseError, got {:?}", other),
        }
    }

    #[test]
    fn invalid_store_name_fails_validation() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        write(&path, "[stores.\".hidden\"]\n");

        assert!(matches!(
            Config::from_path(&path),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn overrides_win() {
        let file = FileConfig {
            root: Some(PathBuf::from("/from/file")),
            process: Some("from-file".into()),
            ..Default::default()
        };
        let config = Config::from_file_config(file)
            .unwrap()
            .with_root(PathBuf::from("/from/flag"))
            .with_process(ProcessName::new("from-flag").unwrap());

        assert_eq!(config.root().unwrap(), PathBuf::from("/from/flag"));
        assert_eq!(config.process().unwrap().as_str(), "from-flag");
    }

    #[test]
    fn default_lock_policy() {
        assert_eq!(Config::default().lock_policy(), LockPolicy::default());
    }
}
