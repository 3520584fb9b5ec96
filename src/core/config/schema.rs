//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Validation
//!
//! Config values are validated after parsing: store names must be valid
//! [`StoreName`]s and process names must be non-blank.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::ops::lock::LockPolicy;
use crate::core::types::{ProcessName, StoreName, Tier};

/// Configuration file contents.
///
/// # Example
///
/// ```toml
/// root = "/var/lib/myapp/settings"
/// process = "launcher"
///
/// [lock]
/// max_attempts = 100
/// backoff_ms = 10
///
/// [stores.main]
/// secure_owner = "launcher"
///
/// [stores.main.shared]
/// url = "https://x"
///
/// [stores.main.device]
/// first_launch = "true"
///
/// [stores.main.secure]
/// admin_pw = ""
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Directory holding every store.
    pub root: Option<PathBuf>,

    /// Name of the current process among the cooperating applications.
    pub process: Option<String>,

    /// Lock retry budget
    pub lock: Option<LockConfig>,

    /// Store definitions by name
    pub stores: BTreeMap<String, StoreDefinition>,
}

impl FileConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(process) = &self.process {
            ProcessName::new(process.as_str())
                .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
        }

        for (name, definition) in &self.stores {
            StoreName::new(name.as_str())
                .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
            definition.validate()?;
        }

        Ok(())
    }
}

/// Lock retry settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LockConfig {
    /// Attempts to open and lock the marker file
    pub max_attempts: Option<u32>,

    /// Pause between attempts, in milliseconds
    pub backoff_ms: Option<u64>,
}

impl LockConfig {
    /// The effective policy, falling back to defaults.
    pub fn policy(&self) -> LockPolicy {
        let default = LockPolicy::default();
        LockPolicy {
            max_attempts: self.max_attempts.unwrap_or(default.max_attempts),
            backoff: self
                .backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(default.backoff),
        }
    }
}

/// Definition of one store: its tier default maps and its secure owner.
///
/// Key classification is derived from membership in these maps.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct StoreDefinition {
    /// Process allowed to touch the secure tier. `None` means no process.
    pub secure_owner: Option<String>,

    /// Shared tier defaults
    pub shared: BTreeMap<String, String>,

    /// Device tier defaults
    pub device: BTreeMap<String, String>,

    /// Secure tier defaults
    pub secure: BTreeMap<String, String>,
}

impl StoreDefinition {
    /// Validate the definition.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(owner) = &self.secure_owner {
            ProcessName::new(owner.as_str())
                .map_err(|e| ConfigError::InvalidValue(format!("secure_owner: {}", e)))?;
        }
        Ok(())
    }

    /// Builder-style setter for the secure owner.
    pub fn with_secure_owner(mut self, owner: impl Into<String>) -> Self {
        self.secure_owner = Some(owner.into());
        self
    }

    /// Builder-style insertion of a default value.
    pub fn with_default(mut self, tier: Tier, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaults_mut(tier).insert(key.into(), value.into());
        self
    }

    /// Default map of one tier.
    pub fn defaults(&self, tier: Tier) -> &BTreeMap<String, String> {
        match tier {
            Tier::Shared => &self.shared,
            Tier::Device => &self.device,
            Tier::Secure => &self.secure,
        }
    }

    fn defaults_mut(&mut self, tier: Tier) -> &mut BTreeMap<String, String> {
        match tier {
            Tier::Shared => &mut self.shared,
            Tier::Device => &mut self.device,
            Tier::Secure => &mut self.secure,
        }
    }

    /// Whether `process` is the designated secure owner.
    pub fn is_secure_owner(&self, process: &ProcessName) -> bool {
        self.secure_owner.as_deref() == Some(process.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_example() {
        let config: FileConfig = toml::from_str(
            r#"
            root = "/data"
            process = "launcher"

            [lock]
            max_attempts = 5
            backoff_ms = 2

            [stores.main]
            secure_owner = "launcher"

            [stores.main.shared]
            url = "https://x"

            [stores.main.device]
            first_launch = "true"

            [stores.main.secure]
            admin_pw = ""
            "#,
        )
        .unwrap();

        assert_eq!(config.root, Some(PathBuf::from("/data")));
        let main = &config.stores["main"];
        assert_eq!(main.shared["url"], "https://x");
        assert_eq!(main.device["first_launch"], "true");
        assert_eq!(main.secure["admin_pw"], "");
        assert!(main.is_secure_owner(&ProcessName::new("launcher").unwrap()));
        assert!(!main.is_secure_owner(&ProcessName::new("sync").unwrap()));

        let policy = config.lock.as_ref().unwrap().policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.backoff, Duration::from_millis(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_fields_rejected() {
        let result: Result<FileConfig, _> = toml::from_str("colour = \"blue\"");
        assert!(result.is_err());

        let result: Result<FileConfig, _> = toml::from_str("[stores.main]\nsecure_owners = \"x\"");
        assert!(result.is_err());
    }

    #[test]
    fn invalid_store_name_rejected() {
        let config = FileConfig {
            stores: BTreeMap::from([("bad/name".to_string(), StoreDefinition::default())]),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn blank_owner_rejected() {
        let definition = StoreDefinition::default().with_secure_owner(" ");
        assert!(definition.validate().is_err());
    }

    #[test]
    fn lock_policy_defaults() {
        let policy = LockConfig::default().policy();
        assert_eq!(policy, LockPolicy::default());
    }

    #[test]
    fn builder_fills_tiers() {
        let definition = StoreDefinition::default()
            .with_default(Tier::Shared, "url", "https://x")
            .with_default(Tier::Secure, "admin_pw", "");
        assert_eq!(definition.defaults(Tier::Shared).len(), 1);
        assert!(definition.defaults(Tier::Device).is_empty());
        assert_eq!(definition.defaults(Tier::Secure)["admin_pw"], "");
    }
}
