//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`StoreName`] - Validated name partitioning independent stores
//! - [`ProcessName`] - Identity of the current cooperating process
//! - [`Tier`] - Classification of a property key
//!
//! # Validation
//!
//! These types enforce validity at construction time. Invalid values
//! cannot be represented, preventing entire classes of bugs.
//!
//! # Examples
//!
//! ```
//! use tierprops::core::types::{ProcessName, StoreName, Tier};
//!
//! let store = StoreName::new("main").unwrap();
//! let process = ProcessName::new("launcher").unwrap();
//! assert_eq!(Tier::Device.as_str(), "device");
//!
//! assert!(StoreName::new("").is_err());
//! assert!(StoreName::new("../escape").is_err());
//! assert!(ProcessName::new("  ").is_err());
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid store name: {0}")]
    InvalidStoreName(String),

    #[error("invalid process name: {0}")]
    InvalidProcessName(String),

    #[error("unknown tier: {0}")]
    UnknownTier(String),
}

/// A validated store name.
///
/// Store names become directory names under the store root, so they are
/// restricted to a portable character set:
/// - Cannot be empty or longer than 64 characters
/// - Only ASCII letters, digits, `-`, `_` and `.`
/// - Cannot start with `.`
///
/// # Example
///
/// ```
/// use tierprops::core::types::StoreName;
///
/// let name = StoreName::new("main.settings").unwrap();
/// assert_eq!(name.as_str(), "main.settings");
///
/// assert!(StoreName::new(".hidden").is_err());
/// assert!(StoreName::new("a/b").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StoreName(String);

/// Longest accepted store name.
const MAX_STORE_NAME_LEN: usize = 64;

impl StoreName {
    /// Create a new validated store name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidStoreName` if the name is empty or contains
    /// characters that are not safe as a directory name.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    fn validate(name: &str) -> Result<(), TypeError> {
        if name.is_empty() {
            return Err(TypeError::InvalidStoreName(
                "store name cannot be empty".into(),
            ));
        }

        if name.len() > MAX_STORE_NAME_LEN {
            return Err(TypeError::InvalidStoreName(format!(
                "store name cannot be longer than {} characters",
                MAX_STORE_NAME_LEN
            )));
        }

        if name.starts_with('.') {
            return Err(TypeError::InvalidStoreName(
                "store name cannot start with '.'".into(),
            ));
        }

        if let Some(bad) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(TypeError::InvalidStoreName(format!(
                "store name cannot contain {:?}",
                bad
            )));
        }

        Ok(())
    }

    /// Get the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for StoreName {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StoreName> for String {
    fn from(name: StoreName) -> Self {
        name.0
    }
}

impl fmt::Display for StoreName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StoreName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The identity of the running process among the cooperating applications.
///
/// Only the process whose name matches a store's secure owner may touch
/// that store's secure tier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProcessName(String);

impl ProcessName {
    /// Create a new process name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidProcessName` if the name is blank.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(TypeError::InvalidProcessName(
                "process name cannot be empty".into(),
            ));
        }
        Ok(Self(name))
    }

    /// Derive a process name from the running executable's file stem.
    ///
    /// Falls back to `"tprops"` when the executable path is unavailable.
    pub fn from_current_exe() -> Self {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .filter(|s| !s.trim().is_empty())
            .map(Self)
            .unwrap_or_else(|| Self("tprops".to_string()))
    }

    /// Get the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ProcessName {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ProcessName> for String {
    fn from(name: ProcessName) -> Self {
        name.0
    }
}

impl fmt::Display for ProcessName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Classification of a property key.
///
/// A key belongs to exactly one tier for the lifetime of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Synced configuration payload, world-readable.
    Shared,
    /// Local to this installation; survives syncs of the shared tier.
    Device,
    /// Sensitive values, reachable only from the owning process.
    Secure,
}

impl Tier {
    /// All tiers, in persist order.
    pub const ALL: [Tier; 3] = [Tier::Shared, Tier::Device, Tier::Secure];

    /// Index into per-tier arrays.
    pub(crate) fn index(self) -> usize {
        match self {
            Tier::Shared => 0,
            Tier::Device => 1,
            Tier::Secure => 2,
        }
    }

    /// Lowercase name used in paths, logs and the CLI.
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Shared => "shared",
            Tier::Device => "device",
            Tier::Secure => "secure",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shared" => Ok(Tier::Shared),
            "device" => Ok(Tier::Device),
            "secure" => Ok(Tier::Secure),
            other => Err(TypeError::UnknownTier(other.to_string())),
        }
    }
}
