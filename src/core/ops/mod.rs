//! core::ops
//!
//! Locking and crash-safe file replacement.
//!
//! # Modules
//!
//! - [`lock`] - Cross-process and cross-thread store lock
//! - [`replace`] - Atomic replace of a file through a numbered backup
//!
//! # Architecture
//!
//! Every mutation of a store's files:
//! 1. Acquires the store lock
//! 2. Bumps the revision marker
//! 3. Replaces each changed tier file through [`replace::replace_file`]
//! 4. Releases the lock (also on every error path)
//!
//! # Example
//!
//! ```ignore
//! use tierprops::core::ops::lock::{LockPolicy, StoreLock};
//! use tierprops::core::ops::replace::replace_file;
//!
//! let lock = StoreLock::new(paths.lock_path(), LockPolicy::default());
//! let _guard = lock.acquire()?;
//!
//! replace_file(&paths.tier_file(Tier::Device), b"first_launch = \"false\"\n")?;
//! ```

pub mod lock;
pub mod replace;

// Re-export main types for convenience
pub use lock::{LockError, LockPolicy, StoreLock, StoreLockGuard};
pub use replace::{replace_file, ReplaceError};
