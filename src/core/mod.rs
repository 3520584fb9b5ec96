//! core
//!
//! Core domain types, configuration, and low-level operations.
//!
//! # Modules
//!
//! - [`types`] - Strong types: StoreName, ProcessName, Tier
//! - [`paths`] - Centralized path routing for store files
//! - [`config`] - Configuration schema and loading
//! - [`ops`] - Store locking and crash-safe file replacement
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Every on-disk location is derived in one place
//! - Nothing in `core` caches state; caching belongs to [`crate::store`]

pub mod config;
pub mod ops;
pub mod paths;
pub mod types;
