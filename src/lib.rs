//! tierprops - Tiered, multi-process property storage
//!
//! tierprops keeps key/value properties for cooperating processes on one
//! machine. Every key belongs to one of three tiers:
//!
//! - **shared**: configuration that may be delivered or synced from elsewhere
//! - **device**: local state that survives a sync of the shared tier
//! - **secure**: sensitive values, reachable only from one owning process
//!
//! # Architecture
//!
//! - [`core`] - Domain types, paths, configuration, locking and file replace
//! - [`store`] - The cached, tiered [`store::PropertyStore`]
//! - [`registry`] - One store instance per name per process
//! - [`cli`] - The `tprops` command-line interface
//!
//! # Correctness Invariants
//!
//! 1. Every write runs under a lock that excludes other threads and processes
//! 2. A committed tier file is only ever replaced whole, never edited in place
//! 3. A reader never mixes tiers from different revisions
//! 4. The secure tier is never touched by a process that does not own it

pub mod cli;
pub mod core;
pub mod registry;
pub mod store;

pub use registry::{RegistryError, RegistrySettings, StoreRegistry};
pub use store::{PropertyStore, StoreError};
