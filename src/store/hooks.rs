//! store::hooks
//!
//! Test-only observation points inside the persist critical section.
//!
//! # Usage
//!
//! ```ignore
//! store.set_write_hook(Arc::new(|tier, phase| {
//!     if phase == WritePhase::Begin {
//!         std::thread::sleep(Duration::from_millis(50));
//!     }
//! }));
//! ```
//!
//! Unlike thread-local fault injection, a write hook is attached to one
//! store instance, so it fires for writes coming from any thread. Lock
//! fairness tests rely on this.
//!
//! # Invariants
//!
//! - Hooks are only available under `cfg(test)` or the `test_hooks` feature
//! - Hooks run while the store lock is held

use std::sync::Arc;

use crate::core::types::Tier;

/// Position of a hook call relative to a tier file replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePhase {
    /// About to replace the tier file.
    Begin,
    /// The replace finished (successfully or not).
    End,
}

/// Callback invoked around every tier file replace.
pub type WriteHook = Arc<dyn Fn(Tier, WritePhase) + Send + Sync>;
