//! store::snapshot
//!
//! Cached tier contents and key classification.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use super::codec::PropertyMap;
use crate::core::config::StoreDefinition;
use crate::core::types::Tier;

/// In-memory copy of all three tiers as of one revision.
///
/// Never mutated after construction; a reload or a write builds a new one.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    revision: u64,
    tiers: [Arc<PropertyMap>; 3],
}

impl Snapshot {
    /// Build a snapshot from freshly loaded tiers.
    pub fn new(revision: u64, shared: PropertyMap, device: PropertyMap, secure: PropertyMap) -> Self {
        Self {
            revision,
            tiers: [Arc::new(shared), Arc::new(device), Arc::new(secure)],
        }
    }

    /// Revision the tiers were read at.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Stored contents of one tier.
    pub fn tier(&self, tier: Tier) -> &PropertyMap {
        &self.tiers[tier.index()]
    }

    /// Copy of this snapshot at a new revision with some tiers replaced.
    pub(crate) fn with_tiers(&self, revision: u64, replaced: [Option<PropertyMap>; 3]) -> Self {
        let mut tiers = self.tiers.clone();
        for (slot, map) in tiers.iter_mut().zip(replaced) {
            if let Some(map) = map {
                *slot = Arc::new(map);
            }
        }
        Self { revision, tiers }
    }
}

/// Lookup table from key to tier, fixed at store construction.
///
/// When a key appears in several default maps, Secure wins over Device,
/// which wins over Shared. Keys in no default map are Shared.
#[derive(Debug, Clone, Default)]
pub struct KeyClassifier {
    table: HashMap<String, Tier>,
}

impl KeyClassifier {
    /// Build the table from a store definition.
    pub fn new(definition: &StoreDefinition) -> Self {
        let mut table = HashMap::new();

        for tier in Tier::ALL {
            for key in definition.defaults(tier).keys() {
                if let Some(previous) = table.insert(key.clone(), tier) {
                    warn!(key = %key, shadowed = %previous, tier = %tier, "key defined in several tiers");
                }
            }
        }

        Self { table }
    }

    /// Tier of `key`.
    pub fn tier_of(&self, key: &str) -> Tier {
        self.table.get(key).copied().unwrap_or(Tier::Shared)
    }

    /// Drop entries that belong to another tier.
    ///
    /// Returns the number of entries removed.
    pub(crate) fn retain_own(&self, tier: Tier, map: &mut PropertyMap) -> usize {
        let before = map.len();
        map.retain(|key, _| self.tier_of(key) == tier);
        before - map.len()
    }
}
