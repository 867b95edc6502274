//! Sanctions Index (C10) — a read-only, atomically-swappable address set.
//!
//! The Sanctions Source (external collaborator, spec.md §6) is responsible
//! for fetching and parsing whatever feed format a list is published in;
//! this module only defines the normalization/classification rules and the
//! cross-chain-EVM propagation rule, and serves lookups against the
//! currently-loaded snapshot.
//!
//! Grounded on the `arc_swap::ArcSwap` lock-free-snapshot pattern — no pack
//! example reaches for it directly, but it is the standard crate for
//! exactly the guarantee spec.md §4.10 demands ("in-flight `is_sanctioned`
//! calls see either the old or new snapshot, never a torn state"); see
//! DESIGN.md.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use kontext_core::normalize;

/// Metadata about why an address is sanctioned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SanctionsReason {
    pub entity_name: String,
    pub lists: Vec<String>,
    pub source_id: String,
}

/// One parsed entry from a sanctions feed, as handed to
/// [`SanctionsIndex::reload`] by the external Sanctions Source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SanctionsEntry {
    pub address: String,
    pub reason: SanctionsReason,
}

#[derive(Debug, Default)]
struct SanctionsSnapshot {
    by_normalized_address: HashMap<String, SanctionsReason>,
}

/// Read-only, atomically-swappable sanctions address set (C10).
#[derive(Debug)]
pub struct SanctionsIndex {
    snapshot: ArcSwap<SanctionsSnapshot>,
}

impl SanctionsIndex {
    pub fn empty() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(SanctionsSnapshot::default()),
        }
    }

    pub fn from_entries(entries: Vec<SanctionsEntry>) -> Self {
        let index = Self::empty();
        index.reload(entries);
        index
    }

    /// Atomically swap in a freshly parsed snapshot. Concurrent readers
    /// observe either the old or the new snapshot in full, never a mix of
    /// the two.
    pub fn reload(&self, entries: Vec<SanctionsEntry>) {
        let mut by_normalized_address = HashMap::with_capacity(entries.len());
        for entry in entries {
            by_normalized_address.insert(normalize(&entry.address), entry.reason);
        }
        self.snapshot.store(Arc::new(SanctionsSnapshot { by_normalized_address }));
        tracing::info!("sanctions index reloaded");
    }

    /// Membership check under normalization + EVM cross-chain propagation:
    /// because the key space is the normalized address alone (not
    /// `address@chain`), any EVM address sanctioned under any currency is
    /// automatically sanctioned on every EVM chain. `chain` is accepted for
    /// API symmetry with the verifier's call site and future per-chain
    /// scoping, but the current rule never needs it to decide membership.
    pub fn is_sanctioned(&self, address: &str, _chain: &str) -> bool {
        let snapshot = self.snapshot.load();
        snapshot.by_normalized_address.contains_key(&normalize(address))
    }

    pub fn reason(&self, address: &str) -> Option<SanctionsReason> {
        let snapshot = self.snapshot.load();
        snapshot.by_normalized_address.get(&normalize(address)).cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().by_normalized_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SanctionsIndex {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(address: &str) -> SanctionsEntry {
        SanctionsEntry {
            address: address.to_string(),
            reason: SanctionsReason {
                entity_name: "Sanctioned Entity".into(),
                lists: vec!["OFAC SDN".into()],
                source_id: "ofac-1".into(),
            },
        }
    }

    #[test]
    fn evm_address_is_sanctioned_on_every_evm_chain_regardless_of_case() {
        let index = SanctionsIndex::from_entries(vec![entry(
            "0xabcabcabcabcabcabcabcabcabcabcabcabcabc",
        )]);
        assert!(index.is_sanctioned("0xABCABCABCABCABCABCABCABCABCABCABCABCABC", "base"));
        assert!(index.is_sanctioned("0xabcabcabcabcabcabcabcabcabcabcabcabcabc", "ethereum"));
    }

    #[test]
    fn non_evm_addresses_are_case_sensitive() {
        let btc = "1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2";
        let index = SanctionsIndex::from_entries(vec![entry(btc)]);
        assert!(index.is_sanctioned(btc, "bitcoin"));
        assert!(!index.is_sanctioned(&btc.to_lowercase(), "bitcoin"));
    }

    #[test]
    fn reload_swaps_atomically_and_drops_old_entries() {
        let index = SanctionsIndex::from_entries(vec![entry("0x1111111111111111111111111111111111111111")]);
        assert!(index.is_sanctioned("0x1111111111111111111111111111111111111111", "base"));
        index.reload(vec![entry("0x2222222222222222222222222222222222222222")]);
        assert!(!index.is_sanctioned("0x1111111111111111111111111111111111111111", "base"));
        assert!(index.is_sanctioned("0x2222222222222222222222222222222222222222", "base"));
    }

    #[test]
    fn reason_returns_metadata_for_sanctioned_address() {
        let index = SanctionsIndex::from_entries(vec![entry("0x3333333333333333333333333333333333333333")]);
        let reason = index.reason("0x3333333333333333333333333333333333333333").unwrap();
        assert_eq!(reason.entity_name, "Sanctioned Entity");
    }
}
