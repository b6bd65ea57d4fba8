//! Shared test helpers for unit tests, integration tests, and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::id::*;
use crate::leaf::{LeafNode, LeafNodeMode, TransferTarget};
use crate::registry::LogisticsRegistry;
use std::collections::BTreeSet;

// ===========================================================================
// Locations and keys
// ===========================================================================

/// A location in dimension 0.
pub fn loc(x: i32, y: i32, z: i32) -> Location {
    Location::new(DimensionId(0), x, y, z)
}

pub fn loc_in(dimension: u32, x: i32, y: i32, z: i32) -> Location {
    Location::new(DimensionId(dimension), x, y, z)
}

pub fn item_key(frequency: i32) -> TransferKey {
    TransferKey::new(CapabilityType::ITEM_HANDLER, frequency)
}

pub fn fluid_key(frequency: i32) -> TransferKey {
    TransferKey::new(CapabilityType::FLUID_HANDLER, frequency)
}

// ===========================================================================
// Endpoints
// ===========================================================================

/// The block below `pos`, with a handle derived from its coordinates.
pub fn target_for(pos: Location) -> TransferTarget {
    let handle =
        ((pos.x as u32 as u64) << 32) ^ ((pos.y as u16 as u64) << 16) ^ (pos.z as u16 as u64);
    TransferTarget {
        pos: pos.offset(0, -1, 0),
        handle: CapabilityHandle(handle),
    }
}

pub fn extractor(pos: Location, key: TransferKey) -> LeafNode {
    LeafNode::extractor(pos, key)
}

/// An inserter whose target is already resolved.
pub fn inserter(pos: Location, key: TransferKey) -> LeafNode {
    LeafNode::inserter(pos, key, Some(target_for(pos)))
}

// ===========================================================================
// Topology builders
// ===========================================================================

/// Wire consecutive locations together.
pub fn wire_chain(registry: &mut LogisticsRegistry, chain: &[Location]) {
    for pair in chain.windows(2) {
        registry.connect(pair[0], pair[1]);
    }
}

/// A straight line of `len` wired locations along x, starting at `start`.
pub fn line(start: Location, len: i32) -> Vec<Location> {
    (0..len).map(|i| start.offset(i, 0, 0)).collect()
}

// ===========================================================================
// Cache inspection
// ===========================================================================

/// Cached partners of the resident endpoint at `pos`, in location order.
/// Empty if nothing is resident there.
pub fn partners(registry: &LogisticsRegistry, pos: Location) -> Vec<Location> {
    registry
        .leaf_node(pos)
        .map(|leaf| leaf.cached_partners().collect())
        .unwrap_or_default()
}

/// What the cache of the extractor at `pos` should contain: every other
/// resident inserter in the same network with the same key.
pub fn expected_partners(registry: &LogisticsRegistry, pos: Location) -> BTreeSet<Location> {
    let Some(leaf) = registry.leaf_node(pos) else {
        return BTreeSet::new();
    };
    if leaf.mode() != LeafNodeMode::Extract {
        return BTreeSet::new();
    }
    let network = registry.network_of(pos);
    registry
        .residents()
        .iter()
        .filter(|other| {
            other.location() != pos
                && other.mode() == LeafNodeMode::Insert
                && other.key() == leaf.key()
                && network.is_some()
                && registry.network_of(other.location()) == network
        })
        .map(LeafNode::location)
        .collect()
}

// ===========================================================================
// Invariant assertions
// ===========================================================================

/// Panic with a readable message if the registry violates any structural
/// invariant or any resident extractor's cache differs from what the index
/// implies.
pub fn assert_invariants(registry: &LogisticsRegistry) {
    if let Err(error) = registry.validate() {
        panic!("registry invariant violated: {error}");
    }

    for leaf in registry.residents().extractors() {
        let pos = leaf.location();
        let cached: BTreeSet<Location> = leaf.cached_partners().collect();
        let expected = expected_partners(registry, pos);
        assert_eq!(
            cached, expected,
            "extractor {pos} caches {cached:?}, expected {expected:?}"
        );
    }
}
