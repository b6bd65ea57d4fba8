//! A single logistics network: one wire-connected component.
//!
//! A network is a set of member locations. Only its leaf nodes interact with
//! the outside; they form sub-networks keyed by [`TransferKey`] (capability
//! type plus frequency). The network keeps that index current and pushes
//! fan-out notifications to resident extractors so their partner caches stay
//! in sync.
//!
//! Fan-out only reaches endpoints present in [`ResidentLeafNodes`]. Unloaded
//! endpoints are skipped; they rebuild their own view when loaded again.

use crate::id::{Location, TransferKey};
use crate::leaf::{LeafNode, LeafNodeMode, ResidentLeafNodes, TransferTarget};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Structural inconsistencies detected by [`LogisticsNetwork::validate`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantError {
    #[error("network has no nodes")]
    Empty,
    #[error("leaf node {0} is not a member of its network")]
    LeafOutsideNetwork(Location),
    #[error("leaf node {0} is missing from the key index")]
    Unindexed(Location),
    #[error("resident endpoint {0} does not match its recorded leaf entry")]
    StaleLeafEntry(Location),
    #[error("index entry {pos} under {key:?} has no matching leaf node")]
    OrphanIndexEntry { pos: Location, key: TransferKey },
    #[error("location {0} is mapped to a network that does not contain it")]
    MembershipMismatch(Location),
    #[error("network member {0} has no membership entry")]
    Untracked(Location),
    #[error("network is split into {0} wire-connected components")]
    Disconnected(usize),
    #[error("wire {0} <-> {1} crosses two networks")]
    CrossNetworkWire(Location, Location),
}

// ---------------------------------------------------------------------------
// Leaf entries
// ---------------------------------------------------------------------------

/// What the network knows about one of its leaf nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeafEntry {
    pub key: TransferKey,
    pub mode: LeafNodeMode,
}

// ---------------------------------------------------------------------------
// LogisticsNetwork
// ---------------------------------------------------------------------------

/// One connected component of the wire graph plus its leaf-node index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogisticsNetwork {
    nodes: BTreeSet<Location>,
    leaf_nodes: BTreeMap<Location, LeafEntry>,
    index: BTreeMap<TransferKey, BTreeSet<Location>>,
}

impl LogisticsNetwork {
    /// Create an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a network containing the given member locations.
    pub fn with_nodes(nodes: impl IntoIterator<Item = Location>) -> Self {
        Self {
            nodes: nodes.into_iter().collect(),
            ..Self::default()
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn nodes(&self) -> &BTreeSet<Location> {
        &self.nodes
    }

    pub fn contains(&self, pos: Location) -> bool {
        self.nodes.contains(&pos)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All leaf nodes with their recorded key and mode.
    pub fn leaf_nodes(&self) -> impl Iterator<Item = (Location, LeafEntry)> + '_ {
        self.leaf_nodes.iter().map(|(pos, entry)| (*pos, *entry))
    }

    pub fn leaf_node_count(&self) -> usize {
        self.leaf_nodes.len()
    }

    pub fn leaf_entry(&self, pos: Location) -> Option<LeafEntry> {
        self.leaf_nodes.get(&pos).copied()
    }

    pub fn is_leaf_node(&self, pos: Location) -> bool {
        self.leaf_nodes.contains_key(&pos)
    }

    /// Leaf nodes registered under `key`.
    pub fn leaf_nodes_for(&self, key: TransferKey) -> impl Iterator<Item = Location> + '_ {
        self.index.get(&key).into_iter().flatten().copied()
    }

    /// Every key with at least one leaf node.
    pub fn keys(&self) -> impl Iterator<Item = TransferKey> + '_ {
        self.index.keys().copied()
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    /// Add a member location. Does not touch the leaf-node index.
    pub fn add_node(&mut self, pos: Location) -> bool {
        self.nodes.insert(pos)
    }

    /// Remove a member location. Does not touch the leaf-node index; callers
    /// remove the leaf node separately when `pos` is an endpoint.
    pub fn remove_node(&mut self, pos: Location) -> bool {
        self.nodes.remove(&pos)
    }

    // -----------------------------------------------------------------------
    // Index bookkeeping
    // -----------------------------------------------------------------------

    fn index_insert(&mut self, key: TransferKey, pos: Location) {
        self.index.entry(key).or_default().insert(pos);
    }

    fn index_remove(&mut self, key: TransferKey, pos: Location) {
        if let Some(bucket) = self.index.get_mut(&key) {
            bucket.remove(&pos);
            if bucket.is_empty() {
                self.index.remove(&key);
            }
        }
    }

    /// Record a leaf node without any fan-out. Used when repopulating from a
    /// snapshot, where no endpoint is resident yet.
    pub(crate) fn record_leaf_node(&mut self, pos: Location, entry: LeafEntry) {
        if let Some(previous) = self.leaf_nodes.insert(pos, entry) {
            self.index_remove(previous.key, pos);
        }
        self.index_insert(entry.key, pos);
    }

    /// Drop a leaf node without any fan-out.
    pub(crate) fn forget_leaf_node(&mut self, pos: Location) -> Option<LeafEntry> {
        let entry = self.leaf_nodes.remove(&pos)?;
        self.index_remove(entry.key, pos);
        Some(entry)
    }

    // -----------------------------------------------------------------------
    // Leaf-node lifecycle
    // -----------------------------------------------------------------------

    /// Register an endpoint that was placed or loaded.
    ///
    /// Inserters notify every resident extractor sharing their key.
    /// Extractors drop whatever cache they carried and rebuild it from the
    /// index.
    pub fn add_leaf_node(&mut self, leaf: &mut LeafNode, residents: &mut ResidentLeafNodes) {
        let pos = leaf.location();
        let key = leaf.key();
        self.record_leaf_node(
            pos,
            LeafEntry {
                key,
                mode: leaf.mode(),
            },
        );

        match leaf.mode() {
            LeafNodeMode::Insert => self.load_insert_node(pos, key, leaf.target(), residents),
            LeafNodeMode::Extract => {
                leaf.reset_insert_targets();
                self.load_extract_node(leaf, key, residents);
            }
        }
    }

    /// Unregister an endpoint that was removed or unloaded.
    ///
    /// Inserters ask resident extractors to drop them. Extractors just clear
    /// their own cache.
    pub fn remove_leaf_node(&mut self, leaf: &mut LeafNode, residents: &mut ResidentLeafNodes) {
        let pos = leaf.location();
        let key = self
            .forget_leaf_node(pos)
            .map_or_else(|| leaf.key(), |entry| entry.key);

        match leaf.mode() {
            LeafNodeMode::Insert => self.unload_insert_node(pos, key, residents),
            LeafNodeMode::Extract => leaf.reset_insert_targets(),
        }
    }

    /// Move an endpoint from `old_key` to its current key.
    ///
    /// The index entry moves first, unconditionally. Cache fan-out follows and
    /// only reaches resident partners; anything it misses resyncs on load.
    pub fn on_frequency_change(
        &mut self,
        leaf: &mut LeafNode,
        old_key: TransferKey,
        residents: &mut ResidentLeafNodes,
    ) {
        let pos = leaf.location();
        let new_key = leaf.key();

        self.index_remove(old_key, pos);
        self.index_insert(new_key, pos);
        self.leaf_nodes.insert(
            pos,
            LeafEntry {
                key: new_key,
                mode: leaf.mode(),
            },
        );

        match leaf.mode() {
            LeafNodeMode::Insert => {
                self.unload_insert_node(pos, old_key, residents);
                self.load_insert_node(pos, new_key, leaf.target(), residents);
            }
            LeafNodeMode::Extract => {
                leaf.reset_insert_targets();
                self.load_extract_node(leaf, new_key, residents);
            }
        }
    }

    /// An inserter's capability became available: update matching extractors.
    pub fn on_inserter_target_added(
        &self,
        pos: Location,
        key: TransferKey,
        target: TransferTarget,
        residents: &mut ResidentLeafNodes,
    ) {
        for other in self.leaf_nodes_for(key) {
            if other == pos {
                continue;
            }
            if let Some(extractor) = residents.extractor_mut(other, key.capability) {
                extractor.on_target_added_to_graph(pos, target);
            }
        }
    }

    /// An inserter's capability went away: update matching extractors.
    pub fn on_inserter_target_removed(
        &self,
        pos: Location,
        key: TransferKey,
        residents: &mut ResidentLeafNodes,
    ) {
        for other in self.leaf_nodes_for(key) {
            if other == pos {
                continue;
            }
            if let Some(extractor) = residents.extractor_mut(other, key.capability) {
                extractor.on_target_removed_from_graph(pos);
            }
        }
    }

    /// Rebuild an extractor's cache from the resident inserters under `key`.
    fn load_extract_node(
        &self,
        leaf: &mut LeafNode,
        key: TransferKey,
        residents: &ResidentLeafNodes,
    ) {
        let pos = leaf.location();
        for other in self.leaf_nodes_for(key) {
            if other == pos {
                continue;
            }
            if let Some(inserter) = residents.find(other, LeafNodeMode::Insert, key.capability) {
                leaf.on_leaf_node_added_to_graph(other, inserter.target());
            }
        }
    }

    /// Tell resident extractors under `key` to add the inserter at `pos`.
    fn load_insert_node(
        &self,
        pos: Location,
        key: TransferKey,
        target: Option<TransferTarget>,
        residents: &mut ResidentLeafNodes,
    ) {
        let mut notified = 0usize;
        for other in self.leaf_nodes_for(key) {
            if other == pos {
                continue;
            }
            if let Some(extractor) = residents.extractor_mut(other, key.capability) {
                extractor.on_leaf_node_added_to_graph(pos, target);
                notified += 1;
            }
        }
        tracing::trace!(%pos, ?key, notified, "inserter linked");
    }

    /// Tell resident extractors under `key` to drop the inserter at `pos`.
    fn unload_insert_node(
        &self,
        pos: Location,
        key: TransferKey,
        residents: &mut ResidentLeafNodes,
    ) {
        let mut notified = 0usize;
        for other in self.leaf_nodes_for(key) {
            if other == pos {
                continue;
            }
            if let Some(extractor) = residents.extractor_mut(other, key.capability) {
                extractor.on_leaf_node_removed_from_graph(pos);
                notified += 1;
            }
        }
        tracing::trace!(%pos, ?key, notified, "inserter unlinked");
    }

    // -----------------------------------------------------------------------
    // Bulk operations
    // -----------------------------------------------------------------------

    /// Absorb another network. Plain set and multimap union.
    pub fn merge(&mut self, other: LogisticsNetwork) {
        self.nodes.extend(other.nodes);
        for (pos, entry) in other.leaf_nodes {
            self.record_leaf_node(pos, entry);
        }
    }

    /// Force every resident endpoint to relink.
    ///
    /// All extractor caches are cleared first. Inserter unloads are skipped
    /// because they would only notify extractors that are reset anyway. Then
    /// every resident inserter fans out again, which repopulates every
    /// matching extractor.
    pub fn rebuild_caches(&self, residents: &mut ResidentLeafNodes) {
        for (pos, entry) in &self.leaf_nodes {
            if entry.mode != LeafNodeMode::Extract {
                continue;
            }
            if let Some(extractor) = residents.extractor_mut(*pos, entry.key.capability) {
                extractor.reset_insert_targets();
            }
        }

        for (pos, entry) in &self.leaf_nodes {
            if entry.mode != LeafNodeMode::Insert {
                continue;
            }
            let target = match residents.find(*pos, LeafNodeMode::Insert, entry.key.capability) {
                Some(inserter) => inserter.target(),
                None => continue,
            };
            self.load_insert_node(*pos, entry.key, target, residents);
        }
    }

    /// Split this network along the given components.
    ///
    /// Each component yields a fresh network holding the members, leaf nodes
    /// and index entries that fall inside it. Locations outside every
    /// component are dropped.
    pub fn partition(self, components: &[BTreeSet<Location>]) -> Vec<LogisticsNetwork> {
        components
            .iter()
            .map(|component| {
                let mut network =
                    LogisticsNetwork::with_nodes(component.intersection(&self.nodes).copied());
                for (pos, entry) in &self.leaf_nodes {
                    if component.contains(pos) {
                        network.record_leaf_node(*pos, *entry);
                    }
                }
                network
            })
            .filter(|network| !network.is_empty())
            .collect()
    }

    // -----------------------------------------------------------------------
    // Invariants
    // -----------------------------------------------------------------------

    /// Check that the network is non-empty, `leaf_nodes ⊆ nodes`, and the
    /// index matches the leaf entries exactly.
    pub fn validate(&self) -> Result<(), InvariantError> {
        if self.nodes.is_empty() {
            return Err(InvariantError::Empty);
        }
        for (pos, entry) in &self.leaf_nodes {
            if !self.nodes.contains(pos) {
                return Err(InvariantError::LeafOutsideNetwork(*pos));
            }
            if !self.index.get(&entry.key).is_some_and(|b| b.contains(pos)) {
                return Err(InvariantError::Unindexed(*pos));
            }
        }
        for (key, bucket) in &self.index {
            for pos in bucket {
                if self.leaf_nodes.get(pos).map(|e| e.key) != Some(*key) {
                    return Err(InvariantError::OrphanIndexEntry {
                        pos: *pos,
                        key: *key,
                    });
                }
            }
        }
        Ok(())
    }

    /// Restore `leaf_nodes ⊆ nodes` and re-derive the index from the leaf
    /// entries. Returns `true` if anything changed. Caches are not touched;
    /// callers follow up with [`rebuild_caches`](Self::rebuild_caches).
    pub fn repair(&mut self) -> bool {
        let before = (self.leaf_nodes.len(), self.index.clone());
        let nodes = &self.nodes;
        self.leaf_nodes.retain(|pos, _| nodes.contains(pos));

        let mut index: BTreeMap<TransferKey, BTreeSet<Location>> = BTreeMap::new();
        for (pos, entry) in &self.leaf_nodes {
            index.entry(entry.key).or_default().insert(*pos);
        }
        self.index = index;

        before != (self.leaf_nodes.len(), self.index.clone())
    }

    #[cfg(test)]
    pub(crate) fn corrupt_index(&mut self, key: TransferKey, pos: Location) {
        self.index.entry(key).or_default().insert(pos);
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{CapabilityHandle, CapabilityType, DimensionId};

    fn loc(x: i32) -> Location {
        Location::new(DimensionId(0), x, 0, 0)
    }

    fn key(frequency: i32) -> TransferKey {
        TransferKey::new(CapabilityType::ITEM_HANDLER, frequency)
    }

    fn entry(frequency: i32, mode: LeafNodeMode) -> LeafEntry {
        LeafEntry {
            key: key(frequency),
            mode,
        }
    }

    fn target(x: i32) -> TransferTarget {
        TransferTarget {
            pos: loc(x).offset(0, 1, 0),
            handle: CapabilityHandle(x as u64),
        }
    }

    /// Load an endpoint the way the registry does: take it out, link, put back.
    fn load(network: &mut LogisticsNetwork, residents: &mut ResidentLeafNodes, mut leaf: LeafNode) {
        network.add_node(leaf.location());
        network.add_leaf_node(&mut leaf, residents);
        residents.insert(leaf);
    }

    fn unload(network: &mut LogisticsNetwork, residents: &mut ResidentLeafNodes, pos: Location) {
        let mut leaf = residents.remove(pos).unwrap();
        network.remove_leaf_node(&mut leaf, residents);
    }

    fn partners(residents: &ResidentLeafNodes, pos: Location) -> Vec<Location> {
        residents.get(pos).unwrap().cached_partners().collect()
    }

    // -----------------------------------------------------------------------
    // Test 1: Inserter loaded after extractor is pushed into its cache
    // -----------------------------------------------------------------------
    #[test]
    fn inserter_fans_out_to_existing_extractor() {
        let mut network = LogisticsNetwork::new();
        let mut residents = ResidentLeafNodes::new();

        load(&mut network, &mut residents, LeafNode::extractor(loc(0), key(0)));
        load(
            &mut network,
            &mut residents,
            LeafNode::inserter(loc(1), key(0), Some(target(1))),
        );

        assert_eq!(partners(&residents, loc(0)), vec![loc(1)]);
        assert!(network.validate().is_ok());
    }

    // -----------------------------------------------------------------------
    // Test 2: Extractor loaded after inserter scans the index
    // -----------------------------------------------------------------------
    #[test]
    fn extractor_scans_index_on_load() {
        let mut network = LogisticsNetwork::new();
        let mut residents = ResidentLeafNodes::new();

        load(
            &mut network,
            &mut residents,
            LeafNode::inserter(loc(1), key(0), Some(target(1))),
        );
        load(
            &mut network,
            &mut residents,
            LeafNode::inserter(loc(2), key(5), Some(target(2))),
        );
        load(&mut network, &mut residents, LeafNode::extractor(loc(0), key(0)));

        assert_eq!(partners(&residents, loc(0)), vec![loc(1)]);
    }

    // -----------------------------------------------------------------------
    // Test 3: Different capability types never link
    // -----------------------------------------------------------------------
    #[test]
    fn capability_types_are_isolated() {
        let mut network = LogisticsNetwork::new();
        let mut residents = ResidentLeafNodes::new();
        let fluids = TransferKey::new(CapabilityType::FLUID_HANDLER, 0);

        load(&mut network, &mut residents, LeafNode::extractor(loc(0), key(0)));
        load(&mut network, &mut residents, LeafNode::inserter(loc(1), fluids, None));

        assert!(partners(&residents, loc(0)).is_empty());
        assert_eq!(network.keys().count(), 2);
    }

    // -----------------------------------------------------------------------
    // Test 4: Unloading an inserter removes it from extractor caches
    // -----------------------------------------------------------------------
    #[test]
    fn unload_inserter_fans_out_removal() {
        let mut network = LogisticsNetwork::new();
        let mut residents = ResidentLeafNodes::new();

        load(&mut network, &mut residents, LeafNode::extractor(loc(0), key(0)));
        load(&mut network, &mut residents, LeafNode::inserter(loc(1), key(0), None));
        load(&mut network, &mut residents, LeafNode::inserter(loc(2), key(0), None));

        unload(&mut network, &mut residents, loc(1));

        assert_eq!(partners(&residents, loc(0)), vec![loc(2)]);
        assert!(!network.is_leaf_node(loc(1)));
        assert_eq!(network.leaf_nodes_for(key(0)).count(), 2);
        assert!(network.contains(loc(1)), "membership is untouched by unload");
    }

    // -----------------------------------------------------------------------
    // Test 5: Unloading an extractor clears its own cache only
    // -----------------------------------------------------------------------
    #[test]
    fn unload_extractor_clears_own_cache() {
        let mut network = LogisticsNetwork::new();
        let mut residents = ResidentLeafNodes::new();

        load(&mut network, &mut residents, LeafNode::inserter(loc(1), key(0), None));
        load(&mut network, &mut residents, LeafNode::extractor(loc(0), key(0)));

        let mut leaf = residents.remove(loc(0)).unwrap();
        network.remove_leaf_node(&mut leaf, &mut residents);

        assert_eq!(leaf.cached_partners().count(), 0);
        assert_eq!(network.leaf_nodes_for(key(0)).collect::<Vec<_>>(), vec![loc(1)]);
    }

    // -----------------------------------------------------------------------
    // Test 6: Frequency change moves index entry and caches
    // -----------------------------------------------------------------------
    #[test]
    fn frequency_change_relinks_inserter() {
        let mut network = LogisticsNetwork::new();
        let mut residents = ResidentLeafNodes::new();

        load(&mut network, &mut residents, LeafNode::extractor(loc(0), key(1)));
        load(&mut network, &mut residents, LeafNode::extractor(loc(3), key(2)));
        load(&mut network, &mut residents, LeafNode::inserter(loc(1), key(1), None));

        let mut leaf = residents.remove(loc(1)).unwrap();
        let old = leaf.set_frequency(2);
        network.on_frequency_change(&mut leaf, old, &mut residents);
        residents.insert(leaf);

        assert!(network.leaf_nodes_for(key(1)).all(|p| p != loc(1)));
        assert!(network.leaf_nodes_for(key(2)).any(|p| p == loc(1)));
        assert!(partners(&residents, loc(0)).is_empty());
        assert_eq!(partners(&residents, loc(3)), vec![loc(1)]);
        assert_eq!(network.leaf_entry(loc(1)).unwrap().key, key(2));
        assert!(network.validate().is_ok());
    }

    #[test]
    fn frequency_change_rebuilds_extractor_cache() {
        let mut network = LogisticsNetwork::new();
        let mut residents = ResidentLeafNodes::new();

        load(&mut network, &mut residents, LeafNode::inserter(loc(1), key(1), None));
        load(&mut network, &mut residents, LeafNode::inserter(loc(2), key(2), None));
        load(&mut network, &mut residents, LeafNode::extractor(loc(0), key(1)));

        let mut leaf = residents.remove(loc(0)).unwrap();
        let old = leaf.set_frequency(2);
        network.on_frequency_change(&mut leaf, old, &mut residents);

        assert_eq!(leaf.cached_partners().collect::<Vec<_>>(), vec![loc(2)]);
    }

    // -----------------------------------------------------------------------
    // Test 7: Target availability fans out without touching membership
    // -----------------------------------------------------------------------
    #[test]
    fn inserter_target_toggles_in_extractor_cache() {
        let mut network = LogisticsNetwork::new();
        let mut residents = ResidentLeafNodes::new();

        load(&mut network, &mut residents, LeafNode::extractor(loc(0), key(0)));
        load(&mut network, &mut residents, LeafNode::inserter(loc(1), key(0), None));
        assert_eq!(residents.get(loc(0)).unwrap().insert_targets().count(), 0);

        network.on_inserter_target_added(loc(1), key(0), target(1), &mut residents);
        assert_eq!(residents.get(loc(0)).unwrap().insert_targets().count(), 1);

        network.on_inserter_target_removed(loc(1), key(0), &mut residents);
        assert_eq!(residents.get(loc(0)).unwrap().insert_targets().count(), 0);
        assert_eq!(partners(&residents, loc(0)), vec![loc(1)]);
    }

    // -----------------------------------------------------------------------
    // Test 8: Merge is a plain union
    // -----------------------------------------------------------------------
    #[test]
    fn merge_unions_nodes_and_index() {
        let mut a = LogisticsNetwork::with_nodes([loc(0), loc(1)]);
        a.record_leaf_node(loc(0), entry(0, LeafNodeMode::Extract));
        let mut b = LogisticsNetwork::with_nodes([loc(2)]);
        b.record_leaf_node(loc(2), entry(0, LeafNodeMode::Insert));

        a.merge(b);

        assert_eq!(a.len(), 3);
        assert_eq!(a.leaf_nodes_for(key(0)).collect::<Vec<_>>(), vec![loc(0), loc(2)]);
        assert!(a.validate().is_ok());
    }

    // -----------------------------------------------------------------------
    // Test 9: Rebuild restores caches after a merge
    // -----------------------------------------------------------------------
    #[test]
    fn rebuild_links_partners_across_merged_halves() {
        let mut residents = ResidentLeafNodes::new();
        let mut a = LogisticsNetwork::new();
        let mut b = LogisticsNetwork::new();
        load(&mut a, &mut residents, LeafNode::extractor(loc(0), key(0)));
        load(&mut b, &mut residents, LeafNode::inserter(loc(1), key(0), Some(target(1))));
        assert!(partners(&residents, loc(0)).is_empty());

        a.merge(b);
        a.rebuild_caches(&mut residents);

        assert_eq!(partners(&residents, loc(0)), vec![loc(1)]);
    }

    #[test]
    fn rebuild_skips_unresident_leaf_nodes() {
        let mut residents = ResidentLeafNodes::new();
        let mut network = LogisticsNetwork::with_nodes([loc(0), loc(1)]);
        network.record_leaf_node(loc(1), entry(0, LeafNodeMode::Insert));
        load(&mut network, &mut residents, LeafNode::extractor(loc(0), key(0)));

        network.rebuild_caches(&mut residents);

        assert!(partners(&residents, loc(0)).is_empty());
    }

    // -----------------------------------------------------------------------
    // Test 10: Partition splits nodes, leaf nodes and index
    // -----------------------------------------------------------------------
    #[test]
    fn partition_restricts_each_part() {
        let mut network = LogisticsNetwork::with_nodes([loc(0), loc(1), loc(2)]);
        network.record_leaf_node(loc(0), entry(0, LeafNodeMode::Extract));
        network.record_leaf_node(loc(2), entry(0, LeafNodeMode::Insert));

        let parts = network.partition(&[
            BTreeSet::from([loc(1), loc(2)]),
            BTreeSet::from([loc(0)]),
        ]);

        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].nodes(), &BTreeSet::from([loc(1), loc(2)]));
        assert_eq!(parts[0].leaf_nodes_for(key(0)).collect::<Vec<_>>(), vec![loc(2)]);
        assert_eq!(parts[1].leaf_nodes_for(key(0)).collect::<Vec<_>>(), vec![loc(0)]);
        assert!(parts.iter().all(|p| p.validate().is_ok()));
    }

    // -----------------------------------------------------------------------
    // Test 11: Validation and repair
    // -----------------------------------------------------------------------
    #[test]
    fn empty_network_is_invalid() {
        assert_eq!(LogisticsNetwork::new().validate(), Err(InvariantError::Empty));
    }

    #[test]
    fn leaf_outside_nodes_is_detected_and_repaired() {
        let mut network = LogisticsNetwork::with_nodes([loc(0)]);
        network.record_leaf_node(loc(9), entry(0, LeafNodeMode::Insert));
        assert_eq!(network.validate(), Err(InvariantError::LeafOutsideNetwork(loc(9))));

        assert!(network.repair());
        assert!(network.validate().is_ok());
        assert_eq!(network.leaf_nodes_for(key(0)).count(), 0);
    }

    #[test]
    fn orphan_index_entry_is_detected_and_repaired() {
        let mut network = LogisticsNetwork::with_nodes([loc(0)]);
        network.corrupt_index(key(3), loc(0));
        assert_eq!(
            network.validate(),
            Err(InvariantError::OrphanIndexEntry { pos: loc(0), key: key(3) })
        );

        assert!(network.repair());
        assert!(network.validate().is_ok());
        assert!(!network.repair(), "second repair has nothing to do");
    }
}
