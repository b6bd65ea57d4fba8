//! Leaf-node endpoints: the network members that actually move resources.
//!
//! An endpoint is either an extractor or an inserter. Extractors keep a cache
//! of the inserters they can currently deliver to, so the transfer tick never
//! has to query the network. The cache is maintained by fan-out notifications
//! from [`LogisticsNetwork`](crate::network::LogisticsNetwork); a stale cache
//! only costs missed transfers until the next reload, never a transfer into a
//! foreign network.

use crate::id::{CapabilityHandle, CapabilityType, Location, TransferKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Mode and targets
// ---------------------------------------------------------------------------

/// Whether an endpoint pulls resources out of or pushes resources into the
/// block it is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LeafNodeMode {
    Extract,
    Insert,
}

/// A resolved capability on the block an inserter delivers into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferTarget {
    /// The block receiving resources (usually adjacent to the inserter).
    pub pos: Location,
    /// Collaborator-issued handle to the block's capability.
    pub handle: CapabilityHandle,
}

/// One resolved delivery option, as seen by an extractor during the tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InsertTarget {
    /// Location of the inserter endpoint.
    pub endpoint: Location,
    pub target: TransferTarget,
}

/// Mode-specific state of an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeafNodeState {
    /// Cached inserters sharing this extractor's key and network. An entry
    /// with `None` is a known partner whose capability is not available.
    Extract {
        insert_targets: BTreeMap<Location, Option<TransferTarget>>,
    },
    Insert { target: Option<TransferTarget> },
}

// ---------------------------------------------------------------------------
// LeafNode
// ---------------------------------------------------------------------------

/// An endpoint attached to a location by the block-lifecycle collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafNode {
    location: Location,
    key: TransferKey,
    state: LeafNodeState,
}

impl LeafNode {
    /// A new extractor with an empty partner cache.
    pub fn extractor(location: Location, key: TransferKey) -> Self {
        Self {
            location,
            key,
            state: LeafNodeState::Extract {
                insert_targets: BTreeMap::new(),
            },
        }
    }

    /// A new inserter, optionally with its capability already resolved.
    pub fn inserter(location: Location, key: TransferKey, target: Option<TransferTarget>) -> Self {
        Self {
            location,
            key,
            state: LeafNodeState::Insert { target },
        }
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn key(&self) -> TransferKey {
        self.key
    }

    pub fn capability(&self) -> CapabilityType {
        self.key.capability
    }

    pub fn frequency(&self) -> i32 {
        self.key.frequency
    }

    pub fn mode(&self) -> LeafNodeMode {
        match self.state {
            LeafNodeState::Extract { .. } => LeafNodeMode::Extract,
            LeafNodeState::Insert { .. } => LeafNodeMode::Insert,
        }
    }

    pub fn state(&self) -> &LeafNodeState {
        &self.state
    }

    /// Whether this endpoint matches a lookup by mode and capability type.
    pub fn matches(&self, mode: LeafNodeMode, capability: CapabilityType) -> bool {
        self.mode() == mode && self.capability() == capability
    }

    /// Retune the endpoint. Returns the previous key.
    ///
    /// Only the registry calls this, so the network index moves with it.
    pub(crate) fn set_frequency(&mut self, frequency: i32) -> TransferKey {
        let old = self.key;
        self.key = old.with_frequency(frequency);
        old
    }

    /// The resolved delivery target of an inserter. Always `None` for extractors.
    pub fn target(&self) -> Option<TransferTarget> {
        match self.state {
            LeafNodeState::Insert { target } => target,
            LeafNodeState::Extract { .. } => None,
        }
    }

    /// Set or clear an inserter's target. Returns `false` for extractors.
    pub(crate) fn set_target(&mut self, new_target: Option<TransferTarget>) -> bool {
        match &mut self.state {
            LeafNodeState::Insert { target } => {
                *target = new_target;
                true
            }
            LeafNodeState::Extract { .. } => false,
        }
    }

    // -----------------------------------------------------------------------
    // Extractor cache protocol. All of these are no-ops on inserters.
    // -----------------------------------------------------------------------

    /// A matching inserter joined the network (or was loaded).
    pub fn on_leaf_node_added_to_graph(&mut self, pos: Location, target: Option<TransferTarget>) {
        if let LeafNodeState::Extract { insert_targets } = &mut self.state {
            insert_targets.insert(pos, target);
        }
    }

    /// A matching inserter left the network (or was unloaded).
    pub fn on_leaf_node_removed_from_graph(&mut self, pos: Location) {
        if let LeafNodeState::Extract { insert_targets } = &mut self.state {
            insert_targets.remove(&pos);
        }
    }

    /// A cached inserter's capability became available.
    pub fn on_target_added_to_graph(&mut self, pos: Location, target: TransferTarget) {
        if let LeafNodeState::Extract { insert_targets } = &mut self.state {
            insert_targets.insert(pos, Some(target));
        }
    }

    /// A cached inserter's capability went away; the inserter stays a partner.
    pub fn on_target_removed_from_graph(&mut self, pos: Location) {
        if let LeafNodeState::Extract { insert_targets } = &mut self.state {
            if let Some(slot) = insert_targets.get_mut(&pos) {
                *slot = None;
            }
        }
    }

    /// Drop the whole cache without notifying anyone.
    pub fn reset_insert_targets(&mut self) {
        if let LeafNodeState::Extract { insert_targets } = &mut self.state {
            insert_targets.clear();
        }
    }

    /// Every cached inserter location, resolved or not.
    pub fn cached_partners(&self) -> impl Iterator<Item = Location> + '_ {
        let cache = match &self.state {
            LeafNodeState::Extract { insert_targets } => Some(insert_targets),
            LeafNodeState::Insert { .. } => None,
        };
        cache.into_iter().flat_map(|c| c.keys().copied())
    }

    /// Cached inserters whose capability is currently resolved.
    pub fn insert_targets(&self) -> impl Iterator<Item = InsertTarget> + '_ {
        let cache = match &self.state {
            LeafNodeState::Extract { insert_targets } => Some(insert_targets),
            LeafNodeState::Insert { .. } => None,
        };
        cache.into_iter().flat_map(|c| {
            c.iter().filter_map(|(endpoint, target)| {
                target.map(|target| InsertTarget {
                    endpoint: *endpoint,
                    target,
                })
            })
        })
    }
}

// ---------------------------------------------------------------------------
// Resident endpoints
// ---------------------------------------------------------------------------

/// Endpoints currently loaded in the simulation, keyed by location.
///
/// Endpoints that exist structurally but are not loaded are absent here and
/// are skipped by every fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResidentLeafNodes {
    nodes: BTreeMap<Location, LeafNode>,
}

impl ResidentLeafNodes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an endpoint, returning any previous one at the same location.
    pub fn insert(&mut self, leaf: LeafNode) -> Option<LeafNode> {
        self.nodes.insert(leaf.location(), leaf)
    }

    pub fn remove(&mut self, pos: Location) -> Option<LeafNode> {
        self.nodes.remove(&pos)
    }

    pub fn get(&self, pos: Location) -> Option<&LeafNode> {
        self.nodes.get(&pos)
    }

    pub fn get_mut(&mut self, pos: Location) -> Option<&mut LeafNode> {
        self.nodes.get_mut(&pos)
    }

    /// The resident endpoint at `pos` if it has the given mode and capability.
    pub fn find(
        &self,
        pos: Location,
        mode: LeafNodeMode,
        capability: CapabilityType,
    ) -> Option<&LeafNode> {
        self.nodes
            .get(&pos)
            .filter(|leaf| leaf.matches(mode, capability))
    }

    /// Mutable variant of [`find`](Self::find).
    pub fn find_mut(
        &mut self,
        pos: Location,
        mode: LeafNodeMode,
        capability: CapabilityType,
    ) -> Option<&mut LeafNode> {
        self.nodes
            .get_mut(&pos)
            .filter(|leaf| leaf.matches(mode, capability))
    }

    /// The resident extractor at `pos` handling `capability`, if any.
    pub fn extractor_mut(
        &mut self,
        pos: Location,
        capability: CapabilityType,
    ) -> Option<&mut LeafNode> {
        self.find_mut(pos, LeafNodeMode::Extract, capability)
    }

    pub fn contains(&self, pos: Location) -> bool {
        self.nodes.contains_key(&pos)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LeafNode> {
        self.nodes.values()
    }

    /// Resident extractors in location order.
    pub fn extractors(&self) -> impl Iterator<Item = &LeafNode> {
        self.nodes
            .values()
            .filter(|leaf| leaf.mode() == LeafNodeMode::Extract)
    }
}
