//! The logistics directory for one world session.
//!
//! [`LogisticsRegistry`] owns the wire graph, every network, the mapping from
//! tracked location to owning network, and the set of resident (loaded)
//! endpoints. All structural mutations go through it:
//!
//! - **connect**: merges the endpoints' networks (smaller into larger),
//!   creates a network, or extends one. Never needs a traversal.
//! - **disconnect / remove**: edge removal cannot be resolved incrementally,
//!   so the affected network is flood-filled and split into fresh networks
//!   when it fell apart. Every resulting network rebuilds its caches.
//! - **load / unload / retune**: incremental fan-out through the owning
//!   network.
//!
//! The registry is an ordinary value owned by the session and passed by
//! `&mut`. Every call runs to completion, including cascading cache updates,
//! before it returns.

use crate::config::LogisticsConfig;
use crate::event::{EventBuffer, LogisticsEvent, Ticks};
use crate::id::{CapabilityType, Location, NetworkId};
use crate::leaf::{InsertTarget, LeafNode, LeafNodeMode, ResidentLeafNodes, TransferTarget};
use crate::network::{InvariantError, LeafEntry, LogisticsNetwork};
use crate::wire::WireGraph;
use slotmap::SlotMap;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Transfer tick
// ---------------------------------------------------------------------------

/// Receives every resident extractor once per transfer tick, together with
/// its currently resolved delivery targets. The actual resource movement is
/// up to the implementor.
pub trait TransferHandler {
    fn transfer(&mut self, extractor: &LeafNode, targets: &[InsertTarget]);
}

impl<F> TransferHandler for F
where
    F: FnMut(&LeafNode, &[InsertTarget]),
{
    fn transfer(&mut self, extractor: &LeafNode, targets: &[InsertTarget]) {
        self(extractor, targets)
    }
}

/// Summary of one transfer tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: Ticks,
    /// Extractors handed to the handler.
    pub extractors: usize,
    /// Total resolved targets offered across all extractors.
    pub targets: usize,
    /// Networks repaired before the tick (only with `validate_each_tick`).
    pub repaired: usize,
}

// ---------------------------------------------------------------------------
// LogisticsRegistry
// ---------------------------------------------------------------------------

/// Directory of all logistics networks in one world session.
#[derive(Debug, Clone)]
pub struct LogisticsRegistry {
    pub(crate) config: LogisticsConfig,
    pub(crate) wires: WireGraph,
    pub(crate) networks: SlotMap<NetworkId, LogisticsNetwork>,
    /// Tracked location -> owning network. Networks partition this key set.
    pub(crate) membership: BTreeMap<Location, NetworkId>,
    pub(crate) residents: ResidentLeafNodes,
    /// Networks whose caches must be rebuilt before their next use.
    pub(crate) pending_rebuild: BTreeSet<NetworkId>,
    pub(crate) events: EventBuffer,
    pub(crate) tick: Ticks,
}

impl Default for LogisticsRegistry {
    fn default() -> Self {
        Self::new(LogisticsConfig::default())
    }
}

impl LogisticsRegistry {
    pub fn new(config: LogisticsConfig) -> Self {
        Self {
            events: EventBuffer::new(config.event_capacity),
            config,
            wires: WireGraph::new(),
            networks: SlotMap::with_key(),
            membership: BTreeMap::new(),
            residents: ResidentLeafNodes::new(),
            pending_rebuild: BTreeSet::new(),
            tick: 0,
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn config(&self) -> &LogisticsConfig {
        &self.config
    }

    pub fn wires(&self) -> &WireGraph {
        &self.wires
    }

    pub fn residents(&self) -> &ResidentLeafNodes {
        &self.residents
    }

    /// Number of completed transfer ticks.
    pub fn current_tick(&self) -> Ticks {
        self.tick
    }

    pub fn network_of(&self, pos: Location) -> Option<NetworkId> {
        self.membership.get(&pos).copied()
    }

    pub fn network(&self, id: NetworkId) -> Option<&LogisticsNetwork> {
        self.networks.get(id)
    }

    /// The network `pos` belongs to, if it is tracked.
    pub fn network_at(&self, pos: Location) -> Option<&LogisticsNetwork> {
        self.network_of(pos).and_then(|id| self.networks.get(id))
    }

    pub fn networks(&self) -> impl Iterator<Item = (NetworkId, &LogisticsNetwork)> {
        self.networks.iter()
    }

    pub fn network_count(&self) -> usize {
        self.networks.len()
    }

    pub fn is_tracked(&self, pos: Location) -> bool {
        self.membership.contains_key(&pos)
    }

    pub fn tracked_count(&self) -> usize {
        self.membership.len()
    }

    /// Whether `id` is waiting for a lazy cache rebuild.
    pub fn is_rebuild_pending(&self, id: NetworkId) -> bool {
        self.pending_rebuild.contains(&id)
    }

    /// The resident endpoint at `pos`, of any mode.
    pub fn leaf_node(&self, pos: Location) -> Option<&LeafNode> {
        self.residents.get(pos)
    }

    /// The resident endpoint at `pos` with the given mode and capability type.
    ///
    /// `None` is a normal answer: the partner may simply not be loaded yet.
    pub fn get_leaf_node(
        &self,
        pos: Location,
        mode: LeafNodeMode,
        capability: CapabilityType,
    ) -> Option<&LeafNode> {
        self.residents.find(pos, mode, capability)
    }

    /// Buffered events, oldest first.
    pub fn events(&self) -> impl Iterator<Item = &LogisticsEvent> {
        self.events.iter()
    }

    /// Remove and return all buffered events, oldest first.
    pub fn drain_events(&mut self) -> Vec<LogisticsEvent> {
        self.events.drain()
    }

    /// Events evicted from the buffer before they were drained.
    pub fn events_dropped(&self) -> u64 {
        self.events.dropped()
    }

    fn emit(&mut self, event: LogisticsEvent) {
        if self.config.record_events {
            self.events.push(event);
        }
    }

    // -----------------------------------------------------------------------
    // Network bookkeeping
    // -----------------------------------------------------------------------

    /// Register a network and point its members at it. No event is emitted.
    pub(crate) fn insert_network(&mut self, network: LogisticsNetwork) -> NetworkId {
        let members: Vec<Location> = network.nodes().iter().copied().collect();
        let id = self.networks.insert(network);
        for pos in members {
            self.membership.insert(pos, id);
        }
        id
    }

    fn create_network(&mut self, nodes: impl IntoIterator<Item = Location>) -> NetworkId {
        let id = self.insert_network(LogisticsNetwork::with_nodes(nodes));
        trace!(network = ?id, "network created");
        self.emit(LogisticsEvent::NetworkCreated {
            network: id,
            tick: self.tick,
        });
        id
    }

    /// Unregister a network and clear the membership entries pointing at it.
    fn take_network(&mut self, id: NetworkId) -> Option<LogisticsNetwork> {
        let network = self.networks.remove(id)?;
        for pos in network.nodes() {
            if self.membership.get(pos) == Some(&id) {
                self.membership.remove(pos);
            }
        }
        self.pending_rebuild.remove(&id);
        Some(network)
    }

    /// Add an untracked location to an existing network.
    fn join_network(&mut self, id: NetworkId, pos: Location) {
        if let Some(network) = self.networks.get_mut(id) {
            network.add_node(pos);
            self.membership.insert(pos, id);
        }
    }

    /// Ensure `pos` is tracked, creating a single-location network if needed.
    pub fn track(&mut self, pos: Location) -> NetworkId {
        match self.network_of(pos) {
            Some(id) => id,
            None => self.create_network([pos]),
        }
    }

    /// Merge two distinct networks, keeping the larger one. Returns the
    /// surviving id.
    pub(crate) fn merge_networks(&mut self, x: NetworkId, y: NetworkId) -> NetworkId {
        let x_len = self.networks.get(x).map_or(0, LogisticsNetwork::len);
        let y_len = self.networks.get(y).map_or(0, LogisticsNetwork::len);
        let (into, absorbed) = if x_len >= y_len { (x, y) } else { (y, x) };

        let Some(other) = self.networks.remove(absorbed) else {
            return into;
        };
        // Caches only change if both halves had endpoints to link.
        let needs_relink = other.leaf_node_count() > 0
            && self
                .networks
                .get(into)
                .is_some_and(|n| n.leaf_node_count() > 0);

        for pos in other.nodes() {
            self.membership.insert(*pos, into);
        }
        if self.pending_rebuild.remove(&absorbed) {
            self.pending_rebuild.insert(into);
        }
        if let Some(network) = self.networks.get_mut(into) {
            network.merge(other);
        }

        debug!(into = ?into, absorbed = ?absorbed, needs_relink, "networks merged");
        self.emit(LogisticsEvent::NetworksMerged {
            into,
            absorbed,
            tick: self.tick,
        });

        if needs_relink {
            self.rebuild_network(into);
        }
        into
    }

    /// Re-partition a network by wire connectivity.
    ///
    /// If it is still one component nothing happens and `[id]` is returned.
    /// Otherwise the original is discarded, one fresh network is created per
    /// component, and each rebuilds its caches so no extractor keeps a
    /// partner that is now in a foreign network.
    pub(crate) fn split_network(&mut self, id: NetworkId) -> Vec<NetworkId> {
        let components = match self.networks.get(id) {
            Some(network) => self.wires.components(network.nodes()),
            None => return Vec::new(),
        };
        if components.len() <= 1 {
            return vec![id];
        }
        let Some(network) = self.take_network(id) else {
            return Vec::new();
        };

        let parts: Vec<NetworkId> = network
            .partition(&components)
            .into_iter()
            .map(|part| self.insert_network(part))
            .collect();

        debug!(from = ?id, parts = parts.len(), "network split");
        self.emit(LogisticsEvent::NetworkSplit {
            from: id,
            into: parts.clone(),
            tick: self.tick,
        });

        for part in &parts {
            self.rebuild_network(*part);
        }
        parts
    }

    fn rebuild_network(&mut self, id: NetworkId) {
        let Some(network) = self.networks.get(id) else {
            return;
        };
        network.rebuild_caches(&mut self.residents);
        self.pending_rebuild.remove(&id);

        trace!(network = ?id, "caches rebuilt");
        self.emit(LogisticsEvent::CachesRebuilt {
            network: id,
            tick: self.tick,
        });
    }

    /// Rebuild every endpoint cache of one network now. Returns `false` if
    /// the network does not exist.
    pub fn rebuild_caches(&mut self, id: NetworkId) -> bool {
        if !self.networks.contains_key(id) {
            return false;
        }
        self.rebuild_network(id);
        true
    }

    /// Perform every deferred cache rebuild. Returns how many ran.
    pub fn flush_pending_rebuilds(&mut self) -> usize {
        let pending = std::mem::take(&mut self.pending_rebuild);
        let count = pending.len();
        for id in pending {
            self.rebuild_network(id);
        }
        count
    }

    // -----------------------------------------------------------------------
    // Wires
    // -----------------------------------------------------------------------

    /// Wire `a` to `b` and unify their networks.
    ///
    /// Returns `false` (and changes nothing) if the wire already exists.
    pub fn connect(&mut self, a: Location, b: Location) -> bool {
        if !self.wires.connect(a, b) {
            return false;
        }

        match (self.network_of(a), self.network_of(b)) {
            (Some(x), Some(y)) if x == y => {
                trace!(%a, %b, "wire closes a cycle");
            }
            (Some(x), Some(y)) => {
                self.merge_networks(x, y);
            }
            (Some(x), None) => self.join_network(x, b),
            (None, Some(y)) => self.join_network(y, a),
            (None, None) => {
                self.create_network([a, b]);
            }
        }
        true
    }

    /// Remove the wire between `a` and `b`, splitting the network if it no
    /// longer holds together.
    ///
    /// Returns `false` (and changes nothing) if there was no such wire.
    pub fn disconnect(&mut self, a: Location, b: Location) -> bool {
        if !self.wires.disconnect(a, b) {
            return false;
        }

        let (Some(x), Some(y)) = (self.network_of(a), self.network_of(b)) else {
            warn!(%a, %b, "removed wire had an untracked end");
            return true;
        };
        if x != y {
            warn!(%a, %b, "removed wire crossed two networks");
            self.split_network(x);
            self.split_network(y);
            return true;
        }

        let still_connected = self
            .networks
            .get(x)
            .is_some_and(|network| self.wires.flood_fill(a, Some(network.nodes())).contains(&b));
        if still_connected {
            trace!(%a, %b, "network still connected after wire removal");
        } else {
            self.split_network(x);
        }
        true
    }

    /// Destroy the wire-holding block at `pos`.
    ///
    /// Unloads its endpoint (with fan-out), drops its leaf entry and every
    /// wire touching it, and re-partitions what is left of its network. The
    /// network is deleted if `pos` was its last member. Returns the number of
    /// wires removed.
    pub fn remove(&mut self, pos: Location) -> usize {
        if self.residents.contains(pos) {
            self.unload_leaf_node(pos);
        }
        // A dead end cannot disconnect the rest of a connected network.
        let may_split = self.wires.degree(pos) > 1;
        let removed = self.wires.remove_all(pos);

        let Some(id) = self.membership.remove(&pos) else {
            return removed;
        };
        let now_empty = match self.networks.get_mut(id) {
            Some(network) => {
                network.forget_leaf_node(pos);
                network.remove_node(pos);
                network.is_empty()
            }
            None => false,
        };

        if now_empty {
            self.take_network(id);
            debug!(network = ?id, %pos, "network removed");
            self.emit(LogisticsEvent::NetworkRemoved {
                network: id,
                tick: self.tick,
            });
        } else if may_split {
            self.split_network(id);
        } else {
            trace!(network = ?id, %pos, "dead end removed");
        }
        removed
    }

    // -----------------------------------------------------------------------
    // Resident endpoints
    // -----------------------------------------------------------------------

    /// Register a placed or loaded endpoint and link it into its network.
    ///
    /// An untracked location becomes a single-location network. An endpoint
    /// already resident at the same location is unloaded first.
    pub fn load_leaf_node(&mut self, mut leaf: LeafNode) -> NetworkId {
        let pos = leaf.location();
        if self.residents.contains(pos) {
            debug!(%pos, "replacing resident leaf node");
            self.unload_leaf_node(pos);
        }

        let id = self.track(pos);
        if let Some(network) = self.networks.get_mut(id) {
            network.add_leaf_node(&mut leaf, &mut self.residents);
        }
        trace!(%pos, mode = ?leaf.mode(), key = ?leaf.key(), "leaf node loaded");
        self.residents.insert(leaf);
        id
    }

    /// Deregister a resident endpoint, returning it.
    ///
    /// Collaborators must call this before the endpoint becomes
    /// inaccessible; the location stays a network member.
    pub fn unload_leaf_node(&mut self, pos: Location) -> Option<LeafNode> {
        let mut leaf = self.residents.remove(pos)?;
        match self
            .membership
            .get(&pos)
            .and_then(|id| self.networks.get_mut(*id))
        {
            Some(network) => network.remove_leaf_node(&mut leaf, &mut self.residents),
            None => {
                warn!(%pos, "resident leaf node had no network");
                leaf.reset_insert_targets();
            }
        }
        trace!(%pos, "leaf node unloaded");
        Some(leaf)
    }

    /// Retune a resident endpoint. Returns `false` if nothing is resident at
    /// `pos` or the frequency is unchanged.
    pub fn set_frequency(&mut self, pos: Location, frequency: i32) -> bool {
        let Some(mut leaf) = self.residents.remove(pos) else {
            return false;
        };
        if leaf.frequency() == frequency {
            self.residents.insert(leaf);
            return false;
        }

        let old_key = leaf.set_frequency(frequency);
        match self
            .membership
            .get(&pos)
            .and_then(|id| self.networks.get_mut(*id))
        {
            Some(network) => network.on_frequency_change(&mut leaf, old_key, &mut self.residents),
            None => warn!(%pos, "retuned leaf node had no network"),
        }
        debug!(%pos, from = old_key.frequency, to = frequency, "frequency changed");
        self.residents.insert(leaf);
        true
    }

    /// An inserter's capability became available.
    pub fn set_insert_target(&mut self, pos: Location, target: TransferTarget) -> bool {
        self.update_insert_target(pos, Some(target))
    }

    /// An inserter's capability went away.
    pub fn clear_insert_target(&mut self, pos: Location) -> bool {
        self.update_insert_target(pos, None)
    }

    fn update_insert_target(&mut self, pos: Location, target: Option<TransferTarget>) -> bool {
        let Some(leaf) = self.residents.get_mut(pos) else {
            return false;
        };
        if !leaf.set_target(target) {
            return false;
        }
        let key = leaf.key();

        let Some(network) = self
            .membership
            .get(&pos)
            .and_then(|id| self.networks.get(*id))
        else {
            return true;
        };
        match target {
            Some(target) => network.on_inserter_target_added(pos, key, target, &mut self.residents),
            None => network.on_inserter_target_removed(pos, key, &mut self.residents),
        }
        true
    }

    /// Resolved delivery targets of the extractor at `pos`, performing any
    /// deferred rebuild of its network first.
    pub fn insert_targets(&mut self, pos: Location) -> Vec<InsertTarget> {
        if let Some(id) = self.network_of(pos) {
            if self.pending_rebuild.contains(&id) {
                self.rebuild_network(id);
            }
        }
        self.residents
            .get(pos)
            .map(|leaf| leaf.insert_targets().collect())
            .unwrap_or_default()
    }

    /// Run one transfer tick: flush deferred rebuilds, optionally validate,
    /// then hand every resident extractor and its targets to `handler`.
    pub fn tick<H: TransferHandler>(&mut self, handler: &mut H) -> TickReport {
        self.flush_pending_rebuilds();
        let repaired = if self.config.validate_each_tick {
            self.check_and_repair()
        } else {
            0
        };

        let mut report = TickReport {
            tick: self.tick,
            repaired,
            ..TickReport::default()
        };
        let mut targets = Vec::new();
        for extractor in self.residents.extractors() {
            targets.clear();
            targets.extend(extractor.insert_targets());
            handler.transfer(extractor, &targets);
            report.extractors += 1;
            report.targets += targets.len();
        }

        self.tick += 1;
        report
    }

    // -----------------------------------------------------------------------
    // Invariants
    // -----------------------------------------------------------------------

    fn validate_network(&self, id: NetworkId) -> Result<(), InvariantError> {
        let Some(network) = self.networks.get(id) else {
            return Ok(());
        };
        network.validate()?;

        for pos in network.nodes() {
            if self.membership.get(pos) != Some(&id) {
                return Err(InvariantError::Untracked(*pos));
            }
            if let Some(leaf) = self.residents.get(*pos) {
                let recorded = network.leaf_entry(*pos);
                if recorded
                    != Some(LeafEntry {
                        key: leaf.key(),
                        mode: leaf.mode(),
                    })
                {
                    return Err(InvariantError::StaleLeafEntry(*pos));
                }
            }
        }

        let components = self.wires.components(network.nodes()).len();
        if components > 1 {
            return Err(InvariantError::Disconnected(components));
        }
        Ok(())
    }

    /// Check the partition, index and membership invariants of the whole
    /// registry.
    pub fn validate(&self) -> Result<(), InvariantError> {
        for id in self.networks.keys() {
            self.validate_network(id)?;
        }
        for (pos, id) in &self.membership {
            if !self.networks.get(*id).is_some_and(|n| n.contains(*pos)) {
                return Err(InvariantError::MembershipMismatch(*pos));
            }
        }
        for (a, b) in self.wires.edges() {
            if self.network_of(a) != self.network_of(b) {
                return Err(InvariantError::CrossNetworkWire(a, b));
            }
        }
        for leaf in self.residents.iter() {
            if !self.is_tracked(leaf.location()) {
                return Err(InvariantError::MembershipMismatch(leaf.location()));
            }
        }
        Ok(())
    }

    /// Validate every network and repair the broken ones. Returns how many
    /// networks were repaired.
    pub fn check_and_repair(&mut self) -> usize {
        let ids: Vec<NetworkId> = self.networks.keys().collect();
        let mut repaired = 0;
        for id in ids {
            if let Err(error) = self.validate_network(id) {
                self.repair_network(id, &error);
                repaired += 1;
            }
        }

        let networks = &self.networks;
        self.membership
            .retain(|pos, id| networks.get(*id).is_some_and(|n| n.contains(*pos)));
        repaired
    }

    fn repair_network(&mut self, id: NetworkId, error: &InvariantError) {
        warn!(network = ?id, %error, "repairing logistics network");
        let members: Vec<Location> = match self.networks.get(id) {
            Some(network) => network.nodes().iter().copied().collect(),
            None => return,
        };

        // Claim every member back from any other network that lists it.
        for pos in &members {
            if let Some(previous) = self.membership.insert(*pos, id) {
                if previous == id {
                    continue;
                }
                let now_empty = match self.networks.get_mut(previous) {
                    Some(other) => {
                        other.forget_leaf_node(*pos);
                        other.remove_node(*pos);
                        other.is_empty()
                    }
                    None => false,
                };
                if now_empty {
                    self.take_network(previous);
                    self.emit(LogisticsEvent::NetworkRemoved {
                        network: previous,
                        tick: self.tick,
                    });
                }
            }
        }

        if let Some(network) = self.networks.get_mut(id) {
            network.repair();
            for pos in &members {
                if let Some(leaf) = self.residents.get(*pos) {
                    network.record_leaf_node(
                        *pos,
                        LeafEntry {
                            key: leaf.key(),
                            mode: leaf.mode(),
                        },
                    );
                }
            }
        }

        self.emit(LogisticsEvent::InvariantRepaired {
            network: id,
            reason: error.to_string(),
            tick: self.tick,
        });

        let parts = self.split_network(id);
        if parts == [id] {
            self.rebuild_network(id);
        }
    }

    #[cfg(test)]
    pub(crate) fn network_mut(&mut self, id: NetworkId) -> Option<&mut LogisticsNetwork> {
        self.networks.get_mut(id)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
