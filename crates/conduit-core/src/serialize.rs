//! Persistence for the logistics registry.
//!
//! Only structure is stored: the wire graph plus, per network, its member
//! locations and leaf-node entries. Endpoint caches and the resident set are
//! runtime state; collaborators reload endpoints after a restore and caches
//! are rebuilt (lazily by default) from the restored index.
//!
//! Snapshots are encoded with `bitcode` behind a versioned header.

use crate::config::LogisticsConfig;
use crate::event::Ticks;
use crate::id::{Location, TransferKey};
use crate::leaf::LeafNodeMode;
use crate::network::{LeafEntry, LogisticsNetwork};
use crate::registry::LogisticsRegistry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number identifying a logistics registry snapshot.
pub const SNAPSHOT_MAGIC: u32 = 0xC0DE_0001;

/// Current format version. Increment when breaking the wire format.
pub const FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during serialization.
#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
}

/// Errors that can occur during deserialization or restore.
#[derive(Debug, thiserror::Error)]
pub enum DeserializeError {
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", SNAPSHOT_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("snapshot from future version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
    #[error("location {0} is stored in more than one network")]
    DuplicateLocation(Location),
    #[error("leaf node {0} is not a member of its stored network")]
    LeafOutsideNetwork(Location),
    #[error("wire endpoint {0} does not belong to any stored network")]
    UntrackedWireEndpoint(Location),
}

// ---------------------------------------------------------------------------
// Snapshot header
// ---------------------------------------------------------------------------

/// Header prepended to every serialized snapshot. Enables format detection
/// and version checking before the payload is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub magic: u32,
    pub version: u32,
    /// Transfer tick count at the time the snapshot was taken.
    pub tick: Ticks,
}

impl SnapshotHeader {
    pub fn new(tick: Ticks) -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: FORMAT_VERSION,
            tick,
        }
    }

    pub fn validate(&self) -> Result<(), DeserializeError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(DeserializeError::InvalidMagic(self.magic));
        }
        if self.version > FORMAT_VERSION {
            return Err(DeserializeError::FutureVersion(self.version));
        }
        if self.version < FORMAT_VERSION {
            return Err(DeserializeError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Persisted form
// ---------------------------------------------------------------------------

/// One stored leaf-node entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafNodeRecord {
    pub location: Location,
    pub key: TransferKey,
    pub mode: LeafNodeMode,
}

/// One stored network: members plus leaf-node entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub nodes: Vec<Location>,
    pub leaf_nodes: Vec<LeafNodeRecord>,
}

impl NetworkSnapshot {
    fn capture(network: &LogisticsNetwork) -> Self {
        Self {
            nodes: network.nodes().iter().copied().collect(),
            leaf_nodes: network
                .leaf_nodes()
                .map(|(location, entry)| LeafNodeRecord {
                    location,
                    key: entry.key,
                    mode: entry.mode,
                })
                .collect(),
        }
    }
}

/// The complete persisted state of a [`LogisticsRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogisticsSnapshot {
    pub header: SnapshotHeader,
    /// Every wire once, as `(lower, higher)`.
    pub wires: Vec<(Location, Location)>,
    pub networks: Vec<NetworkSnapshot>,
}

impl LogisticsSnapshot {
    pub fn serialize(&self) -> Result<Vec<u8>, SerializeError> {
        bitcode::serialize(self).map_err(|e| SerializeError::Encode(e.to_string()))
    }

    /// Decode a snapshot and validate its header.
    pub fn deserialize(data: &[u8]) -> Result<Self, DeserializeError> {
        let snapshot: LogisticsSnapshot =
            bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))?;
        snapshot.header.validate()?;
        Ok(snapshot)
    }
}

// ---------------------------------------------------------------------------
// Registry persistence
// ---------------------------------------------------------------------------

impl LogisticsRegistry {
    /// Capture the persisted form of every network and wire.
    pub fn snapshot(&self) -> LogisticsSnapshot {
        LogisticsSnapshot {
            header: SnapshotHeader::new(self.tick),
            wires: self.wires.edges().collect(),
            networks: self
                .networks
                .values()
                .map(NetworkSnapshot::capture)
                .collect(),
        }
    }

    /// Rebuild a registry from a snapshot.
    ///
    /// No endpoint is resident afterwards. Each restored network is marked
    /// for a cache rebuild, which runs on first use when
    /// `lazy_restore_rebuild` is set and immediately otherwise. Stored
    /// networks that a wire joins are merged, and stored networks that are
    /// not wire-connected are split, so the restored registry always
    /// satisfies the partition invariant.
    pub fn restore(
        snapshot: LogisticsSnapshot,
        config: LogisticsConfig,
    ) -> Result<Self, DeserializeError> {
        snapshot.header.validate()?;
        let mut registry = LogisticsRegistry::new(config);
        registry.tick = snapshot.header.tick;

        for stored in snapshot.networks {
            if stored.nodes.is_empty() {
                warn!("skipping stored network without members");
                continue;
            }
            let mut network = LogisticsNetwork::with_nodes(stored.nodes.iter().copied());
            for pos in &stored.nodes {
                if registry.membership.contains_key(pos) {
                    return Err(DeserializeError::DuplicateLocation(*pos));
                }
            }
            for record in stored.leaf_nodes {
                if !network.contains(record.location) {
                    return Err(DeserializeError::LeafOutsideNetwork(record.location));
                }
                network.record_leaf_node(
                    record.location,
                    LeafEntry {
                        key: record.key,
                        mode: record.mode,
                    },
                );
            }
            registry.insert_network(network);
        }

        for (a, b) in &snapshot.wires {
            for end in [a, b] {
                if !registry.membership.contains_key(end) {
                    return Err(DeserializeError::UntrackedWireEndpoint(*end));
                }
            }
            registry.wires.connect(*a, *b);
        }

        // Stored partition disagrees with the wires: merge first, then split.
        for (a, b) in &snapshot.wires {
            if let (Some(x), Some(y)) = (registry.network_of(*a), registry.network_of(*b)) {
                if x != y {
                    warn!(%a, %b, "stored wire joins two networks");
                    registry.merge_networks(x, y);
                }
            }
        }
        let ids: Vec<_> = registry.networks.keys().collect();
        for id in ids {
            registry.split_network(id);
        }

        let ids: BTreeSet<_> = registry.networks.keys().collect();
        debug!(
            networks = ids.len(),
            wires = registry.wires.edge_count(),
            lazy = registry.config.lazy_restore_rebuild,
            "registry restored"
        );
        registry.pending_rebuild = ids;
        if !registry.config.lazy_restore_rebuild {
            registry.flush_pending_rebuilds();
        }
        Ok(registry)
    }

    /// Serialize the registry to a binary blob via bitcode.
    pub fn serialize(&self) -> Result<Vec<u8>, SerializeError> {
        self.snapshot().serialize()
    }

    /// Deserialize and restore a registry from a binary blob.
    pub fn deserialize(data: &[u8], config: LogisticsConfig) -> Result<Self, DeserializeError> {
        Self::restore(LogisticsSnapshot::deserialize(data)?, config)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
