//! Conduit Core -- the logistics network graph engine.
//!
//! Players wire block locations together; each wire-connected component is a
//! [`network::LogisticsNetwork`]. Some members are leaf nodes (endpoints)
//! that either extract resources from the block they are attached to or
//! insert resources into it. Extractors deliver only to inserters in the same
//! network with the same [`id::TransferKey`] (capability type plus
//! frequency), and each extractor caches those partners so the transfer tick
//! never queries the graph.
//!
//! # Structural operations
//!
//! All mutations go through [`registry::LogisticsRegistry`]:
//!
//! - `connect` merges the two endpoints' networks, smaller into larger.
//! - `disconnect` and `remove` flood-fill the affected network and split it
//!   into fresh networks when it fell apart.
//! - `load_leaf_node`, `unload_leaf_node`, `set_frequency` and the target
//!   setters update the key index and fan out to resident extractor caches.
//!
//! Every call runs to completion before it returns; the registry is a plain
//! value passed by `&mut`.
//!
//! ```rust,ignore
//! let mut registry = LogisticsRegistry::default();
//! registry.connect(a, b);
//! registry.load_leaf_node(LeafNode::extractor(a, key));
//! registry.load_leaf_node(LeafNode::inserter(b, key, Some(target)));
//! registry.tick(&mut |extractor: &LeafNode, targets: &[InsertTarget]| {
//!     // move resources
//! });
//! ```
//!
//! # Key Types
//!
//! - [`registry::LogisticsRegistry`] -- Directory of networks, wires and
//!   resident endpoints.
//! - [`network::LogisticsNetwork`] -- One connected component plus its
//!   leaf-node index.
//! - [`leaf::LeafNode`] -- An extractor or inserter endpoint.
//! - [`wire::WireGraph`] -- Undirected wire adjacency with flood fill.
//! - [`event::EventBuffer`] -- Bounded queue of structural events.
//! - [`serialize`] -- Versioned snapshots via bitcode.

pub mod config;
pub mod event;
pub mod id;
pub mod leaf;
pub mod network;
pub mod registry;
pub mod serialize;
pub mod wire;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
