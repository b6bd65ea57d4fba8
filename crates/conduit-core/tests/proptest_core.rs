//! Property-based tests for the logistics registry.
//!
//! Uses proptest to generate random wiring and endpoint mutation sequences,
//! then verify that networks always partition the tracked locations by wire
//! connectivity and that every resident extractor caches exactly the
//! resident inserters its index implies.

use conduit_core::config::LogisticsConfig;
use conduit_core::id::*;
use conduit_core::leaf::{InsertTarget, LeafNode};
use conduit_core::registry::LogisticsRegistry;
use conduit_core::test_utils::*;
use proptest::prelude::*;
use std::collections::BTreeSet;

// ===========================================================================
// Generators
// ===========================================================================

const SLOTS: usize = 10;

/// Slot `i` maps to a fixed location; two of them live in another dimension.
fn slot(i: usize) -> Location {
    let i = i % SLOTS;
    if i >= SLOTS - 2 {
        loc_in(1, i as i32, 0, 0)
    } else {
        loc(i as i32, 0, 0)
    }
}

#[derive(Debug, Clone)]
enum Op {
    Connect(usize, usize),
    Disconnect(usize, usize),
    Remove(usize),
    LoadExtractor(usize, i32),
    LoadInserter(usize, i32, bool),
    Unload(usize),
    SetFrequency(usize, i32),
    ToggleTarget(usize),
    Tick,
    SaveLoad,
}

fn arb_ops(max_ops: usize) -> impl Strategy<Value = Vec<Op>> {
    proptest::collection::vec(
        prop_oneof![
            4 => (0..SLOTS, 0..SLOTS).prop_map(|(a, b)| Op::Connect(a, b)),
            2 => (0..SLOTS, 0..SLOTS).prop_map(|(a, b)| Op::Disconnect(a, b)),
            1 => (0..SLOTS).prop_map(Op::Remove),
            2 => (0..SLOTS, 0..3i32).prop_map(|(i, f)| Op::LoadExtractor(i, f)),
            2 => (0..SLOTS, 0..3i32, any::<bool>())
                .prop_map(|(i, f, fluid)| Op::LoadInserter(i, f, fluid)),
            1 => (0..SLOTS).prop_map(Op::Unload),
            1 => (0..SLOTS, 0..3i32).prop_map(|(i, f)| Op::SetFrequency(i, f)),
            1 => (0..SLOTS).prop_map(Op::ToggleTarget),
            1 => Just(Op::Tick),
            1 => Just(Op::SaveLoad),
        ],
        1..=max_ops,
    )
}

fn apply(registry: &mut LogisticsRegistry, op: &Op) {
    match *op {
        Op::Connect(a, b) => {
            registry.connect(slot(a), slot(b));
        }
        Op::Disconnect(a, b) => {
            registry.disconnect(slot(a), slot(b));
        }
        Op::Remove(i) => {
            registry.remove(slot(i));
        }
        Op::LoadExtractor(i, f) => {
            registry.load_leaf_node(extractor(slot(i), item_key(f)));
        }
        Op::LoadInserter(i, f, fluid) => {
            let key = if fluid { fluid_key(f) } else { item_key(f) };
            registry.load_leaf_node(inserter(slot(i), key));
        }
        Op::Unload(i) => {
            registry.unload_leaf_node(slot(i));
        }
        Op::SetFrequency(i, f) => {
            registry.set_frequency(slot(i), f);
        }
        Op::ToggleTarget(i) => {
            let pos = slot(i);
            let resolved = registry.leaf_node(pos).and_then(LeafNode::target).is_some();
            if resolved {
                registry.clear_insert_target(pos);
            } else {
                registry.set_insert_target(pos, target_for(pos));
            }
        }
        Op::Tick => {
            registry.tick(&mut |_: &LeafNode, _: &[InsertTarget]| {});
        }
        Op::SaveLoad => {
            // Collaborators reload every resident endpoint after a restore.
            let residents: Vec<LeafNode> = registry.residents().iter().cloned().collect();
            let data = registry.serialize().expect("serialize should succeed");
            let mut restored = LogisticsRegistry::deserialize(&data, LogisticsConfig::default())
                .expect("deserialize should succeed");
            for leaf in residents {
                restored.load_leaf_node(leaf);
            }
            *registry = restored;
        }
    }
}

/// The partition the wire graph implies: connected components over every
/// tracked location.
fn wire_components(registry: &LogisticsRegistry) -> BTreeSet<BTreeSet<Location>> {
    let tracked: BTreeSet<Location> = registry
        .networks()
        .flat_map(|(_, network)| network.nodes().iter().copied())
        .collect();
    registry.wires().components(&tracked).into_iter().collect()
}

fn network_partition(registry: &LogisticsRegistry) -> BTreeSet<BTreeSet<Location>> {
    registry
        .networks()
        .map(|(_, network)| network.nodes().clone())
        .collect()
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// After every operation networks equal the wire components, every index
    /// matches its leaf entries, and every extractor cache is exact. Restored
    /// networks stay pending until a tick flushes them, so caches must also
    /// be exact while a rebuild is still owed.
    #[test]
    fn invariants_hold_after_every_op(ops in arb_ops(60)) {
        let mut registry = LogisticsRegistry::default();
        for op in &ops {
            apply(&mut registry, op);
            assert_invariants(&registry);
            prop_assert_eq!(network_partition(&registry), wire_components(&registry));
        }

        registry.flush_pending_rebuilds();
        assert_invariants(&registry);
    }

    /// Order of wiring never changes the resulting partition or caches.
    #[test]
    fn wiring_order_is_irrelevant(
        edges in proptest::collection::vec((0..SLOTS, 0..SLOTS), 1..20),
    ) {
        let build = |edges: &[(usize, usize)]| {
            let mut registry = LogisticsRegistry::default();
            registry.load_leaf_node(extractor(slot(0), item_key(0)));
            registry.load_leaf_node(inserter(slot(3), item_key(0)));
            registry.load_leaf_node(inserter(slot(5), item_key(0)));
            for &(a, b) in edges {
                registry.connect(slot(a), slot(b));
            }
            registry
        };

        let forward = build(&edges);
        let reversed: Vec<_> = edges.iter().rev().copied().collect();
        let backward = build(&reversed);

        prop_assert_eq!(network_partition(&forward), network_partition(&backward));
        prop_assert_eq!(partners(&forward, slot(0)), partners(&backward, slot(0)));
        assert_invariants(&forward);
        assert_invariants(&backward);
    }

    /// Repeated connect of already-joined locations changes nothing.
    #[test]
    fn merge_is_idempotent(
        len in 2..8i32,
        extra in proptest::collection::vec((0..8usize, 0..8usize), 1..10),
    ) {
        let chain = line(loc(0, 0, 0), len);
        let mut registry = LogisticsRegistry::default();
        wire_chain(&mut registry, &chain);
        registry.load_leaf_node(extractor(chain[0], item_key(0)));
        registry.load_leaf_node(inserter(chain[chain.len() - 1], item_key(0)));
        let before = network_partition(&registry);

        for (a, b) in extra {
            let (a, b) = (chain[a % chain.len()], chain[b % chain.len()]);
            registry.connect(a, b);
        }

        prop_assert_eq!(network_partition(&registry), before);
        prop_assert_eq!(registry.network_count(), 1);
        assert_invariants(&registry);
    }
}
