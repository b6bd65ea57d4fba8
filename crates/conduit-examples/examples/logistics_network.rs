//! Logistics network example: wiring, frequencies, splits, and save/restore.
//!
//! Builds a small base with two cables, links extractors to inserters,
//! retunes a channel, cuts a cable in half, and round-trips the registry
//! through a snapshot. Structural events are printed after each step.
//!
//! Run with: `RUST_LOG=conduit_core=debug cargo run -p conduit-examples --example logistics_network`
//!
//! Pass a data pack directory as the first argument to seed the registry
//! from disk instead.

use conduit_core::config::LogisticsConfig;
use conduit_core::id::{CapabilityHandle, CapabilityType, DimensionId, Location, TransferKey};
use conduit_core::leaf::{InsertTarget, LeafNode, TransferTarget};
use conduit_core::registry::LogisticsRegistry;
use tracing_subscriber::EnvFilter;

fn at(x: i32) -> Location {
    Location::new(DimensionId(0), x, 64, 0)
}

fn chest_under(pos: Location, handle: u64) -> TransferTarget {
    TransferTarget {
        pos: pos.offset(0, -1, 0),
        handle: CapabilityHandle(handle),
    }
}

fn print_events(registry: &mut LogisticsRegistry) {
    for event in registry.drain_events() {
        println!("  event: {event:?}");
    }
}

fn print_tick(registry: &mut LogisticsRegistry) {
    let report = registry.tick(&mut |extractor: &LeafNode, targets: &[InsertTarget]| {
        let endpoints: Vec<String> = targets.iter().map(|t| t.endpoint.to_string()).collect();
        println!("  {} -> [{}]", extractor.location(), endpoints.join(", "));
    });
    println!(
        "  tick {}: {} extractors, {} targets offered",
        report.tick, report.extractors, report.targets
    );
}

fn demo_registry() -> LogisticsRegistry {
    let mut registry = LogisticsRegistry::new(LogisticsConfig::default());
    let items = TransferKey::new(CapabilityType::ITEM_HANDLER, 0);

    println!("=== Step 1: Two separate cables ===\n");
    for x in 0..4 {
        registry.connect(at(x), at(x + 1));
    }
    for x in 10..13 {
        registry.connect(at(x), at(x + 1));
    }
    registry.load_leaf_node(LeafNode::extractor(at(0), items));
    registry.load_leaf_node(LeafNode::inserter(at(4), items, Some(chest_under(at(4), 1))));
    registry.load_leaf_node(LeafNode::inserter(at(13), items, Some(chest_under(at(13), 2))));
    println!("networks: {}", registry.network_count());
    print_events(&mut registry);
    print_tick(&mut registry);

    println!("\n=== Step 2: Bridge the cables ===\n");
    registry.connect(at(4), at(10));
    println!("networks: {}", registry.network_count());
    print_events(&mut registry);
    print_tick(&mut registry);

    println!("\n=== Step 3: Retune the far inserter to channel 5 ===\n");
    registry.set_frequency(at(13), 5);
    print_tick(&mut registry);

    println!("\n=== Step 4: Break the bridge block ===\n");
    let wires = registry.remove(at(10));
    println!("removed {wires} wire(s), networks: {}", registry.network_count());
    print_events(&mut registry);
    print_tick(&mut registry);

    registry
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let registry = match std::env::args().nth(1) {
        Some(dir) => match conduit_data::load_data_pack(std::path::Path::new(&dir)) {
            Ok(pack) => {
                tracing::info!(
                    dir = %dir,
                    endpoints = pack.layout.endpoints.len(),
                    "loaded data pack"
                );
                let mut registry = pack.build_registry();
                print_events(&mut registry);
                print_tick(&mut registry);
                registry
            }
            Err(error) => {
                tracing::error!(%error, "failed to load data pack");
                std::process::exit(1);
            }
        },
        None => demo_registry(),
    };

    println!("\n=== Save and restore ===\n");
    let residents: Vec<LeafNode> = registry.residents().iter().cloned().collect();
    let data = match registry.serialize() {
        Ok(data) => data,
        Err(error) => {
            tracing::error!(%error, "snapshot failed");
            std::process::exit(1);
        }
    };
    println!("snapshot: {} bytes", data.len());

    let mut restored = match LogisticsRegistry::deserialize(&data, registry.config().clone()) {
        Ok(restored) => restored,
        Err(error) => {
            tracing::error!(%error, "restore failed");
            std::process::exit(1);
        }
    };
    for leaf in residents {
        restored.load_leaf_node(leaf);
    }
    println!("restored networks: {}", restored.network_count());
    print_tick(&mut restored);

    match restored.validate() {
        Ok(()) => println!("\nall invariants hold"),
        Err(error) => println!("\ninvariant violated: {error}"),
    }
}
