//! Data packs: a directory holding registry configuration, capability types,
//! and an optional pre-built layout.
//!
//! | base name      | required | content                                  |
//! |----------------|----------|------------------------------------------|
//! | `logistics`    | no       | [`LogisticsConfig`], defaults if absent  |
//! | `capabilities` | no       | capability list, `item` + `fluid` if absent |
//! | `layout`       | no       | wires and endpoints to seed a registry   |
//!
//! Each file may be `.ron`, `.toml`, or `.json`.

use conduit_core::config::LogisticsConfig;
use conduit_core::id::{CapabilityHandle, CapabilityType, DimensionId, Location, TransferKey};
use conduit_core::leaf::{LeafNode, TransferTarget};
use conduit_core::registry::LogisticsRegistry;
use std::collections::BTreeMap;
use std::path::Path;

use crate::loader::{
    DataLoadError, deserialize_file, deserialize_list, find_data_file, resolve_name,
};
use crate::schema::*;

// ===========================================================================
// Resolved types
// ===========================================================================

/// A resolved layout, ready to be applied to a registry.
#[derive(Debug, Clone, Default)]
pub struct Layout {
    pub wires: Vec<(Location, Location)>,
    pub endpoints: Vec<LeafNode>,
}

/// Everything loaded from one data pack directory.
#[derive(Debug, Clone)]
pub struct DataPack {
    pub config: LogisticsConfig,
    /// Capability type name -> id.
    pub capabilities: BTreeMap<String, CapabilityType>,
    pub layout: Layout,
}

impl DataPack {
    /// A fresh registry with this pack's config and layout applied.
    pub fn build_registry(&self) -> LogisticsRegistry {
        let mut registry = LogisticsRegistry::new(self.config.clone());
        self.layout.apply(&mut registry);
        registry
    }
}

impl Layout {
    /// Connect every wire, then load every endpoint.
    pub fn apply(&self, registry: &mut LogisticsRegistry) {
        for (a, b) in &self.wires {
            registry.connect(*a, *b);
        }
        for leaf in &self.endpoints {
            registry.load_leaf_node(leaf.clone());
        }
    }
}

fn default_capabilities() -> BTreeMap<String, CapabilityType> {
    BTreeMap::from([
        ("item".to_string(), CapabilityType::ITEM_HANDLER),
        ("fluid".to_string(), CapabilityType::FLUID_HANDLER),
    ])
}

// ===========================================================================
// Loading functions
// ===========================================================================

/// Load a [`LogisticsConfig`] from a single file.
pub fn load_config(path: &Path) -> Result<LogisticsConfig, DataLoadError> {
    let config: LogisticsConfig = deserialize_file(path)?;
    if config.event_capacity == 0 {
        return Err(DataLoadError::Invalid {
            file: path.to_path_buf(),
            detail: "event_capacity must be at least 1".to_string(),
        });
    }
    Ok(config)
}

/// Load and index a capability list. Names and ids must both be unique.
pub fn load_capabilities(path: &Path) -> Result<BTreeMap<String, CapabilityType>, DataLoadError> {
    let list: Vec<CapabilityData> = deserialize_list(path, "capabilities")?;
    let mut by_name = BTreeMap::new();
    let mut seen_ids = BTreeMap::new();

    for entry in list {
        if let Some(other) = seen_ids.insert(entry.id, entry.name.clone()) {
            return Err(DataLoadError::Duplicate {
                file: path.to_path_buf(),
                kind: "capability id",
                name: format!("{} ({other} and {})", entry.id, entry.name),
            });
        }
        if by_name.contains_key(&entry.name) {
            return Err(DataLoadError::Duplicate {
                file: path.to_path_buf(),
                kind: "capability",
                name: entry.name,
            });
        }
        by_name.insert(entry.name, CapabilityType(entry.id));
    }
    Ok(by_name)
}

fn resolve_location(data: LocationData) -> Location {
    Location::new(DimensionId(data.dimension), data.x, data.y, data.z)
}

/// Load a layout, resolving capability names.
pub fn load_layout(
    path: &Path,
    capabilities: &BTreeMap<String, CapabilityType>,
) -> Result<Layout, DataLoadError> {
    let data: LayoutData = deserialize_file(path)?;

    let wires = data
        .wires
        .iter()
        .map(|w| (resolve_location(w.from), resolve_location(w.to)))
        .collect();

    let mut endpoints: Vec<LeafNode> = Vec::with_capacity(data.endpoints.len());
    for e in &data.endpoints {
        let capability = resolve_name(capabilities, &e.capability, path, "capability")?;
        let location = resolve_location(e.at);
        if endpoints.iter().any(|leaf| leaf.location() == location) {
            return Err(DataLoadError::Duplicate {
                file: path.to_path_buf(),
                kind: "endpoint",
                name: location.to_string(),
            });
        }

        let key = TransferKey::new(capability, e.frequency);
        let leaf = match e.mode {
            ModeData::Extract => {
                if e.target.is_some() {
                    return Err(DataLoadError::Invalid {
                        file: path.to_path_buf(),
                        detail: format!("extractor at {location} cannot have a target"),
                    });
                }
                LeafNode::extractor(location, key)
            }
            ModeData::Insert => {
                let target = e.target.as_ref().map(|t| TransferTarget {
                    pos: resolve_location(t.at),
                    handle: CapabilityHandle(t.handle),
                });
                LeafNode::inserter(location, key, target)
            }
        };
        endpoints.push(leaf);
    }

    Ok(Layout { wires, endpoints })
}

/// Load a data pack directory. Every file is optional.
pub fn load_data_pack(dir: &Path) -> Result<DataPack, DataLoadError> {
    let config = match find_data_file(dir, "logistics")? {
        Some(path) => load_config(&path)?,
        None => LogisticsConfig::default(),
    };
    let capabilities = match find_data_file(dir, "capabilities")? {
        Some(path) => load_capabilities(&path)?,
        None => default_capabilities(),
    };
    let layout = match find_data_file(dir, "layout")? {
        Some(path) => load_layout(&path, &capabilities)?,
        None => Layout::default(),
    };

    Ok(DataPack {
        config,
        capabilities,
        layout,
    })
}

// ===========================================================================
// Tests
// ===========================================================================
