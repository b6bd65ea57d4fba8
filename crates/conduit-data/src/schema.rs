//! Serde data file structs for logistics data packs.
//!
//! These structs define the on-disk format for capability types and
//! pre-built network layouts. They are deserialized from RON, JSON, or TOML
//! data files and then resolved into engine types by the pack loader.

use serde::Deserialize;

// ===========================================================================
// Capability types
// ===========================================================================

/// A named capability type (items, fluids, energy, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct CapabilityData {
    pub name: String,
    /// Numeric id the engine keys on. Must be unique within the pack.
    pub id: u16,
}

// ===========================================================================
// Layout
// ===========================================================================

/// A block location. Dimension defaults to 0.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LocationData {
    #[serde(default)]
    pub dimension: u32,
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

/// One wire between two locations.
#[derive(Debug, Clone, Deserialize)]
pub struct WireData {
    pub from: LocationData,
    pub to: LocationData,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeData {
    Extract,
    Insert,
}

/// The capability an inserter delivers into.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetData {
    pub at: LocationData,
    pub handle: u64,
}

/// An endpoint attached to a wired location.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointData {
    pub at: LocationData,
    pub mode: ModeData,
    /// Capability type name, resolved against the pack's capability list.
    pub capability: String,
    #[serde(default)]
    pub frequency: i32,
    /// Only meaningful for inserters.
    #[serde(default)]
    pub target: Option<TargetData>,
}

/// A pre-built network layout: wires first, then endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LayoutData {
    #[serde(default)]
    pub wires: Vec<WireData>,
    #[serde(default)]
    pub endpoints: Vec<EndpointData>,
}
