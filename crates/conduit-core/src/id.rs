use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies a logistics network inside a [`LogisticsRegistry`](crate::registry::LogisticsRegistry).
    ///
    /// Ids are never reused for a different network while the registry lives,
    /// so a stale id simply resolves to `None`.
    pub struct NetworkId;
}

/// Identifies a dimension (world layer). Cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DimensionId(pub u32);

/// A block location in the simulated world: dimension plus 3D coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location {
    pub dimension: DimensionId,
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Location {
    pub fn new(dimension: DimensionId, x: i32, y: i32, z: i32) -> Self {
        Self { dimension, x, y, z }
    }

    /// The location offset by the given delta, in the same dimension.
    pub fn offset(&self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.dimension, self.x + dx, self.y + dy, self.z + dz)
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:({}, {}, {})", self.dimension.0, self.x, self.y, self.z)
    }
}

/// Identifies the kind of resource an endpoint handles (items, fluids, ...).
///
/// Used purely as a map key; the engine never dispatches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CapabilityType(pub u16);

impl CapabilityType {
    pub const ITEM_HANDLER: CapabilityType = CapabilityType(0);
    pub const FLUID_HANDLER: CapabilityType = CapabilityType(1);
}

/// The channel an endpoint transfers on: capability type plus frequency.
///
/// Only endpoints sharing an identical key exchange resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransferKey {
    pub capability: CapabilityType,
    pub frequency: i32,
}

impl TransferKey {
    pub fn new(capability: CapabilityType, frequency: i32) -> Self {
        Self {
            capability,
            frequency,
        }
    }

    /// Same capability type, different frequency.
    pub fn with_frequency(self, frequency: i32) -> Self {
        Self {
            capability: self.capability,
            frequency,
        }
    }
}

impl From<CapabilityType> for TransferKey {
    /// Frequency defaults to 0.
    fn from(capability: CapabilityType) -> Self {
        Self::new(capability, 0)
    }
}

/// Opaque handle to a resolved capability on a target block, issued by the
/// collaborator that owns the block. The engine only stores and hands it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CapabilityHandle(pub u64);
