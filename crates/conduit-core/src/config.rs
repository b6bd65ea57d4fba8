use serde::{Deserialize, Serialize};

/// Tunables for a [`LogisticsRegistry`](crate::registry::LogisticsRegistry).
///
/// Every field has a default, so partial config files are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticsConfig {
    /// Defer cache rebuilds of restored networks until first use instead of
    /// rebuilding during restore.
    pub lazy_restore_rebuild: bool,
    /// Validate every network (and repair on failure) at the start of each
    /// transfer tick.
    pub validate_each_tick: bool,
    /// Record structural events into the registry's event buffer.
    pub record_events: bool,
    /// Capacity of the event buffer; older events are dropped beyond it.
    pub event_capacity: usize,
}

impl Default for LogisticsConfig {
    fn default() -> Self {
        Self {
            lazy_restore_rebuild: true,
            validate_each_tick: false,
            record_events: true,
            event_capacity: 1024,
        }
    }
}
