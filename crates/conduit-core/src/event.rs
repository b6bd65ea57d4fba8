//! Structural events recorded by the registry.
//!
//! Every merge, split, rebuild and repair is recorded into a fixed-capacity
//! [`EventBuffer`]. Collaborators drain it at their own pace (e.g. to refresh
//! wire highlighting); events nobody drained in time are evicted and counted.

use crate::id::NetworkId;
use std::collections::VecDeque;

/// Ticks are the unit of simulation time, counted by the registry's
/// transfer tick.
pub type Ticks = u64;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// A structural change to the set of networks. All events carry the tick at
/// which they occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogisticsEvent {
    NetworkCreated {
        network: NetworkId,
        tick: Ticks,
    },
    /// `absorbed` no longer exists; its members now belong to `into`.
    NetworksMerged {
        into: NetworkId,
        absorbed: NetworkId,
        tick: Ticks,
    },
    /// `from` no longer exists; its members were partitioned into `into`.
    NetworkSplit {
        from: NetworkId,
        into: Vec<NetworkId>,
        tick: Ticks,
    },
    /// The network lost its last member.
    NetworkRemoved {
        network: NetworkId,
        tick: Ticks,
    },
    CachesRebuilt {
        network: NetworkId,
        tick: Ticks,
    },
    /// A structural inconsistency was found and repaired.
    InvariantRepaired {
        network: NetworkId,
        reason: String,
        tick: Ticks,
    },
}

impl LogisticsEvent {
    pub fn tick(&self) -> Ticks {
        match self {
            LogisticsEvent::NetworkCreated { tick, .. }
            | LogisticsEvent::NetworksMerged { tick, .. }
            | LogisticsEvent::NetworkSplit { tick, .. }
            | LogisticsEvent::NetworkRemoved { tick, .. }
            | LogisticsEvent::CachesRebuilt { tick, .. }
            | LogisticsEvent::InvariantRepaired { tick, .. } => *tick,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBuffer (bounded queue)
// ---------------------------------------------------------------------------

/// Bounded FIFO of structural events. Once `capacity` events are waiting,
/// each new event evicts the oldest one and counts it as dropped.
#[derive(Debug, Clone)]
pub struct EventBuffer {
    queue: VecDeque<LogisticsEvent>,
    capacity: usize,
    /// Events evicted unread since the buffer was created.
    dropped: u64,
}

impl Default for EventBuffer {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventBuffer {
    /// A capacity of 0 is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            queue: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    pub fn push(&mut self, event: LogisticsEvent) {
        if self.queue.len() == self.capacity {
            self.queue.pop_front();
            self.dropped += 1;
        }
        self.queue.push_back(event);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Events evicted before anyone drained them.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogisticsEvent> {
        self.queue.iter()
    }

    /// Remove and return every stored event, oldest first.
    pub fn drain(&mut self) -> Vec<LogisticsEvent> {
        self.queue.drain(..).collect()
    }
}
