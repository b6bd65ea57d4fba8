//! Undirected wire graph over world locations.
//!
//! The wire graph is pure topology: it records which locations are physically
//! wired together and answers reachability queries. Network bookkeeping
//! (merges, splits, leaf-node indices) lives in the registry, which drives
//! this structure.

use crate::id::Location;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Symmetric adjacency lists keyed by location.
///
/// An edge `a <-> b` is always stored in both directions. Locations whose last
/// wire is removed are dropped from the map entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireGraph {
    adjacency: BTreeMap<Location, BTreeSet<Location>>,
}

impl WireGraph {
    /// Create an empty wire graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a wire between `a` and `b`.
    ///
    /// Returns `false` if the wire already existed or `a == b`.
    pub fn connect(&mut self, a: Location, b: Location) -> bool {
        if a == b {
            return false;
        }
        let inserted = self.adjacency.entry(a).or_default().insert(b);
        self.adjacency.entry(b).or_default().insert(a);
        inserted
    }

    /// Remove the wire between `a` and `b`. Returns `false` if there was none.
    pub fn disconnect(&mut self, a: Location, b: Location) -> bool {
        let removed = self.unlink(a, b);
        self.unlink(b, a);
        removed
    }

    fn unlink(&mut self, from: Location, to: Location) -> bool {
        let Some(neighbors) = self.adjacency.get_mut(&from) else {
            return false;
        };
        let removed = neighbors.remove(&to);
        if neighbors.is_empty() {
            self.adjacency.remove(&from);
        }
        removed
    }

    /// Remove every wire touching `pos`. Returns how many wires were removed.
    pub fn remove_all(&mut self, pos: Location) -> usize {
        let Some(neighbors) = self.adjacency.remove(&pos) else {
            return 0;
        };
        for other in &neighbors {
            self.unlink(*other, pos);
        }
        neighbors.len()
    }

    /// Locations directly wired to `pos`.
    pub fn neighbors(&self, pos: Location) -> impl Iterator<Item = Location> + '_ {
        self.adjacency.get(&pos).into_iter().flatten().copied()
    }

    /// Number of wires attached to `pos`.
    pub fn degree(&self, pos: Location) -> usize {
        self.adjacency.get(&pos).map_or(0, BTreeSet::len)
    }

    /// Total number of wires.
    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(BTreeSet::len).sum::<usize>() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    /// Every wire exactly once, as `(lower, higher)` location pairs.
    pub fn edges(&self) -> impl Iterator<Item = (Location, Location)> + '_ {
        self.adjacency.iter().flat_map(|(a, neighbors)| {
            neighbors
                .iter()
                .filter(move |b| a < *b)
                .map(move |b| (*a, *b))
        })
    }

    /// Breadth-first traversal from `start` over wires.
    ///
    /// When `within` is given, traversal never leaves that set (the start
    /// location is always included).
    pub fn flood_fill(
        &self,
        start: Location,
        within: Option<&BTreeSet<Location>>,
    ) -> BTreeSet<Location> {
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::new();
        visited.insert(start);
        queue.push_back(start);

        while let Some(pos) = queue.pop_front() {
            for next in self.neighbors(pos) {
                if within.is_some_and(|set| !set.contains(&next)) {
                    continue;
                }
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }

        visited
    }

    /// Partition `members` into wire-connected components, restricted to
    /// `members`. Components are returned largest first, ties broken by their
    /// smallest location.
    pub fn components(&self, members: &BTreeSet<Location>) -> Vec<BTreeSet<Location>> {
        let mut remaining = members.clone();
        let mut components = Vec::new();

        while let Some(start) = remaining.pop_first() {
            let component = self.flood_fill(start, Some(members));
            for pos in &component {
                remaining.remove(pos);
            }
            components.push(component);
        }

        components.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.first().cmp(&b.first())));
        components
    }
}

// ===========================================================================
// Tests
// ===========================================================================
