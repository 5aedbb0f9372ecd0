//! RoutingTable - destination tag to output channel mapping
//!
//! Built once at construction, read-only afterwards.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::DestinationTag;

/// Routing table
///
/// Every tag an upstream sender uses must be a key here. A missing key is a
/// configuration error, not a runtime condition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingTable {
    routes: BTreeMap<DestinationTag, usize>,
}

impl RoutingTable {
    /// Create empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route, returning the previous channel for the tag (if any)
    pub fn insert(&mut self, tag: DestinationTag, channel: usize) -> Option<usize> {
        self.routes.insert(tag, channel)
    }

    /// Output channel for a tag
    pub fn lookup(&self, tag: DestinationTag) -> Option<usize> {
        self.routes.get(&tag).copied()
    }

    /// All tags reachable through this node, in ascending order
    pub fn destinations(&self) -> Vec<DestinationTag> {
        self.routes.keys().copied().collect()
    }

    /// Highest output channel referenced by the table
    pub fn max_channel(&self) -> Option<usize> {
        self.routes.values().copied().max()
    }

    /// Number of routes
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Iterate `(tag, channel)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (DestinationTag, usize)> + '_ {
        self.routes.iter().map(|(tag, channel)| (*tag, *channel))
    }
}

impl FromIterator<(DestinationTag, usize)> for RoutingTable {
    fn from_iter<I: IntoIterator<Item = (DestinationTag, usize)>>(iter: I) -> Self {
        Self {
            routes: iter.into_iter().collect(),
        }
    }
}

/// One `[[routing]]` entry as written in configuration files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    /// Destination tag
    pub tag: DestinationTag,
    /// Output channel index
    pub channel: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_and_destinations() {
        let table: RoutingTable = [(5, 1), (2, 0), (9, 1)].into_iter().collect();
        assert_eq!(table.lookup(2), Some(0));
        assert_eq!(table.lookup(9), Some(1));
        assert_eq!(table.lookup(4), None);
        assert_eq!(table.destinations(), vec![2, 5, 9]);
        assert_eq!(table.max_channel(), Some(1));
    }

    #[test]
    fn test_insert_replaces() {
        let mut table = RoutingTable::new();
        assert_eq!(table.insert(0, 0), None);
        assert_eq!(table.insert(0, 3), Some(0));
        assert_eq!(table.len(), 1);
    }
}
