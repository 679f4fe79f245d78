//! Frequency-biased node cache: a small working set of decoded nodes kept hot across
//! repeated rebalancing of the same ancestors, evicted by minimum hit count rather than
//! recency (splits and merges hammer the same few nodes, so LRU would thrash here).

use std::collections::HashMap;

use crate::storage::node::Node;

struct Entry {
    node: Node,
    hits: u64,
    inserted_at: u64,
}

pub struct NodeCache {
    capacity: usize,
    entries: HashMap<u64, Entry>,
    clock: u64,
}

pub const DEFAULT_CAPACITY: usize = 32;

impl NodeCache {
    pub fn new(capacity: usize) -> Self {
        NodeCache {
            capacity,
            entries: HashMap::with_capacity(capacity),
            clock: 0,
        }
    }

    /// Returns the cached node for `offset`, bumping its hit counter, if present.
    pub fn get(&mut self, offset: u64) -> Option<Node> {
        let entry = self.entries.get_mut(&offset)?;
        entry.hits += 1;
        Some(entry.node.clone())
    }

    /// Inserts (or overwrites) the entry for `node.offset`, evicting the
    /// minimum-hit-count entry (ties broken by earliest insertion) if the cache is full.
    pub fn insert(&mut self, node: Node) {
        let offset = node.offset;
        self.clock += 1;
        if self.entries.contains_key(&offset) {
            let entry = self.entries.get_mut(&offset).unwrap();
            entry.node = node;
            return;
        }
        if self.entries.len() >= self.capacity {
            self.evict_one();
        }
        self.entries.insert(
            offset,
            Entry {
                node,
                hits: 0,
                inserted_at: self.clock,
            },
        );
    }

    /// Write-through update: refreshes the cached copy if present, otherwise does
    /// nothing (the caller is still responsible for writing the node to disk).
    pub fn update(&mut self, node: &Node) {
        if let Some(entry) = self.entries.get_mut(&node.offset) {
            entry.node = node.clone();
        }
    }

    pub fn remove(&mut self, offset: u64) {
        self.entries.remove(&offset);
    }

    fn evict_one(&mut self) {
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, e)| (e.hits, e.inserted_at))
            .map(|(&offset, _)| offset);
        if let Some(offset) = victim {
            self.entries.remove(&offset);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_at(offset: u64) -> Node {
        Node::new_at(offset)
    }

    #[test]
    fn evicts_least_frequently_hit_entry() {
        let mut cache = NodeCache::new(2);
        cache.insert(node_at(1));
        cache.insert(node_at(2));

        // Hit offset 1 so offset 2 becomes the eviction candidate.
        cache.get(1);

        cache.insert(node_at(3));

        assert!(cache.get(1).is_some());
        assert!(cache.get(2).is_none());
        assert!(cache.get(3).is_some());
    }

    #[test]
    fn ties_evict_earliest_inserted() {
        let mut cache = NodeCache::new(2);
        cache.insert(node_at(1));
        cache.insert(node_at(2));
        // Neither has been hit; offset 1 was inserted first and should go.
        cache.insert(node_at(3));

        assert!(cache.get(1).is_none());
        assert!(cache.get(2).is_some());
        assert!(cache.get(3).is_some());
    }

    #[test]
    fn write_through_update_refreshes_cached_copy() {
        let mut cache = NodeCache::new(2);
        cache.insert(node_at(1));

        let mut updated = node_at(1);
        updated.keys.push(vec![1, 2, 3]);
        cache.update(&updated);

        assert_eq!(cache.get(1).unwrap().keys, vec![vec![1, 2, 3]]);
    }
}
