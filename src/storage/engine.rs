//! Glue between the file manager, the node cache, and the header for the lifetime of a
//! single public `Store` operation. Every mutation of `stats` happens through this type
//! so the write-through discipline (§5 of the design doc: the header is rewritten on
//! every statistic mutation) lives in exactly one place.

use std::path::Path;

use tracing::trace;

use crate::errors::Error;
use crate::storage::cache::NodeCache;
use crate::storage::codec;
use crate::storage::file::FileManager;
use crate::storage::header::{min_occup, Header};
use crate::storage::node::{Node, NIL};

pub struct Tx<'a> {
    pub file: FileManager,
    pub cache: &'a mut NodeCache,
    pub header: Header,
    pub s_node: usize,
}

impl<'a> Tx<'a> {
    pub fn open(
        path: &Path,
        cache: &'a mut NodeCache,
        s_header: usize,
        s_node: usize,
    ) -> Result<Self, Error> {
        let mut file = FileManager::open(path, s_header, s_node)?;
        let header_bytes = file.read_header_bytes()?;
        let header = codec::decode_header_slot(&header_bytes)?;
        Ok(Tx {
            file,
            cache,
            header,
            s_node,
        })
    }

    pub fn min_occup(&self) -> usize {
        min_occup(self.header.num_keys)
    }

    pub fn is_full(&self, node: &Node) -> bool {
        node.occupancy() == self.header.num_keys
    }

    pub fn is_underfull(&self, node: &Node) -> bool {
        node.offset != self.header.root_offset && node.occupancy() < self.min_occup()
    }

    /// Loads a node by offset, through the cache.
    pub fn load(&mut self, offset: u64) -> Result<Node, Error> {
        if let Some(node) = self.cache.get(offset) {
            self.header.stats.cache_hit += 1;
            return Ok(node);
        }
        self.header.stats.cache_miss += 1;
        let bytes = self.file.read_slot(offset)?;
        let node = codec::decode_node_slot(&bytes)?;
        if node.offset != offset {
            return Err(Error::Corrupt(format!(
                "slot at {} holds a node claiming offset {}",
                offset, node.offset
            )));
        }
        self.cache.insert(node.clone());
        Ok(node)
    }

    /// Loads a node, returning `None` for the nil offset. Convenience for optional
    /// sibling/parent links.
    pub fn load_opt(&mut self, offset: u64) -> Result<Option<Node>, Error> {
        if offset == NIL {
            Ok(None)
        } else {
            Ok(Some(self.load(offset)?))
        }
    }

    /// Write-through save: updates the cache and writes to disk in the same call.
    pub fn save(&mut self, node: &Node) -> Result<(), Error> {
        let bytes = codec::encode_node_slot(node, self.s_node)?;
        self.file.write_slot(node.offset, &bytes)?;
        self.cache.update(node);
        Ok(())
    }

    /// Allocates a fresh, empty node: reuses a free slot if one exists, otherwise grows
    /// the file.
    pub fn alloc(&mut self) -> Result<Node, Error> {
        let node = if let Some(offset) = pop_smallest(&mut self.header.free_offset) {
            let mut node = Node::new_at(offset);
            node.clear();
            node
        } else {
            let empty = Node::new_at(0);
            let bytes = codec::encode_node_slot(&empty, self.s_node)?;
            let offset = self.file.append_slot(&bytes)?;
            self.header.last_offset = offset;
            Node::new_at(offset)
        };
        self.header.stats.nodes += 1;
        self.save(&node)?;
        trace!(offset = node.offset, "allocated node");
        Ok(node)
    }

    /// Releases a node back to the free list and triggers compaction if the list has
    /// grown past the threshold.
    pub fn free(&mut self, mut node: Node) -> Result<(), Error> {
        let offset = node.offset;
        node.clear();
        let bytes = codec::encode_node_slot(&node, self.s_node)?;
        self.file.write_slot(offset, &bytes)?;
        self.cache.remove(offset);
        insert_sorted(&mut self.header.free_offset, offset);
        self.header.stats.nodes -= 1;
        self.compact_if_needed()?;
        Ok(())
    }

    /// Persists the (possibly stat-only) header back to disk. Called at the end of
    /// every public operation.
    pub fn flush_header(&mut self) -> Result<(), Error> {
        let s_header = self.file.first_slot_offset() as usize - 1;
        let bytes = codec::encode_header_slot(&self.header, s_header)?;
        self.file.write_header_bytes(&bytes)?;
        Ok(())
    }

    fn compact_if_needed(&mut self) -> Result<(), Error> {
        const MAX_FREE_NODES: usize = super::alloc::DEFAULT_MAX_FREE_NODES;
        while self.header.free_offset.len() > MAX_FREE_NODES {
            super::alloc::compact_once(self)?;
        }
        Ok(())
    }
}

fn pop_smallest(free: &mut Vec<u64>) -> Option<u64> {
    if free.is_empty() {
        None
    } else {
        Some(free.remove(0))
    }
}

fn insert_sorted(free: &mut Vec<u64>, offset: u64) {
    let pos = free.partition_point(|&o| o < offset);
    free.insert(pos, offset);
}
