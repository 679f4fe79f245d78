//! Free-list compaction: keeps the file from accumulating an unbounded tail of holes.
//!
//! `Tx::free` appends to `header.free_offset` on every delete. Once that list grows past
//! [`DEFAULT_MAX_FREE_NODES`], `compact_once` is called repeatedly (via
//! `Tx::compact_if_needed`) to shrink the file from the end: either the tail slot is
//! already free and can just be dropped, or the tail node is relocated into the lowest
//! free slot and the file is truncated behind it.

use tracing::debug;

use crate::errors::Error;
use crate::storage::balance::move_node;
use crate::storage::engine::Tx;

pub const DEFAULT_MAX_FREE_NODES: usize = 10;

/// Shrinks the file by one node slot, if possible.
pub fn compact_once(tx: &mut Tx) -> Result<(), Error> {
    let tail = tx.header.last_offset;
    if tail == 0 {
        return Ok(());
    }
    if let Some(pos) = tx.header.free_offset.iter().position(|&o| o == tail) {
        tx.header.free_offset.remove(pos);
        shrink_to(tx, tail)?;
        debug!(tail, "dropped already-free tail slot");
        return Ok(());
    }

    let new_offset = tx.header.free_offset.remove(0);
    move_node(tx, tail, new_offset)?;
    shrink_to(tx, tail)?;
    debug!(tail, new_offset, "relocated tail node to free slot");
    Ok(())
}

fn shrink_to(tx: &mut Tx, tail: u64) -> Result<(), Error> {
    tx.file.truncate_to(tail)?;
    tx.header.last_offset = tail.saturating_sub(tx.s_node as u64);
    Ok(())
}
