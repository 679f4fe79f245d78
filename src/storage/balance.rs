//! Rebalancing primitives: thread (sibling rotation), split, merge, and move.
//!
//! These are the only operations that touch more than one node's sibling/parent
//! pointers at once, so they are the only place that needs to keep the invariant that
//! `left_node`/`right_node` only ever link nodes sharing a parent (§3, invariant 6).

use tracing::debug;

use crate::errors::Error;
use crate::storage::engine::Tx;
use crate::storage::node::{Node, NIL};

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ThreadMode {
    /// `node` is underfull (or being treated as one): look for a fuller sibling to
    /// borrow a key from.
    Underfull,
    /// `node` is full, or full enough that spilling a key delays a future split: look
    /// for an emptier sibling to give a key to.
    Overfull,
}

/// Finds the index of `child_offset` among `parent.children`.
pub(crate) fn child_index(parent: &Node, child_offset: u64) -> Result<usize, Error> {
    parent
        .children
        .iter()
        .position(|&c| c == child_offset)
        .ok_or_else(|| {
            Error::Corrupt(format!(
                "node {} is not a child of its claimed parent {}",
                child_offset, parent.offset
            ))
        })
}

/// Attempts to rebalance `node` by rotating one key to or from a sibling, per `mode`.
/// Returns whether a rotation happened. `node` has no siblings if it is the root, in
/// which case this always returns `Ok(false)`.
pub fn try_thread(tx: &mut Tx, node_offset: u64, mode: ThreadMode) -> Result<bool, Error> {
    let node = tx.load(node_offset)?;
    if node.upper_node == NIL {
        return Ok(false);
    }
    let parent = tx.load(node.upper_node)?;
    let left = tx.load_opt(node.left_node)?;
    let right = tx.load_opt(node.right_node)?;

    let min_occup = tx.min_occup();
    let node_occ = node.occupancy();
    let qualifies = |sib_occ: usize| match mode {
        ThreadMode::Underfull => sib_occ > min_occup,
        ThreadMode::Overfull => sib_occ + 1 < node_occ,
    };
    // Underfull: prefer the fuller sibling. Overfull: prefer the emptier sibling.
    // Ties favor the left sibling in both cases.
    let left_better_than_right = |l: usize, r: usize| match mode {
        ThreadMode::Underfull => l >= r,
        ThreadMode::Overfull => l <= r,
    };

    let left_occ = left.as_ref().map(|l| l.occupancy());
    let right_occ = right.as_ref().map(|r| r.occupancy());
    let left_qualifies = left_occ.is_some_and(qualifies);
    let right_qualifies = right_occ.is_some_and(qualifies);
    if !left_qualifies && !right_qualifies {
        return Ok(false);
    }
    let take_left = if left_qualifies && right_qualifies {
        left_better_than_right(left_occ.unwrap(), right_occ.unwrap())
    } else {
        left_qualifies
    };

    // Underfull: `node` is short on keys, so it's the taker regardless of which side
    // gives. Overfull: `node` is the one that must shed a key, so it's the giver — the
    // qualifying sibling is the taker, and the two rotate_* helpers (always "left param
    // gives to right param") get their arguments swapped accordingly.
    let taker_offset = match mode {
        ThreadMode::Underfull => {
            if take_left {
                rotate_from_left(tx, left.unwrap(), node, parent)?
            } else {
                rotate_from_right(tx, node, right.unwrap(), parent)?
            }
        }
        ThreadMode::Overfull => {
            if take_left {
                rotate_from_right(tx, left.unwrap(), node, parent)?
            } else {
                rotate_from_left(tx, node, right.unwrap(), parent)?
            }
        }
    };

    // Delaying a future split: if the node that just received a key landed one shy of
    // full, spread the load further before the next insert forces a split.
    let taker = tx.load(taker_offset)?;
    if taker.occupancy() + 1 == tx.header.num_keys {
        try_thread(tx, taker_offset, ThreadMode::Overfull)?;
    }
    Ok(true)
}

/// Rotates one key from `left` into `node` (`node` sits immediately to `left`'s right
/// under `parent`). Returns the offset of the node that received the key (`node`).
fn rotate_from_left(tx: &mut Tx, mut left: Node, mut node: Node, mut parent: Node) -> Result<u64, Error> {
    let pos = child_index(&parent, left.offset)?;
    debug_assert_eq!(parent.children[pos + 1], node.offset);

    node.keys.insert(0, parent.keys[pos].clone());
    node.values.insert(0, parent.values[pos].clone());
    parent.keys[pos] = left.keys.pop().expect("giver must be non-empty to qualify");
    parent.values[pos] = left.values.pop().expect("giver must be non-empty to qualify");

    if !left.is_leaf() {
        let moved_child_offset = left.children.pop().expect("internal node has children");
        // `moved` is leaving `left`'s children; the child now at `left`'s new boundary
        // has no parent-crossing sibling to its right.
        if let Some(&new_left_last) = left.children.last() {
            let mut new_left_last_node = tx.load(new_left_last)?;
            new_left_last_node.right_node = NIL;
            tx.save(&new_left_last_node)?;
        }
        node.children.insert(0, moved_child_offset);
        let mut moved = tx.load(moved_child_offset)?;
        moved.upper_node = node.offset;
        moved.left_node = NIL;
        let old_first = node.children[1];
        let mut old_first_node = tx.load(old_first)?;
        old_first_node.left_node = moved_child_offset;
        moved.right_node = old_first;
        tx.save(&old_first_node)?;
        tx.save(&moved)?;
    }

    tx.save(&left)?;
    tx.save(&node)?;
    tx.save(&parent)?;
    tx.header.stats.threads_right += 1;
    debug!(taker = node.offset, giver = left.offset, "threaded from left");
    Ok(node.offset)
}

/// Rotates one key from `right` into `node` (`node` sits immediately to `right`'s
/// left under `parent`). Returns the offset of the node that received the key.
fn rotate_from_right(tx: &mut Tx, mut node: Node, mut right: Node, mut parent: Node) -> Result<u64, Error> {
    let pos = child_index(&parent, node.offset)?;
    debug_assert_eq!(parent.children[pos + 1], right.offset);

    node.keys.push(parent.keys[pos].clone());
    node.values.push(parent.values[pos].clone());
    parent.keys[pos] = right.keys.remove(0);
    parent.values[pos] = right.values.remove(0);

    if !right.is_leaf() {
        let moved_child_offset = right.children.remove(0);
        // `moved` is leaving `right`'s children; the child now at `right`'s new
        // boundary has no parent-crossing sibling to its left.
        if let Some(&new_right_first) = right.children.first() {
            let mut new_right_first_node = tx.load(new_right_first)?;
            new_right_first_node.left_node = NIL;
            tx.save(&new_right_first_node)?;
        }
        node.children.push(moved_child_offset);
        let mut moved = tx.load(moved_child_offset)?;
        moved.upper_node = node.offset;
        moved.right_node = NIL;
        let old_last = node.children[node.children.len() - 2];
        let mut old_last_node = tx.load(old_last)?;
        old_last_node.right_node = moved_child_offset;
        moved.left_node = old_last;
        tx.save(&old_last_node)?;
        tx.save(&moved)?;
    }

    tx.save(&node)?;
    tx.save(&right)?;
    tx.save(&parent)?;
    tx.header.stats.threads_left += 1;
    debug!(taker = node.offset, giver = right.offset, "threaded from right");
    Ok(node.offset)
}

/// Splits a full `node` in two, promoting its median key into the parent (allocating a
/// new root first if `node` is the root). Returns the parent so the caller can check it
/// for overflow too.
pub fn split(tx: &mut Tx, mut left: Node) -> Result<Node, Error> {
    let p = tx.header.num_keys / 2;

    let mut parent = if left.upper_node == NIL {
        let mut new_root = tx.alloc()?;
        new_root.children = vec![left.offset];
        tx.save(&new_root)?;
        left.upper_node = new_root.offset;
        tx.header.root_offset = new_root.offset;
        tx.header.stats.levels += 1;
        new_root
    } else {
        tx.load(left.upper_node)?
    };

    let mut right = tx.alloc()?;
    right.keys = left.keys.split_off(p + 1);
    right.values = left.values.split_off(p + 1);
    let promoted_key = left.keys.pop().expect("split point must hold a key");
    let promoted_value = left.values.pop().expect("split point must hold a value");

    if !left.is_leaf() {
        right.children = left.children.split_off(p + 1);
        for (idx, &c) in right.children.iter().enumerate() {
            let mut child = tx.load(c)?;
            child.upper_node = right.offset;
            if idx == 0 {
                // New parent boundary: R's first child no longer shares a parent with
                // whatever used to sit to its left.
                child.left_node = NIL;
            }
            tx.save(&child)?;
        }
        if let Some(&last_left_child) = left.children.last() {
            let mut last_left_child_node = tx.load(last_left_child)?;
            last_left_child_node.right_node = NIL;
            tx.save(&last_left_child_node)?;
        }
    }

    right.upper_node = parent.offset;
    right.left_node = left.offset;
    right.right_node = left.right_node;
    if right.right_node != NIL {
        let mut old_right = tx.load(right.right_node)?;
        old_right.left_node = right.offset;
        tx.save(&old_right)?;
    }
    left.right_node = right.offset;

    let pos = child_index(&parent, left.offset)?;
    parent.keys.insert(pos, promoted_key);
    parent.values.insert(pos, promoted_value);
    parent.children.insert(pos + 1, right.offset);

    tx.save(&left)?;
    tx.save(&right)?;
    tx.save(&parent)?;
    tx.header.stats.splits += 1;
    debug!(left = left.offset, right = right.offset, parent = parent.offset, "split node");
    Ok(parent)
}

/// Merges underfull `node` with a sibling, demoting the separating key down from the
/// parent. Returns the parent for a recursive underflow check, or `None` if `node` was
/// the root (no parent to check, and a root merge never underflows further).
pub fn merge(tx: &mut Tx, node: Node) -> Result<Option<Node>, Error> {
    if node.offset == tx.header.root_offset {
        if node.keys.is_empty() && node.children.len() == 1 {
            let only_child_offset = node.children[0];
            let mut child = tx.load(only_child_offset)?;
            child.upper_node = NIL;
            tx.save(&child)?;
            tx.header.root_offset = child.offset;
            tx.free(node)?;
            tx.header.stats.levels = tx.header.stats.levels.saturating_sub(1);
            tx.header.stats.merges += 1;
        }
        return Ok(None);
    }

    let parent = tx.load(node.upper_node)?;
    let left_sib = tx.load_opt(node.left_node)?;
    let right_sib = tx.load_opt(node.right_node)?;

    let (spatial_left, spatial_right) = match (left_sib, right_sib) {
        (Some(l), _) => (l, node),
        (None, Some(r)) => (node, r),
        (None, None) => {
            return Err(Error::Corrupt(format!(
                "underfull non-root node {} has no siblings to merge with",
                node.offset
            )))
        }
    };

    let sep_pos = child_index(&parent, spatial_left.offset)?;
    debug_assert_eq!(parent.children[sep_pos + 1], spatial_right.offset);

    let keep_left = spatial_left.occupancy() >= spatial_right.occupancy();
    let (mut surviving, donor) = if keep_left {
        (spatial_left.clone(), spatial_right.clone())
    } else {
        (spatial_right.clone(), spatial_left.clone())
    };

    surviving.keys = spatial_left.keys.iter().cloned().collect();
    surviving.keys.push(parent.keys[sep_pos].clone());
    surviving.keys.extend(spatial_right.keys.iter().cloned());
    surviving.values = spatial_left.values.iter().cloned().collect();
    surviving.values.push(parent.values[sep_pos].clone());
    surviving.values.extend(spatial_right.values.iter().cloned());
    surviving.children = spatial_left
        .children
        .iter()
        .cloned()
        .chain(spatial_right.children.iter().cloned())
        .collect();
    surviving.left_node = spatial_left.left_node;
    surviving.right_node = spatial_right.right_node;

    for &c in &surviving.children {
        let mut child = tx.load(c)?;
        child.upper_node = surviving.offset;
        tx.save(&child)?;
    }
    // The two halves' children now share one parent: restore the sibling link at the
    // old split boundary, severed when the two sides were first split apart.
    let boundary = spatial_left.children.len();
    if boundary > 0 && boundary < surviving.children.len() {
        let last_of_left = surviving.children[boundary - 1];
        let first_of_right = surviving.children[boundary];
        let mut last_of_left_node = tx.load(last_of_left)?;
        last_of_left_node.right_node = first_of_right;
        tx.save(&last_of_left_node)?;
        let mut first_of_right_node = tx.load(first_of_right)?;
        first_of_right_node.left_node = last_of_left;
        tx.save(&first_of_right_node)?;
    }
    if surviving.left_node != NIL {
        let mut l = tx.load(surviving.left_node)?;
        l.right_node = surviving.offset;
        tx.save(&l)?;
    }
    if surviving.right_node != NIL {
        let mut r = tx.load(surviving.right_node)?;
        r.left_node = surviving.offset;
        tx.save(&r)?;
    }

    let mut parent = parent;
    parent.keys.remove(sep_pos);
    parent.values.remove(sep_pos);
    if surviving.offset == spatial_left.offset {
        parent.children.remove(sep_pos + 1);
    } else {
        parent.children.remove(sep_pos);
    }

    tx.save(&surviving)?;
    tx.save(&parent)?;
    tx.free(donor)?;
    tx.header.stats.merges += 1;
    debug!(surviving = surviving.offset, parent = parent.offset, "merged node");
    Ok(Some(parent))
}

/// Relocates the node at `old_offset` to `new_offset`, fixing every parent/sibling/
/// child pointer that referenced it. Used only by allocator compaction (`crate::alloc`)
/// to shrink the file by moving the tail node into a free slot further up the file.
pub fn move_node(tx: &mut Tx, old_offset: u64, new_offset: u64) -> Result<(), Error> {
    let mut moved = tx.load(old_offset)?;
    moved.offset = new_offset;

    if moved.upper_node == NIL {
        tx.header.root_offset = new_offset;
    } else {
        let mut parent = tx.load(moved.upper_node)?;
        let idx = child_index(&parent, old_offset)?;
        parent.children[idx] = new_offset;
        tx.save(&parent)?;
    }
    if moved.left_node != NIL {
        let mut l = tx.load(moved.left_node)?;
        l.right_node = new_offset;
        tx.save(&l)?;
    }
    if moved.right_node != NIL {
        let mut r = tx.load(moved.right_node)?;
        r.left_node = new_offset;
        tx.save(&r)?;
    }
    for &c in &moved.children.clone() {
        let mut child = tx.load(c)?;
        child.upper_node = new_offset;
        tx.save(&child)?;
    }

    tx.cache.remove(old_offset);
    tx.save(&moved)?;
    debug!(old_offset, new_offset, "moved node");
    Ok(())
}
