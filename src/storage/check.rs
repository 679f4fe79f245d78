//! Whole-tree consistency checker: walks every node once, verifying the invariants
//! from the design notes rather than trusting them. Used by `Store::check_consistency`
//! and by `Store::open` when opening an existing file.

use crate::errors::Error;
use crate::storage::engine::Tx;
use crate::storage::node::NIL;

/// A confirmed-bad tree. Each variant names the invariant that failed and where.
#[derive(Debug)]
pub enum Violation {
    KeysNotAscending { offset: u64 },
    TooManyKeys { offset: u64, len: usize },
    TooFewKeys { offset: u64, len: usize },
    WrongChildCount { offset: u64, keys: usize, children: usize },
    BoundViolation { offset: u64, child: u64 },
    SiblingMismatch { offset: u64, expected: u64, actual: u64 },
    ParentMismatch { offset: u64, claimed_parent: u64, actual_parent: u64 },
    FreeOffsetInUse { offset: u64 },
    Cycle { offset: u64 },
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Violation::KeysNotAscending { offset } => {
                write!(f, "node {} has keys out of order", offset)
            }
            Violation::TooManyKeys { offset, len } => {
                write!(f, "node {} holds {} keys, above the configured maximum", offset, len)
            }
            Violation::TooFewKeys { offset, len } => {
                write!(f, "non-root node {} holds only {} keys, below the minimum occupancy", offset, len)
            }
            Violation::WrongChildCount { offset, keys, children } => write!(
                f,
                "node {} has {} keys but {} children (expected {})",
                offset, keys, children, keys + 1
            ),
            Violation::BoundViolation { offset, child } => {
                write!(f, "child {} of node {} holds a key outside its separator bounds", child, offset)
            }
            Violation::SiblingMismatch { offset, expected, actual } => write!(
                f,
                "node {} expected sibling link {} but found {}",
                offset, expected, actual
            ),
            Violation::ParentMismatch { offset, claimed_parent, actual_parent } => write!(
                f,
                "node {} claims parent {} but its parent's children point to it from {}",
                offset, claimed_parent, actual_parent
            ),
            Violation::FreeOffsetInUse { offset } => {
                write!(f, "offset {} is on the free list but is still referenced by the live tree", offset)
            }
            Violation::Cycle { offset } => write!(f, "cycle detected while descending through node {}", offset),
        }
    }
}

/// Walks the whole tree from the root, returning every invariant violation found. An
/// empty vector means the tree is internally consistent.
pub fn check(tx: &mut Tx) -> Result<Vec<Violation>, Error> {
    let mut violations = Vec::new();
    let mut visited = std::collections::HashSet::new();
    walk(tx, tx.header.root_offset, None, None, true, &mut visited, &mut violations)?;

    for &offset in &tx.header.free_offset.clone() {
        if visited.contains(&offset) {
            violations.push(Violation::FreeOffsetInUse { offset });
        }
    }
    Ok(violations)
}

#[allow(clippy::too_many_arguments)]
fn walk(
    tx: &mut Tx,
    offset: u64,
    lower_bound: Option<&[u8]>,
    upper_bound: Option<&[u8]>,
    is_root: bool,
    visited: &mut std::collections::HashSet<u64>,
    violations: &mut Vec<Violation>,
) -> Result<(), Error> {
    if !visited.insert(offset) {
        violations.push(Violation::Cycle { offset });
        return Ok(());
    }

    let node = tx.load(offset)?;

    for pair in node.keys.windows(2) {
        if pair[0] >= pair[1] {
            violations.push(Violation::KeysNotAscending { offset });
            break;
        }
    }
    if let Some(lb) = lower_bound {
        if let Some(first) = node.keys.first() {
            if first.as_slice() < lb {
                violations.push(Violation::BoundViolation { offset, child: offset });
            }
        }
    }
    if let Some(ub) = upper_bound {
        if let Some(last) = node.keys.last() {
            if last.as_slice() >= ub {
                violations.push(Violation::BoundViolation { offset, child: offset });
            }
        }
    }

    if node.occupancy() > tx.header.num_keys {
        violations.push(Violation::TooManyKeys { offset, len: node.occupancy() });
    }
    if !is_root && tx.is_underfull(&node) {
        violations.push(Violation::TooFewKeys { offset, len: node.occupancy() });
    }
    if !node.is_leaf() && node.children.len() != node.keys.len() + 1 {
        violations.push(Violation::WrongChildCount {
            offset,
            keys: node.keys.len(),
            children: node.children.len(),
        });
    }

    for (idx, &child_offset) in node.children.clone().iter().enumerate() {
        let child = tx.load(child_offset)?;
        if child.upper_node != node.offset {
            violations.push(Violation::ParentMismatch {
                offset: child_offset,
                claimed_parent: child.upper_node,
                actual_parent: node.offset,
            });
        }
        let child_lower = if idx == 0 { lower_bound } else { Some(node.keys[idx - 1].as_slice()) };
        let child_upper = if idx == node.keys.len() { upper_bound } else { Some(node.keys[idx].as_slice()) };
        walk(tx, child_offset, child_lower, child_upper, false, visited, violations)?;
    }

    // Sibling links only ever connect children sharing a parent (§3, invariant 6); the
    // first/last child of each parent has no sibling across the parent boundary.
    for (idx, &child_offset) in node.children.iter().enumerate() {
        let child = tx.load(child_offset)?;
        let expected_left = if idx == 0 { NIL } else { node.children[idx - 1] };
        let expected_right = if idx + 1 == node.children.len() { NIL } else { node.children[idx + 1] };
        if child.left_node != expected_left {
            violations.push(Violation::SiblingMismatch {
                offset: child_offset,
                expected: expected_left,
                actual: child.left_node,
            });
        }
        if child.right_node != expected_right {
            violations.push(Violation::SiblingMismatch {
                offset: child_offset,
                expected: expected_right,
                actual: child.right_node,
            });
        }
    }

    Ok(())
}
