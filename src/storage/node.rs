//! Node layout: the in-memory `Node` and its on-disk JSON mirror.
//!
//! A node is the unit the B-tree operates on. Internal nodes and leaves share the same
//! shape here (unlike a classic B+tree): every node carries `keys` and `values` in
//! parallel, and internal nodes additionally carry one more `children` offset than they
//! have keys. This matches the predecessor-substitution delete path, which overwrites a
//! key *and its value* in place at an interior node (see `crate::mutate`).

use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// Offset `0` never refers to a real slot (the header occupies byte 0), so it doubles as
/// the "no node" sentinel for parent/sibling/child links.
pub const NIL: u64 = 0;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Node {
    pub offset: u64,
    pub upper_node: u64,
    pub left_node: u64,
    pub right_node: u64,
    pub keys: Vec<Vec<u8>>,
    pub values: Vec<Vec<u8>>,
    pub children: Vec<u64>,
}

impl Node {
    pub fn new_at(offset: u64) -> Self {
        Node {
            offset,
            ..Default::default()
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn occupancy(&self) -> usize {
        self.keys.len()
    }

    /// Resets a node to the empty, offset-less state the allocator frees nodes into.
    pub fn clear(&mut self) {
        self.upper_node = NIL;
        self.left_node = NIL;
        self.right_node = NIL;
        self.keys.clear();
        self.values.clear();
        self.children.clear();
    }
}

/// On-disk mirror of [`Node`]. Keys and values are carried as JSON strings rather than
/// byte arrays: see [`textbytes`] for the lossless mapping used to get arbitrary bytes
/// through a JSON string without a base64/hex dependency.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
struct NodeRecord {
    offset: u64,
    upper_node: u64,
    left_node: u64,
    right_node: u64,
    key: Vec<String>,
    data: Vec<String>,
    lower_node: Vec<u64>,
}

impl From<&Node> for NodeRecord {
    fn from(node: &Node) -> Self {
        NodeRecord {
            offset: node.offset,
            upper_node: node.upper_node,
            left_node: node.left_node,
            right_node: node.right_node,
            key: node.keys.iter().map(|k| textbytes::encode(k)).collect(),
            data: node.values.iter().map(|v| textbytes::encode(v)).collect(),
            lower_node: node.children.clone(),
        }
    }
}

impl TryFrom<NodeRecord> for Node {
    type Error = Error;

    fn try_from(rec: NodeRecord) -> Result<Self, Error> {
        if rec.key.len() != rec.data.len() {
            return Err(Error::Corrupt(format!(
                "node at {} has {} keys but {} values",
                rec.offset,
                rec.key.len(),
                rec.data.len()
            )));
        }
        let keys = rec
            .key
            .iter()
            .map(|s| textbytes::decode(s))
            .collect::<Result<Vec<_>, _>>()?;
        let values = rec
            .data
            .iter()
            .map(|s| textbytes::decode(s))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Node {
            offset: rec.offset,
            upper_node: rec.upper_node,
            left_node: rec.left_node,
            right_node: rec.right_node,
            keys,
            values,
            children: rec.lower_node,
        })
    }
}

/// Encodes a node to a compact JSON object (no padding applied here; see `crate::codec`).
pub fn to_json(node: &Node) -> Result<Vec<u8>, Error> {
    let rec = NodeRecord::from(node);
    Ok(serde_json::to_vec(&rec)?)
}

/// Decodes a node from its (already unpadded) JSON bytes.
pub fn from_json(bytes: &[u8]) -> Result<Node, Error> {
    let rec: NodeRecord = serde_json::from_slice(bytes)
        .map_err(|e| Error::Corrupt(format!("invalid node record: {}", e)))?;
    Node::try_from(rec)
}

/// Builds the largest node `to_json` can ever produce for the given dimensions, used to
/// size the fixed slot width (`S_node`). See `crate::codec::node_slot_width`.
pub fn worst_case(num_keys: usize, key_size: usize, data_size: usize) -> Node {
    let is_internal = num_keys > 0;
    Node {
        offset: u64::MAX,
        upper_node: u64::MAX,
        left_node: u64::MAX,
        right_node: u64::MAX,
        keys: vec![vec![0xFFu8; key_size]; num_keys],
        values: vec![vec![0xFFu8; data_size]; num_keys],
        children: if is_internal {
            vec![u64::MAX; num_keys + 1]
        } else {
            vec![]
        },
    }
}

/// Lossless byte-string <-> JSON-string mapping: byte `b` maps to the Unicode scalar
/// value `b` (Latin-1 range), so every `u8` sequence round-trips through a JSON string
/// without escaping ambiguity, at the cost of control bytes and bytes `>= 0x80` costing
/// two UTF-8 bytes on disk instead of one.
mod textbytes {
    use crate::errors::Error;

    pub fn encode(bytes: &[u8]) -> String {
        bytes.iter().map(|&b| b as char).collect()
    }

    pub fn decode(s: &str) -> Result<Vec<u8>, Error> {
        s.chars()
            .map(|c| {
                u32::from(c)
                    .try_into()
                    .map_err(|_| Error::Corrupt(format!("byte string contains char {:?}", c)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_arbitrary_bytes() {
        let mut node = Node::new_at(128);
        node.keys = vec![vec![0, 1, 2, 255, 128], vec![b'h', b'i']];
        node.values = vec![vec![9, 9], vec![0]];
        node.children = vec![1, 2, 3];

        let bytes = to_json(&node).unwrap();
        let back = from_json(&bytes).unwrap();
        assert_eq!(node, back);
    }

    #[test]
    fn rejects_mismatched_key_value_counts() {
        let bad = br#"{"offset":0,"upper_node":0,"left_node":0,"right_node":0,"key":["a"],"data":[],"lower_node":[]}"#;
        assert!(from_json(bad).is_err());
    }
}
