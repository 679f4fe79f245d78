//! Fixed-width padding around the JSON records produced by [`crate::header`] and
//! [`crate::node`].
//!
//! Every slot is a textual record padded with ASCII spaces so it can be overwritten in
//! place without ever shifting a neighboring slot. Widths are computed once, at creation
//! time, from the worst case the schema (`num_keys`/`key_size`/`data_size`) can produce,
//! plus a safety margin — the reference byte counts in the format description are a
//! starting point, not a contract, so we measure rather than hard-code them.

use crate::errors::Error;
use crate::storage::header::{self, Header};
use crate::storage::node::{self, Node};

/// Extra bytes of slack reserved on top of the measured worst case, to absorb small
/// encoder differences between `serde_json` versions.
const MARGIN: usize = 32;

pub fn node_slot_width(num_keys: usize, key_size: usize, data_size: usize) -> Result<usize, Error> {
    let worst = node::worst_case(num_keys, key_size, data_size);
    let measured = node::to_json(&worst)?.len();
    Ok(round_up(measured + MARGIN, 16))
}

pub fn header_slot_width(
    num_keys: usize,
    key_size: usize,
    data_size: usize,
    max_free_nodes: usize,
) -> Result<usize, Error> {
    let worst = header::worst_case(num_keys, key_size, data_size, max_free_nodes);
    let measured = header::to_json(&worst)?.len();
    Ok(round_up(measured + MARGIN, 16))
}

fn round_up(value: usize, to: usize) -> usize {
    (value + to - 1) / to * to
}

/// Pads an encoded record to `width` with trailing ASCII spaces.
pub fn pad(mut bytes: Vec<u8>, width: usize) -> Result<Vec<u8>, Error> {
    if bytes.len() > width {
        return Err(Error::Corrupt(format!(
            "encoded record of {} bytes does not fit its {}-byte slot",
            bytes.len(),
            width
        )));
    }
    bytes.resize(width, b' ');
    Ok(bytes)
}

/// Strips the trailing space padding (and, for the header, the terminating newline).
fn unpad(bytes: &[u8]) -> &[u8] {
    let trimmed = bytes
        .iter()
        .rposition(|&b| b != b' ' && b != b'\n')
        .map(|last| &bytes[..=last])
        .unwrap_or(&[]);
    trimmed
}

pub fn encode_node_slot(node: &Node, width: usize) -> Result<Vec<u8>, Error> {
    pad(node::to_json(node)?, width)
}

pub fn decode_node_slot(bytes: &[u8]) -> Result<Node, Error> {
    node::from_json(unpad(bytes))
}

/// Encodes the header record: JSON padded to `width`, followed by the `\n` terminator
/// the file layout reserves room for (see `crate::file`).
pub fn encode_header_slot(header: &Header, width: usize) -> Result<Vec<u8>, Error> {
    let mut bytes = pad(header::to_json(header)?, width)?;
    bytes.push(b'\n');
    Ok(bytes)
}

pub fn decode_header_slot(bytes: &[u8]) -> Result<Header, Error> {
    header::from_json(unpad(bytes))
}
