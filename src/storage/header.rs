//! The tree header: the single record at file offset 0 describing shape and free space.

use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// Lifetime counters for a store. Exposed verbatim through `Store::stats`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub nodes: u64,
    pub keys: u64,
    pub splits: u64,
    pub merges: u64,
    pub threads_left: u64,
    pub threads_right: u64,
    pub levels: u64,
    pub cache_hit: u64,
    pub cache_miss: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Header {
    pub num_keys: usize,
    pub key_size: usize,
    pub data_size: usize,
    pub root_offset: u64,
    pub free_offset: Vec<u64>,
    pub last_offset: u64,
    pub stats: Stats,
}

/// Lower bound below which a branching factor degenerates (the root could never hold a
/// useful fan-out) and above which a single node record would dominate the file.
pub const MIN_NUM_KEYS: usize = 3;
pub const MAX_NUM_KEYS: usize = 1024;

pub fn min_occup(num_keys: usize) -> usize {
    num_keys / 3
}

impl Header {
    pub fn new(num_keys: usize, key_size: usize, data_size: usize) -> Result<Self, Error> {
        if !(MIN_NUM_KEYS..=MAX_NUM_KEYS).contains(&num_keys) {
            return Err(Error::InvalidArgument(format!(
                "num_keys must be in {}..={}, got {}",
                MIN_NUM_KEYS, MAX_NUM_KEYS, num_keys
            )));
        }
        if key_size == 0 {
            return Err(Error::InvalidArgument("key_size must be > 0".into()));
        }
        if data_size == 0 {
            return Err(Error::InvalidArgument("data_size must be > 0".into()));
        }
        Ok(Header {
            num_keys,
            key_size,
            data_size,
            root_offset: 0,
            free_offset: Vec::new(),
            last_offset: 0,
            stats: Stats::default(),
        })
    }
}

/// Encodes the header to a compact JSON object (no padding; see `crate::codec`).
pub fn to_json(header: &Header) -> Result<Vec<u8>, Error> {
    Ok(serde_json::to_vec(header)?)
}

pub fn from_json(bytes: &[u8]) -> Result<Header, Error> {
    serde_json::from_slice(bytes).map_err(|e| Error::Corrupt(format!("invalid header: {}", e)))
}

/// Builds the largest header `to_json` could ever produce for a store with the given
/// dimensions, used to size the fixed header width (`S_header`).
pub fn worst_case(num_keys: usize, key_size: usize, data_size: usize, max_free_nodes: usize) -> Header {
    Header {
        num_keys,
        key_size,
        data_size,
        root_offset: u64::MAX,
        free_offset: vec![u64::MAX; max_free_nodes + 1],
        last_offset: u64::MAX,
        stats: Stats {
            nodes: u64::MAX,
            keys: u64::MAX,
            splits: u64::MAX,
            merges: u64::MAX,
            threads_left: u64::MAX,
            threads_right: u64::MAX,
            levels: u64::MAX,
            cache_hit: u64::MAX,
            cache_miss: u64::MAX,
        },
    }
}
