//! `ordkv`: a persistent, disk-resident ordered key-value store backed by a single
//! fixed-slot B-tree file. See [`Store`] for the public surface.

pub mod errors;
pub mod storage;
pub mod store;

pub use errors::Error;
pub use store::{Store, DEFAULT_DATA_SIZE, DEFAULT_KEY_SIZE, DEFAULT_NUM_KEYS};
