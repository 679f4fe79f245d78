//! The public key-value mapping surface: the only thing callers outside this crate see.
//!
//! Every method here opens a scoped [`storage::Tx`] (file handle + header), does its
//! work, flushes the header, and lets the file handle drop — see §5 of the design notes.
//! The node cache is the one piece of state that outlives a single operation, so it
//! lives on `Store` itself.

use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::errors::Error;
use crate::storage::cache::NodeCache;
use crate::storage::header::Header;
use crate::storage::{alloc, check, codec, file, iter, mutate, search};
use crate::storage::{Stats, Tx};

pub const DEFAULT_NUM_KEYS: usize = 512;
pub const DEFAULT_KEY_SIZE: usize = 64;
pub const DEFAULT_DATA_SIZE: usize = 256;

/// A persistent, disk-resident ordered key-value store backed by a single file.
pub struct Store {
    path: PathBuf,
    s_header: usize,
    s_node: usize,
    cache: NodeCache,
}

impl Store {
    /// Creates a brand-new store file. Fails if `path` already exists.
    pub fn create(
        path: impl AsRef<Path>,
        num_keys: usize,
        key_size: usize,
        data_size: usize,
    ) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let header = Header::new(num_keys, key_size, data_size)?;
        let s_node = codec::node_slot_width(num_keys, key_size, data_size)?;
        let s_header = codec::header_slot_width(num_keys, key_size, data_size, alloc::DEFAULT_MAX_FREE_NODES)?;
        let header_bytes = codec::encode_header_slot(&header, s_header)?;
        file::initialize_file(&path, s_header, &header_bytes)?;

        let mut store = Store {
            path,
            s_header,
            s_node,
            cache: NodeCache::new(crate::storage::cache::DEFAULT_CAPACITY),
        };
        // The root always exists, even empty (invariant 1 allows a root with 0 keys).
        store.with_tx(|tx| {
            let root = tx.alloc()?;
            tx.header.root_offset = root.offset;
            Ok(())
        })?;
        info!(path = %store.path.display(), num_keys, key_size, data_size, "created store");
        Ok(store)
    }

    /// Opens an existing store file, bootstrapping the slot widths from the header's
    /// self-describing `num_keys`/`key_size`/`data_size` before reading it properly.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let prefix = read_header_prefix(&path)?;
        let header = codec::decode_header_slot(&prefix)?;
        let s_node = codec::node_slot_width(header.num_keys, header.key_size, header.data_size)?;
        let s_header = codec::header_slot_width(
            header.num_keys,
            header.key_size,
            header.data_size,
            alloc::DEFAULT_MAX_FREE_NODES,
        )?;

        let mut store = Store {
            path,
            s_header,
            s_node,
            cache: NodeCache::new(crate::storage::cache::DEFAULT_CAPACITY),
        };

        let violations = store.with_tx(check::check)?;
        if !violations.is_empty() {
            for v in &violations {
                warn!(%v, "consistency violation at open");
            }
            return Err(Error::Corrupt(format!(
                "{} structural violation(s) found at open",
                violations.len()
            )));
        }
        info!(path = %store.path.display(), "opened store");
        Ok(store)
    }

    /// Looks up `key`, failing with `KeyNotFound` if it is absent.
    pub fn get(&mut self, key: &[u8]) -> Result<Vec<u8>, Error> {
        self.with_tx(|tx| {
            let (node, i, found) = search::rec_search(tx, tx.header.root_offset, key)?;
            if found {
                Ok(node.values[i].clone())
            } else {
                Err(Error::KeyNotFound)
            }
        })
    }

    /// Inserts or updates `key` with `value`.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        self.with_tx(|tx| mutate::insert(tx, key, value))
    }

    /// Deletes `key`, failing with `KeyNotFound` if it is absent.
    pub fn delete(&mut self, key: &[u8]) -> Result<(), Error> {
        self.with_tx(|tx| mutate::delete(tx, key))
    }

    /// Reports whether `key` is present.
    pub fn contains(&mut self, key: &[u8]) -> Result<bool, Error> {
        self.with_tx(|tx| {
            let (_, _, found) = search::rec_search(tx, tx.header.root_offset, key)?;
            Ok(found)
        })
    }

    /// The number of keys currently stored.
    pub fn len(&mut self) -> Result<u64, Error> {
        self.with_tx(|tx| Ok(tx.header.stats.keys))
    }

    pub fn is_empty(&mut self) -> Result<bool, Error> {
        Ok(self.len()? == 0)
    }

    /// A copy of the lifetime counters.
    pub fn stats(&mut self) -> Result<Stats, Error> {
        self.with_tx(|tx| Ok(tx.header.stats))
    }

    /// Runs the whole-tree structural audit without treating any failure as fatal.
    pub fn check_consistency(&mut self) -> Result<bool, Error> {
        let violations = self.with_tx(check::check)?;
        for v in &violations {
            warn!(%v, "consistency violation");
        }
        Ok(violations.is_empty())
    }

    /// Forward (ascending key order) iteration.
    pub fn iter(&mut self) -> Result<Iter<'_>, Error> {
        let mut tx = Tx::open(&self.path, &mut self.cache, self.s_header, self.s_node)?;
        let cursor = iter::Cursor::first(&mut tx)?;
        Ok(Iter { tx, cursor })
    }

    /// Reverse (descending key order) iteration.
    pub fn iter_reverse(&mut self) -> Result<Iter<'_>, Error> {
        let mut tx = Tx::open(&self.path, &mut self.cache, self.s_header, self.s_node)?;
        let cursor = iter::Cursor::last(&mut tx)?;
        Ok(Iter { tx, cursor })
    }

    fn with_tx<T>(&mut self, f: impl FnOnce(&mut Tx) -> Result<T, Error>) -> Result<T, Error> {
        let mut tx = Tx::open(&self.path, &mut self.cache, self.s_header, self.s_node)?;
        let result = f(&mut tx);
        tx.flush_header()?;
        result
    }
}

/// A live cursor over a [`Store`]'s entries, produced by [`Store::iter`] or
/// [`Store::iter_reverse`]. Holds its own scoped file handle for its lifetime, matching
/// the "iteration is one long-lived operation" read in §4.9.
pub struct Iter<'a> {
    tx: Tx<'a>,
    cursor: iter::Cursor,
}

impl<'a> Iterator for Iter<'a> {
    type Item = Result<(Vec<u8>, Vec<u8>), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.cursor.next(&mut self.tx) {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

impl<'a> Drop for Iter<'a> {
    fn drop(&mut self) {
        if let Err(e) = self.tx.flush_header() {
            warn!(error = %e, "failed to flush header at end of iteration");
        }
    }
}

/// Reads everything up to (not including) the header's terminating `\n`, without yet
/// knowing `S_header` (it depends on fields the header itself carries).
fn read_header_prefix(path: &Path) -> Result<Vec<u8>, Error> {
    let mut file = std::fs::File::open(path)?;
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = file.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.contains(&b'\n') {
            break;
        }
    }
    let pos = buf
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| Error::Corrupt("store file is missing its header terminator".into()))?;
    buf.truncate(pos);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(num_keys: usize) -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let store = Store::create(&path, num_keys, 16, 16).unwrap();
        (dir, store)
    }

    #[test]
    fn round_trip_put_get() {
        let (_dir, mut store) = temp_store(5);
        store.put(b"a", b"1").unwrap();
        assert_eq!(store.get(b"a").unwrap(), b"1");
    }

    #[test]
    fn update_is_idempotent_on_len() {
        let (_dir, mut store) = temp_store(5);
        store.put(b"a", b"1").unwrap();
        store.put(b"a", b"1").unwrap();
        assert_eq!(store.get(b"a").unwrap(), b"1");
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn delete_then_miss() {
        let (_dir, mut store) = temp_store(5);
        store.put(b"a", b"1").unwrap();
        store.delete(b"a").unwrap();
        assert!(!store.contains(b"a").unwrap());
        assert!(matches!(store.get(b"a"), Err(Error::KeyNotFound)));
    }

    #[test]
    fn iteration_yields_sorted_order() {
        let (_dir, mut store) = temp_store(5);
        for k in [b"d", b"b", b"a", b"c"] {
            store.put(k, k).unwrap();
        }
        let forward: Vec<_> = store.iter().unwrap().map(|r| r.unwrap().0).collect();
        assert_eq!(forward, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec()]);

        let reverse: Vec<_> = store.iter_reverse().unwrap().map(|r| r.unwrap().0).collect();
        assert_eq!(reverse, vec![b"d".to_vec(), b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]);
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        {
            let mut store = Store::create(&path, 5, 16, 16).unwrap();
            store.put(b"a", b"1").unwrap();
        }
        let mut reopened = Store::open(&path).unwrap();
        assert_eq!(reopened.get(b"a").unwrap(), b"1");
        assert!(reopened.check_consistency().unwrap());
    }

    #[test]
    fn create_rejects_out_of_bounds_num_keys() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Store::create(dir.path().join("too_small.db"), 1, 16, 16),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            Store::create(dir.path().join("too_big.db"), 4096, 16, 16),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn rejects_oversized_value() {
        let (_dir, mut store) = temp_store(5);
        let big = vec![0u8; 17];
        assert!(matches!(store.put(b"a", &big), Err(Error::ValueTooLarge { .. })));
    }

    #[test]
    fn many_inserts_and_deletes_stay_consistent() {
        let (_dir, mut store) = temp_store(5);
        for i in 0..200u32 {
            store.put(&i.to_be_bytes(), &i.to_be_bytes()).unwrap();
        }
        for i in (0..200u32).step_by(2) {
            store.delete(&i.to_be_bytes()).unwrap();
        }
        assert!(store.check_consistency().unwrap());
        assert_eq!(store.len().unwrap(), 100);
    }
}
