//! Black-box integration tests driving `Store` through its public API against a temp
//! file, covering the laws and boundary cases from the design notes.

use ordkv::{Error, Store};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn store_at(dir: &tempfile::TempDir, num_keys: usize, key_size: usize, data_size: usize) -> Store {
    Store::create(dir.path().join("store.db"), num_keys, key_size, data_size).unwrap()
}

#[test]
fn round_trip_law() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = store_at(&dir, 5, 16, 16);
    store.put(b"hello", b"world").unwrap();
    assert_eq!(store.get(b"hello").unwrap(), b"world");
}

#[test]
fn update_idempotence_law() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = store_at(&dir, 5, 16, 16);
    store.put(b"k", b"v1").unwrap();
    store.put(b"k", b"v1").unwrap();
    assert_eq!(store.get(b"k").unwrap(), b"v1");
    assert_eq!(store.len().unwrap(), 1);
}

#[test]
fn delete_then_miss_law() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = store_at(&dir, 5, 16, 16);
    store.put(b"k", b"v").unwrap();
    store.delete(b"k").unwrap();
    assert!(!store.contains(b"k").unwrap());
    assert!(matches!(store.get(b"k"), Err(Error::KeyNotFound)));
}

#[test]
fn order_law_holds_for_randomly_ordered_inserts() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = store_at(&dir, 7, 16, 16);

    let mut rng = StdRng::seed_from_u64(42);
    let mut keys: Vec<u32> = (0..500).collect();
    // Fisher-Yates, deterministic under the seeded RNG.
    for i in (1..keys.len()).rev() {
        let j = rng.gen_range(0..=i);
        keys.swap(i, j);
    }
    for &k in &keys {
        store.put(&k.to_be_bytes(), &k.to_be_bytes()).unwrap();
    }

    let forward: Vec<u32> = store
        .iter()
        .unwrap()
        .map(|r| u32::from_be_bytes(r.unwrap().0.try_into().unwrap()))
        .collect();
    let mut sorted = keys.clone();
    sorted.sort_unstable();
    assert_eq!(forward, sorted);

    let reverse: Vec<u32> = store
        .iter_reverse()
        .unwrap()
        .map(|r| u32::from_be_bytes(r.unwrap().0.try_into().unwrap()))
        .collect();
    let mut sorted_desc = sorted.clone();
    sorted_desc.reverse();
    assert_eq!(reverse, sorted_desc);
}

#[test]
fn persistence_law_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");
    {
        let mut store = Store::create(&path, 5, 16, 16).unwrap();
        for k in [b"a", b"b", b"c"] {
            store.put(k, k).unwrap();
        }
        store.delete(b"b").unwrap();
    }
    let mut reopened = Store::open(&path).unwrap();
    assert_eq!(reopened.get(b"a").unwrap(), b"a");
    assert!(!reopened.contains(b"b").unwrap());
    assert_eq!(reopened.get(b"c").unwrap(), b"c");
    assert!(reopened.check_consistency().unwrap());
}

#[test]
fn compaction_shrinks_file_after_enough_deletes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");
    let mut store = Store::create(&path, 3, 16, 16).unwrap();

    for i in 0..400u32 {
        store.put(&i.to_be_bytes(), &i.to_be_bytes()).unwrap();
    }
    let len_before = std::fs::metadata(&path).unwrap().len();
    for i in 0..400u32 {
        store.delete(&i.to_be_bytes()).unwrap();
    }
    let len_after = std::fs::metadata(&path).unwrap().len();
    assert!(len_after < len_before, "{} should be < {}", len_after, len_before);
}

#[test]
fn num_keys_bounds_are_enforced() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        Store::create(dir.path().join("a.db"), 2, 16, 16),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        Store::create(dir.path().join("b.db"), 1025, 16, 16),
        Err(Error::InvalidArgument(_))
    ));
    assert!(Store::create(dir.path().join("c.db"), 3, 16, 16).is_ok());
    assert!(Store::create(dir.path().join("d.db"), 1024, 16, 16).is_ok());
}

#[test]
fn value_at_exactly_data_size_is_accepted_one_over_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = store_at(&dir, 5, 16, 8);
    let exact = vec![0u8; 8];
    let over = vec![0u8; 9];
    store.put(b"k", &exact).unwrap();
    assert!(matches!(store.put(b"k2", &over), Err(Error::ValueTooLarge { .. })));
}

#[test]
fn deleting_the_last_key_leaves_an_empty_but_usable_root() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = store_at(&dir, 5, 16, 16);
    store.put(b"only", b"1").unwrap();
    store.delete(b"only").unwrap();
    assert_eq!(store.len().unwrap(), 0);
    store.put(b"again", b"2").unwrap();
    assert_eq!(store.get(b"again").unwrap(), b"2");
}

#[test]
fn root_split_and_collapse_track_levels() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = store_at(&dir, 3, 16, 16);

    for i in 0..50u32 {
        store.put(&i.to_be_bytes(), &i.to_be_bytes()).unwrap();
    }
    let levels_after_growth = store.stats().unwrap().levels;
    assert!(levels_after_growth > 0, "inserting past one node's capacity must split the root");

    for i in 0..50u32 {
        store.delete(&i.to_be_bytes()).unwrap();
    }
    assert_eq!(store.len().unwrap(), 0);
    assert!(store.check_consistency().unwrap());
}

#[test]
fn large_workload_remains_structurally_consistent() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = store_at(&dir, 11, 16, 16);

    let mut rng = StdRng::seed_from_u64(7);
    let mut present = std::collections::BTreeSet::new();
    for _ in 0..2000 {
        let k: u32 = rng.gen_range(0..1000);
        if present.contains(&k) {
            store.delete(&k.to_be_bytes()).unwrap();
            present.remove(&k);
        } else {
            store.put(&k.to_be_bytes(), &k.to_be_bytes()).unwrap();
            present.insert(k);
        }
    }

    assert_eq!(store.len().unwrap(), present.len() as u64);
    assert!(store.check_consistency().unwrap());
    let forward: Vec<u32> = store
        .iter()
        .unwrap()
        .map(|r| u32::from_be_bytes(r.unwrap().0.try_into().unwrap()))
        .collect();
    let expected: Vec<u32> = present.into_iter().collect();
    assert_eq!(forward, expected);
}
