//! Tests for CachedStore
//!
//! These tests verify:
//! - Misses load and decode from the store
//! - Writes stay in the cache until eviction or flush
//! - Predicate eviction persists dirty objects
//! - Dirty objects stay cached when the store rejects their write-back

use std::sync::Arc;

use chunkstore::{CachedStore, Config, DoubleBufferedStore, Key, Storage, StoreError};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Record {
    name: String,
    points: Vec<u32>,
}

fn record(n: u32) -> Record {
    Record {
        name: format!("record-{}", n),
        points: (0..n).collect(),
    }
}

fn key(n: u32) -> Key {
    Key::new(vec![1], vec![n])
}

fn store_config(temp_dir: &TempDir) -> Config {
    Config::builder()
        .data_dir(temp_dir.path())
        .base_name("cache")
        .build()
}

fn open_store(temp_dir: &TempDir) -> DoubleBufferedStore {
    let store = DoubleBufferedStore::new(store_config(temp_dir)).unwrap();
    assert!(store.open(true).unwrap());
    store
}

/// A store holding record 9, reopened read-only so every write-back fails
fn read_only_store(temp_dir: &TempDir) -> DoubleBufferedStore {
    {
        let store = open_store(temp_dir);
        store
            .write(&key(9), &bincode::serialize(&record(9)).unwrap())
            .unwrap();
        store.close().unwrap();
    }
    let store = DoubleBufferedStore::new(store_config(temp_dir)).unwrap();
    assert!(store.open(false).unwrap());
    store
}

fn stored_record(store: &DoubleBufferedStore, n: u32) -> Option<Record> {
    store
        .read(&key(n))
        .unwrap()
        .map(|bytes| bincode::deserialize(&bytes).unwrap())
}

// =============================================================================
// Read Path
// =============================================================================

#[test]
fn test_get_loads_from_store() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir);
    store
        .write(&key(3), &bincode::serialize(&record(3)).unwrap())
        .unwrap();
    let cached: CachedStore<_, Record> = CachedStore::new(store, 4);

    let first = cached.get(&key(3)).unwrap().unwrap();
    let second = cached.get(&key(3)).unwrap().unwrap();

    assert_eq!(*first, record(3));
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cached.cached_len(), 1);
}

#[test]
fn test_get_missing() {
    let temp_dir = TempDir::new().unwrap();
    let cached: CachedStore<_, Record> = CachedStore::new(open_store(&temp_dir), 4);

    assert!(cached.get(&key(1)).unwrap().is_none());
    assert_eq!(cached.cached_len(), 0);
}

// =============================================================================
// Write Path
// =============================================================================

#[test]
fn test_put_is_write_back() {
    let temp_dir = TempDir::new().unwrap();
    let cached = CachedStore::new(open_store(&temp_dir), 4);

    cached.put(key(1), record(1)).unwrap();

    assert_eq!(*cached.get(&key(1)).unwrap().unwrap(), record(1));
    assert!(!cached.storage().has_key(&key(1)).unwrap());

    assert_eq!(cached.flush().unwrap(), 1);
    assert_eq!(stored_record(cached.storage(), 1), Some(record(1)));
    // Nothing dirty anymore
    assert_eq!(cached.flush().unwrap(), 0);
}

#[test]
fn test_eviction_writes_back_dirty_object() {
    let temp_dir = TempDir::new().unwrap();
    let cached = CachedStore::new(open_store(&temp_dir), 2);

    cached.put(key(1), record(1)).unwrap();
    cached.put(key(2), record(2)).unwrap();
    cached.put(key(3), record(3)).unwrap();

    assert_eq!(cached.cached_len(), 2);
    assert_eq!(stored_record(cached.storage(), 1), Some(record(1)));
    assert_eq!(stored_record(cached.storage(), 2), None);
    // Reloaded from the store
    assert_eq!(*cached.get(&key(1)).unwrap().unwrap(), record(1));
}

#[test]
fn test_evict_where_persists_matches() {
    let temp_dir = TempDir::new().unwrap();
    let cached = CachedStore::new(open_store(&temp_dir), 10);
    for n in 0..6 {
        cached.put(key(n), record(n)).unwrap();
    }

    let evicted = cached
        .evict_where(|_, value: &Record| value.points.len() >= 3)
        .unwrap();

    assert_eq!(evicted, 3);
    assert_eq!(cached.cached_len(), 3);
    for n in 3..6 {
        assert_eq!(stored_record(cached.storage(), n), Some(record(n)));
    }
    assert_eq!(stored_record(cached.storage(), 0), None);
}

#[test]
fn test_failed_write_back_on_put_keeps_victim() {
    let temp_dir = TempDir::new().unwrap();
    let cached = CachedStore::new(read_only_store(&temp_dir), 1);
    cached.put(key(1), record(1)).unwrap();

    let result = cached.put(key(2), record(2));

    assert!(matches!(result, Err(StoreError::ReadOnly)));
    assert_eq!(cached.cached_len(), 1);
    assert_eq!(*cached.get(&key(1)).unwrap().unwrap(), record(1));
    assert!(cached.get(&key(2)).unwrap().is_none());
}

#[test]
fn test_failed_write_back_on_get_keeps_victim() {
    let temp_dir = TempDir::new().unwrap();
    let cached = CachedStore::new(read_only_store(&temp_dir), 1);
    cached.put(key(1), record(1)).unwrap();

    let result = cached.get(&key(9));

    assert!(matches!(result, Err(StoreError::ReadOnly)));
    assert_eq!(cached.cached_len(), 1);
    assert_eq!(*cached.get(&key(1)).unwrap().unwrap(), record(1));
}

#[test]
fn test_failed_evict_where_keeps_every_match() {
    let temp_dir = TempDir::new().unwrap();
    let cached = CachedStore::new(read_only_store(&temp_dir), 4);
    for n in 0..3 {
        cached.put(key(n), record(n)).unwrap();
    }
    // Clean objects need no write and still leave
    assert_eq!(*cached.get(&key(9)).unwrap().unwrap(), record(9));

    let result = cached.evict_where(|_, _: &Record| true);

    assert!(matches!(result, Err(StoreError::ReadOnly)));
    assert_eq!(cached.cached_len(), 3);
    for n in 0..3 {
        assert_eq!(*cached.get(&key(n)).unwrap().unwrap(), record(n));
    }
}

#[test]
fn test_remove_drops_cache_and_store() {
    let temp_dir = TempDir::new().unwrap();
    let cached = CachedStore::new(open_store(&temp_dir), 4);
    cached.put(key(1), record(1)).unwrap();
    cached.flush().unwrap();

    cached.remove(&key(1)).unwrap();

    assert!(cached.get(&key(1)).unwrap().is_none());
    assert!(!cached.storage().has_key(&key(1)).unwrap());
}

#[test]
fn test_flushed_objects_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    {
        let cached = CachedStore::new(open_store(&temp_dir), 4);
        for n in 0..4 {
            cached.put(key(n), record(n)).unwrap();
        }
        cached.flush().unwrap();
        cached.storage().close().unwrap();
    }

    let config = Config::builder().cache_capacity(2).build();
    let cached: CachedStore<_, Record> = CachedStore::with_config(open_store(&temp_dir), &config);

    for n in 0..4 {
        assert_eq!(*cached.get(&key(n)).unwrap().unwrap(), record(n));
    }
    assert_eq!(cached.cached_len(), 2);
}
