//! Tests for ChunkIndex
//!
//! These tests verify:
//! - Basic put/get/remove operations
//! - Live-byte accounting across overwrites and removals
//! - Fragmentation percentages and extents

use chunkstore::index::{fragmentation_percent, Chunk, ChunkIndex};
use chunkstore::Key;

// =============================================================================
// Helper Functions
// =============================================================================

fn key(n: u32) -> Key {
    Key::new(vec![n], vec![0])
}

// =============================================================================
// Basic Operations
// =============================================================================

#[test]
fn test_new_index_is_empty() {
    let index = ChunkIndex::new();

    assert!(index.is_empty());
    assert_eq!(index.len(), 0);
    assert_eq!(index.live_bytes(), 0);
    assert_eq!(index.max_extent(), 0);
}

#[test]
fn test_put_and_get() {
    let mut index = ChunkIndex::new();

    let chunk = index.put(key(1), 0, 10);

    assert_eq!(chunk, Chunk::new(0, 10));
    assert_eq!(index.get(&key(1)), Some(Chunk::new(0, 10)));
    assert!(index.contains(&key(1)));
    assert_eq!(index.get(&key(2)), None);
}

#[test]
fn test_put_overwrites_chunk() {
    let mut index = ChunkIndex::new();
    index.put(key(1), 0, 10);

    index.put(key(1), 10, 4);

    assert_eq!(index.len(), 1);
    assert_eq!(index.get(&key(1)), Some(Chunk::new(10, 4)));
    assert_eq!(index.live_bytes(), 4);
}

#[test]
fn test_remove_returns_size() {
    let mut index = ChunkIndex::new();
    index.put(key(1), 0, 10);
    index.put(key(2), 10, 20);

    assert_eq!(index.remove(&key(1)), 10);
    assert_eq!(index.remove(&key(1)), 0);
    assert_eq!(index.live_bytes(), 20);
    assert_eq!(index.len(), 1);
}

#[test]
fn test_keys_and_iter_cover_all_entries() {
    let mut index = ChunkIndex::new();
    for n in 0..10 {
        index.put(key(n), n as u64 * 8, 8);
    }

    let mut keys: Vec<Key> = index.keys().cloned().collect();
    keys.sort();
    assert_eq!(keys, (0..10).map(key).collect::<Vec<_>>());

    let total: u64 = index.iter().map(|(_, chunk)| chunk.size as u64).sum();
    assert_eq!(total, index.live_bytes());
}

#[test]
fn test_clear() {
    let mut index = ChunkIndex::new();
    index.put(key(1), 0, 10);

    index.clear();

    assert!(index.is_empty());
    assert_eq!(index.live_bytes(), 0);
}

// =============================================================================
// Fragmentation
// =============================================================================

#[test]
fn test_max_extent() {
    let mut index = ChunkIndex::new();
    index.put(key(1), 100, 10);
    index.put(key(2), 0, 50);

    assert_eq!(index.max_extent(), 110);
}

#[test]
fn test_fragmentation_percent() {
    assert_eq!(fragmentation_percent(0, 0), 0);
    assert_eq!(fragmentation_percent(100, 100), 0);
    assert_eq!(fragmentation_percent(100, 25), 75);
    assert_eq!(fragmentation_percent(100, 0), 100);
    // 1 dead byte of 3 rounds to 33
    assert_eq!(fragmentation_percent(3, 2), 33);
    // 2 dead bytes of 3 rounds to 67
    assert_eq!(fragmentation_percent(3, 1), 67);
}

#[test]
fn test_index_fragmentation_tracks_overwrites() {
    let mut index = ChunkIndex::new();
    index.put(key(1), 0, 10);
    index.put(key(2), 10, 10);
    assert_eq!(index.fragmentation_percent(20), 0);

    // Overwrite appends a new chunk, old bytes become dead
    index.put(key(1), 20, 10);
    assert_eq!(index.fragmentation_percent(30), 33);

    index.remove(&key(2));
    assert_eq!(index.fragmentation_percent(30), 67);
}
