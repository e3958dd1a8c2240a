//! Tests for the persisted chunk index format
//!
//! These tests verify:
//! - A stored index loads back with the same mapping
//! - Damaged or foreign input loads as "no index" rather than an error

use chunkstore::index::ChunkIndex;
use chunkstore::Key;

// =============================================================================
// Helper Functions
// =============================================================================

fn sample_index() -> ChunkIndex {
    let mut index = ChunkIndex::new();
    index.put(Key::new(vec![1, 2], vec![3]), 0, 10);
    index.put(Key::new(vec![1, 2], vec![4]), 10, 25);
    index.put(Key::primary(vec![7]), 35, 0);
    index.put(Key::new(vec![u32::MAX], vec![0, 0, 0]), 35, 100);
    index
}

fn encode(index: &ChunkIndex) -> Vec<u8> {
    let mut buf = Vec::new();
    index.store(&mut buf).unwrap();
    buf
}

// =============================================================================
// Round Trip
// =============================================================================

#[test]
fn test_store_and_load() {
    let index = sample_index();
    let bytes = encode(&index);

    let loaded = ChunkIndex::load(bytes.as_slice()).unwrap().unwrap();

    assert_eq!(loaded.len(), index.len());
    assert_eq!(loaded.live_bytes(), index.live_bytes());
    for (key, chunk) in index.iter() {
        assert_eq!(loaded.get(key), Some(*chunk));
    }
}

#[test]
fn test_store_and_load_empty() {
    let bytes = encode(&ChunkIndex::new());

    assert_eq!(&bytes[0..4], b"CKIX");
    let loaded = ChunkIndex::load(bytes.as_slice()).unwrap().unwrap();
    assert!(loaded.is_empty());
}

// =============================================================================
// Damaged Input
// =============================================================================

#[test]
fn test_load_empty_input() {
    let loaded = ChunkIndex::load(&b""[..]).unwrap();

    assert!(loaded.is_none());
}

#[test]
fn test_load_wrong_magic() {
    let mut bytes = encode(&sample_index());
    bytes[0] = b'X';

    assert!(ChunkIndex::load(bytes.as_slice()).unwrap().is_none());
}

#[test]
fn test_load_stale_version() {
    let mut bytes = encode(&sample_index());
    bytes[4] = 99;

    assert!(ChunkIndex::load(bytes.as_slice()).unwrap().is_none());
}

#[test]
fn test_load_truncated() {
    let bytes = encode(&sample_index());

    for len in [5, 14, 20, bytes.len() - 1] {
        let loaded = ChunkIndex::load(&bytes[..len]).unwrap();
        assert!(loaded.is_none(), "prefix of {} bytes loaded", len);
    }
}

#[test]
fn test_load_flipped_record_byte() {
    let mut bytes = encode(&sample_index());
    // Last byte of the final record's size field, just before the CRC
    let target = bytes.len() - 5;
    bytes[target] ^= 0xFF;

    assert!(ChunkIndex::load(bytes.as_slice()).unwrap().is_none());
}

#[test]
fn test_load_bad_checksum() {
    let mut bytes = encode(&sample_index());
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;

    assert!(ChunkIndex::load(bytes.as_slice()).unwrap().is_none());
}
