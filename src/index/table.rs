//! Chunk index table
//!
//! HashMap-based key → chunk mapping with live-byte accounting.

use std::collections::HashMap;
use std::io::{Read, Write};

use crate::error::Result;
use crate::key::Key;

use super::{codec, fragmentation_percent, Chunk};

/// In-memory index of one data file
///
/// Updating a key never frees its previous range: the old bytes become dead
/// space that only defragmentation reclaims. `live_bytes` is the sum of all
/// referenced chunk sizes.
///
/// ## Concurrency:
/// No internal locking. The owning store slot is guarded by the store lock.
#[derive(Debug, Default, Clone)]
pub struct ChunkIndex {
    chunks: HashMap<Key, Chunk>,
    live_bytes: u64,
}

impl ChunkIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the chunk of a key
    pub fn get(&self, key: &Key) -> Option<Chunk> {
        self.chunks.get(key).copied()
    }

    /// Point a key at a new chunk, replacing any previous one
    pub fn put(&mut self, key: Key, offset: u64, size: u32) -> Chunk {
        let chunk = Chunk::new(offset, size);
        if let Some(old) = self.chunks.insert(key, chunk) {
            self.live_bytes -= old.size as u64;
        }
        self.live_bytes += size as u64;
        chunk
    }

    /// Forget a key, returning the size of its chunk (0 if absent)
    pub fn remove(&mut self, key: &Key) -> u32 {
        match self.chunks.remove(key) {
            Some(old) => {
                self.live_bytes -= old.size as u64;
                old.size
            }
            None => 0,
        }
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.chunks.contains_key(key)
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Fresh iterator over all keys
    pub fn keys(&self) -> impl Iterator<Item = &Key> + '_ {
        self.chunks.keys()
    }

    /// Fresh iterator over all entries
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Chunk)> + '_ {
        self.chunks.iter()
    }

    /// Sum of the sizes of all referenced chunks
    pub fn live_bytes(&self) -> u64 {
        self.live_bytes
    }

    /// Largest `offset + size` over all chunks (0 when empty)
    ///
    /// An index whose extent exceeds its data file points at bytes that were
    /// never written.
    pub fn max_extent(&self) -> u64 {
        self.chunks.values().map(Chunk::end).max().unwrap_or(0)
    }

    /// Dead-space percentage of a file of `file_size` bytes indexed by this table
    pub fn fragmentation_percent(&self, file_size: u64) -> u8 {
        fragmentation_percent(file_size, self.live_bytes)
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.live_bytes = 0;
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Write the persisted form of this index
    pub fn store<W: Write>(&self, writer: W) -> Result<()> {
        codec::write_index(self, writer)
    }

    /// Read a persisted index
    ///
    /// Returns `Ok(None)` when the stream does not hold a valid index of the
    /// current version; callers start empty in that case. Only genuine I/O
    /// failures are errors. `live_bytes` is recomputed from the records.
    pub fn load<R: Read>(reader: R) -> Result<Option<Self>> {
        codec::read_index(reader)
    }
}
