//! Chunk Index Module
//!
//! Maps keys to the byte range holding their latest value in one data file.
//!
//! ## Responsibilities
//! - Point lookup, upsert and removal of chunks
//! - Live-byte accounting for fragmentation
//! - Exact-round-trip persistence of the mapping
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (14 bytes)                                       │
//! │   Magic: "CKIX" (4) | Version: u16 (2) | Count: u64 (8) │
//! ├─────────────────────────────────────────────────────────┤
//! │ Records (variable)                                      │
//! │   [KeyLen: u32][Key (bincode)][Offset: u64][Size: u32]  │
//! │   ... repeated Count times ...                          │
//! ├─────────────────────────────────────────────────────────┤
//! │ Footer (4 bytes)                                        │
//! │   CRC32 of all record bytes                             │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod codec;
mod table;

pub use table::ChunkIndex;

/// Byte range of one stored value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Chunk {
    pub offset: u64,
    pub size: u32,
}

impl Chunk {
    pub fn new(offset: u64, size: u32) -> Self {
        Self { offset, size }
    }

    /// First byte after the chunk
    pub fn end(&self) -> u64 {
        self.offset + self.size as u64
    }
}

/// Percentage of `file_size` not covered by live chunks, rounded
///
/// Zero for an empty file.
pub fn fragmentation_percent(file_size: u64, live_bytes: u64) -> u8 {
    if file_size == 0 {
        return 0;
    }
    let dead = file_size.saturating_sub(live_bytes) as u128;
    let size = file_size as u128;
    ((dead * 100 + size / 2) / size) as u8
}
