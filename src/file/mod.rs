//! Buffered File Module
//!
//! A single logical data file made of an on-disk region and an in-memory
//! write-behind buffer.
//!
//! ## Responsibilities
//! - Append-only writes batched through a pending buffer
//! - Reads at arbitrary offsets, flushing the buffer only when needed
//! - Chunk migration between two files (defragmentation)
//! - Lost-write detection on close
//!
//! ## Layout
//! ```text
//! 0                      on_disk                 logical_size
//! ├──────────────────────────┼───────────────────────┤
//! │    flushed (on disk)     │  pending (BytesMut)   │
//! └──────────────────────────┴───────────────────────┘
//!          ◄── direct reads ──┤ reads here flush first
//! ```

mod buffered;
mod positional;

pub use buffered::BufferedFile;
