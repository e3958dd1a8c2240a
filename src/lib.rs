//! # chunkstore
//!
//! A persistent key-value chunk store with:
//! - Buffered append-only data files
//! - In-memory chunk indexes persisted on close
//! - Online, incremental defragmentation across two file slots
//! - A bounded FIFO/LFU eviction cache for decoded objects
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 CachedStore (optional)                       │
//! │          EvictionCache<Key, decoded object>                  │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ Storage contract
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                DoubleBufferedStore                           │
//! │     (shared-lock reads / exclusive-lock writes + defrag)     │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │   Slot A    │          │   Slot B    │
//!   │ ChunkIndex  │ ◄──────► │ ChunkIndex  │
//!   │ BufferedFile│  migrate │ BufferedFile│
//!   └─────────────┘          └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod key;
pub mod file;
pub mod index;
pub mod storage;
pub mod cache;
pub mod maintenance;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use cache::{CachedStore, EvictionCache};
pub use config::Config;
pub use error::{Result, StoreError};
pub use key::Key;
pub use maintenance::MaintenanceWorker;
pub use storage::{
    DoubleBufferedStore, MaintenanceBudget, MetadataFile, SingleFileStore, SlotId, Storage,
    StoreStats,
};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of chunkstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
