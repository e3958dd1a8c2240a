//! Storage Module
//!
//! Persistent key → bytes stores behind one contract.
//!
//! ## Responsibilities
//! - Point reads, writes and removals by key
//! - Online, incremental defragmentation (double-buffered store)
//! - A naive one-file-per-key backend with the same contract
//! - Persisting the metadata table's opaque blob next to the store
//!
//! ## Double-Buffered Layout
//! ```text
//! ┌──────────────────────────┐    ┌──────────────────────────┐
//! │ Slot A                   │    │ Slot B                   │
//! │  {base}-a-data  (chunks) │    │  {base}-b-data  (chunks) │
//! │  {base}-a-index (close)  │    │  {base}-b-index (close)  │
//! └────────────┬─────────────┘    └─────────────┬────────────┘
//!              │                                │
//!              └──── passive drained into ──────┘
//!                    active (defragmentation)
//! ```

mod double_buffered;
mod metadata;
mod single_file;
mod slot;

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::key::Key;

pub use double_buffered::{DoubleBufferedStore, StoreStats};
pub use metadata::MetadataFile;
pub use single_file::SingleFileStore;
pub use slot::SlotId;

/// How much work a maintenance call may do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceBudget {
    /// Defragment regardless of fragmentation, until done
    Forced,

    /// Defragment only if worthwhile, stopping after roughly this long
    Within(Duration),
}

/// Contract shared by every store backend
///
/// All methods take `&self`; implementations synchronize internally.
pub trait Storage: Send + Sync {
    /// Open the store, creating it when `writable`
    ///
    /// Returns `Ok(false)` when a read-only open finds no store.
    fn open(&self, writable: bool) -> Result<bool>;

    /// Whether a value is stored for the key
    fn has_key(&self, key: &Key) -> Result<bool>;

    /// Read the value stored for the key
    fn read(&self, key: &Key) -> Result<Option<Vec<u8>>>;

    /// Store a value, replacing any previous one
    fn write(&self, key: &Key, data: &[u8]) -> Result<()>;

    /// Forget a key (idempotent)
    fn remove(&self, key: &Key) -> Result<()>;

    /// Persist state and release files
    fn close(&self) -> Result<()>;

    /// Run cooperative maintenance; returns whether work remains
    fn maintenance(&self, budget: MaintenanceBudget) -> Result<bool>;

    /// Number of stored keys
    fn object_count(&self) -> usize;

    /// Write a full diagnostic listing
    fn dump(&self, sink: &mut dyn Write) -> Result<()>;

    /// Write a short diagnostic summary
    fn dump_summary(&self, sink: &mut dyn Write) -> Result<()>;
}

/// Forward the contract through a smart pointer
macro_rules! forward_storage {
    ($($pointer:ident),*) => {$(
        impl<T: Storage + ?Sized> Storage for $pointer<T> {
            fn open(&self, writable: bool) -> Result<bool> {
                (**self).open(writable)
            }

            fn has_key(&self, key: &Key) -> Result<bool> {
                (**self).has_key(key)
            }

            fn read(&self, key: &Key) -> Result<Option<Vec<u8>>> {
                (**self).read(key)
            }

            fn write(&self, key: &Key, data: &[u8]) -> Result<()> {
                (**self).write(key, data)
            }

            fn remove(&self, key: &Key) -> Result<()> {
                (**self).remove(key)
            }

            fn close(&self) -> Result<()> {
                (**self).close()
            }

            fn maintenance(&self, budget: MaintenanceBudget) -> Result<bool> {
                (**self).maintenance(budget)
            }

            fn object_count(&self) -> usize {
                (**self).object_count()
            }

            fn dump(&self, sink: &mut dyn Write) -> Result<()> {
                (**self).dump(sink)
            }

            fn dump_summary(&self, sink: &mut dyn Write) -> Result<()> {
                (**self).dump_summary(sink)
            }
        }
    )*};
}

forward_storage!(Arc, Box);

/// Create `dir` and check a file can be created in it
///
/// Returns false, after a warning, when the store has to fall back to
/// read-only.
pub(crate) fn ensure_writable_dir(dir: &Path, scratch_name: &str) -> bool {
    let scratch = dir.join(scratch_name);
    let result = std::fs::create_dir_all(dir)
        .and_then(|_| std::fs::File::create(&scratch))
        .and_then(|_| std::fs::remove_file(&scratch));

    match result {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(
                "Directory {:?} is not writable ({}), opening read-only",
                dir,
                e
            );
            false
        }
    }
}
