//! Buffered append file
//!
//! Combines an on-disk region with a bounded write-behind buffer.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::BytesMut;
use parking_lot::Mutex;

use crate::error::{Result, StoreError};

use super::positional::{read_exact_at, write_all_at};

/// Bytes appended but not yet written, plus the authoritative on-disk length
struct Pending {
    buf: BytesMut,
    on_disk: u64,
}

/// Append-only data file with a write-behind buffer
///
/// ## Concurrency:
/// - `pending`: Mutex guarding the buffer and the on-disk length
/// - `logical_size`: Atomic counter, readable without the lock
/// - Reads of ranges that are certainly flushed use positional I/O and
///   never take the lock
pub struct BufferedFile {
    path: PathBuf,
    file: File,
    writable: bool,
    capacity: usize,
    pending: Mutex<Pending>,
    logical_size: AtomicU64,
}

impl BufferedFile {
    /// Open a data file
    ///
    /// Writable files are created when missing. A missing file opened
    /// read-only fails with a `NotFound` I/O error.
    pub fn open(path: &Path, writable: bool, capacity: usize) -> Result<Self> {
        let file = if writable {
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)?
        } else {
            File::open(path)?
        };
        let len = file.metadata()?.len();
        let capacity = capacity.max(1);

        tracing::trace!("Opened {:?} ({} bytes, writable={})", path, len, writable);

        Ok(Self {
            path: path.to_path_buf(),
            file,
            writable,
            capacity,
            pending: Mutex::new(Pending {
                buf: BytesMut::with_capacity(if writable { capacity } else { 0 }),
                on_disk: len,
            }),
            logical_size: AtomicU64::new(len),
        })
    }

    /// Read `size` bytes at `offset`
    ///
    /// Ranges ending at least one buffer capacity before the logical end are
    /// on disk already and are read directly. Anything closer to the end
    /// flushes the buffer first. The buffer itself is never read.
    pub fn read(&self, offset: u64, size: u32) -> Result<Vec<u8>> {
        let end = offset.checked_add(size as u64).ok_or_else(|| {
            StoreError::InvalidArgument(format!("range {}+{} overflows", offset, size))
        })?;
        let logical = self.size();
        if end > logical {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "read of {}..{} past end of {:?} ({} bytes)",
                    offset, end, self.path, logical
                ),
            )));
        }

        let mut data = vec![0u8; size as usize];
        if end <= logical.saturating_sub(self.capacity as u64) {
            read_exact_at(&self.file, &mut data, offset)?;
        } else {
            let mut pending = self.pending.lock();
            self.flush_locked(&mut pending)?;
            read_exact_at(&self.file, &mut data, offset)?;
        }
        Ok(data)
    }

    /// Append bytes, returning the offset they were placed at
    pub fn append(&self, data: &[u8]) -> Result<u64> {
        if !self.writable {
            return Err(StoreError::ReadOnly);
        }

        let mut pending = self.pending.lock();
        if pending.buf.len() + data.len() > self.capacity {
            self.flush_locked(&mut pending)?;
        }

        let offset = pending.on_disk + pending.buf.len() as u64;
        if data.len() > self.capacity {
            // Too large to buffer; the buffer is empty after the flush above
            write_all_at(&self.file, data, pending.on_disk)?;
            pending.on_disk += data.len() as u64;
        } else {
            pending.buf.extend_from_slice(data);
        }
        self.logical_size.fetch_add(data.len() as u64, Ordering::AcqRel);

        Ok(offset)
    }

    /// Copy `size` bytes at `offset` of `other` to the end of this file
    pub fn move_from(&self, other: &BufferedFile, offset: u64, size: u32) -> Result<u64> {
        let data = other.read(offset, size)?;
        self.append(&data)
    }

    /// Drop all content, pending and on disk
    pub fn truncate(&self) -> Result<()> {
        if !self.writable {
            return Err(StoreError::ReadOnly);
        }

        let mut pending = self.pending.lock();
        pending.buf.clear();
        self.file.set_len(0)?;
        pending.on_disk = 0;
        self.logical_size.store(0, Ordering::Release);

        tracing::debug!("Truncated {:?}", self.path);
        Ok(())
    }

    /// Write pending bytes to the file
    pub fn flush(&self) -> Result<()> {
        let mut pending = self.pending.lock();
        self.flush_locked(&mut pending)
    }

    /// Flush and fsync file data
    pub fn sync(&self) -> Result<()> {
        let mut pending = self.pending.lock();
        self.flush_locked(&mut pending)?;
        if self.writable {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Flush, sync and verify that every appended byte reached the disk
    pub fn close(&self) -> Result<()> {
        let mut pending = self.pending.lock();
        if self.writable {
            self.flush_locked(&mut pending)?;
            self.file.sync_data()?;
        }

        let logical = self.size();
        if pending.on_disk != logical || !pending.buf.is_empty() {
            return Err(StoreError::LostWrite {
                path: self.path.clone(),
                on_disk: pending.on_disk,
                logical,
            });
        }
        Ok(())
    }

    /// Logical size: flushed plus pending bytes
    pub fn size(&self) -> u64 {
        self.logical_size.load(Ordering::Acquire)
    }

    /// Bytes already written to the file
    pub fn on_disk_size(&self) -> u64 {
        self.pending.lock().on_disk
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn flush_locked(&self, pending: &mut Pending) -> Result<()> {
        if pending.buf.is_empty() {
            return Ok(());
        }
        write_all_at(&self.file, &pending.buf, pending.on_disk)?;
        pending.on_disk += pending.buf.len() as u64;
        pending.buf.clear();
        Ok(())
    }
}

impl std::fmt::Debug for BufferedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedFile")
            .field("path", &self.path)
            .field("writable", &self.writable)
            .field("capacity", &self.capacity)
            .field("size", &self.size())
            .finish()
    }
}
