//! Metadata blob file
//!
//! Persists the opaque blob of the metadata table that lives alongside a
//! store. The store never interprets the bytes.
//!
//! ## File Format
//! ```text
//! ┌──────────┬─────────────┬──────────┬──────────┬───────────┐
//! │ "CKMD" 4 │ Version u16 │ Len u64  │ CRC32 u32│   Blob    │
//! └──────────┴─────────────┴──────────┴──────────┴───────────┘
//! ```

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};

const MAGIC: &[u8; 4] = b"CKMD";
const VERSION: u16 = 1;
const HEADER_SIZE: usize = 18;

/// Handle to the `{base}-metadata` file of a store
#[derive(Debug, Clone)]
pub struct MetadataFile {
    path: PathBuf,
}

impl MetadataFile {
    pub fn new(dir: &Path, base_name: &str) -> Self {
        Self {
            path: dir.join(format!("{}-metadata", base_name)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the stored blob
    ///
    /// Written to a temporary file and renamed over the old one.
    pub fn store(&self, blob: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.path.with_extension("tmp");
        let mut file = File::create(&tmp_path)?;
        file.write_all(MAGIC)?;
        file.write_all(&VERSION.to_le_bytes())?;
        file.write_all(&(blob.len() as u64).to_le_bytes())?;
        file.write_all(&crc32fast::hash(blob).to_le_bytes())?;
        file.write_all(blob)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp_path, &self.path)?;
        tracing::debug!("Stored {} metadata bytes in {:?}", blob.len(), self.path);
        Ok(())
    }

    /// Load the stored blob
    ///
    /// Returns `Ok(None)` when the file is missing, of another version or
    /// fails its checksum.
    pub fn load(&self) -> Result<Option<Vec<u8>>> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match Self::decode(&mut file) {
            Ok(blob) => Ok(Some(blob)),
            Err(StoreError::Corruption(reason)) => {
                tracing::warn!("Discarding metadata {:?}: {}", self.path, reason);
                Ok(None)
            }
            Err(StoreError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                tracing::warn!("Discarding truncated metadata {:?}", self.path);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Delete the stored blob, if any
    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn decode(reader: &mut impl Read) -> Result<Vec<u8>> {
        let mut header = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header)?;

        if &header[0..4] != MAGIC {
            return Err(StoreError::Corruption("invalid magic".to_string()));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != VERSION {
            return Err(StoreError::Corruption(format!("stale version {}", version)));
        }
        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&header[6..14]);
        let len = u64::from_le_bytes(len_bytes);
        let crc = u32::from_le_bytes([header[14], header[15], header[16], header[17]]);

        let mut blob = Vec::new();
        reader.take(len).read_to_end(&mut blob)?;
        if (blob.len() as u64) < len {
            return Err(StoreError::Corruption(format!(
                "blob truncated to {} of {} bytes",
                blob.len(),
                len
            )));
        }
        if crc32fast::hash(&blob) != crc {
            return Err(StoreError::Corruption("checksum mismatch".to_string()));
        }
        Ok(blob)
    }
}
