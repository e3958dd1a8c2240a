//! Chunk index codec
//!
//! Encodes and decodes the persisted index format (see module docs).

use std::io::{self, Read, Write};

use crate::error::{Result, StoreError};
use crate::key::Key;

use super::ChunkIndex;

/// Magic bytes identifying a chunk index file
pub(crate) const MAGIC: &[u8; 4] = b"CKIX";

/// Current index format version; other versions are discarded on load
pub(crate) const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) + Count (8) = 14 bytes
pub(crate) const HEADER_SIZE: usize = 14;

/// Upper bound for one encoded key, anything larger is corruption
const MAX_KEY_LEN: u32 = 64 * 1024;

pub(super) fn write_index<W: Write>(index: &ChunkIndex, mut writer: W) -> Result<()> {
    writer.write_all(MAGIC)?;
    writer.write_all(&VERSION.to_le_bytes())?;
    writer.write_all(&(index.len() as u64).to_le_bytes())?;

    let mut hasher = crc32fast::Hasher::new();
    for (key, chunk) in index.iter() {
        let key_bytes = bincode::serialize(key)?;
        let key_len = (key_bytes.len() as u32).to_le_bytes();
        let offset = chunk.offset.to_le_bytes();
        let size = chunk.size.to_le_bytes();

        let parts: [&[u8]; 4] = [&key_len, &key_bytes, &offset, &size];
        for part in parts {
            writer.write_all(part)?;
            hasher.update(part);
        }
    }

    writer.write_all(&hasher.finalize().to_le_bytes())?;
    writer.flush()?;
    Ok(())
}

pub(super) fn read_index<R: Read>(reader: R) -> Result<Option<ChunkIndex>> {
    match decode(reader) {
        Ok(index) => Ok(Some(index)),
        Err(StoreError::Corruption(reason)) => {
            tracing::warn!("Discarding chunk index: {}", reason);
            Ok(None)
        }
        Err(StoreError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
            tracing::warn!("Discarding truncated chunk index");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn decode<R: Read>(mut reader: R) -> Result<ChunkIndex> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;

    if &header[0..4] != MAGIC {
        return Err(StoreError::Corruption(format!(
            "invalid index magic: expected CKIX, got {:?}",
            &header[0..4]
        )));
    }
    let version = u16::from_le_bytes([header[4], header[5]]);
    if version != VERSION {
        return Err(StoreError::Corruption(format!(
            "stale index version {} (current {})",
            version, VERSION
        )));
    }
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&header[6..14]);
    let count = u64::from_le_bytes(count_bytes);

    let mut index = ChunkIndex::new();
    let mut hasher = crc32fast::Hasher::new();

    for _ in 0..count {
        let mut len_bytes = [0u8; 4];
        reader.read_exact(&mut len_bytes)?;
        let key_len = u32::from_le_bytes(len_bytes);
        if key_len > MAX_KEY_LEN {
            return Err(StoreError::Corruption(format!(
                "key length {} exceeds {}",
                key_len, MAX_KEY_LEN
            )));
        }

        let mut key_bytes = vec![0u8; key_len as usize];
        reader.read_exact(&mut key_bytes)?;
        let mut offset_bytes = [0u8; 8];
        reader.read_exact(&mut offset_bytes)?;
        let mut size_bytes = [0u8; 4];
        reader.read_exact(&mut size_bytes)?;

        hasher.update(&len_bytes);
        hasher.update(&key_bytes);
        hasher.update(&offset_bytes);
        hasher.update(&size_bytes);

        let key: Key = bincode::deserialize(&key_bytes)
            .map_err(|e| StoreError::Corruption(format!("undecodable key: {}", e)))?;
        if index.contains(&key) {
            return Err(StoreError::Corruption(format!("duplicate key {}", key)));
        }
        let offset = u64::from_le_bytes(offset_bytes);
        let size = u32::from_le_bytes(size_bytes);
        if offset.checked_add(size as u64).is_none() {
            return Err(StoreError::Corruption(format!(
                "chunk {}+{} of key {} overflows",
                offset, size, key
            )));
        }
        index.put(key, offset, size);
    }

    let mut crc_bytes = [0u8; 4];
    reader.read_exact(&mut crc_bytes)?;
    let stored = u32::from_le_bytes(crc_bytes);
    let computed = hasher.finalize();
    if stored != computed {
        return Err(StoreError::Corruption(format!(
            "index checksum mismatch: stored {:08x}, computed {:08x}",
            stored, computed
        )));
    }

    Ok(index)
}
