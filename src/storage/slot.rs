//! Store slot
//!
//! One data file plus the index of the chunks it holds.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::file::BufferedFile;
use crate::index::{Chunk, ChunkIndex};
use crate::key::Key;

/// Identity of one of the two slots of a double-buffered store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotId {
    A,
    B,
}

impl SlotId {
    /// The other slot
    pub fn other(self) -> SlotId {
        match self {
            SlotId::A => SlotId::B,
            SlotId::B => SlotId::A,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            SlotId::A => 0,
            SlotId::B => 1,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            SlotId::A => "a",
            SlotId::B => "b",
        }
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SlotId::A => "A",
            SlotId::B => "B",
        })
    }
}

/// Data file + chunk index pair
pub(crate) struct Slot {
    id: SlotId,
    file: BufferedFile,
    index: ChunkIndex,
    index_path: PathBuf,
}

impl Slot {
    /// Path of the data file of a slot
    pub(crate) fn data_path(dir: &Path, base: &str, id: SlotId) -> PathBuf {
        dir.join(format!("{}-{}-data", base, id.suffix()))
    }

    /// Path of the persisted index of a slot
    pub(crate) fn index_path(dir: &Path, base: &str, id: SlotId) -> PathBuf {
        dir.join(format!("{}-{}-index", base, id.suffix()))
    }

    /// Open a slot
    ///
    /// On open:
    /// 1. Open (or create, when writable) the data file
    /// 2. Load the persisted index; missing/stale/corrupt means empty
    /// 3. Check the index against the data file length
    ///
    /// The index file stays on disk; the store discards it with
    /// [`Slot::discard_persisted_index`] once every slot has opened.
    ///
    /// Returns `Ok(None)` when opened read-only and the data file is missing.
    pub(crate) fn open(config: &Config, id: SlotId, writable: bool) -> Result<Option<Self>> {
        let data_path = Self::data_path(&config.data_dir, &config.base_name, id);
        let index_path = Self::index_path(&config.data_dir, &config.base_name, id);

        let file = match BufferedFile::open(&data_path, writable, config.buffer_capacity) {
            Ok(file) => file,
            Err(StoreError::Io(ref e)) if !writable && e.kind() == io::ErrorKind::NotFound => {
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let loaded = match File::open(&index_path) {
            Ok(f) => ChunkIndex::load(BufReader::new(f))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        let mut index = match loaded {
            Some(index) => index,
            None => {
                if file.size() > 0 {
                    tracing::warn!(
                        "Slot {}: no usable index for {:?}, {} bytes unreachable",
                        id,
                        data_path,
                        file.size()
                    );
                }
                ChunkIndex::new()
            }
        };

        let extent = index.max_extent();
        if extent > file.size() {
            let reason = format!(
                "slot {} index reaches byte {} but {:?} holds {} bytes",
                id,
                extent,
                data_path,
                file.size()
            );
            if config.consistency_checks {
                return Err(StoreError::Corruption(reason));
            }
            tracing::warn!("Wiping inconsistent slot: {}", reason);
            index.clear();
            if writable {
                file.truncate()?;
            }
        }

        tracing::debug!(
            "Opened slot {}: {} keys, {} bytes, {}% fragmented",
            id,
            index.len(),
            file.size(),
            index.fragmentation_percent(file.size())
        );

        Ok(Some(Self {
            id,
            file,
            index,
            index_path,
        }))
    }

    /// Read the value of a key held by this slot
    pub(crate) fn read(&self, key: &Key) -> Result<Option<Vec<u8>>> {
        match self.index.get(key) {
            Some(chunk) => Ok(Some(self.file.read(chunk.offset, chunk.size)?)),
            None => Ok(None),
        }
    }

    /// Append a value and point the key at it
    ///
    /// The index is updated only after the append succeeded and the file
    /// grew by exactly the payload length.
    pub(crate) fn write(&mut self, key: &Key, data: &[u8]) -> Result<Chunk> {
        let size = u32::try_from(data.len()).map_err(|_| {
            StoreError::InvalidArgument(format!("value of {} bytes is too large", data.len()))
        })?;

        let before = self.file.size();
        let offset = self.file.append(data)?;
        let after = self.file.size();
        if offset != before || after != before + size as u64 {
            return Err(StoreError::Corruption(format!(
                "slot {}: append of {} bytes at {} left file at {} (was {})",
                self.id, size, offset, after, before
            )));
        }

        Ok(self.index.put(key.clone(), offset, size))
    }

    /// Forget a key, returning the size of its chunk
    pub(crate) fn remove(&mut self, key: &Key) -> u32 {
        self.index.remove(key)
    }

    /// Move the chunk of `key` from `source` into this slot
    ///
    /// Returns false when `source` does not hold the key. A key already
    /// present here is newer than the source copy, which is dropped.
    pub(crate) fn migrate_from(&mut self, source: &mut Slot, key: &Key) -> Result<bool> {
        let Some(chunk) = source.index.get(key) else {
            return Ok(false);
        };
        if self.index.contains(key) {
            source.index.remove(key);
            return Ok(false);
        }

        let offset = self.file.move_from(&source.file, chunk.offset, chunk.size)?;
        self.index.put(key.clone(), offset, chunk.size);
        source.index.remove(key);
        Ok(true)
    }

    /// Up to `limit` keys, from a fresh scan of the index
    pub(crate) fn keys(&self, limit: usize) -> Vec<Key> {
        self.index.keys().take(limit).cloned().collect()
    }

    /// Truncate the data file to nothing; the index must be empty
    pub(crate) fn reset(&mut self) -> Result<()> {
        if !self.index.is_empty() {
            return Err(StoreError::Corruption(format!(
                "slot {} reset with {} live keys",
                self.id,
                self.index.len()
            )));
        }
        self.file.truncate()
    }

    /// Flush data, then persist the index (writable slots only)
    pub(crate) fn close(&self) -> Result<()> {
        self.file.close()?;
        if !self.file.is_writable() {
            return Ok(());
        }

        let tmp_path = self.index_path.with_extension("tmp");
        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        self.index.store(&mut writer)?;
        let file = writer
            .into_inner()
            .map_err(|e| StoreError::Io(e.into_error()))?;
        file.sync_all()?;
        fs::rename(&tmp_path, &self.index_path)?;

        tracing::debug!(
            "Closed slot {}: persisted {} keys to {:?}",
            self.id,
            self.index.len(),
            self.index_path
        );
        Ok(())
    }

    /// Delete the index file so a crash cannot leave a stale one behind
    pub(crate) fn discard_persisted_index(&self) -> Result<()> {
        match fs::remove_file(&self.index_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) fn contains(&self, key: &Key) -> bool {
        self.index.contains(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.index.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub(crate) fn size(&self) -> u64 {
        self.file.size()
    }

    pub(crate) fn live_bytes(&self) -> u64 {
        self.index.live_bytes()
    }

    pub(crate) fn fragmentation_percent(&self) -> u8 {
        self.index.fragmentation_percent(self.file.size())
    }

    pub(crate) fn id(&self) -> SlotId {
        self.id
    }

    /// Write one line per key
    pub(crate) fn dump(&self, sink: &mut dyn Write) -> Result<()> {
        self.dump_summary(sink)?;
        let mut entries: Vec<_> = self.index.iter().collect();
        entries.sort_by_key(|(_, chunk)| chunk.offset);
        for (key, chunk) in entries {
            writeln!(sink, "    {} @ {} [{} bytes]", key, chunk.offset, chunk.size)?;
        }
        Ok(())
    }

    pub(crate) fn dump_summary(&self, sink: &mut dyn Write) -> Result<()> {
        writeln!(
            sink,
            "  slot {}: {} keys, {} of {} bytes live ({}% fragmented) in {:?}",
            self.id,
            self.index.len(),
            self.index.live_bytes(),
            self.file.size(),
            self.fragmentation_percent(),
            self.file.path()
        )?;
        Ok(())
    }
}
