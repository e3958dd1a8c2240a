//! Single-File Store
//!
//! Naive backend storing each key in its own file, named by
//! [`Key::file_name`]. No chunk indexing and nothing to defragment.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::error::{Result, StoreError};
use crate::key::Key;

use super::{ensure_writable_dir, MaintenanceBudget, Storage};

/// Extension of files being written, never counted as objects
const TMP_EXTENSION: &str = "tmp";

/// Scratch file created to test the directory; a `.tmp` so it is never an object
const SCRATCH_NAME: &str = ".chunkstore-probe.tmp";

/// One-file-per-key store
pub struct SingleFileStore {
    dir: PathBuf,
    /// `Some(writable)` while open
    mode: RwLock<Option<bool>>,
}

impl SingleFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            mode: RwLock::new(None),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_of(&self, key: &Key) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Mode of an open store
    fn writable(&self) -> Result<bool> {
        (*self.mode.read()).ok_or(StoreError::NotOpen)
    }

    fn object_files(&self) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_tmp = path.extension().map_or(false, |ext| ext == TMP_EXTENSION);
            if path.is_file() && !is_tmp {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

impl Storage for SingleFileStore {
    fn open(&self, writable: bool) -> Result<bool> {
        let mut mode = self.mode.write();
        if let Some(current) = *mode {
            if current || !writable {
                return Ok(true);
            }
        }

        let writable = writable && ensure_writable_dir(&self.dir, SCRATCH_NAME);
        if !writable && !self.dir.is_dir() {
            return Ok(false);
        }

        *mode = Some(writable);
        tracing::debug!("Opened single-file store {:?}, writable={}", self.dir, writable);
        Ok(true)
    }

    fn has_key(&self, key: &Key) -> Result<bool> {
        self.writable()?;
        Ok(self.path_of(key).is_file())
    }

    fn read(&self, key: &Key) -> Result<Option<Vec<u8>>> {
        self.writable()?;
        match fs::read(self.path_of(key)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &Key, data: &[u8]) -> Result<()> {
        if !self.writable()? {
            return Err(StoreError::ReadOnly);
        }

        let path = self.path_of(key);
        let tmp_path = path.with_extension(TMP_EXTENSION);
        let mut file = File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_data()?;
        drop(file);
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    fn remove(&self, key: &Key) -> Result<()> {
        if !self.writable()? {
            return Err(StoreError::ReadOnly);
        }
        match fs::remove_file(self.path_of(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn close(&self) -> Result<()> {
        *self.mode.write() = None;
        Ok(())
    }

    fn maintenance(&self, _budget: MaintenanceBudget) -> Result<bool> {
        Ok(false)
    }

    fn object_count(&self) -> usize {
        if self.mode.read().is_none() {
            return 0;
        }
        self.object_files().map_or(0, |files| files.len())
    }

    fn dump(&self, sink: &mut dyn Write) -> Result<()> {
        self.dump_summary(sink)?;
        for path in self.object_files()? {
            let len = fs::metadata(&path)?.len();
            let name = path.file_name().unwrap_or_default().to_string_lossy();
            writeln!(sink, "    {} [{} bytes]", name, len)?;
        }
        Ok(())
    }

    fn dump_summary(&self, sink: &mut dyn Write) -> Result<()> {
        let writable = self.writable()?;
        writeln!(
            sink,
            "single-file store in {:?}: {} keys{}",
            self.dir,
            self.object_count(),
            if writable { "" } else { ", read-only" }
        )?;
        Ok(())
    }
}
