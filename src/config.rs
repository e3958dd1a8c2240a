//! Configuration for chunkstore
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, StoreError};

const KIB: usize = 1024;
const MIB: u64 = 1024 * 1024;

/// Main configuration for a store instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Layout
    // -------------------------------------------------------------------------
    /// Directory holding the store files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── {base}-a-data / {base}-a-index   (slot A)
    ///     ├── {base}-b-data / {base}-b-index   (slot B)
    ///     └── {base}-metadata                  (opaque metadata blob)
    pub data_dir: PathBuf,

    /// Base name shared by all files of one store
    pub base_name: String,

    // -------------------------------------------------------------------------
    // Buffered File
    // -------------------------------------------------------------------------
    /// Size of the in-memory write-behind buffer per data file (in bytes)
    pub buffer_capacity: usize,

    // -------------------------------------------------------------------------
    // Defragmentation
    // -------------------------------------------------------------------------
    /// File size that makes a write consider defragmentation (in bytes)
    pub defrag_threshold: u64,

    /// Amount the threshold grows after a pass over a large, lightly
    /// fragmented file (in bytes)
    pub defrag_threshold_step: u64,

    /// Minimum time between two defragmentation attempts
    pub maintenance_period: Duration,

    /// Fragmentation (percent) below which a non-forced pass is skipped
    pub fragmentation_threshold: u8,

    /// Fragmentation (percent) under which a large file counts as lightly fragmented
    pub light_fragmentation_percent: u8,

    /// Number of keys migrated per exclusive-lock batch
    pub migration_batch: usize,

    /// Time a write-triggered defragmentation may spend before returning
    pub write_defrag_budget: Duration,

    // -------------------------------------------------------------------------
    // Integrity
    // -------------------------------------------------------------------------
    /// Fail loudly on index/data inconsistencies instead of wiping the slot
    pub consistency_checks: bool,

    // -------------------------------------------------------------------------
    // Cache
    // -------------------------------------------------------------------------
    /// Max number of decoded objects kept by a `CachedStore`
    pub cache_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./chunkstore_data"),
            base_name: "storage".to_string(),
            buffer_capacity: 64 * KIB,
            defrag_threshold: 512 * MIB,
            defrag_threshold_step: 256 * MIB,
            maintenance_period: Duration::from_secs(5 * 60),
            fragmentation_threshold: 50,
            light_fragmentation_percent: 40,
            migration_batch: 256,
            write_defrag_budget: Duration::from_millis(200),
            consistency_checks: cfg!(debug_assertions),
            cache_capacity: 1024,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check that the configuration can drive a store
    pub fn validate(&self) -> Result<()> {
        if self.base_name.is_empty() {
            return Err(StoreError::Config("base_name must not be empty".to_string()));
        }
        if self
            .base_name
            .contains(|c: char| std::path::is_separator(c))
        {
            return Err(StoreError::Config(format!(
                "base_name must be a plain file name, got {:?}",
                self.base_name
            )));
        }
        if self.buffer_capacity == 0 {
            return Err(StoreError::Config("buffer_capacity must be positive".to_string()));
        }
        if self.migration_batch == 0 {
            return Err(StoreError::Config("migration_batch must be positive".to_string()));
        }
        if self.fragmentation_threshold > 100 || self.light_fragmentation_percent > 100 {
            return Err(StoreError::Config(
                "fragmentation percentages must be within 0..=100".to_string(),
            ));
        }
        if self.cache_capacity == 0 {
            return Err(StoreError::Config("cache_capacity must be positive".to_string()));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the base name of the store files
    pub fn base_name(mut self, name: impl Into<String>) -> Self {
        self.config.base_name = name.into();
        self
    }

    /// Set the write-behind buffer capacity (in bytes)
    pub fn buffer_capacity(mut self, bytes: usize) -> Self {
        self.config.buffer_capacity = bytes;
        self
    }

    /// Set the initial defragmentation threshold (in bytes)
    pub fn defrag_threshold(mut self, bytes: u64) -> Self {
        self.config.defrag_threshold = bytes;
        self
    }

    /// Set the threshold growth step (in bytes)
    pub fn defrag_threshold_step(mut self, bytes: u64) -> Self {
        self.config.defrag_threshold_step = bytes;
        self
    }

    /// Set the minimum period between defragmentation attempts
    pub fn maintenance_period(mut self, period: Duration) -> Self {
        self.config.maintenance_period = period;
        self
    }

    /// Set the fragmentation percentage that makes a pass worthwhile
    pub fn fragmentation_threshold(mut self, percent: u8) -> Self {
        self.config.fragmentation_threshold = percent;
        self
    }

    /// Set the percentage under which a large file counts as lightly fragmented
    pub fn light_fragmentation_percent(mut self, percent: u8) -> Self {
        self.config.light_fragmentation_percent = percent;
        self
    }

    /// Set the number of keys migrated per locked batch
    pub fn migration_batch(mut self, keys: usize) -> Self {
        self.config.migration_batch = keys;
        self
    }

    /// Set the time budget of a write-triggered defragmentation
    pub fn write_defrag_budget(mut self, budget: Duration) -> Self {
        self.config.write_defrag_budget = budget;
        self
    }

    /// Enable or disable hard failures on inconsistent indexes
    pub fn consistency_checks(mut self, enabled: bool) -> Self {
        self.config.consistency_checks = enabled;
        self
    }

    /// Set the object cache capacity (in entries)
    pub fn cache_capacity(mut self, entries: usize) -> Self {
        self.config.cache_capacity = entries;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
