//! Double-Buffered Store
//!
//! Two slots, one active and one passive. Writes go to the active slot;
//! defragmentation swaps roles and drains the passive slot's live chunks
//! into the active one, then truncates the drained file.
//!
//! ## Responsibilities
//! - Route reads to active then passive, writes to active
//! - Keep at most one live chunk per key across both slots
//! - Trigger defragmentation from writes and maintenance calls
//! - Persist both indexes on close

use std::io::Write;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::index::fragmentation_percent;
use crate::key::Key;

use super::metadata::MetadataFile;
use super::slot::{Slot, SlotId};
use super::{ensure_writable_dir, MaintenanceBudget, Storage};

/// Routing state of an open store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Writes go to `active`; the passive slot holds leftovers, if anything
    Serving { active: SlotId },

    /// The passive slot is being drained into `active`
    Defragmenting { active: SlotId },
}

impl State {
    fn active(self) -> SlotId {
        match self {
            State::Serving { active } | State::Defragmenting { active } => active,
        }
    }
}

/// Outcome of one locked defragmentation batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Fragmentation too low, nothing done
    Skipped,
    /// The passive slot still holds keys
    Continue,
    /// The passive slot was drained and truncated
    Done,
}

/// When the next write-triggered defragmentation may run
#[derive(Debug)]
struct MaintenanceClock {
    last_defrag: Instant,
    next_threshold: u64,
}

impl MaintenanceClock {
    fn new(config: &Config) -> Self {
        Self {
            last_defrag: Instant::now(),
            next_threshold: config.defrag_threshold,
        }
    }

    /// Either file reached the threshold and the period has elapsed
    fn is_due(&self, slots: &OpenSlots, config: &Config) -> bool {
        let large = slots.active().size() >= self.next_threshold
            || slots.passive().size() >= self.next_threshold;
        large && self.last_defrag.elapsed() >= config.maintenance_period
    }

    /// Record a completed pass
    ///
    /// A large active file with little dead space raises the threshold, so
    /// workloads of many small live keys do not defragment over and over.
    fn finish_pass(&mut self, active_size: u64, active_fragmentation: u8, config: &Config) {
        self.last_defrag = Instant::now();
        if active_size >= self.next_threshold
            && active_fragmentation < config.light_fragmentation_percent
        {
            self.next_threshold = self
                .next_threshold
                .saturating_add(config.defrag_threshold_step);
            tracing::info!(
                "Raised defragmentation threshold to {} bytes",
                self.next_threshold
            );
        }
    }
}

/// Both slots of an open store
struct OpenSlots {
    slots: [Slot; 2],
    state: State,
    writable: bool,
}

impl OpenSlots {
    fn active(&self) -> &Slot {
        &self.slots[self.state.active().index()]
    }

    fn passive(&self) -> &Slot {
        &self.slots[self.state.active().other().index()]
    }

    /// (active, passive)
    fn pair_mut(&mut self) -> (&mut Slot, &mut Slot) {
        let active = self.state.active();
        let [a, b] = &mut self.slots;
        match active {
            SlotId::A => (a, b),
            SlotId::B => (b, a),
        }
    }

    fn size(&self) -> u64 {
        self.slots.iter().map(Slot::size).sum()
    }

    fn live_bytes(&self) -> u64 {
        self.slots.iter().map(Slot::live_bytes).sum()
    }

    fn object_count(&self) -> usize {
        self.slots.iter().map(Slot::len).sum()
    }

    fn fragmentation_percent(&self) -> u8 {
        fragmentation_percent(self.size(), self.live_bytes())
    }
}

struct Inner {
    open: Option<OpenSlots>,
    clock: MaintenanceClock,
}

/// Point-in-time view of an open store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub active: SlotId,
    pub defragmenting: bool,
    pub writable: bool,
    pub object_count: usize,
    pub size: u64,
    pub live_bytes: u64,
    pub fragmentation_percent: u8,
    pub next_defrag_threshold: u64,
}

/// Chunk store with online, incremental defragmentation
///
/// ## Concurrency Model
///
/// - **Reads** (`has_key`, `read`): shared lock on `inner`
/// - **Writes** (`write`, `remove`, defragmentation batches, open/close):
///   exclusive lock on `inner`
/// - Each data file guards its write buffer with its own mutex, always
///   taken after `inner`, never before
///
/// A defragmentation pass migrates `migration_batch` keys per exclusive
/// lock acquisition, so writers interleave between batches.
pub struct DoubleBufferedStore {
    config: Config,
    inner: RwLock<Inner>,
}

impl DoubleBufferedStore {
    /// Create a closed store over `config.data_dir`
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let clock = MaintenanceClock::new(&config);
        Ok(Self {
            config,
            inner: RwLock::new(Inner { open: None, clock }),
        })
    }

    /// Run a defragmentation pass
    ///
    /// Without `force`, a store below the fragmentation threshold is left
    /// alone. With a `timeout`, the pass stops between batches once it has
    /// run that long; a timeout past the clock's range means no deadline.
    /// Returns whether the passive slot still holds keys.
    pub fn defragment(&self, force: bool, timeout: Option<Duration>) -> Result<bool> {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        loop {
            let step = {
                let mut guard = self.inner.write();
                let Inner { open, clock } = &mut *guard;
                let open = open.as_mut().ok_or(StoreError::NotOpen)?;
                self.defragment_step(open, clock, force)?
            };

            if step != Step::Continue {
                return Ok(false);
            }
            if deadline.map_or(false, |d| Instant::now() >= d) {
                return Ok(true);
            }
        }
    }

    /// Handle to the metadata blob file stored next to this store
    pub fn metadata(&self) -> MetadataFile {
        MetadataFile::new(&self.config.data_dir, &self.config.base_name)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.inner.read().open.is_some()
    }

    /// Whether the store is open for writing
    pub fn is_writable(&self) -> bool {
        self.inner.read().open.as_ref().map_or(false, |o| o.writable)
    }

    /// Total bytes of both data files (0 when closed)
    pub fn size(&self) -> u64 {
        self.inner.read().open.as_ref().map_or(0, OpenSlots::size)
    }

    /// Dead-space percentage over both data files (0 when closed)
    pub fn fragmentation_percent(&self) -> u8 {
        self.inner
            .read()
            .open
            .as_ref()
            .map_or(0, OpenSlots::fragmentation_percent)
    }

    pub fn active_slot(&self) -> Option<SlotId> {
        self.inner.read().open.as_ref().map(|o| o.state.active())
    }

    pub fn is_defragmenting(&self) -> bool {
        matches!(
            self.inner.read().open.as_ref().map(|o| o.state),
            Some(State::Defragmenting { .. })
        )
    }

    /// Slots whose index holds `key`; never more than one
    pub fn slots_holding(&self, key: &Key) -> Result<Vec<SlotId>> {
        let inner = self.inner.read();
        let open = inner.open.as_ref().ok_or(StoreError::NotOpen)?;
        Ok(open
            .slots
            .iter()
            .filter(|slot| slot.contains(key))
            .map(Slot::id)
            .collect())
    }

    pub fn stats(&self) -> Option<StoreStats> {
        let inner = self.inner.read();
        let open = inner.open.as_ref()?;
        Some(StoreStats {
            active: open.state.active(),
            defragmenting: matches!(open.state, State::Defragmenting { .. }),
            writable: open.writable,
            object_count: open.object_count(),
            size: open.size(),
            live_bytes: open.live_bytes(),
            fragmentation_percent: open.fragmentation_percent(),
            next_defrag_threshold: inner.clock.next_threshold,
        })
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Pick the initial active slot
    ///
    /// An empty A with a non-empty B makes B active. When both hold data,
    /// the more fragmented one is active, so the other becomes the first
    /// defragmentation target.
    fn choose_active(a: &Slot, b: &Slot) -> SlotId {
        match (a.size() > 0, b.size() > 0) {
            (false, true) => SlotId::B,
            (true, true) if b.fragmentation_percent() > a.fragmentation_percent() => SlotId::B,
            _ => SlotId::A,
        }
    }

    /// Run batches with the lock already held until done or past `deadline`
    fn defragment_locked(
        &self,
        open: &mut OpenSlots,
        clock: &mut MaintenanceClock,
        force: bool,
        deadline: Option<Instant>,
    ) -> Result<bool> {
        loop {
            if self.defragment_step(open, clock, force)? != Step::Continue {
                return Ok(false);
            }
            if deadline.map_or(false, |d| Instant::now() >= d) {
                return Ok(true);
            }
        }
    }

    /// One defragmentation batch
    ///
    /// Steps:
    /// 1. If idle and not worth it (and not forced), skip
    /// 2. If idle, swap roles: the old active becomes the drained passive
    /// 3. Migrate up to `migration_batch` keys from passive to active
    /// 4. Once passive is empty, truncate its file and go back to serving
    fn defragment_step(
        &self,
        open: &mut OpenSlots,
        clock: &mut MaintenanceClock,
        force: bool,
    ) -> Result<Step> {
        if !open.writable {
            return Ok(Step::Skipped);
        }

        if let State::Serving { active } = open.state {
            let fragmentation = open.fragmentation_percent();
            if !force && fragmentation < self.config.fragmentation_threshold {
                clock.last_defrag = Instant::now();
                tracing::debug!(
                    "Skipping defragmentation of {}: {}% fragmented",
                    self.config.base_name,
                    fragmentation
                );
                return Ok(Step::Skipped);
            }

            open.state = State::Defragmenting {
                active: active.other(),
            };
            tracing::info!(
                "Defragmenting {}: draining slot {} into slot {} ({}% fragmented, {} bytes)",
                self.config.base_name,
                active,
                active.other(),
                fragmentation,
                open.size()
            );
        }

        let batch = open.passive().keys(self.config.migration_batch);
        let (active, passive) = open.pair_mut();
        let mut moved = 0usize;
        for key in &batch {
            if active.migrate_from(passive, key)? {
                moved += 1;
            }
        }
        tracing::trace!("Migrated {} of {} keys", moved, batch.len());

        if !passive.is_empty() {
            return Ok(Step::Continue);
        }

        passive.reset()?;
        let active_id = active.id();
        let active_size = active.size();
        let active_fragmentation = active.fragmentation_percent();

        open.state = State::Serving { active: active_id };
        clock.finish_pass(active_size, active_fragmentation, &self.config);
        tracing::info!(
            "Defragmented {}: slot {} holds {} keys in {} bytes",
            self.config.base_name,
            active_id,
            open.object_count(),
            active_size
        );
        Ok(Step::Done)
    }

    fn write_header(&self, open: &OpenSlots, sink: &mut dyn Write) -> Result<()> {
        writeln!(
            sink,
            "store {:?} in {:?}: {} keys, {} bytes, {}% fragmented, active {}{}{}",
            self.config.base_name,
            self.config.data_dir,
            open.object_count(),
            open.size(),
            open.fragmentation_percent(),
            open.state.active(),
            if matches!(open.state, State::Defragmenting { .. }) {
                ", defragmenting"
            } else {
                ""
            },
            if open.writable { "" } else { ", read-only" }
        )?;
        Ok(())
    }
}

impl Storage for DoubleBufferedStore {
    /// Open both slots
    ///
    /// Reopening a read-only store for writing reopens both slots. A
    /// directory that cannot be written degrades to a read-only open.
    fn open(&self, writable: bool) -> Result<bool> {
        let mut inner = self.inner.write();
        if let Some(open) = inner.open.as_ref() {
            if open.writable || !writable {
                return Ok(true);
            }
            tracing::info!("Reopening {} for writing", self.config.base_name);
            if let Some(previous) = inner.open.take() {
                for slot in &previous.slots {
                    slot.close()?;
                }
            }
        }

        let scratch_name = format!(".{}.probe", self.config.base_name);
        let writable = writable && ensure_writable_dir(&self.config.data_dir, &scratch_name);
        if !writable && !self.config.data_dir.is_dir() {
            tracing::debug!("No directory {:?}", self.config.data_dir);
            return Ok(false);
        }
        let a = Slot::open(&self.config, SlotId::A, writable)?;
        let b = Slot::open(&self.config, SlotId::B, writable)?;
        let (a, b) = match (a, b) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                tracing::debug!(
                    "No store {:?} in {:?}",
                    self.config.base_name,
                    self.config.data_dir
                );
                return Ok(false);
            }
        };
        // Both slots validated; their indexes are written again on close
        if writable {
            a.discard_persisted_index()?;
            b.discard_persisted_index()?;
        }

        let active = Self::choose_active(&a, &b);
        let open = OpenSlots {
            slots: [a, b],
            state: State::Serving { active },
            writable,
        };
        tracing::info!(
            "Opened store {:?}: {} keys, {} bytes, active slot {}, writable={}",
            self.config.base_name,
            open.object_count(),
            open.size(),
            active,
            writable
        );
        inner.open = Some(open);
        Ok(true)
    }

    fn has_key(&self, key: &Key) -> Result<bool> {
        let inner = self.inner.read();
        let open = inner.open.as_ref().ok_or(StoreError::NotOpen)?;
        Ok(open.active().contains(key) || open.passive().contains(key))
    }

    /// Read from the active slot, then the passive one
    ///
    /// A failing read in the active slot is returned, not treated as absent.
    fn read(&self, key: &Key) -> Result<Option<Vec<u8>>> {
        let inner = self.inner.read();
        let open = inner.open.as_ref().ok_or(StoreError::NotOpen)?;
        if let Some(data) = open.active().read(key)? {
            return Ok(Some(data));
        }
        open.passive().read(key)
    }

    /// Write to the active slot and drop any passive copy
    fn write(&self, key: &Key, data: &[u8]) -> Result<()> {
        let mut guard = self.inner.write();
        let Inner { open, clock } = &mut *guard;
        let open = open.as_mut().ok_or(StoreError::NotOpen)?;
        if !open.writable {
            return Err(StoreError::ReadOnly);
        }

        if clock.is_due(open, &self.config) {
            let deadline = Instant::now().checked_add(self.config.write_defrag_budget);
            self.defragment_locked(open, clock, false, deadline)?;
        }

        let (active, passive) = open.pair_mut();
        active.write(key, data)?;
        passive.remove(key);
        Ok(())
    }

    fn remove(&self, key: &Key) -> Result<()> {
        let mut inner = self.inner.write();
        let open = inner.open.as_mut().ok_or(StoreError::NotOpen)?;
        if !open.writable {
            return Err(StoreError::ReadOnly);
        }
        for slot in open.slots.iter_mut() {
            slot.remove(key);
        }
        Ok(())
    }

    /// Flush both data files and persist both indexes
    ///
    /// Both slots are closed even if the first fails; the first error wins.
    fn close(&self) -> Result<()> {
        let mut inner = self.inner.write();
        let Some(open) = inner.open.take() else {
            return Ok(());
        };

        let mut first_error = None;
        for slot in &open.slots {
            if let Err(e) = slot.close() {
                tracing::error!("Failed to close slot {}: {}", slot.id(), e);
                first_error.get_or_insert(e);
            }
        }
        tracing::info!(
            "Closed store {:?}: {} keys",
            self.config.base_name,
            open.object_count()
        );

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn maintenance(&self, budget: MaintenanceBudget) -> Result<bool> {
        match budget {
            MaintenanceBudget::Forced => self.defragment(true, None),
            MaintenanceBudget::Within(timeout) => self.defragment(false, Some(timeout)),
        }
    }

    fn object_count(&self) -> usize {
        self.inner
            .read()
            .open
            .as_ref()
            .map_or(0, OpenSlots::object_count)
    }

    fn dump(&self, sink: &mut dyn Write) -> Result<()> {
        let inner = self.inner.read();
        let open = inner.open.as_ref().ok_or(StoreError::NotOpen)?;
        self.write_header(open, sink)?;
        for slot in &open.slots {
            slot.dump(sink)?;
        }
        Ok(())
    }

    fn dump_summary(&self, sink: &mut dyn Write) -> Result<()> {
        let inner = self.inner.read();
        let open = inner.open.as_ref().ok_or(StoreError::NotOpen)?;
        self.write_header(open, sink)?;
        for slot in &open.slots {
            slot.dump_summary(sink)?;
        }
        Ok(())
    }
}

impl Drop for DoubleBufferedStore {
    fn drop(&mut self) {
        if let Err(e) = Storage::close(self) {
            tracing::error!(
                "Failed to close store {:?} on drop: {}",
                self.config.base_name,
                e
            );
        }
    }
}
