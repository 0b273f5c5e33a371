use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::debug;

use loglens_types::{LogEntry, LogLevel, Signature};

use crate::ArcLogEntry;
use crate::dedup::Deduplicator;
use crate::marks::MarkManager;

/// First id handed out after construction or `clear`
const FIRST_ID: u64 = 1;

/// Options for a single ingestion call
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AppendOptions {
    /// Skip the check against remote signatures already in the store.
    /// Only used right after a replace-mode clear.
    pub ignore_existing_for_elastic: bool,
}

/// Where ingestion batches go. Implemented by [`LogStore`]; producers such as
/// the search paginator only see this.
pub trait IngestSink: Send + Sync {
    /// Ingest a batch, returning the number of records accepted after dedup
    fn append(&self, batch: Vec<LogEntry>, opts: AppendOptions) -> usize;

    /// Drop every entry and reset ids and dedup state
    fn clear(&self);

    /// Number of remote-origin entries currently held
    fn remote_count(&self) -> usize;

    /// Bumped by every `clear`; ids are only unique within one epoch
    fn epoch(&self) -> u64;
}

struct StoreInner {
    /// Sorted by `(timestamp, id)`
    entries: Vec<ArcLogEntry>,
    next_id: u64,
    dedup: Deduplicator,
    marks: MarkManager,
    level_counts: LevelCounts,
    remote_count: usize,
    epoch: u64,
}

impl StoreInner {
    fn new(marks: MarkManager) -> Self {
        Self {
            entries: Vec::new(),
            next_id: FIRST_ID,
            dedup: Deduplicator::new(),
            marks,
            level_counts: LevelCounts::default(),
            remote_count: 0,
            epoch: 0,
        }
    }
}

/// Thread-safe, sorted, deduplicating store for log entries
#[derive(Clone)]
pub struct LogStore {
    inner: Arc<RwLock<StoreInner>>,

    /// Bumped on every mutation so views know when to recompute
    generation: Arc<AtomicU64>,
}

impl LogStore {
    /// Create an empty store with no marks
    pub fn new() -> Self {
        Self::with_marks(MarkManager::new())
    }

    /// Create an empty store seeded with persisted marks
    pub fn with_marks(marks: MarkManager) -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreInner::new(marks))),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Ingest a batch: dedup, assign ids, apply marks, merge and re-sort.
    ///
    /// Empty batches are a no-op. Returns the number of accepted records.
    pub fn append(&self, batch: Vec<LogEntry>, opts: AppendOptions) -> usize {
        if batch.is_empty() {
            return 0;
        }
        let offered = batch.len();

        let mut inner = self.inner.write();
        let accepted = inner
            .dedup
            .filter_batch(batch, opts.ignore_existing_for_elastic);
        if accepted.is_empty() {
            debug!(offered, "append dropped every record as duplicate");
            return 0;
        }

        // Ids are read and advanced under the same write lock as the merge
        let count = accepted.len();
        for mut entry in accepted {
            entry.id = inner.next_id;
            inner.next_id += 1;
            inner.marks.apply(&mut entry);
            inner.level_counts.increment(entry.log_level());
            if entry.origin().is_remote() {
                inner.remote_count += 1;
            }
            inner.entries.push(Arc::new(entry));
        }
        inner.entries.sort_by_cached_key(|e| e.sort_key());
        drop(inner);

        self.bump();
        debug!(offered, accepted = count, "appended batch");
        count
    }

    /// Clear all entries, reset the id cursor and every dedup scope
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.next_id = FIRST_ID;
        inner.dedup.reset();
        inner.level_counts = LevelCounts::default();
        inner.remote_count = 0;
        inner.epoch += 1;
        drop(inner);
        self.bump();
    }

    /// Set or remove a mark and re-synchronize every entry.
    /// Returns whether the mark map changed.
    pub fn set_mark(&self, signature: Signature, color: Option<String>) -> bool {
        let mut inner = self.inner.write();
        if !inner.marks.set_mark(signature, color) {
            return false;
        }
        let synced = inner.marks.sync_entries(&inner.entries);
        inner.entries = synced;
        drop(inner);
        self.bump();
        true
    }

    /// Snapshot of the mark map
    pub fn marks(&self) -> BTreeMap<Signature, String> {
        self.inner.read().marks.marks()
    }

    pub fn custom_colors(&self) -> Vec<String> {
        self.inner.read().marks.custom_colors().to_vec()
    }

    pub fn add_custom_color(&self, color: &str) -> bool {
        self.inner.write().marks.add_custom_color(color)
    }

    pub fn remove_custom_color(&self, color: &str) -> bool {
        self.inner.write().marks.remove_custom_color(color)
    }

    /// Sorted entries; cloning only bumps reference counts
    pub fn all(&self) -> Vec<ArcLogEntry> {
        self.inner.read().entries.clone()
    }

    /// Clear epoch and the entries it belongs to, read under one lock
    pub fn snapshot(&self) -> (u64, Vec<ArcLogEntry>) {
        let inner = self.inner.read();
        (inner.epoch, inner.entries.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn remote_count(&self) -> usize {
        self.inner.read().remote_count
    }

    /// Get entry count per log level
    pub fn level_counts(&self) -> LevelCounts {
        self.inner.read().level_counts.clone()
    }

    pub fn epoch(&self) -> u64 {
        self.inner.read().epoch
    }

    /// Monotonic mutation counter
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Export all entries as JSON lines
    pub fn export_raw(&self) -> String {
        self.inner
            .read()
            .entries
            .iter()
            .filter_map(|e| serde_json::to_string(e.as_ref()).ok())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}

impl Default for LogStore {
    fn default() -> Self {
        Self::new()
    }
}

impl IngestSink for LogStore {
    fn append(&self, batch: Vec<LogEntry>, opts: AppendOptions) -> usize {
        LogStore::append(self, batch, opts)
    }

    fn clear(&self) {
        LogStore::clear(self)
    }

    fn remote_count(&self) -> usize {
        LogStore::remote_count(self)
    }

    fn epoch(&self) -> u64 {
        LogStore::epoch(self)
    }
}

/// Counts per log level
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LevelCounts {
    pub trace: usize,
    pub debug: usize,
    pub info: usize,
    pub warn: usize,
    pub error: usize,
    pub fatal: usize,
    pub unknown: usize,
}

impl LevelCounts {
    fn increment(&mut self, level: LogLevel) {
        match level {
            LogLevel::Trace => self.trace += 1,
            LogLevel::Debug => self.debug += 1,
            LogLevel::Info => self.info += 1,
            LogLevel::Warn => self.warn += 1,
            LogLevel::Error => self.error += 1,
            LogLevel::Fatal => self.fatal += 1,
            LogLevel::Unknown => self.unknown += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.trace + self.debug + self.info + self.warn + self.error + self.fatal + self.unknown
    }
}
