use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread::{self, ThreadId};

use crate::error::{Result, StatsError};
use crate::info::StatisticsInfo;
use crate::unit::{unit_number, StatisticsUnit, UNKNOWN_RECENCY};

/// Narrow seam over the statistics store so hosts and tests can substitute
/// implementations (e.g. an in-memory store for deterministic tests).
///
/// Reads never fail: unknown keys yield `0` / [`UNKNOWN_RECENCY`].
pub trait UsageStatistics {
    /// Stored use-count for the fact; for composites, the maximum across
    /// conjuncts.
    fn get_use_count(&self, info: &StatisticsInfo) -> u32;

    /// Recency rank for the fact (lower = more recent); for composites, the
    /// minimum across conjuncts. [`UNKNOWN_RECENCY`] when nothing matches.
    fn get_last_use_recency(&self, info: &StatisticsInfo) -> u32;

    /// Bumps the use-count and makes each conjunct the most recent value of
    /// its context. A no-op when recording is disabled.
    fn inc_use_count(&self, info: &StatisticsInfo);

    /// Every value ever recorded for `context`, most recently used first.
    fn get_all_values(&self, context: &str) -> Vec<StatisticsInfo>;

    /// Flushes all dirty shards. Safe to call repeatedly; shards that fail to
    /// write stay dirty so the next call retries them.
    fn save(&self) -> Result<()>;
}

/// Whether `inc_use_count` records anything.
///
/// Batch/test hosts construct the store with [`RecordingMode::Disabled`] so
/// automated runs stay deterministic and leave statistics files untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingMode {
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, Copy)]
pub struct StoreConfig {
    pub recording: RecordingMode,
    /// Maximum number of shards kept in memory. Evicted dirty shards are
    /// flushed to disk first, so eviction never loses counters.
    pub shard_cache_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            recording: RecordingMode::Enabled,
            shard_cache_capacity: 64,
        }
    }
}

/// Disk-backed, sharded usage-statistics store.
///
/// Contexts are distributed across [`crate::UNIT_COUNT`] shard files
/// (`<root>/stat/unit.<N>`) by a stable hash of the context string. All shard
/// state is guarded by one process-wide lock: usage events are infrequent UI
/// actions, so correctness wins over throughput here. Shard load/save does
/// synchronous file I/O under that lock; the files are small.
///
/// Writes (`inc_use_count`, `save`) are expected on the thread that created
/// the store (the host's UI thread); reads may come from anywhere.
pub struct StatisticsStore {
    dir: PathBuf,
    recording: RecordingMode,
    owner_thread: ThreadId,
    inner: Mutex<Inner>,
}

struct Inner {
    shards: HashMap<u16, CachedUnit>,
    // Invariant: dirty is a subset of the loaded shard set; eviction flushes
    // dirty shards before dropping them.
    dirty: HashSet<u16>,
    clock: u64,
    capacity: usize,
    save_error_reported: bool,
}

struct CachedUnit {
    unit: StatisticsUnit,
    last_access: u64,
}

impl StatisticsStore {
    /// Opens (or creates) the store under `root`; shard files live in
    /// `<root>/stat/`.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        Self::new_with_config(root, StoreConfig::default())
    }

    pub fn new_with_config(root: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let dir = root.as_ref().join("stat");
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            recording: config.recording,
            owner_thread: thread::current().id(),
            inner: Mutex::new(Inner {
                shards: HashMap::new(),
                dirty: HashSet::new(),
                clock: 0,
                capacity: config.shard_cache_capacity.max(1),
                save_error_reported: false,
            }),
        })
    }

    fn unit_path(&self, number: u16) -> PathBuf {
        self.dir.join(format!("unit.{number}"))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A panic while holding this lock leaves only ranking hints behind;
        // recover the data rather than poisoning every later lookup.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn assert_write_thread(&self) {
        debug_assert_eq!(
            thread::current().id(),
            self.owner_thread,
            "statistics writes must happen on the thread that created the store"
        );
    }

    /// Ensures the shard for `number` is loaded and returns it, evicting the
    /// least recently used shard first if the cache is full.
    fn unit_mut<'a>(&self, inner: &'a mut Inner, number: u16) -> &'a mut StatisticsUnit {
        inner.clock += 1;
        let now = inner.clock;

        if !inner.shards.contains_key(&number) {
            self.evict_if_full(inner);
        }

        let path = self.unit_path(number);
        let cached = inner.shards.entry(number).or_insert_with(|| CachedUnit {
            unit: StatisticsUnit::load(&path, number),
            last_access: now,
        });
        cached.last_access = now;
        &mut cached.unit
    }

    fn evict_if_full(&self, inner: &mut Inner) {
        while inner.shards.len() >= inner.capacity {
            let mut candidates: Vec<(u16, u64)> = inner
                .shards
                .iter()
                .map(|(&n, cached)| (n, cached.last_access))
                .collect();
            candidates.sort_by_key(|&(_, last_access)| last_access);

            let mut evicted = false;
            for (number, _) in candidates {
                if inner.dirty.contains(&number) {
                    let cached = &inner.shards[&number];
                    match cached.unit.save(&self.unit_path(number)) {
                        Ok(()) => {
                            inner.dirty.remove(&number);
                        }
                        Err(err) => {
                            // Never drop unsaved counters; try the next
                            // candidate instead.
                            tracing::warn!(
                                target: "sift.stats",
                                unit = number,
                                error = %err,
                                "failed to flush dirty statistics unit during eviction"
                            );
                            continue;
                        }
                    }
                }
                inner.shards.remove(&number);
                evicted = true;
                break;
            }

            if !evicted {
                // Every shard is dirty and unsaveable; overflow the cache
                // rather than lose data.
                tracing::debug!(
                    target: "sift.stats",
                    loaded = inner.shards.len(),
                    capacity = inner.capacity,
                    "statistics shard cache over capacity"
                );
                break;
            }
        }
    }

    /// Removes every recorded value for `context` and marks its shard dirty.
    pub fn forget(&self, context: &str) {
        self.assert_write_thread();
        let mut inner = self.lock();
        let number = unit_number(context);
        if self.unit_mut(&mut inner, number).forget(context) {
            inner.dirty.insert(number);
        }
    }

    /// Number of shards currently held in memory.
    pub fn loaded_unit_count(&self) -> usize {
        self.lock().shards.len()
    }

    /// Number of shards with unsaved changes.
    pub fn dirty_unit_count(&self) -> usize {
        self.lock().dirty.len()
    }
}

impl UsageStatistics for StatisticsStore {
    fn get_use_count(&self, info: &StatisticsInfo) -> u32 {
        let mut inner = self.lock();
        info.conjuncts()
            .iter()
            .map(|conjunct| {
                let unit = self.unit_mut(&mut inner, unit_number(conjunct.context()));
                unit.use_count(conjunct.context(), conjunct.value())
            })
            .max()
            .unwrap_or(0)
    }

    fn get_last_use_recency(&self, info: &StatisticsInfo) -> u32 {
        let mut inner = self.lock();
        info.conjuncts()
            .iter()
            .map(|conjunct| {
                let unit = self.unit_mut(&mut inner, unit_number(conjunct.context()));
                unit.recency(conjunct.context(), conjunct.value())
            })
            .min()
            .unwrap_or(UNKNOWN_RECENCY)
    }

    fn inc_use_count(&self, info: &StatisticsInfo) {
        if self.recording == RecordingMode::Disabled {
            return;
        }
        self.assert_write_thread();

        let mut inner = self.lock();
        for conjunct in info.conjuncts() {
            let number = unit_number(conjunct.context());
            self.unit_mut(&mut inner, number)
                .increment(conjunct.context(), conjunct.value());
            inner.dirty.insert(number);
        }
    }

    fn get_all_values(&self, context: &str) -> Vec<StatisticsInfo> {
        let mut inner = self.lock();
        let unit = self.unit_mut(&mut inner, unit_number(context));
        unit.values(context)
            .map(|value| StatisticsInfo::new(context, value))
            .collect()
    }

    fn save(&self) -> Result<()> {
        self.assert_write_thread();
        let mut inner = self.lock();

        let mut numbers: Vec<u16> = inner.dirty.iter().copied().collect();
        numbers.sort_unstable();
        let dirty = numbers.len();

        let mut failed = 0usize;
        let mut first_error: Option<StatsError> = None;
        for number in numbers {
            let Some(cached) = inner.shards.get(&number) else {
                // Dirty shards are always loaded; tolerate a stale entry.
                inner.dirty.remove(&number);
                continue;
            };
            match cached.unit.save(&self.unit_path(number)) {
                Ok(()) => {
                    inner.dirty.remove(&number);
                }
                Err(err) => {
                    failed += 1;
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }

        match first_error {
            None => Ok(()),
            Some(first) => {
                // The counters stay in memory and the shards stay dirty, so a
                // later save() retries. Log loudly only the first time.
                if !inner.save_error_reported {
                    inner.save_error_reported = true;
                    tracing::warn!(
                        target: "sift.stats",
                        failed,
                        dirty,
                        error = %first,
                        "failed to save usage statistics"
                    );
                } else {
                    tracing::debug!(
                        target: "sift.stats",
                        failed,
                        dirty,
                        error = %first,
                        "failed to save usage statistics (already reported)"
                    );
                }
                Err(StatsError::PartialSave {
                    failed,
                    dirty,
                    first: Box::new(first),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &Path) -> StatisticsStore {
        StatisticsStore::new(dir).unwrap()
    }

    #[test]
    fn use_count_accumulates() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = store(tmp.path());
        let info = StatisticsInfo::new("ctx", "foo");

        assert_eq!(store.get_use_count(&info), 0);
        for _ in 0..3 {
            store.inc_use_count(&info);
        }
        assert_eq!(store.get_use_count(&info), 3);
    }

    #[test]
    fn recency_is_monotonic_in_call_order() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = store(tmp.path());

        store.inc_use_count(&StatisticsInfo::new("ctx", "v1"));
        store.inc_use_count(&StatisticsInfo::new("ctx", "v2"));
        store.inc_use_count(&StatisticsInfo::new("ctx", "v3"));

        let r1 = store.get_last_use_recency(&StatisticsInfo::new("ctx", "v1"));
        let r2 = store.get_last_use_recency(&StatisticsInfo::new("ctx", "v2"));
        let r3 = store.get_last_use_recency(&StatisticsInfo::new("ctx", "v3"));
        assert!(r3 < r2 && r2 < r1, "expected {r3} < {r2} < {r1}");
    }

    #[test]
    fn composite_aggregates_max_count_min_recency() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = store(tmp.path());

        let a = StatisticsInfo::new("ctx-a", "x");
        let b = StatisticsInfo::new("ctx-b", "y");
        store.inc_use_count(&a);
        store.inc_use_count(&a);
        store.inc_use_count(&b);

        let composite = StatisticsInfo::composite(vec![a.clone(), b.clone()]);
        assert_eq!(
            store.get_use_count(&composite),
            store.get_use_count(&a).max(store.get_use_count(&b))
        );
        assert_eq!(
            store.get_last_use_recency(&composite),
            store
                .get_last_use_recency(&a)
                .min(store.get_last_use_recency(&b))
        );
    }

    #[test]
    fn unknown_keys_yield_zero_and_sentinel() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = store(tmp.path());
        let info = StatisticsInfo::new("never-seen", "nothing");

        assert_eq!(store.get_use_count(&info), 0);
        assert_eq!(store.get_last_use_recency(&info), UNKNOWN_RECENCY);
        assert!(store.get_all_values("never-seen").is_empty());
    }

    #[test]
    fn disabled_recording_is_a_no_op() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = StatisticsStore::new_with_config(
            tmp.path(),
            StoreConfig {
                recording: RecordingMode::Disabled,
                ..StoreConfig::default()
            },
        )
        .unwrap();

        let info = StatisticsInfo::new("ctx", "foo");
        store.inc_use_count(&info);
        assert_eq!(store.get_use_count(&info), 0);
        assert_eq!(store.dirty_unit_count(), 0);
    }

    #[test]
    fn get_all_values_lists_most_recent_first() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = store(tmp.path());

        store.inc_use_count(&StatisticsInfo::new("ctx", "foo"));
        store.inc_use_count(&StatisticsInfo::new("ctx", "bar"));

        let values: Vec<String> = store
            .get_all_values("ctx")
            .iter()
            .map(|info| info.value().to_string())
            .collect();
        assert_eq!(values, ["bar", "foo"]);
    }

    #[test]
    fn forget_clears_one_context() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = store(tmp.path());

        store.inc_use_count(&StatisticsInfo::new("keep", "a"));
        store.inc_use_count(&StatisticsInfo::new("drop", "b"));
        store.forget("drop");

        assert!(store.get_all_values("drop").is_empty());
        assert_eq!(store.get_use_count(&StatisticsInfo::new("keep", "a")), 1);
    }

    #[test]
    fn save_clears_dirty_set() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = store(tmp.path());

        store.inc_use_count(&StatisticsInfo::new("ctx", "foo"));
        assert_eq!(store.dirty_unit_count(), 1);
        store.save().unwrap();
        assert_eq!(store.dirty_unit_count(), 0);
        // Repeated saves are safe.
        store.save().unwrap();
    }

    #[test]
    fn eviction_flushes_dirty_shards() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = StatisticsStore::new_with_config(
            tmp.path(),
            StoreConfig {
                shard_cache_capacity: 2,
                ..StoreConfig::default()
            },
        )
        .unwrap();

        // Find contexts hashing to three distinct shards.
        let mut contexts: Vec<String> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for i in 0.. {
            let context = format!("context-{i}");
            if seen.insert(unit_number(&context)) {
                contexts.push(context);
            }
            if contexts.len() == 3 {
                break;
            }
        }

        for context in &contexts {
            store.inc_use_count(&StatisticsInfo::new(context.clone(), "v"));
        }
        assert!(store.loaded_unit_count() <= 2);

        // The evicted shard was flushed, so its count survives reload.
        for context in &contexts {
            assert_eq!(
                store.get_use_count(&StatisticsInfo::new(context.clone(), "v")),
                1,
                "count lost for {context}"
            );
        }
    }
}
