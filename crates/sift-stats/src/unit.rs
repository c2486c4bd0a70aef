use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::scramble::scramble;
use crate::util::{atomic_write, bincode_deserialize, bincode_serialize, read_file_limited};

/// Number of on-disk shards. Prime, to spread hash collisions.
pub const UNIT_COUNT: u16 = 997;

/// Recency rank returned for a (context, value) pair with no recorded use.
/// Larger than any real rank; lower ranks are more recent.
pub const UNKNOWN_RECENCY: u32 = u32::MAX;

const UNIT_FILE_MAGIC: [u8; 8] = *b"SIFTSTAT";
const UNIT_FILE_FORMAT_VERSION: u32 = 1;

/// Stable 31-based polynomial string hash (wrapping `i32`).
///
/// Shard assignment is persisted implicitly in file names, so the hash must
/// not change across releases or platforms; std's `DefaultHasher` gives no
/// such guarantee.
fn context_hash(context: &str) -> i32 {
    let mut h: i32 = 0;
    for ch in context.chars() {
        h = h.wrapping_mul(31).wrapping_add(ch as i32);
    }
    h
}

/// The shard a context belongs to. Deterministic for a given context string.
pub fn unit_number(context: &str) -> u16 {
    (context_hash(context).unsigned_abs() % u32::from(UNIT_COUNT)) as u16
}

#[derive(Debug, Clone)]
struct ValueEntry {
    value: String,
    use_count: u32,
}

/// One shard of the statistics store.
///
/// Holds every recorded context that hashes to this shard's index. Per
/// context, values are kept ordered most-recently-used first; a value's
/// recency rank is simply its position in that list, so ordinals are assigned
/// purely by call order.
#[derive(Debug)]
pub(crate) struct StatisticsUnit {
    number: u16,
    contexts: HashMap<String, Vec<ValueEntry>>,
}

impl StatisticsUnit {
    pub(crate) fn empty(number: u16) -> Self {
        debug_assert!(number < UNIT_COUNT);
        Self {
            number,
            contexts: HashMap::new(),
        }
    }

    pub(crate) fn use_count(&self, context: &str, value: &str) -> u32 {
        self.contexts
            .get(context)
            .and_then(|values| values.iter().find(|e| e.value == value))
            .map(|e| e.use_count)
            .unwrap_or(0)
    }

    pub(crate) fn recency(&self, context: &str, value: &str) -> u32 {
        self.contexts
            .get(context)
            .and_then(|values| values.iter().position(|e| e.value == value))
            .map(|rank| rank as u32)
            .unwrap_or(UNKNOWN_RECENCY)
    }

    /// Bumps the use-count for (context, value) and makes it the most
    /// recently used value of its context.
    pub(crate) fn increment(&mut self, context: &str, value: &str) {
        let values = self.contexts.entry(context.to_string()).or_default();
        let entry = match values.iter().position(|e| e.value == value) {
            Some(pos) => {
                let mut entry = values.remove(pos);
                entry.use_count = entry.use_count.saturating_add(1);
                entry
            }
            None => ValueEntry {
                value: value.to_string(),
                use_count: 1,
            },
        };
        values.insert(0, entry);
    }

    /// Values recorded for `context`, most recently used first.
    pub(crate) fn values(&self, context: &str) -> impl Iterator<Item = &str> {
        self.contexts
            .get(context)
            .into_iter()
            .flat_map(|values| values.iter().map(|e| e.value.as_str()))
    }

    /// Drops every recorded value for `context`. Returns whether anything
    /// was removed.
    pub(crate) fn forget(&mut self, context: &str) -> bool {
        self.contexts.remove(context).is_some()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Loads the shard from `path`.
    ///
    /// Statistics are an optimization, never a correctness dependency:
    /// a missing, corrupt, oversized, or version-incompatible file yields a
    /// fresh empty shard and at most a warn log.
    pub(crate) fn load(path: &Path, number: u16) -> Self {
        let Some(mut bytes) = read_file_limited(path) else {
            return Self::empty(number);
        };
        scramble(&mut bytes);

        let file: UnitFile = match bincode_deserialize(&bytes) {
            Ok(file) => file,
            Err(err) => {
                tracing::warn!(
                    target: "sift.stats",
                    unit = number,
                    path = %path.display(),
                    error = %err,
                    "failed to decode statistics unit; starting empty"
                );
                return Self::empty(number);
            }
        };

        if file.magic != UNIT_FILE_MAGIC || file.format_version != UNIT_FILE_FORMAT_VERSION {
            tracing::warn!(
                target: "sift.stats",
                unit = number,
                path = %path.display(),
                format_version = file.format_version,
                "incompatible statistics unit file; starting empty"
            );
            return Self::empty(number);
        }

        if file.unit_number != number {
            tracing::warn!(
                target: "sift.stats",
                unit = number,
                found = file.unit_number,
                path = %path.display(),
                "unit number mismatch in statistics file; starting empty"
            );
            return Self::empty(number);
        }

        let mut contexts = HashMap::with_capacity(file.contexts.len());
        for record in file.contexts {
            let values = record
                .values
                .into_iter()
                .map(|v| ValueEntry {
                    value: v.value,
                    use_count: v.use_count,
                })
                .collect();
            contexts.insert(record.context, values);
        }
        Self { number, contexts }
    }

    /// Writes the shard to `path` atomically.
    pub(crate) fn save(&self, path: &Path) -> Result<()> {
        let mut contexts: Vec<ContextRecord> = self
            .contexts
            .iter()
            .map(|(context, values)| ContextRecord {
                context: context.clone(),
                values: values
                    .iter()
                    .map(|e| ValueRecord {
                        value: e.value.clone(),
                        use_count: e.use_count,
                    })
                    .collect(),
            })
            .collect();
        // HashMap iteration order is nondeterministic; sort so identical
        // shards produce identical files.
        contexts.sort_by(|a, b| a.context.cmp(&b.context));

        let file = UnitFile {
            magic: UNIT_FILE_MAGIC,
            format_version: UNIT_FILE_FORMAT_VERSION,
            unit_number: self.number,
            contexts,
        };
        let mut bytes = bincode_serialize(&file)?;
        scramble(&mut bytes);
        atomic_write(path, &bytes)
    }
}

/// On-disk shard format: versioned, self-describing, with per-context value
/// records ordered most-recently-used first (recency is implicit in order).
#[derive(Debug, Serialize, Deserialize)]
struct UnitFile {
    magic: [u8; 8],
    format_version: u32,
    unit_number: u16,
    contexts: Vec<ContextRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ContextRecord {
    context: String,
    values: Vec<ValueRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ValueRecord {
    value: String,
    use_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_number_is_deterministic_and_in_range() {
        for context in ["", "completion after foo.", "goto symbol", "ctx1", "日本語"] {
            let n = unit_number(context);
            assert_eq!(n, unit_number(context));
            assert!(n < UNIT_COUNT);
        }
    }

    #[test]
    fn increment_moves_value_to_front() {
        let mut unit = StatisticsUnit::empty(0);
        unit.increment("ctx", "foo");
        unit.increment("ctx", "bar");
        unit.increment("ctx", "baz");

        assert_eq!(unit.recency("ctx", "baz"), 0);
        assert_eq!(unit.recency("ctx", "bar"), 1);
        assert_eq!(unit.recency("ctx", "foo"), 2);

        unit.increment("ctx", "foo");
        assert_eq!(unit.recency("ctx", "foo"), 0);
        assert_eq!(unit.use_count("ctx", "foo"), 2);
    }

    #[test]
    fn unknown_keys_are_safe() {
        let unit = StatisticsUnit::empty(3);
        assert_eq!(unit.use_count("nope", "nothing"), 0);
        assert_eq!(unit.recency("nope", "nothing"), UNKNOWN_RECENCY);
        assert_eq!(unit.values("nope").count(), 0);
    }

    #[test]
    fn save_load_round_trip_preserves_counts_and_order() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("unit.7");

        let mut unit = StatisticsUnit::empty(7);
        unit.increment("ctx", "foo");
        unit.increment("ctx", "bar");
        unit.increment("ctx", "bar");
        unit.increment("other", "x");
        unit.save(&path).unwrap();

        let loaded = StatisticsUnit::load(&path, 7);
        assert_eq!(loaded.use_count("ctx", "bar"), 2);
        assert_eq!(loaded.use_count("ctx", "foo"), 1);
        assert_eq!(loaded.recency("ctx", "bar"), 0);
        assert_eq!(loaded.recency("ctx", "foo"), 1);
        assert_eq!(loaded.use_count("other", "x"), 1);
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("unit.9");
        std::fs::write(&path, b"definitely not a statistics unit").unwrap();

        let unit = StatisticsUnit::load(&path, 9);
        assert!(unit.is_empty());
    }

    fn write_unit_file(path: &std::path::Path, file: &UnitFile) {
        let mut bytes = bincode_serialize(file).unwrap();
        scramble(&mut bytes);
        std::fs::write(path, bytes).unwrap();
    }

    fn one_context_file(magic: [u8; 8], format_version: u32, unit_number: u16) -> UnitFile {
        UnitFile {
            magic,
            format_version,
            unit_number,
            contexts: vec![ContextRecord {
                context: "ctx".to_string(),
                values: vec![ValueRecord {
                    value: "foo".to_string(),
                    use_count: 3,
                }],
            }],
        }
    }

    #[test]
    fn future_format_version_loads_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("unit.4");

        write_unit_file(
            &path,
            &one_context_file(UNIT_FILE_MAGIC, UNIT_FILE_FORMAT_VERSION + 1, 4),
        );

        let unit = StatisticsUnit::load(&path, 4);
        assert!(unit.is_empty());
        assert_eq!(unit.use_count("ctx", "foo"), 0);
    }

    #[test]
    fn wrong_magic_loads_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("unit.4");

        write_unit_file(
            &path,
            &one_context_file(*b"NOTSTATS", UNIT_FILE_FORMAT_VERSION, 4),
        );

        let unit = StatisticsUnit::load(&path, 4);
        assert!(unit.is_empty());
    }

    #[test]
    fn unit_number_mismatch_loads_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("unit.5");

        let mut unit = StatisticsUnit::empty(5);
        unit.increment("ctx", "foo");
        unit.save(&path).unwrap();

        let loaded = StatisticsUnit::load(&path, 6);
        assert!(loaded.is_empty());
    }

    #[test]
    fn file_bytes_are_scrambled() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("unit.1");

        let mut unit = StatisticsUnit::empty(1);
        unit.increment("visible-context", "visible-value");
        unit.save(&path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let haystack = String::from_utf8_lossy(&bytes).to_string();
        assert!(!haystack.contains("visible-context"));
        assert!(!haystack.contains("visible-value"));
    }
}
