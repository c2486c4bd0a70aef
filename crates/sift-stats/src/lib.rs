//! Persistent usage statistics for candidate ranking.
//!
//! The store answers two questions about a `(context, value)` pair: how often
//! has the value been chosen for that context, and how recently relative to
//! the context's other choices. Callers feed it with [`StatisticsInfo`] facts
//! when the user picks a candidate; ranking code reads the counters back
//! through the [`UsageStatistics`] trait.
//!
//! ## Storage
//!
//! Contexts are sharded across [`UNIT_COUNT`] files (`<root>/stat/unit.<N>`)
//! by a stable hash of the context string, bounding per-file size and keeping
//! lock scope simple. Shard files are versioned bincode run through a
//! reversible byte-scrambling filter that discourages casual tampering.
//!
//! Statistics are an optimization, never a correctness dependency: every load
//! failure degrades to an empty shard, and every read has a defined answer
//! for unknown keys.

#![forbid(unsafe_code)]

mod error;
mod info;
mod scramble;
mod store;
mod unit;
mod util;

pub use error::{Result, StatsError};
pub use info::StatisticsInfo;
pub use store::{RecordingMode, StatisticsStore, StoreConfig, UsageStatistics};
pub use unit::{unit_number, UNIT_COUNT, UNKNOWN_RECENCY};
