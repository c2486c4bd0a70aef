//! Statistics-weighted proximity ranking for candidate lists.
//!
//! Ranking call sites (completion, goto-symbol, and friends) build a
//! [`ProximityComparator`] bound to a context element, then hand it to a
//! stable sort. Each comparison consults usage history first (the recency
//! counters kept by `sift-stats`) and falls back to a pluggable, weighted
//! proximity score when recency ties or is unavailable.
//!
//! Every extension point is an explicit value: hosts populate a
//! [`WeigherRegistry`] per candidate kind at startup and pass it (plus a
//! [`StatisticsSerializer`] and [`ModuleResolver`]) into each comparator.
//! Nothing here is fallible at the call site; every degraded input has a
//! defined, safe ordering.

#![forbid(unsafe_code)]

mod comparator;
mod location;
mod serializer;
mod weigher;

pub use comparator::ProximityComparator;
pub use location::{ModuleId, ModuleResolver, ProcessingCache, ProximityLocation};
pub use serializer::StatisticsSerializer;
pub use weigher::{proximity_score, ProximityScore, Weigher, WeigherRegistry, Weight};
