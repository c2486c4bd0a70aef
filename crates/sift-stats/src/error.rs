pub type Result<T> = std::result::Result<T, StatsError>;

/// Errors produced by statistics persistence.
///
/// Load-side problems never surface here: a missing or corrupt shard file is
/// treated as an empty shard. Only write-side failures are reported, and the
/// in-memory counters survive them so a later `save()` can retry.
#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("failed to save {failed} of {dirty} dirty statistics units (first error: {first})")]
    PartialSave {
        failed: usize,
        dirty: usize,
        #[source]
        first: Box<StatsError>,
    },
}
