use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the statistics core. Counter merges report through [`crate::MergeOutcome`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StatsError {
    #[error("failed to allocate operation counters for {slots} URL slots")]
    Allocation { slots: usize },

    #[error("wall clock unavailable: {0}")]
    Clock(String),

    #[error("failed to open {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
