//! Error types surfaced by the core.
//!
//! Pipeline failures are deliberately NOT errors: an unmount that fails
//! resolves into a volume status transition, and a scan that runs out of
//! budget returns partial results. `CoreError` covers the remaining cases
//! where a caller can meaningfully observe a failure.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// An external command could not be started at all (missing binary,
    /// spawn failure). Distinct from the command running and exiting
    /// non-zero, which is reported through [`crate::runner::CommandOutput`].
    #[error("failed to launch {program}: {source}")]
    CommandLaunch {
        program: String,
        source: std::io::Error,
    },

    /// The stats file could not be written back to disk.
    #[error("failed to write stats file {path}: {source}")]
    StatsWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The stats file could not be encoded.
    #[error("failed to encode stats file: {0}")]
    StatsEncode(#[from] serde_json::Error),
}
