//! Error types for repodigest.

use std::path::PathBuf;

use crate::config::ConfigError;
use crate::walker::WalkError;

/// Top-level error type for digest operations.
///
/// Per-file problems (unreadable files, failing redactors) never surface
/// here; they are reported through [`crate::diagnostics::Diagnostics`] and
/// degrade to placeholder sections instead.
#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    #[error("root not found: {0}")]
    RootNotFound(PathBuf),

    #[error("digest generation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("walk error: {0}")]
    Walk(#[from] WalkError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DigestError {
    /// Whether this error is the cancellation condition.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DigestError::Cancelled)
    }
}

/// Map an error to its exit code.
pub fn exit_code(error: &DigestError) -> i32 {
    match error {
        DigestError::RootNotFound(_) => 3,
        DigestError::Cancelled => 130,
        DigestError::Io(_) => 1,
        DigestError::Walk(_) => 2,
        DigestError::Config(_) => 4,
        DigestError::WorkerPool(_) => 1,
        DigestError::Serialization(_) => 1,
    }
}
