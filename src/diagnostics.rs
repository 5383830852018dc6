//! Non-fatal warning sink.
//!
//! Anything that degrades a digest without aborting it (an unreadable file,
//! a failing redactor, a truncated tree) is reported through
//! [`Diagnostics`]. The default sink forwards to the `log` facade.

use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;

/// A non-fatal condition observed while building a digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    UnreadableFile { path: PathBuf, reason: String },
    FileTooLarge { path: PathBuf, size: u64, limit: u64 },
    RedactionFailed { path: PathBuf, reason: String },
    TreeTruncated { shown: usize, total: usize },
    IgnorePatternSkipped { base_dir: String, line: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::UnreadableFile { path, reason } => {
                write!(f, "cannot read {}: {}", path.display(), reason)
            }
            Warning::FileTooLarge { path, size, limit } => write!(
                f,
                "skipping {} ({} bytes exceeds the {} byte limit)",
                path.display(),
                size,
                limit
            ),
            Warning::RedactionFailed { path, reason } => write!(
                f,
                "redaction failed for {}, using original content: {}",
                path.display(),
                reason
            ),
            Warning::TreeTruncated { shown, total } => {
                write!(f, "file tree truncated to {} of {} lines", shown, total)
            }
            Warning::IgnorePatternSkipped { base_dir, line } => {
                write!(f, "skipping malformed ignore pattern {:?} in {:?}", line, base_dir)
            }
        }
    }
}

/// Receives warnings. Must be shareable across read workers.
pub trait Diagnostics: Send + Sync {
    fn warn(&self, warning: Warning);
}

/// Forwards every warning to `log::warn!`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDiagnostics;

impl Diagnostics for LogDiagnostics {
    fn warn(&self, warning: Warning) {
        log::warn!("{}", warning);
    }
}

/// Keeps warnings in memory and also logs them.
#[derive(Debug, Default)]
pub struct CollectingDiagnostics {
    warnings: Mutex<Vec<Warning>>,
}

impl CollectingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the warnings recorded so far.
    pub fn warnings(&self) -> Vec<Warning> {
        match self.warnings.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.warnings().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Diagnostics for CollectingDiagnostics {
    fn warn(&self, warning: Warning) {
        log::warn!("{}", warning);
        match self.warnings.lock() {
            Ok(mut guard) => guard.push(warning),
            Err(poisoned) => poisoned.into_inner().push(warning),
        }
    }
}
