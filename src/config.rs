//! Digest configuration.
//!
//! [`DigestConfig`] is deserialized from JSON with camelCase keys, e.g.
//!
//! ```json
//! {
//!   "outputFormat": "markdown",
//!   "includeTree": "minimal",
//!   "maxSelectedTreeLines": 40,
//!   "token": { "model": "gpt-4o", "maxTokensPerChunk": 8000 },
//!   "outputSeparatorsHeader": "\n"
//! }
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default per-file size cap (1 MiB).
pub const DEFAULT_MAX_FILE_BYTES: u64 = 1024 * 1024;

/// Default number of concurrent file reads.
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Output flavour for sections and tree blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormatKind {
    #[default]
    Markdown,
    Text,
}

impl OutputFormatKind {
    /// File extension used when chunks are written to disk.
    pub fn file_extension(&self) -> &'static str {
        match self {
            OutputFormatKind::Markdown => "md",
            OutputFormatKind::Text => "txt",
        }
    }
}

impl fmt::Display for OutputFormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormatKind::Markdown => write!(f, "markdown"),
            OutputFormatKind::Text => write!(f, "text"),
        }
    }
}

impl FromStr for OutputFormatKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "markdown" | "md" => Ok(OutputFormatKind::Markdown),
            "text" | "txt" | "plain" => Ok(OutputFormatKind::Text),
            _ => Err(format!("unknown output format: {}", s)),
        }
    }
}

/// Whether and how the file tree is included.
///
/// Serialized as `true`, `false` or `"minimal"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "IncludeTreeRepr", into = "IncludeTreeRepr")]
pub enum IncludeTree {
    None,
    #[default]
    Full,
    Minimal,
}

impl IncludeTree {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, IncludeTree::None)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum IncludeTreeRepr {
    Flag(bool),
    Mode(String),
}

impl TryFrom<IncludeTreeRepr> for IncludeTree {
    type Error = String;

    fn try_from(repr: IncludeTreeRepr) -> Result<Self, Self::Error> {
        match repr {
            IncludeTreeRepr::Flag(true) => Ok(IncludeTree::Full),
            IncludeTreeRepr::Flag(false) => Ok(IncludeTree::None),
            IncludeTreeRepr::Mode(mode) => mode.parse(),
        }
    }
}

impl From<IncludeTree> for IncludeTreeRepr {
    fn from(mode: IncludeTree) -> Self {
        match mode {
            IncludeTree::None => IncludeTreeRepr::Flag(false),
            IncludeTree::Full => IncludeTreeRepr::Flag(true),
            IncludeTree::Minimal => IncludeTreeRepr::Mode("minimal".to_string()),
        }
    }
}

impl FromStr for IncludeTree {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" | "true" => Ok(IncludeTree::Full),
            "minimal" => Ok(IncludeTree::Minimal),
            "none" | "false" => Ok(IncludeTree::None),
            _ => Err(format!("unknown tree mode: {}", s)),
        }
    }
}

/// Token model and chunk budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenConfig {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens_per_chunk: Option<usize>,
}

/// Configuration for a single digest run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DigestConfig {
    pub output_format: OutputFormatKind,
    pub include_tree: IncludeTree,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_selected_tree_lines: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenConfig>,
    /// Literal separator placed between chunks in the joined content.
    pub output_separators_header: String,
    /// Files larger than this degrade to a placeholder section.
    pub max_file_bytes: u64,
    /// Size of the file-read worker pool.
    pub max_concurrency: usize,
    /// Run the redactor over each assembled chunk as a final sweep.
    pub redact_assembled: bool,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            output_format: OutputFormatKind::Markdown,
            include_tree: IncludeTree::Full,
            max_selected_tree_lines: None,
            token: None,
            output_separators_header: "\n".to_string(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            redact_assembled: false,
        }
    }
}

impl DigestConfig {
    /// Parse and validate a JSON config document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: DigestConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Reject settings the generator cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "maxConcurrency must be at least 1".to_string(),
            ));
        }
        if let Some(token) = &self.token {
            if token.model.trim().is_empty() {
                return Err(ConfigError::Invalid("token.model must not be empty".to_string()));
            }
        }
        Ok(())
    }

    /// Chunk token budget, if any.
    pub fn chunk_budget(&self) -> Option<usize> {
        self.token.as_ref().and_then(|t| t.max_tokens_per_chunk)
    }

    /// Model name used for token estimates.
    pub fn model(&self) -> &str {
        self.token.as_ref().map_or("", |t| t.model.as_str())
    }
}
