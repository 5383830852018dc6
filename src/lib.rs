//! Repodigest - Pack a source tree into a single LLM-ready digest.
//!
//! Repodigest walks a directory honouring `.gitignore`-style rules, renders a
//! file tree, reads the selected files (skipping binaries and redacting
//! secrets), and joins everything into Markdown or plain-text output,
//! optionally split into token-bounded chunks.
//!
//! # Quick Start
//!
//! ```no_run
//! use repodigest::config::DigestConfig;
//! use repodigest::generator::DigestGenerator;
//! use repodigest::walker::{collect_nodes, WalkOptions};
//! use std::path::Path;
//!
//! let root = Path::new("./my-project");
//! let nodes = collect_nodes(root, &WalkOptions::default()).unwrap();
//! let result = DigestGenerator::new(root)
//!     .generate_from_config(&nodes, &DigestConfig::default())
//!     .unwrap();
//!
//! println!("{} chunks", result.chunks.len());
//! println!("{}", result.content);
//! ```
//!
//! # Modules
//!
//! - [`patterns`] - Gitignore-style matching with per-directory scopes
//! - [`walker`] - Directory traversal producing [`FileNode`]s
//! - [`content`] - File reading, binary detection and redaction
//! - [`redact`] - Secret redaction
//! - [`tokens`] - Token counting for chunk budgets
//! - [`tree`] - File tree rendering
//! - [`output`] - Markdown and text section templates
//! - [`generator`] - Digest assembly and chunking

pub mod cancel;
pub mod config;
pub mod content;
pub mod diagnostics;
pub mod errors;
pub mod generator;
pub mod output;
pub mod patterns;
pub mod redact;
pub mod tokens;
pub mod tree;
pub mod walker;

// Re-export key types at crate root for convenience
pub use cancel::CancellationToken;
pub use config::{ConfigError, DigestConfig, IncludeTree, OutputFormatKind, TokenConfig};
pub use content::{ContentError, ContentProcessor, FileContent};
pub use diagnostics::{CollectingDiagnostics, Diagnostics, LogDiagnostics, Warning};
pub use errors::DigestError;
pub use generator::{DigestGenerator, DigestResult};
pub use output::{formatter_for, OutputFormatter};
pub use patterns::PatternMatcher;
pub use redact::{NoopRedactor, Redactor, SecretRedactor};
pub use tokens::{TokenAnalyzer, TokenModel};
pub use tree::{FileNode, NodeKind, TreeBuilder, TreeMode};
pub use walker::{build_matcher, collect_nodes, collect_nodes_with, WalkError, WalkOptions};
