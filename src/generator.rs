//! Digest assembly.
//!
//! [`DigestGenerator`] renders the tree, reads and redacts each selected
//! file on a bounded worker pool, formats sections in selection order,
//! packs them into token-budgeted chunks and joins the chunks.
//!
//! The rendered tree always reaches the consumer: if anything after
//! assembly (an aggressive redactor sweeping whole chunks, say) removes it
//! from the first chunk, it is put back at the head.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;

use crate::cancel::CancellationToken;
use crate::config::{DigestConfig, IncludeTree, OutputFormatKind};
use crate::content::{
    BinaryDetector, ContentError, ContentProcessor, ContentSniffer, EitherDetector,
    ExtensionDetector,
};
use crate::diagnostics::{Diagnostics, LogDiagnostics, Warning};
use crate::errors::DigestError;
use crate::output::{formatter_for, OutputFormatter, Placeholder};
use crate::redact::{Redactor, SecretRedactor};
use crate::tokens::TokenAnalyzer;
use crate::tree::{FileNode, TreeBuilder, TreeMode};

/// Glue between sections inside one chunk.
pub const SECTION_SEPARATOR: &str = "\n";

/// Output of one [`DigestGenerator::generate`] call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DigestResult {
    /// Rendered tree, when enabled and non-empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tree: Option<String>,
    /// All chunks joined with the configured separator.
    pub content: String,
    pub chunks: Vec<String>,
}

/// Builds digests for a workspace root.
///
/// # Examples
///
/// ```no_run
/// use repodigest::config::DigestConfig;
/// use repodigest::generator::DigestGenerator;
/// use repodigest::walker::{collect_nodes, WalkOptions};
///
/// let files = collect_nodes("./project".as_ref(), &WalkOptions::default()).unwrap();
/// let result = DigestGenerator::new("./project")
///     .generate_from_config(&files, &DigestConfig::default())
///     .unwrap();
/// println!("{} chunks", result.chunks.len());
/// ```
pub struct DigestGenerator {
    root: PathBuf,
    redactor: Arc<dyn Redactor>,
    detector: Arc<dyn BinaryDetector>,
    diagnostics: Arc<dyn Diagnostics>,
    cancel: CancellationToken,
    tokens: TokenAnalyzer,
}

impl DigestGenerator {
    /// Create a generator with the default secret redactor and log sink.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            redactor: Arc::new(SecretRedactor::new()),
            detector: Arc::new(EitherDetector(ExtensionDetector, ContentSniffer::default())),
            diagnostics: Arc::new(LogDiagnostics),
            cancel: CancellationToken::new(),
            tokens: TokenAnalyzer::new(),
        }
    }

    pub fn redactor(mut self, redactor: Arc<dyn Redactor>) -> Self {
        self.redactor = redactor;
        self
    }

    pub fn binary_detector(mut self, detector: Arc<dyn BinaryDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Token checked before every file; cancelling it aborts `generate`.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Generate using `config.output_format` and no extra sections.
    pub fn generate_from_config(
        &self,
        files: &[FileNode],
        config: &DigestConfig,
    ) -> Result<DigestResult, DigestError> {
        self.generate(files, config, &[], config.output_format)
    }

    /// Build a digest for the selected files.
    ///
    /// `extra_sections` are appended verbatim after the file sections.
    /// Only a missing root and cancellation are errors; per-file failures
    /// become placeholder sections plus a warning.
    pub fn generate(
        &self,
        files: &[FileNode],
        config: &DigestConfig,
        extra_sections: &[String],
        format_kind: OutputFormatKind,
    ) -> Result<DigestResult, DigestError> {
        config.validate()?;
        if !self.root.is_dir() {
            return Err(DigestError::RootNotFound(self.root.clone()));
        }
        self.check_cancelled()?;

        let formatter = formatter_for(format_kind);
        let tree = self.render_tree(files, config);

        let file_sections = self.file_sections(files, config, formatter.as_ref())?;

        let mut sections = Vec::with_capacity(file_sections.len() + extra_sections.len() + 1);
        if let Some(tree) = &tree {
            sections.push(formatter.tree_section(tree));
        }
        sections.extend(file_sections);
        sections.extend(extra_sections.iter().cloned());

        let mut chunks = self.partition(sections, config);

        if config.redact_assembled {
            let processor = self.processor(config);
            let label = Path::new("<assembled digest>");
            chunks = chunks
                .into_iter()
                .map(|chunk| processor.redact_or_original(label, &chunk).content)
                .collect();
        }

        if let Some(tree) = &tree {
            ensure_tree(&mut chunks, tree, formatter.as_ref());
        }

        // Content is derived from the guarded chunks, so it carries the
        // tree whenever chunks[0] does.
        let content = formatter.finalize(&chunks, config);

        log::debug!(
            "digest: {} chunks, {} bytes, tree: {}",
            chunks.len(),
            content.len(),
            tree.is_some()
        );

        Ok(DigestResult {
            tree,
            content,
            chunks,
        })
    }

    fn check_cancelled(&self) -> Result<(), DigestError> {
        if self.cancel.is_cancelled() {
            Err(DigestError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn processor(&self, config: &DigestConfig) -> ContentProcessor {
        ContentProcessor::new(self.redactor.clone())
            .with_detector(self.detector.clone())
            .with_diagnostics(self.diagnostics.clone())
            .with_max_file_bytes(config.max_file_bytes)
    }

    fn render_tree(&self, files: &[FileNode], config: &DigestConfig) -> Option<String> {
        let mode = match config.include_tree {
            IncludeTree::None => return None,
            IncludeTree::Full => TreeMode::Full,
            IncludeTree::Minimal => TreeMode::Minimal,
        };

        let rendered = TreeBuilder::new()
            .max_selected_lines(config.max_selected_tree_lines)
            .render(files, mode);
        if rendered.truncated() {
            self.diagnostics.warn(Warning::TreeTruncated {
                shown: rendered.shown_lines,
                total: rendered.total_lines,
            });
        }

        if rendered.text.is_empty() {
            None
        } else {
            Some(rendered.text)
        }
    }

    /// Format every selected file, in selection order.
    fn file_sections(
        &self,
        files: &[FileNode],
        config: &DigestConfig,
        formatter: &dyn OutputFormatter,
    ) -> Result<Vec<String>, DigestError> {
        let selected: Vec<&FileNode> = files
            .iter()
            .filter(|node| node.is_file() && node.is_selected)
            .collect();
        if selected.is_empty() {
            return Ok(Vec::new());
        }

        let processor = self.processor(config);
        let workers = config.max_concurrency.min(selected.len()).max(1);
        let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build()?;

        // Indexed collect keeps selection order regardless of completion order.
        let sections = pool.install(|| {
            selected
                .par_iter()
                .map(|node| -> Result<String, DigestError> {
                    self.check_cancelled()?;
                    Ok(self.file_section(&processor, formatter, node))
                })
                .collect::<Result<Vec<String>, DigestError>>()
        })?;

        self.check_cancelled()?;
        Ok(sections)
    }

    fn file_section(
        &self,
        processor: &ContentProcessor,
        formatter: &dyn OutputFormatter,
        node: &FileNode,
    ) -> String {
        if node.is_binary {
            return formatter.placeholder_section(node, Placeholder::Binary);
        }

        match processor.get_file_content(&node.path) {
            Ok(content) if content.is_binary => {
                formatter.placeholder_section(node, Placeholder::Binary)
            }
            Ok(content) => formatter.file_section(node, &content.content),
            Err(ContentError::TooLarge { path, size, limit }) => {
                self.diagnostics
                    .warn(Warning::FileTooLarge { path, size, limit });
                formatter.placeholder_section(node, Placeholder::TooLarge { size })
            }
            Err(e) => {
                self.diagnostics.warn(Warning::UnreadableFile {
                    path: node.path.clone(),
                    reason: e.to_string(),
                });
                formatter.placeholder_section(node, Placeholder::Unreadable)
            }
        }
    }

    /// Greedily pack sections into chunks that fit the token budget.
    ///
    /// A section larger than the budget becomes a chunk of its own.
    fn partition(&self, sections: Vec<String>, config: &DigestConfig) -> Vec<String> {
        let Some(budget) = config.chunk_budget() else {
            if sections.is_empty() {
                return Vec::new();
            }
            return vec![sections.join(SECTION_SEPARATOR)];
        };
        let model = config.model();

        let mut chunks = Vec::new();
        let mut current: Option<String> = None;
        for section in sections {
            current = match current.take() {
                None => Some(section),
                Some(chunk) => {
                    let candidate_len = chunk.len() + SECTION_SEPARATOR.len() + section.len();
                    let mut candidate = String::with_capacity(candidate_len);
                    candidate.push_str(&chunk);
                    candidate.push_str(SECTION_SEPARATOR);
                    candidate.push_str(&section);

                    if self.tokens.estimate(&candidate, model) <= budget {
                        Some(candidate)
                    } else {
                        log::debug!("chunk {} closed at {} bytes", chunks.len(), chunk.len());
                        chunks.push(chunk);
                        Some(section)
                    }
                }
            };
        }
        chunks.extend(current);
        chunks
    }
}

/// Put the tree back at the head of the first chunk if it went missing.
fn ensure_tree(chunks: &mut Vec<String>, tree: &str, formatter: &dyn OutputFormatter) {
    if chunks.first().is_some_and(|first| first.contains(tree)) {
        return;
    }

    log::warn!("file tree missing from assembled digest; re-inserting it");
    let block = formatter.tree_section(tree);
    match chunks.first_mut() {
        Some(first) => {
            let mut restored = String::with_capacity(block.len() + SECTION_SEPARATOR.len() + first.len());
            restored.push_str(&block);
            restored.push_str(SECTION_SEPARATOR);
            restored.push_str(first);
            *first = restored;
        }
        None => chunks.push(block),
    }
}
