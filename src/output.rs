//! Section templates and chunk joining.
//!
//! Each [`OutputFormatter`] defines how the tree and per-file sections are
//! written. Joining chunks is format-independent: see [`finalize`].

use crate::config::{DigestConfig, OutputFormatKind};
use crate::tree::FileNode;

/// Join chunks with the configured separator, verbatim and in order.
///
/// # Examples
///
/// ```
/// use repodigest::config::DigestConfig;
/// use repodigest::output::finalize;
///
/// let config = DigestConfig {
///     output_separators_header: "\n---\n".to_string(),
///     ..Default::default()
/// };
/// let chunks = vec!["a".to_string(), "b".to_string()];
/// assert_eq!(finalize(&chunks, &config), "a\n---\nb");
/// ```
pub fn finalize(chunks: &[String], config: &DigestConfig) -> String {
    chunks.join(&config.output_separators_header)
}

/// Why a file contributes a placeholder instead of its body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    Binary,
    TooLarge { size: u64 },
    Unreadable,
}

impl Placeholder {
    fn note(&self) -> String {
        match self {
            Placeholder::Binary => "binary file omitted".to_string(),
            Placeholder::TooLarge { size } => format!("file too large to include ({} bytes)", size),
            Placeholder::Unreadable => "file could not be read".to_string(),
        }
    }
}

/// Section syntax for one output flavour.
pub trait OutputFormatter: Send + Sync {
    fn kind(&self) -> OutputFormatKind;

    /// The tree block that opens a digest.
    fn tree_section(&self, tree: &str) -> String;

    /// A text file with its body.
    fn file_section(&self, node: &FileNode, content: &str) -> String;

    /// A file whose body is left out.
    fn placeholder_section(&self, node: &FileNode, reason: Placeholder) -> String;

    fn finalize(&self, chunks: &[String], config: &DigestConfig) -> String {
        finalize(chunks, config)
    }
}

/// Formatter for the given kind.
pub fn formatter_for(kind: OutputFormatKind) -> Box<dyn OutputFormatter> {
    match kind {
        OutputFormatKind::Markdown => Box::new(MarkdownFormatter),
        OutputFormatKind::Text => Box::new(TextFormatter),
    }
}

// ============================================================================
// Markdown
// ============================================================================

/// `## File: path` headings with fenced bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownFormatter;

/// A backtick fence longer than any backtick run inside `body`.
fn fence_for(body: &str) -> String {
    let mut longest = 0;
    let mut run = 0;
    for c in body.chars() {
        if c == '`' {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    "`".repeat((longest + 1).max(3))
}

fn language_tag(ext: &str) -> &str {
    match ext {
        "rs" => "rust",
        "py" | "pyi" => "python",
        "ts" | "tsx" => "typescript",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "md" => "markdown",
        "yml" => "yaml",
        "sh" => "bash",
        "h" => "c",
        "hpp" | "cc" => "cpp",
        other => other,
    }
}

fn push_body(out: &mut String, content: &str) {
    out.push_str(content);
    if !content.is_empty() && !content.ends_with('\n') {
        out.push('\n');
    }
}

impl OutputFormatter for MarkdownFormatter {
    fn kind(&self) -> OutputFormatKind {
        OutputFormatKind::Markdown
    }

    fn tree_section(&self, tree: &str) -> String {
        let fence = fence_for(tree);
        let mut out = String::with_capacity(tree.len() + 32);
        out.push_str("## File Tree\n\n");
        out.push_str(&fence);
        out.push('\n');
        push_body(&mut out, tree);
        out.push_str(&fence);
        out.push('\n');
        out
    }

    fn file_section(&self, node: &FileNode, content: &str) -> String {
        let fence = fence_for(content);
        let mut out = String::with_capacity(content.len() + node.rel_path.len() + 32);
        out.push_str(&format!("## File: {}\n\n", node.rel_path));
        out.push_str(&fence);
        out.push_str(language_tag(&node.ext));
        out.push('\n');
        push_body(&mut out, content);
        out.push_str(&fence);
        out.push('\n');
        out
    }

    fn placeholder_section(&self, node: &FileNode, reason: Placeholder) -> String {
        format!("## File: {}\n\n_{}_\n", node.rel_path, reason.note())
    }
}

// ============================================================================
// Text
// ============================================================================

/// `==== File: path ====` headings with plain bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextFormatter;

impl OutputFormatter for TextFormatter {
    fn kind(&self) -> OutputFormatKind {
        OutputFormatKind::Text
    }

    fn tree_section(&self, tree: &str) -> String {
        let mut out = String::with_capacity(tree.len() + 24);
        out.push_str("==== File Tree ====\n");
        push_body(&mut out, tree);
        out
    }

    fn file_section(&self, node: &FileNode, content: &str) -> String {
        let mut out = String::with_capacity(content.len() + node.rel_path.len() + 24);
        out.push_str(&format!("==== File: {} ====\n", node.rel_path));
        push_body(&mut out, content);
        out
    }

    fn placeholder_section(&self, node: &FileNode, reason: Placeholder) -> String {
        format!("==== File: {} ====\n[{}]\n", node.rel_path, reason.note())
    }
}
