//! File nodes and tree rendering.
//!
//! [`FileNode`] is the flat, immutable record produced by the tree walk.
//! [`TreeBuilder`] folds a list of nodes into a hierarchy and renders it
//! with box-drawing characters, either in full or pruned to the selection.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// The type of a filesystem node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Dir,
}

/// A file or directory selected for (or visible in) a digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNode {
    /// Absolute path on disk.
    pub path: PathBuf,
    /// Posix-style path relative to the workspace root.
    pub rel_path: String,
    /// Lowercase extension without the dot, or empty.
    pub ext: String,
    pub is_binary: bool,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub is_selected: bool,
    /// Number of ancestors below the root (top-level entries are 0).
    pub depth: usize,
}

impl FileNode {
    /// Create a file node under `root`.
    pub fn file(root: &Path, rel_path: &str, is_selected: bool) -> Self {
        Self::new(root, rel_path, NodeKind::File, is_selected)
    }

    /// Create a directory node under `root`.
    pub fn dir(root: &Path, rel_path: &str) -> Self {
        Self::new(root, rel_path, NodeKind::Dir, false)
    }

    fn new(root: &Path, rel_path: &str, kind: NodeKind, is_selected: bool) -> Self {
        let rel_path = rel_path.replace('\\', "/").trim_matches('/').to_string();
        let name = rel_path.rsplit('/').next().unwrap_or_default().to_string();
        let ext = match kind {
            NodeKind::File => Path::new(&name)
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_lowercase())
                .unwrap_or_default(),
            NodeKind::Dir => String::new(),
        };
        let depth = rel_path.matches('/').count();

        Self {
            path: root.join(&rel_path),
            ext,
            is_binary: false,
            name,
            kind,
            is_selected,
            depth,
            rel_path,
        }
    }

    /// Mark this node as binary.
    pub fn binary(mut self, is_binary: bool) -> Self {
        self.is_binary = is_binary;
        self
    }

    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Dir
    }
}

/// Which nodes a rendered tree shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeMode {
    /// Every node.
    Full,
    /// Selected files and their ancestors only.
    Minimal,
}

#[derive(Debug, Default)]
struct TreeNode {
    name: String,
    is_dir: bool,
    children: Vec<TreeNode>,
    index: HashMap<String, usize>,
}

impl TreeNode {
    fn insert(&mut self, components: &[&str], is_dir: bool) {
        let Some((first, rest)) = components.split_first() else {
            return;
        };
        let child_is_dir = is_dir || !rest.is_empty();

        let idx = match self.index.get(*first) {
            Some(&idx) => idx,
            None => {
                self.children.push(TreeNode {
                    name: first.to_string(),
                    ..Default::default()
                });
                let idx = self.children.len() - 1;
                self.index.insert(first.to_string(), idx);
                idx
            }
        };

        let child = &mut self.children[idx];
        child.is_dir |= child_is_dir;
        child.insert(rest, is_dir);
    }

    /// Sort children: directories first, then alphabetically.
    fn sort_children(&mut self) {
        self.children.sort_by(|a, b| match (a.is_dir, b.is_dir) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => a
                .name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.name.cmp(&b.name)),
        });
        self.index.clear();

        for child in &mut self.children {
            child.sort_children();
        }
    }
}

/// Box-drawing characters for tree rendering.
const BRANCH: &str = "├── ";
const LAST_BRANCH: &str = "└── ";
const VERTICAL: &str = "│   ";
const SPACE: &str = "    ";

fn render_node(lines: &mut Vec<String>, node: &TreeNode, prefix: &str, is_last: bool) {
    let branch = if is_last { LAST_BRANCH } else { BRANCH };
    let mut line = String::with_capacity(prefix.len() + branch.len() + node.name.len() + 1);
    line.push_str(prefix);
    line.push_str(branch);
    line.push_str(&node.name);
    if node.is_dir {
        line.push('/');
    }
    lines.push(line);

    let continuation = if is_last { SPACE } else { VERTICAL };
    let child_prefix = format!("{}{}", prefix, continuation);
    let child_count = node.children.len();
    for (i, child) in node.children.iter().enumerate() {
        render_node(lines, child, &child_prefix, i == child_count - 1);
    }
}

/// Result of rendering, with truncation bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTree {
    pub text: String,
    /// Lines before truncation.
    pub total_lines: usize,
    /// Lines in `text`, including any elision marker.
    pub shown_lines: usize,
}

impl RenderedTree {
    pub fn truncated(&self) -> bool {
        self.shown_lines < self.total_lines
    }
}

/// Renders file lists as ASCII trees.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use repodigest::tree::{FileNode, TreeBuilder, TreeMode};
///
/// let root = Path::new("/project");
/// let files = vec![
///     FileNode::file(root, "src/main.rs", true),
///     FileNode::file(root, "README.md", false),
/// ];
/// let tree = TreeBuilder::new().build(&files, TreeMode::Full);
/// assert_eq!(tree, "├── src/\n│   └── main.rs\n└── README.md");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeBuilder {
    max_selected_lines: Option<usize>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Line cap applied in [`TreeMode::Minimal`].
    pub fn max_selected_lines(mut self, max: Option<usize>) -> Self {
        self.max_selected_lines = max;
        self
    }

    /// Render the tree. An empty selection renders as `""`.
    pub fn build(&self, files: &[FileNode], mode: TreeMode) -> String {
        self.render(files, mode).text
    }

    /// Render the tree and report whether it was truncated.
    pub fn render(&self, files: &[FileNode], mode: TreeMode) -> RenderedTree {
        let mut root = TreeNode::default();
        for node in files {
            let wanted = match mode {
                TreeMode::Full => true,
                TreeMode::Minimal => node.is_file() && node.is_selected,
            };
            if !wanted {
                continue;
            }
            let components: Vec<&str> = node
                .rel_path
                .split('/')
                .filter(|c| !c.is_empty() && *c != ".")
                .collect();
            root.insert(&components, node.is_dir());
        }
        root.sort_children();

        let mut lines = Vec::new();
        let child_count = root.children.len();
        for (i, child) in root.children.iter().enumerate() {
            render_node(&mut lines, child, "", i == child_count - 1);
        }

        let total_lines = lines.len();
        if mode == TreeMode::Minimal {
            if let Some(max) = self.max_selected_lines {
                truncate_lines(&mut lines, max);
            }
        }

        RenderedTree {
            shown_lines: lines.len(),
            text: lines.join("\n"),
            total_lines,
        }
    }
}

/// Keep at most `max` lines, the last of which becomes an elision marker.
fn truncate_lines(lines: &mut Vec<String>, max: usize) {
    if lines.len() <= max {
        return;
    }
    if max == 0 {
        lines.clear();
        return;
    }
    let hidden = lines.len() - (max - 1);
    lines.truncate(max - 1);
    lines.push(format!("… ({} more lines)", hidden));
}
