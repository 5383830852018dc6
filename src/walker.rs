//! Directory traversal producing [`FileNode`]s.
//!
//! Ignore files (`.gitignore`, `.digestignore`) are evaluated by this
//! crate's own [`PatternMatcher`], one scope per directory, rather than by
//! the `ignore` crate's filters; the `ignore` crate only does the walking.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use glob::Pattern;
use ignore::WalkBuilder;
use thiserror::Error;

use crate::content::is_binary_extension;
use crate::diagnostics::{Diagnostics, LogDiagnostics, Warning};
use crate::patterns::PatternMatcher;
use crate::tree::FileNode;

/// Ignore file names honoured by default, in precedence order.
pub const DEFAULT_IGNORE_FILES: &[&str] = &[".gitignore", ".digestignore"];

/// Errors that can occur during directory walking.
#[derive(Debug, Error)]
pub enum WalkError {
    #[error("path not found: {path}")]
    NotFound { path: PathBuf },

    #[error("not a directory: {path}")]
    NotADirectory { path: PathBuf },

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid selection pattern: {pattern}")]
    InvalidSelect { pattern: String },
}

/// Options for directory walking.
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Maximum depth to recurse (None = unlimited).
    pub max_depth: Option<usize>,
    /// Follow symbolic links.
    pub follow_symlinks: bool,
    /// Include hidden files and directories.
    pub include_hidden: bool,
    /// Ignore file names to load from every directory.
    pub ignore_files: Vec<String>,
    /// Extra root-scoped ignore lines, applied after all ignore files.
    pub exclude: Vec<String>,
    /// Glob patterns selecting files for content inclusion.
    /// Empty selects every file.
    pub select: Vec<String>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            max_depth: None,
            follow_symlinks: false,
            include_hidden: false,
            ignore_files: DEFAULT_IGNORE_FILES.iter().map(|s| s.to_string()).collect(),
            exclude: Vec::new(),
            select: Vec::new(),
        }
    }
}

impl WalkOptions {
    /// Create options that include hidden files.
    pub fn with_hidden() -> Self {
        Self {
            include_hidden: true,
            ..Default::default()
        }
    }

    /// Set maximum depth.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Restrict content selection to files matching these globs.
    pub fn select<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = patterns.into_iter().map(Into::into).collect();
        self
    }
}

/// Posix-style path of `path` relative to `root`.
fn rel_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

fn check_root(root: &Path) -> Result<(), WalkError> {
    if !root.exists() {
        return Err(WalkError::NotFound {
            path: root.to_path_buf(),
        });
    }
    if !root.is_dir() {
        return Err(WalkError::NotADirectory {
            path: root.to_path_buf(),
        });
    }
    Ok(())
}

/// Load every ignore file under `root` into a fresh matcher.
///
/// Directories are visited breadth-first, so each directory is tested
/// against all of its ancestors' rules before its own ignore files are
/// read. Ignore files inside an ignored directory are never loaded, and
/// the ignored directory is not descended into. Symlinked directories are
/// not followed here.
pub fn build_matcher(
    root: &Path,
    options: &WalkOptions,
    diagnostics: &dyn Diagnostics,
) -> Result<PatternMatcher, WalkError> {
    check_root(root)?;

    let mut matcher = PatternMatcher::new();
    let mut queue: VecDeque<(PathBuf, usize)> = VecDeque::from([(root.to_path_buf(), 0)]);

    while let Some((dir, depth)) = queue.pop_front() {
        // Ignore files in `dir` sit one level deeper than `dir` itself.
        if options.max_depth.is_some_and(|max| depth >= max) {
            continue;
        }
        let base = rel_path(root, &dir).unwrap_or_default();

        let mut ignore_files: Vec<(usize, PathBuf)> = Vec::new();
        let mut subdirs: Vec<PathBuf> = Vec::new();

        let mut listing = WalkBuilder::new(&dir);
        listing
            .standard_filters(false)
            .max_depth(Some(1))
            .sort_by_file_name(|a, b| a.cmp(b));
        for entry in listing.build().filter_map(|r| r.ok()) {
            if entry.depth() != 1 {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            match entry.file_type() {
                Some(ft) if ft.is_dir() && name != ".git" => subdirs.push(entry.into_path()),
                Some(ft) if ft.is_file() => {
                    if let Some(rank) = options.ignore_files.iter().position(|f| *f == name) {
                        ignore_files.push((rank, entry.into_path()));
                    }
                }
                _ => {}
            }
        }

        ignore_files.sort();
        for (_, path) in ignore_files {
            load_ignore_file(&mut matcher, &base, &path, diagnostics);
        }

        for sub in subdirs {
            match rel_path(root, &sub) {
                Some(rel) if !matcher.is_path_ignored(&rel, true) => {
                    queue.push_back((sub, depth + 1));
                }
                _ => log::debug!("not reading ignore files below {}", sub.display()),
            }
        }
    }

    if !options.exclude.is_empty() {
        let report = matcher.add_ignore_file("", options.exclude.iter());
        report_malformed("", report.malformed, diagnostics);
    }

    Ok(matcher)
}

fn load_ignore_file(
    matcher: &mut PatternMatcher,
    base: &str,
    path: &Path,
    diagnostics: &dyn Diagnostics,
) {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            diagnostics.warn(Warning::UnreadableFile {
                path: path.to_path_buf(),
                reason: e.to_string(),
            });
            return;
        }
    };
    let report = matcher.add_ignore_file(base, text.lines());
    report_malformed(base, report.malformed, diagnostics);
}

fn report_malformed(base: &str, lines: Vec<String>, diagnostics: &dyn Diagnostics) {
    for line in lines {
        diagnostics.warn(Warning::IgnorePatternSkipped {
            base_dir: base.to_string(),
            line,
        });
    }
}

fn compile_selection(patterns: &[String]) -> Result<Vec<Pattern>, WalkError> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p.trim_end_matches('/')).map_err(|_| WalkError::InvalidSelect {
                pattern: p.clone(),
            })
        })
        .collect()
}

/// A file is selected if a pattern matches it or one of its ancestors.
fn is_selected(selection: &[Pattern], rel: &str) -> bool {
    if selection.is_empty() {
        return true;
    }
    let mut candidate = rel;
    loop {
        if selection.iter().any(|p| p.matches(candidate)) {
            return true;
        }
        match candidate.rfind('/') {
            Some(idx) => candidate = &candidate[..idx],
            None => return false,
        }
    }
}

/// Walk `root` and return every non-ignored node in sorted walk order.
///
/// # Examples
///
/// ```no_run
/// use repodigest::walker::{collect_nodes, WalkOptions};
/// use std::path::Path;
///
/// let nodes = collect_nodes(Path::new("."), &WalkOptions::default().select(["src"])).unwrap();
/// for node in nodes.iter().filter(|n| n.is_selected) {
///     println!("{}", node.rel_path);
/// }
/// ```
pub fn collect_nodes(root: &Path, options: &WalkOptions) -> Result<Vec<FileNode>, WalkError> {
    collect_nodes_with(root, options, &LogDiagnostics)
}

/// Like [`collect_nodes`], reporting skipped ignore patterns and unreadable
/// ignore files to `diagnostics`.
pub fn collect_nodes_with(
    root: &Path,
    options: &WalkOptions,
    diagnostics: &dyn Diagnostics,
) -> Result<Vec<FileNode>, WalkError> {
    let selection = compile_selection(&options.select)?;
    let matcher = build_matcher(root, options, diagnostics)?;
    collect_nodes_with_matcher(root, options, &selection, Arc::new(matcher))
}

fn collect_nodes_with_matcher(
    root: &Path,
    options: &WalkOptions,
    selection: &[Pattern],
    matcher: Arc<PatternMatcher>,
) -> Result<Vec<FileNode>, WalkError> {
    // A negation could re-include something below an ignored directory,
    // so directories are only pruned when there are none.
    let prune = !matcher.has_negations();
    let filter_matcher = Arc::clone(&matcher);
    let filter_root = root.to_path_buf();

    let mut builder = WalkBuilder::new(root);
    builder
        .standard_filters(false)
        .hidden(!options.include_hidden)
        .follow_links(options.follow_symlinks)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(move |entry| {
            if entry.file_name() == ".git" {
                return false;
            }
            if !prune || !entry.file_type().is_some_and(|ft| ft.is_dir()) {
                return true;
            }
            match rel_path(&filter_root, entry.path()) {
                Some(rel) if !rel.is_empty() => !filter_matcher.is_path_ignored(&rel, true),
                _ => true,
            }
        });
    if let Some(depth) = options.max_depth {
        builder.max_depth(Some(depth));
    }

    let mut nodes = Vec::new();
    for result in builder.build() {
        let entry = match result {
            Ok(entry) => entry,
            Err(ignore::Error::Io(source)) if source.kind() == std::io::ErrorKind::NotFound => {
                return Err(WalkError::NotFound {
                    path: root.to_path_buf(),
                });
            }
            Err(e) => {
                log::warn!("skipping entry during walk: {}", e);
                continue;
            }
        };
        if entry.depth() == 0 {
            continue;
        }

        let Some(rel) = rel_path(root, entry.path()) else {
            continue;
        };
        let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
        if matcher.is_path_ignored(&rel, is_dir) {
            continue;
        }

        let node = if is_dir {
            FileNode::dir(root, &rel)
        } else {
            let node = FileNode::file(root, &rel, is_selected(selection, &rel));
            let binary = is_binary_extension(&node.ext);
            node.binary(binary)
        };
        nodes.push(node);
    }

    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingDiagnostics;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_dir() -> TempDir {
        let dir = TempDir::new().unwrap();

        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/main.rs"), "fn main() {}").unwrap();
        fs::write(dir.path().join("src/lib.rs"), "pub fn hello() {}").unwrap();
        fs::write(dir.path().join("Cargo.toml"), "[package]").unwrap();

        dir
    }

    fn rels(nodes: &[FileNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.rel_path.as_str()).collect()
    }

    #[test]
    fn test_collect_basic() {
        let dir = create_test_dir();
        let nodes = collect_nodes(dir.path(), &WalkOptions::default()).unwrap();

        assert_eq!(rels(&nodes), vec!["Cargo.toml", "src", "src/lib.rs", "src/main.rs"]);
        assert!(nodes.iter().filter(|n| n.is_file()).all(|n| n.is_selected));
        assert!(nodes[1].is_dir());
        assert_eq!(nodes[2].depth, 1);
    }

    #[test]
    fn test_collect_nonexistent() {
        let err = collect_nodes(Path::new("/nonexistent/path"), &WalkOptions::default())
            .unwrap_err();
        assert!(matches!(err, WalkError::NotFound { .. }));
    }

    #[test]
    fn test_collect_file_root() {
        let dir = create_test_dir();
        let err = collect_nodes(&dir.path().join("Cargo.toml"), &WalkOptions::default())
            .unwrap_err();
        assert!(matches!(err, WalkError::NotADirectory { .. }));
    }

    #[test]
    fn test_respects_gitignore() {
        let dir = create_test_dir();
        fs::write(dir.path().join("debug.log"), "noise").unwrap();
        fs::create_dir_all(dir.path().join("target/debug")).unwrap();
        fs::write(dir.path().join("target/debug/app"), "bin").unwrap();
        fs::write(dir.path().join(".gitignore"), "*.log\n/target\n").unwrap();

        let nodes = collect_nodes(dir.path(), &WalkOptions::default()).unwrap();
        let paths = rels(&nodes);
        assert!(!paths.contains(&"debug.log"));
        assert!(!paths.iter().any(|p| p.starts_with("target")));
        assert!(paths.contains(&"src/main.rs"));
    }

    #[test]
    fn test_nested_ignore_scopes() {
        let dir = create_test_dir();
        fs::write(dir.path().join(".digestignore"), "*.gen.rs\n").unwrap();
        fs::write(dir.path().join("src/.digestignore"), "!keep.gen.rs\n").unwrap();
        fs::write(dir.path().join("src/keep.gen.rs"), "").unwrap();
        fs::write(dir.path().join("src/drop.gen.rs"), "").unwrap();
        fs::write(dir.path().join("top.gen.rs"), "").unwrap();

        let nodes = collect_nodes(dir.path(), &WalkOptions::with_hidden()).unwrap();
        let paths = rels(&nodes);
        assert!(paths.contains(&"src/keep.gen.rs"));
        assert!(!paths.contains(&"src/drop.gen.rs"));
        assert!(!paths.contains(&"top.gen.rs"));
    }

    #[test]
    fn test_negation_disables_pruning() {
        let dir = create_test_dir();
        fs::create_dir_all(dir.path().join("build")).unwrap();
        fs::write(dir.path().join("build/skip.js"), "").unwrap();
        fs::write(dir.path().join("build/keep.js"), "").unwrap();
        fs::write(dir.path().join(".gitignore"), "build/\n!build/keep.js\n").unwrap();

        let nodes = collect_nodes(dir.path(), &WalkOptions::default()).unwrap();
        let paths = rels(&nodes);
        assert!(paths.contains(&"build/keep.js"));
        assert!(!paths.contains(&"build/skip.js"));
        assert!(!paths.contains(&"build"));
    }

    #[test]
    fn test_ignore_files_inside_ignored_dirs_are_not_loaded() {
        let dir = create_test_dir();
        fs::write(dir.path().join(".gitignore"), "node_modules/\n").unwrap();
        fs::create_dir_all(dir.path().join("node_modules/pkg/dist")).unwrap();
        fs::write(dir.path().join("node_modules/pkg/.gitignore"), "!dist/\n").unwrap();
        fs::write(dir.path().join("node_modules/pkg/dist/index.js"), "x").unwrap();

        let matcher = build_matcher(dir.path(), &WalkOptions::default(), &LogDiagnostics).unwrap();
        assert_eq!(matcher.rules().len(), 1);
        assert!(!matcher.has_negations());

        let nodes = collect_nodes(dir.path(), &WalkOptions::default()).unwrap();
        assert!(!rels(&nodes).iter().any(|p| p.starts_with("node_modules")));
        assert!(rels(&nodes).contains(&"src/main.rs"));
    }

    #[test]
    fn test_malformed_ignore_lines_reach_diagnostics() {
        let dir = create_test_dir();
        fs::write(dir.path().join("src/.digestignore"), "[z-a\n*.tmp\n").unwrap();

        let diagnostics = CollectingDiagnostics::new();
        let options = WalkOptions {
            exclude: vec!["/".to_string()],
            ..Default::default()
        };
        collect_nodes_with(dir.path(), &options, &diagnostics).unwrap();

        assert_eq!(
            diagnostics.warnings(),
            vec![
                Warning::IgnorePatternSkipped {
                    base_dir: "src".to_string(),
                    line: "[z-a".to_string(),
                },
                Warning::IgnorePatternSkipped {
                    base_dir: String::new(),
                    line: "/".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_hidden_files() {
        let dir = create_test_dir();
        fs::write(dir.path().join(".env"), "X=1").unwrap();

        let nodes = collect_nodes(dir.path(), &WalkOptions::default()).unwrap();
        assert!(!rels(&nodes).contains(&".env"));

        let nodes = collect_nodes(dir.path(), &WalkOptions::with_hidden()).unwrap();
        assert!(rels(&nodes).contains(&".env"));
    }

    #[test]
    fn test_git_dir_never_walked() {
        let dir = create_test_dir();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git/HEAD"), "ref").unwrap();

        let nodes = collect_nodes(dir.path(), &WalkOptions::with_hidden()).unwrap();
        assert!(!rels(&nodes).iter().any(|p| p.starts_with(".git/") || *p == ".git"));
    }

    #[test]
    fn test_selection() {
        let dir = create_test_dir();
        let nodes = collect_nodes(dir.path(), &WalkOptions::default().select(["src"])).unwrap();
        let selected: Vec<_> = nodes
            .iter()
            .filter(|n| n.is_selected)
            .map(|n| n.rel_path.as_str())
            .collect();
        assert_eq!(selected, vec!["src/lib.rs", "src/main.rs"]);

        let nodes = collect_nodes(dir.path(), &WalkOptions::default().select(["*.toml"])).unwrap();
        let selected: Vec<_> = nodes.iter().filter(|n| n.is_selected).collect();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].name, "Cargo.toml");
    }

    #[test]
    fn test_invalid_selection() {
        let dir = create_test_dir();
        let err = collect_nodes(dir.path(), &WalkOptions::default().select(["[z-a"])).unwrap_err();
        assert!(matches!(err, WalkError::InvalidSelect { .. }));
    }

    #[test]
    fn test_binary_extension_flag() {
        let dir = create_test_dir();
        fs::write(dir.path().join("logo.PNG"), "x").unwrap();
        let nodes = collect_nodes(dir.path(), &WalkOptions::default()).unwrap();
        let logo = nodes.iter().find(|n| n.name == "logo.PNG").unwrap();
        assert!(logo.is_binary);
    }

    #[test]
    fn test_extra_excludes() {
        let dir = create_test_dir();
        let options = WalkOptions {
            exclude: vec!["Cargo.toml".to_string()],
            ..Default::default()
        };
        let nodes = collect_nodes(dir.path(), &options).unwrap();
        assert!(!rels(&nodes).contains(&"Cargo.toml"));
    }

    #[test]
    fn test_max_depth() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("a/b/c")).unwrap();
        fs::write(dir.path().join("a/b/c/deep.rs"), "").unwrap();
        fs::write(dir.path().join("a/shallow.rs"), "").unwrap();

        let nodes = collect_nodes(dir.path(), &WalkOptions::default().max_depth(2)).unwrap();
        let paths = rels(&nodes);
        assert!(paths.contains(&"a/shallow.rs"));
        assert!(!paths.contains(&"a/b/c/deep.rs"));
    }
}
