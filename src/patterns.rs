//! Gitignore-style path exclusion.
//!
//! A [`PatternMatcher`] holds an ordered list of [`IgnoreRule`]s, each bound
//! to the directory whose ignore file declared it. Evaluation is
//! last-match-wins across every rule whose scope contains the path, so a
//! later `!pattern` re-includes what an earlier rule excluded.
//!
//! Supported syntax is the subset used in practice: `#` comments, `!`
//! negation, leading `/` anchoring, trailing `/` directory-only rules,
//! `*`/`?`/`[...]` wildcards within a segment and `**` across segments.

use glob::Pattern;
use smallvec::SmallVec;

type Components<'a> = SmallVec<[&'a str; 8]>;

#[derive(Debug, Clone)]
enum Segment {
    /// `**`: zero or more path components.
    AnyDepth,
    Glob(Pattern),
}

/// A single parsed ignore line.
#[derive(Debug, Clone)]
pub struct IgnoreRule {
    /// Raw line text as written in the ignore file.
    pub pattern: String,
    /// Scope root, relative to the workspace root ("" for the root itself).
    pub base_dir: String,
    pub negated: bool,
    /// Leading `/`: only matches at the top of the scope.
    pub anchored: bool,
    /// Trailing `/`: matches the directory and everything under it.
    pub directory_only: bool,
    segments: Vec<Segment>,
    base_components: Vec<String>,
}

impl IgnoreRule {
    /// Parse one ignore-file line.
    ///
    /// Returns `Ok(None)` for blank lines and comments, and `Err` with the
    /// offending line when a segment is not a valid glob.
    pub fn parse(base_dir: &str, line: &str) -> Result<Option<IgnoreRule>, String> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(None);
        }

        let mut body = trimmed;
        let negated = match body.strip_prefix('!') {
            Some(rest) => {
                body = rest;
                true
            }
            None => false,
        };
        // `\#` and `\!` escape a literal leading character.
        if let Some(rest) = body.strip_prefix('\\') {
            body = rest;
        }

        let directory_only = body.ends_with('/');
        let body = body.trim_end_matches('/');
        let anchored = body.starts_with('/');
        let body = body.trim_start_matches('/');
        if body.is_empty() {
            return Err(trimmed.to_string());
        }

        let mut segments = Vec::new();
        for part in body.split('/').filter(|s| !s.is_empty()) {
            if part == "**" {
                // Collapse runs of `**`.
                if !matches!(segments.last(), Some(Segment::AnyDepth)) {
                    segments.push(Segment::AnyDepth);
                }
                continue;
            }
            let glob = Pattern::new(part).map_err(|_| trimmed.to_string())?;
            segments.push(Segment::Glob(glob));
        }

        let base_dir = normalize(base_dir).0;
        let base_components = split(&base_dir).iter().map(|s| s.to_string()).collect();

        Ok(Some(IgnoreRule {
            pattern: trimmed.to_string(),
            base_dir,
            negated,
            anchored,
            directory_only,
            segments,
            base_components,
        }))
    }

    /// Whether this rule's pattern matches the path, ignoring negation.
    fn matches(&self, components: &[&str], is_dir: bool) -> bool {
        if components.len() < self.base_components.len()
            || components
                .iter()
                .zip(&self.base_components)
                .any(|(a, b)| *a != b.as_str())
        {
            return false;
        }
        let rel = &components[self.base_components.len()..];
        if rel.is_empty() {
            return false;
        }

        // Directory-only rules are rooted at the scope: `dist/` covers
        // `dist/...` but not `src/dist/...`.
        let starts = if self.anchored || self.directory_only {
            0..1
        } else {
            0..rel.len()
        };

        let mut ends: SmallVec<[usize; 4]> = SmallVec::new();
        for start in starts {
            ends.clear();
            match_ends(&self.segments, rel, start, &mut ends);
            let hit = ends.iter().any(|&end| {
                if end <= start {
                    return false;
                }
                if self.directory_only {
                    end < rel.len() || is_dir
                } else {
                    true
                }
            });
            if hit {
                return true;
            }
        }
        false
    }
}

/// Collect every index at which `segments` finishes matching `comps[pos..]`.
fn match_ends(segments: &[Segment], comps: &[&str], pos: usize, out: &mut SmallVec<[usize; 4]>) {
    match segments.split_first() {
        None => out.push(pos),
        Some((Segment::AnyDepth, rest)) => {
            for p in pos..=comps.len() {
                match_ends(rest, comps, p, out);
            }
        }
        Some((Segment::Glob(glob), rest)) => {
            if pos < comps.len() && glob.matches(comps[pos]) {
                match_ends(rest, comps, pos + 1, out);
            }
        }
    }
}

/// Normalize a relative path to posix form, reporting a trailing slash.
fn normalize(path: &str) -> (String, bool) {
    let posix = path.replace('\\', "/");
    let is_dir = posix.ends_with('/');
    let trimmed = posix
        .trim_start_matches("./")
        .trim_matches('/')
        .to_string();
    if trimmed == "." {
        (String::new(), is_dir)
    } else {
        (trimmed, is_dir)
    }
}

fn split(path: &str) -> Components<'_> {
    path.split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect()
}

/// Outcome of loading one ignore file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreFileReport {
    /// Number of rules appended.
    pub added: usize,
    /// Lines that could not be parsed and were skipped.
    pub malformed: Vec<String>,
}

/// Per-session ignore rule engine.
///
/// Each instance owns its rules; there is no shared storage between
/// matchers, and [`PatternMatcher::clear`] only affects `self`.
#[derive(Debug, Clone, Default)]
pub struct PatternMatcher {
    rules: Vec<IgnoreRule>,
}

impl PatternMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the rules of one ignore file, scoped to `base_dir`.
    ///
    /// `base_dir` is relative to the workspace root; `""` or `"."` is the
    /// root. Malformed lines are skipped.
    pub fn add_ignore_file<I, S>(&mut self, base_dir: &str, lines: I) -> IgnoreFileReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut report = IgnoreFileReport::default();
        for line in lines {
            match IgnoreRule::parse(base_dir, line.as_ref()) {
                Ok(Some(rule)) => {
                    self.rules.push(rule);
                    report.added += 1;
                }
                Ok(None) => {}
                Err(bad) => {
                    log::debug!("skipping malformed ignore pattern {:?} in {:?}", bad, base_dir);
                    report.malformed.push(bad);
                }
            }
        }
        report
    }

    /// Whether `rel_path` is excluded. A trailing `/` marks a directory.
    pub fn is_ignored(&self, rel_path: &str) -> bool {
        let (path, is_dir) = normalize(rel_path);
        self.is_path_ignored(&path, is_dir)
    }

    /// Whether `rel_path` is excluded, with the directory flag given explicitly.
    pub fn is_path_ignored(&self, rel_path: &str, is_dir: bool) -> bool {
        let (path, trailing) = normalize(rel_path);
        let components = split(&path);
        if components.is_empty() {
            return false;
        }
        let is_dir = is_dir || trailing;

        self.rules
            .iter()
            .rev()
            .find(|rule| rule.matches(&components, is_dir))
            .is_some_and(|rule| !rule.negated)
    }

    /// Drop every rule held by this matcher.
    pub fn clear(&mut self) {
        self.rules.clear();
    }

    pub fn rules(&self) -> &[IgnoreRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether any rule re-includes paths. Callers pruning ignored
    /// directories must not do so when this is true.
    pub fn has_negations(&self) -> bool {
        self.rules.iter().any(|r| r.negated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(lines: &[&str]) -> PatternMatcher {
        let mut m = PatternMatcher::new();
        m.add_ignore_file("", lines.iter().copied());
        m
    }

    #[test]
    fn test_anchored_pattern() {
        let m = matcher(&["/build"]);
        assert!(m.is_ignored("build/file.js"));
        assert!(m.is_ignored("build"));
        assert!(!m.is_ignored("src/build/file.js"));
    }

    #[test]
    fn test_negation_overrides() {
        let m = matcher(&["build/", "!build/keep.js"]);
        assert!(m.is_ignored("build/skip.js"));
        assert!(!m.is_ignored("build/keep.js"));
    }

    #[test]
    fn test_negation_order_matters() {
        // A later positive rule beats an earlier negation.
        let m = matcher(&["!keep.log", "*.log"]);
        assert!(m.is_ignored("keep.log"));
    }

    #[test]
    fn test_directory_only() {
        let m = matcher(&["dist/"]);
        assert!(m.is_ignored("dist/"));
        assert!(m.is_ignored("dist/file.js"));
        assert!(!m.is_ignored("src/dist/file.js"));
        // A file named `dist` is not a directory.
        assert!(!m.is_ignored("dist"));
        assert!(m.is_path_ignored("dist", true));
    }

    #[test]
    fn test_unanchored_matches_any_depth() {
        let m = matcher(&["node_modules", "*.log"]);
        assert!(m.is_ignored("node_modules/pkg/index.js"));
        assert!(m.is_ignored("web/node_modules/pkg/index.js"));
        assert!(m.is_ignored("debug.log"));
        assert!(m.is_ignored("logs/deep/app.log"));
        assert!(!m.is_ignored("src/main.rs"));
        assert!(!m.is_ignored("node_modules_backup/a.js"));
    }

    #[test]
    fn test_double_star() {
        let m = matcher(&["**/generated/**", "/docs/**/*.tmp"]);
        assert!(m.is_ignored("a/b/generated/c.rs"));
        assert!(m.is_ignored("generated/x"));
        assert!(m.is_ignored("docs/a.tmp"));
        assert!(m.is_ignored("docs/x/y/a.tmp"));
        assert!(!m.is_ignored("src/docs/a.tmp"));
    }

    #[test]
    fn test_comments_and_blanks_skipped() {
        let mut m = PatternMatcher::new();
        let report = m.add_ignore_file("", ["# comment", "", "   ", "*.o"]);
        assert_eq!(report.added, 1);
        assert!(report.malformed.is_empty());
        assert!(m.is_ignored("main.o"));
    }

    #[test]
    fn test_escaped_hash() {
        let m = matcher(&["\\#notes"]);
        assert!(m.is_ignored("#notes"));
    }

    #[test]
    fn test_malformed_line_is_skipped() {
        let mut m = PatternMatcher::new();
        let report = m.add_ignore_file("", ["[z-a", "/", "*.tmp"]);
        assert_eq!(report.added, 1);
        assert_eq!(report.malformed.len(), 2);
        assert!(m.is_ignored("x.tmp"));
    }

    #[test]
    fn test_scoped_rules() {
        let mut m = PatternMatcher::new();
        m.add_ignore_file("", ["*.log"]);
        m.add_ignore_file("web", ["/dist", "!keep.log"]);

        assert!(m.is_ignored("web/dist/app.js"));
        assert!(!m.is_ignored("dist/app.js"));
        assert!(!m.is_ignored("web/keep.log"));
        assert!(m.is_ignored("keep.log"));
        assert!(m.is_ignored("api/keep.log"));
    }

    #[test]
    fn test_no_rules_means_not_ignored() {
        let m = PatternMatcher::new();
        assert!(!m.is_ignored("anything/at/all.rs"));
        assert!(!m.is_ignored(""));
    }

    #[test]
    fn test_clear_is_instance_scoped() {
        let mut a = matcher(&["*.rs"]);
        let b = matcher(&["*.rs"]);
        a.clear();
        assert!(a.is_empty());
        assert!(!a.is_ignored("main.rs"));
        assert!(b.is_ignored("main.rs"));
    }

    #[test]
    fn test_path_normalization() {
        let m = matcher(&["/build"]);
        assert!(m.is_ignored("./build/file.js"));
        assert!(m.is_ignored("build\\file.js"));
    }

    #[test]
    fn test_has_negations() {
        assert!(!matcher(&["a"]).has_negations());
        assert!(matcher(&["a", "!b"]).has_negations());
    }
}
