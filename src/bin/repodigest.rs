//! Repodigest CLI - Pack a source tree into an LLM-ready digest.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use rayon::prelude::*;
use repodigest::config::{DigestConfig, IncludeTree, OutputFormatKind, TokenConfig};
use repodigest::content::ContentProcessor;
use repodigest::diagnostics::{CollectingDiagnostics, LogDiagnostics, Warning};
use repodigest::errors::{exit_code, DigestError};
use repodigest::generator::DigestGenerator;
use repodigest::redact::{NoopRedactor, Redactor, SecretRedactor};
use repodigest::tokens::TokenAnalyzer;
use repodigest::tree::{TreeBuilder, TreeMode};
use repodigest::walker::{build_matcher, collect_nodes, collect_nodes_with, WalkOptions};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "repodigest")]
#[command(about = "Pack a source tree into a single LLM-ready digest")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a digest of the selected files
    Digest {
        /// Root directory to scan
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Output format (overrides the config file)
        #[arg(long)]
        format: Option<FormatArg>,

        /// File tree mode (overrides the config file)
        #[arg(long)]
        tree: Option<TreeArg>,

        /// Line cap for the minimal tree
        #[arg(long)]
        max_tree_lines: Option<usize>,

        /// Select files for content inclusion (globs; default all)
        #[arg(long)]
        select: Vec<String>,

        /// Extra ignore patterns, applied after ignore files
        #[arg(long)]
        exclude: Vec<String>,

        /// Model name used for token estimates
        #[arg(long)]
        model: Option<String>,

        /// Split the digest into chunks of at most this many tokens
        #[arg(long)]
        max_tokens: Option<usize>,

        /// Separator placed between chunks (`\n` and `\t` are unescaped)
        #[arg(long)]
        separator: Option<String>,

        /// Do not redact secrets
        #[arg(long)]
        no_redact: bool,

        /// Include hidden files and directories
        #[arg(long)]
        include_hidden: bool,

        /// JSON config file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write each chunk to `digest-NNN.<ext>` in this directory
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Output the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Display the file tree
    Tree {
        /// Root directory to scan
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Show only selected files and their parents
        #[arg(long)]
        minimal: bool,

        /// Line cap for the minimal tree
        #[arg(long)]
        max_lines: Option<usize>,

        /// Select files (globs; default all)
        #[arg(long)]
        select: Vec<String>,

        /// Include hidden files and directories
        #[arg(long)]
        include_hidden: bool,

        /// Maximum directory depth
        #[arg(long)]
        max_depth: Option<usize>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Estimate tokens for selected files
    Tokens {
        /// Root directory to scan
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Model name used for token estimates
        #[arg(long, default_value = "gpt-4")]
        model: String,

        /// Select files (globs; default all)
        #[arg(long)]
        select: Vec<String>,

        /// Show per-file breakdown
        #[arg(long)]
        per_file: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Report whether paths are ignored
    CheckIgnore {
        /// Root directory holding the ignore files
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// Paths relative to the root; a trailing `/` marks a directory
        #[arg(required = true)]
        paths: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Clone, ValueEnum)]
enum FormatArg {
    Markdown,
    Text,
}

impl From<FormatArg> for OutputFormatKind {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Markdown => OutputFormatKind::Markdown,
            FormatArg::Text => OutputFormatKind::Text,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum TreeArg {
    Full,
    Minimal,
    None,
}

impl From<TreeArg> for IncludeTree {
    fn from(arg: TreeArg) -> Self {
        match arg {
            TreeArg::Full => IncludeTree::Full,
            TreeArg::Minimal => IncludeTree::Minimal,
            TreeArg::None => IncludeTree::None,
        }
    }
}

struct DigestArgs {
    path: PathBuf,
    format: Option<FormatArg>,
    tree: Option<TreeArg>,
    max_tree_lines: Option<usize>,
    select: Vec<String>,
    exclude: Vec<String>,
    model: Option<String>,
    max_tokens: Option<usize>,
    separator: Option<String>,
    no_redact: bool,
    include_hidden: bool,
    config: Option<PathBuf>,
    out_dir: Option<PathBuf>,
    json: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();
    let json_output = json_flag(&cli.command);

    let result = match cli.command {
        Commands::Digest {
            path,
            format,
            tree,
            max_tree_lines,
            select,
            exclude,
            model,
            max_tokens,
            separator,
            no_redact,
            include_hidden,
            config,
            out_dir,
            json,
        } => run_digest(DigestArgs {
            path,
            format,
            tree,
            max_tree_lines,
            select,
            exclude,
            model,
            max_tokens,
            separator,
            no_redact,
            include_hidden,
            config,
            out_dir,
            json,
        }),
        Commands::Tree {
            path,
            minimal,
            max_lines,
            select,
            include_hidden,
            max_depth,
            json,
        } => run_tree(path, minimal, max_lines, select, include_hidden, max_depth, json),
        Commands::Tokens {
            path,
            model,
            select,
            per_file,
            json,
        } => run_tokens(path, &model, select, per_file, json),
        Commands::CheckIgnore { root, paths, json } => run_check_ignore(root, paths, json),
        Commands::Completions { shell } => {
            generate(shell, &mut Cli::command(), "repodigest", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        if json_output {
            #[derive(Serialize)]
            struct ErrorOutput {
                error: String,
            }

            let payload = ErrorOutput {
                error: e.to_string(),
            };

            let json = serde_json::to_string(&payload)
                .unwrap_or_else(|_| "{\"error\":\"serialization failed\"}".to_string());
            eprintln!("{json}");
        } else {
            eprintln!("error: {}", e);
        }
        std::process::exit(exit_code(&e));
    }
}

fn json_flag(cmd: &Commands) -> bool {
    match cmd {
        Commands::Digest { json, .. } => *json,
        Commands::Tree { json, .. } => *json,
        Commands::Tokens { json, .. } => *json,
        Commands::CheckIgnore { json, .. } => *json,
        Commands::Completions { .. } => false,
    }
}

fn unescape(separator: &str) -> String {
    separator.replace("\\n", "\n").replace("\\t", "\t")
}

// --- Digest command ---

fn run_digest(args: DigestArgs) -> Result<(), DigestError> {
    if !args.path.is_dir() {
        return Err(DigestError::RootNotFound(args.path));
    }

    let mut config = match &args.config {
        Some(file) => DigestConfig::load(file)?,
        None => DigestConfig::default(),
    };
    if let Some(format) = args.format {
        config.output_format = format.into();
    }
    if let Some(tree) = args.tree {
        config.include_tree = tree.into();
    }
    if args.max_tree_lines.is_some() {
        config.max_selected_tree_lines = args.max_tree_lines;
    }
    if args.model.is_some() || args.max_tokens.is_some() {
        let mut token = config.token.take().unwrap_or(TokenConfig {
            model: String::new(),
            max_tokens_per_chunk: None,
        });
        if let Some(model) = args.model {
            token.model = model;
        }
        if token.model.is_empty() {
            token.model = "gpt-4".to_string();
        }
        if args.max_tokens.is_some() {
            token.max_tokens_per_chunk = args.max_tokens;
        }
        config.token = Some(token);
    }
    if let Some(separator) = &args.separator {
        config.output_separators_header = unescape(separator);
    }

    let walk_opts = WalkOptions {
        include_hidden: args.include_hidden,
        select: args.select,
        exclude: args.exclude,
        ..Default::default()
    };
    let diagnostics = Arc::new(CollectingDiagnostics::new());
    let nodes = collect_nodes_with(&args.path, &walk_opts, diagnostics.as_ref())?;

    let redactor: Arc<dyn Redactor> = if args.no_redact {
        Arc::new(NoopRedactor)
    } else {
        Arc::new(SecretRedactor::new())
    };
    let result = DigestGenerator::new(&args.path)
        .redactor(redactor)
        .diagnostics(diagnostics.clone())
        .generate_from_config(&nodes, &config)?;

    if let Some(dir) = &args.out_dir {
        let written = write_chunks(dir, &result.chunks, config.output_format)?;
        if args.json {
            #[derive(Serialize)]
            struct Output {
                files: Vec<String>,
            }
            let output = Output {
                files: written.iter().map(|p| p.display().to_string()).collect(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            for path in written {
                println!("{}", path.display());
            }
        }
    } else if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", result.content);
    }

    print_warning_summary(&diagnostics);
    Ok(())
}

fn print_warning_summary(diagnostics: &CollectingDiagnostics) {
    let warnings = diagnostics.warnings();
    if warnings.is_empty() {
        return;
    }

    let mut by_kind: BTreeMap<&'static str, usize> = BTreeMap::new();
    for warning in &warnings {
        *by_kind.entry(warning_kind(warning)).or_default() += 1;
    }
    let breakdown: Vec<String> = by_kind
        .iter()
        .map(|(kind, count)| format!("{} {}", count, kind))
        .collect();
    let noun = if warnings.len() == 1 { "warning" } else { "warnings" };
    eprintln!(
        "digest finished with {} {} ({})",
        warnings.len(),
        noun,
        breakdown.join(", ")
    );
}

fn warning_kind(warning: &Warning) -> &'static str {
    match warning {
        Warning::UnreadableFile { .. } => "unreadable",
        Warning::FileTooLarge { .. } => "too large",
        Warning::RedactionFailed { .. } => "redaction failed",
        Warning::TreeTruncated { .. } => "tree truncated",
        Warning::IgnorePatternSkipped { .. } => "bad ignore pattern",
    }
}

fn write_chunks(
    dir: &Path,
    chunks: &[String],
    format: OutputFormatKind,
) -> Result<Vec<PathBuf>, DigestError> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(chunks.len());
    for (i, chunk) in chunks.iter().enumerate() {
        let path = dir.join(format!("digest-{:03}.{}", i + 1, format.file_extension()));
        fs::write(&path, chunk)?;
        written.push(path);
    }
    Ok(written)
}

// --- Tree command ---

fn run_tree(
    path: PathBuf,
    minimal: bool,
    max_lines: Option<usize>,
    select: Vec<String>,
    include_hidden: bool,
    max_depth: Option<usize>,
    json: bool,
) -> Result<(), DigestError> {
    let walk_opts = WalkOptions {
        include_hidden,
        max_depth,
        select,
        ..Default::default()
    };
    let nodes = collect_nodes(&path, &walk_opts)?;

    let mode = if minimal {
        TreeMode::Minimal
    } else {
        TreeMode::Full
    };
    let rendered = TreeBuilder::new()
        .max_selected_lines(max_lines)
        .render(&nodes, mode);

    if json {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Output {
            tree: String,
            total_lines: usize,
            shown_lines: usize,
        }
        let output = Output {
            tree: rendered.text,
            total_lines: rendered.total_lines,
            shown_lines: rendered.shown_lines,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if !rendered.text.is_empty() {
        println!("{}", rendered.text);
    }

    Ok(())
}

// --- Tokens command ---

fn run_tokens(
    path: PathBuf,
    model: &str,
    select: Vec<String>,
    per_file: bool,
    json: bool,
) -> Result<(), DigestError> {
    let walk_opts = WalkOptions {
        select,
        ..Default::default()
    };
    let nodes = collect_nodes(&path, &walk_opts)?;

    let processor = ContentProcessor::new(Arc::new(NoopRedactor));
    let analyzer = TokenAnalyzer::new();

    let file_tokens: BTreeMap<String, usize> = nodes
        .par_iter()
        .filter(|node| node.is_file() && node.is_selected && !node.is_binary)
        .filter_map(|node| {
            let content = match processor.get_file_content(&node.path) {
                Ok(content) => content,
                Err(e) => {
                    log::warn!("{}", e);
                    return None;
                }
            };
            if content.is_binary {
                return None;
            }
            Some((node.rel_path.clone(), analyzer.estimate(&content.content, model)))
        })
        .collect();

    let total: usize = file_tokens.values().sum();

    if json {
        #[derive(Serialize)]
        struct Output {
            total: usize,
            model: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            files: Option<BTreeMap<String, usize>>,
        }

        let output = Output {
            total,
            model: model.to_string(),
            files: per_file.then_some(file_tokens),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        use std::io::{BufWriter, Write};
        let stdout = std::io::stdout();
        let mut out = BufWriter::new(stdout.lock());
        if per_file {
            for (file, count) in &file_tokens {
                writeln!(out, "{}: {} tokens", file, count)?;
            }
        }
        writeln!(out, "Total: {} tokens", total)?;
    }

    Ok(())
}

// --- Check-ignore command ---

fn run_check_ignore(root: PathBuf, paths: Vec<String>, json: bool) -> Result<(), DigestError> {
    let matcher = build_matcher(&root, &WalkOptions::with_hidden(), &LogDiagnostics)?;

    let verdicts: BTreeMap<String, bool> = paths
        .into_iter()
        .map(|rel| {
            let ignored = matcher.is_ignored(&rel);
            (rel, ignored)
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&verdicts)?);
    } else {
        for (rel, ignored) in &verdicts {
            let label = if *ignored { "ignored" } else { "kept" };
            println!("{}\t{}", label, rel);
        }
    }

    Ok(())
}
