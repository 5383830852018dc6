//! File content acquisition.
//!
//! [`ContentProcessor`] reads one file, classifies it as binary or text
//! from a fixed-size prefix, and runs text through the injected
//! [`Redactor`]. Binary bytes are never decoded.

use std::fs::File;
use std::io::Read;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::config::DEFAULT_MAX_FILE_BYTES;
use crate::diagnostics::{Diagnostics, LogDiagnostics, Warning};
use crate::redact::{Redaction, Redactor, SecretRedactor};

/// Number of leading bytes inspected by binary detection.
pub const SNIFF_BYTES: usize = 8192;

/// Errors that can occur while acquiring a file's content.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is {size} bytes, over the {limit} byte limit")]
    TooLarge { path: PathBuf, size: u64, limit: u64 },

    #[error("{path} is not valid UTF-8")]
    Decode { path: PathBuf },
}

// ============================================================================
// Binary detection
// ============================================================================

/// Decides whether a file is binary.
pub trait BinaryDetector: Send + Sync {
    /// `prefix` holds at most [`SNIFF_BYTES`] leading bytes of the file.
    fn is_binary(&self, path: &Path, prefix: &[u8]) -> bool;
}

/// Content sniffing: a NUL byte, or too many control bytes, means binary.
#[derive(Debug, Clone, Copy)]
pub struct ContentSniffer {
    /// Maximum tolerated share of non-text bytes.
    pub threshold: f64,
}

impl Default for ContentSniffer {
    fn default() -> Self {
        Self { threshold: 0.30 }
    }
}

impl BinaryDetector for ContentSniffer {
    fn is_binary(&self, _path: &Path, prefix: &[u8]) -> bool {
        if prefix.is_empty() {
            return false;
        }
        if prefix.contains(&0) {
            return true;
        }
        let suspicious = prefix
            .iter()
            .filter(|&&b| b < 0x20 && !matches!(b, b'\n' | b'\r' | b'\t' | 0x0c | 0x1b))
            .count();
        suspicious as f64 / prefix.len() as f64 > self.threshold
    }
}

const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "tiff", "psd", "zip", "gz", "tgz", "bz2",
    "xz", "7z", "rar", "tar", "zst", "exe", "dll", "so", "dylib", "bin", "o", "a", "lib", "class",
    "jar", "war", "pyc", "wasm", "woff", "woff2", "ttf", "otf", "eot", "mp3", "mp4", "wav", "ogg",
    "flac", "avi", "mov", "mkv", "webm", "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx",
    "sqlite", "db",
];

/// Whether an extension (without the dot) names a known binary format.
pub fn is_binary_extension(ext: &str) -> bool {
    let ext = ext.to_lowercase();
    BINARY_EXTENSIONS.contains(&ext.as_str())
}

/// Classifies purely by file extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtensionDetector;

impl BinaryDetector for ExtensionDetector {
    fn is_binary(&self, path: &Path, _prefix: &[u8]) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(is_binary_extension)
    }
}

/// Binary if either detector says so.
#[derive(Debug, Clone, Copy, Default)]
pub struct EitherDetector<A, B>(pub A, pub B);

impl<A: BinaryDetector, B: BinaryDetector> BinaryDetector for EitherDetector<A, B> {
    fn is_binary(&self, path: &Path, prefix: &[u8]) -> bool {
        self.0.is_binary(path, prefix) || self.1.is_binary(path, prefix)
    }
}

// ============================================================================
// Processor
// ============================================================================

/// Content of a single file as exposed to the generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    /// Text after redaction. Empty for binary files.
    pub content: String,
    pub is_binary: bool,
    /// Whether the redactor changed the text.
    pub redacted: bool,
    /// Newline count of the exposed text.
    pub lines: usize,
}

impl FileContent {
    fn binary() -> Self {
        Self {
            content: String::new(),
            is_binary: true,
            redacted: false,
            lines: 0,
        }
    }
}

/// Reads, classifies and redacts files.
#[derive(Clone)]
pub struct ContentProcessor {
    redactor: Arc<dyn Redactor>,
    detector: Arc<dyn BinaryDetector>,
    diagnostics: Arc<dyn Diagnostics>,
    max_file_bytes: u64,
}

impl Default for ContentProcessor {
    fn default() -> Self {
        Self::new(Arc::new(SecretRedactor::new()))
    }
}

impl ContentProcessor {
    /// Create a processor around a redactor, sniffing content for binaries.
    pub fn new(redactor: Arc<dyn Redactor>) -> Self {
        Self {
            redactor,
            detector: Arc::new(EitherDetector(ExtensionDetector, ContentSniffer::default())),
            diagnostics: Arc::new(LogDiagnostics),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }

    /// Swap the binary classification heuristic.
    pub fn with_detector(mut self, detector: Arc<dyn BinaryDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Files larger than this are rejected with [`ContentError::TooLarge`].
    pub fn with_max_file_bytes(mut self, limit: u64) -> Self {
        self.max_file_bytes = limit;
        self
    }

    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_bytes
    }

    /// Read a file and return its (redacted) text, or mark it binary.
    ///
    /// The file handle is dropped on every return path.
    pub fn get_file_content(&self, path: &Path) -> Result<FileContent, ContentError> {
        let io_err = |source: std::io::Error| ContentError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut file = File::open(path).map_err(io_err)?;

        let mut bytes = Vec::with_capacity(SNIFF_BYTES);
        (&mut file)
            .take(SNIFF_BYTES as u64)
            .read_to_end(&mut bytes)
            .map_err(io_err)?;

        if self.detector.is_binary(path, &bytes) {
            return Ok(FileContent::binary());
        }

        let size = file.metadata().map_err(io_err)?.len();
        if size > self.max_file_bytes {
            return Err(ContentError::TooLarge {
                path: path.to_path_buf(),
                size,
                limit: self.max_file_bytes,
            });
        }

        // Cap the read itself in case the file grows after the size check.
        let remaining = self.max_file_bytes.saturating_add(1).saturating_sub(bytes.len() as u64);
        (&mut file)
            .take(remaining)
            .read_to_end(&mut bytes)
            .map_err(io_err)?;
        if bytes.len() as u64 > self.max_file_bytes {
            return Err(ContentError::TooLarge {
                path: path.to_path_buf(),
                size: bytes.len() as u64,
                limit: self.max_file_bytes,
            });
        }

        let text = String::from_utf8(bytes).map_err(|_| ContentError::Decode {
            path: path.to_path_buf(),
        })?;
        let text = match text.strip_prefix('\u{feff}') {
            Some(stripped) => stripped.to_string(),
            None => text,
        };

        let redaction = self.redact_or_original(path, &text);
        Ok(FileContent {
            lines: bytecount::count(redaction.content.as_bytes(), b'\n'),
            content: redaction.content,
            is_binary: false,
            redacted: redaction.applied,
        })
    }

    /// Run the redactor, falling back to the original text if it errors or
    /// panics. Failures are reported as [`Warning::RedactionFailed`].
    pub fn redact_or_original(&self, label: &Path, text: &str) -> Redaction {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.redactor.redact(text)));

        let reason = match outcome {
            Ok(Ok(redaction)) if redaction.applied => return redaction,
            Ok(Ok(_)) => return Redaction::unchanged(text),
            Ok(Err(e)) => e.to_string(),
            Err(payload) => panic_message(payload.as_ref()),
        };

        self.diagnostics.warn(Warning::RedactionFailed {
            path: label.to_path_buf(),
            reason,
        });
        Redaction::unchanged(text)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("redactor panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("redactor panicked: {}", s)
    } else {
        "redactor panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingDiagnostics;
    use crate::redact::{NoopRedactor, RedactError};
    use std::fs;
    use tempfile::TempDir;

    struct FailingRedactor;

    impl Redactor for FailingRedactor {
        fn redact(&self, _content: &str) -> Result<Redaction, RedactError> {
            Err(RedactError("boom".to_string()))
        }
    }

    struct PanickingRedactor;

    impl Redactor for PanickingRedactor {
        fn redact(&self, _content: &str) -> Result<Redaction, RedactError> {
            panic!("redactor exploded")
        }
    }

    struct Everything;

    impl Redactor for Everything {
        fn redact(&self, _content: &str) -> Result<Redaction, RedactError> {
            Ok(Redaction {
                applied: true,
                content: "[REDACTED]".to_string(),
            })
        }
    }

    #[test]
    fn test_text_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("main.rs");
        fs::write(&path, "fn main() {}\n").unwrap();

        let content = ContentProcessor::new(Arc::new(NoopRedactor))
            .get_file_content(&path)
            .unwrap();
        assert!(!content.is_binary);
        assert!(!content.redacted);
        assert_eq!(content.content, "fn main() {}\n");
        assert_eq!(content.lines, 1);
    }

    #[test]
    fn test_binary_by_nul() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blob.dat");
        fs::write(&path, [0x7f, b'E', b'L', b'F', 0, 0, 1]).unwrap();

        let content = ContentProcessor::default().get_file_content(&path).unwrap();
        assert!(content.is_binary);
        assert!(content.content.is_empty());
    }

    #[test]
    fn test_binary_by_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logo.png");
        fs::write(&path, "not really a png").unwrap();

        let content = ContentProcessor::default().get_file_content(&path).unwrap();
        assert!(content.is_binary);
    }

    #[test]
    fn test_custom_detector() {
        struct Never;
        impl BinaryDetector for Never {
            fn is_binary(&self, _: &Path, _: &[u8]) -> bool {
                false
            }
        }

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logo.png");
        fs::write(&path, "plain").unwrap();

        let content = ContentProcessor::new(Arc::new(NoopRedactor))
            .with_detector(Arc::new(Never))
            .get_file_content(&path)
            .unwrap();
        assert!(!content.is_binary);
        assert_eq!(content.content, "plain");
    }

    #[test]
    fn test_sniffer_threshold() {
        let sniffer = ContentSniffer::default();
        let path = Path::new("x");
        assert!(!sniffer.is_binary(path, b""));
        assert!(!sniffer.is_binary(path, b"hello\tworld\r\n"));
        assert!(sniffer.is_binary(path, &[1, 2, 3, 4, b'a']));
    }

    #[test]
    fn test_redaction_applied() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");
        fs::write(&path, "API_KEY=abcdef123456\n").unwrap();

        let content = ContentProcessor::default().get_file_content(&path).unwrap();
        assert!(content.redacted);
        assert_eq!(content.content, "API_KEY=[REDACTED]\n");
    }

    #[test]
    fn test_redactor_error_falls_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "secret stuff").unwrap();

        let sink = Arc::new(CollectingDiagnostics::new());
        let content = ContentProcessor::new(Arc::new(FailingRedactor))
            .with_diagnostics(sink.clone())
            .get_file_content(&path)
            .unwrap();
        assert_eq!(content.content, "secret stuff");
        assert!(!content.redacted);
        assert!(matches!(
            sink.warnings()[0],
            Warning::RedactionFailed { .. }
        ));
    }

    #[test]
    fn test_redactor_panic_falls_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "text").unwrap();

        let sink = Arc::new(CollectingDiagnostics::new());
        let content = ContentProcessor::new(Arc::new(PanickingRedactor))
            .with_diagnostics(sink.clone())
            .get_file_content(&path)
            .unwrap();
        assert_eq!(content.content, "text");
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_redacted_content_replaces_original() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "anything").unwrap();

        let content = ContentProcessor::new(Arc::new(Everything))
            .get_file_content(&path)
            .unwrap();
        assert!(content.redacted);
        assert_eq!(content.content, "[REDACTED]");
    }

    #[test]
    fn test_too_large() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.txt");
        fs::write(&path, "x".repeat(100)).unwrap();

        let err = ContentProcessor::default()
            .with_max_file_bytes(10)
            .get_file_content(&path)
            .unwrap_err();
        assert!(matches!(err, ContentError::TooLarge { size: 100, limit: 10, .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = ContentProcessor::default()
            .get_file_content(Path::new("/nonexistent/file.rs"))
            .unwrap_err();
        assert!(matches!(err, ContentError::Io { .. }));
    }

    #[test]
    fn test_invalid_utf8() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("latin1.txt");
        fs::write(&path, [b'c', b'a', b'f', 0xe9, b'\n']).unwrap();

        let err = ContentProcessor::default().get_file_content(&path).unwrap_err();
        assert!(matches!(err, ContentError::Decode { .. }));
    }

    #[test]
    fn test_bom_stripped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bom.txt");
        fs::write(&path, "\u{feff}hello").unwrap();

        let content = ContentProcessor::new(Arc::new(NoopRedactor))
            .get_file_content(&path)
            .unwrap();
        assert_eq!(content.content, "hello");
    }
}
