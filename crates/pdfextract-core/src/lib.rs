use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod backend;
pub mod capture;
pub mod config;
pub mod config_file;
pub mod file;
pub mod mock;
pub mod orchestrator;
pub mod output;
pub mod page;
pub mod page_selection;
pub mod pool;
pub mod strategy;
pub mod workspace;

// Re-export for convenience
pub use backend::{BackendError, PdfBackend, PdfDocument, PdfPage};
pub use capture::WarningCapture;
pub use config::{Config, ConfigBuilder, ConfigError};
pub use orchestrator::{ExtractionOrchestrator, RunState, describe_matches, resolve_filenames};
pub use output::{OutputRecord, SCHEMA_PATH, TYPE_URI};
pub use page::{PageError, PageFailure, PageProcessor};
pub use page_selection::{PageSelection, PageSelectionError};
pub use strategy::{TableSettings, TableStrategy, TextSettings, TextStrategy};
pub use workspace::{DirectoryWorkspace, ResourceError, ResourceInfo, ResourceProvider};

/// Metadata key that always carries the source filename.
pub const FILENAME_KEY: &str = "Filename";
/// Metadata key that carries a file-level error message.
pub const ERROR_KEY: &str = "error";

/// One table: rows of cell strings.
pub type Table = Vec<Vec<String>>;

/// The outcome of extracting a single page.
///
/// A successful page carries `text` and `tables`; a failed page carries only
/// `error`. `warning` may accompany a successful page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-based page number.
    pub page_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tables: Option<Vec<Table>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl PageResult {
    pub fn success(page_number: u32, text: String, tables: Vec<Table>) -> Self {
        Self {
            page_number,
            text: Some(text),
            tables: Some(tables),
            error: None,
            warning: None,
        }
    }

    pub fn failed(page_number: u32, error: impl Into<String>) -> Self {
        Self {
            page_number,
            text: None,
            tables: None,
            error: Some(error.into()),
            warning: None,
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// The outcome of extracting one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileResult {
    pub filename: String,
    /// Document metadata. Always contains [`FILENAME_KEY`]; contains
    /// [`ERROR_KEY`] when the file could not be opened.
    pub metadata: BTreeMap<String, String>,
    pub pages: Vec<PageResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileResult {
    /// An empty result for `filename` with only the `Filename` metadata entry.
    pub fn new(filename: impl Into<String>) -> Self {
        let filename = filename.into();
        let mut metadata = BTreeMap::new();
        metadata.insert(FILENAME_KEY.to_string(), filename.clone());
        Self {
            filename,
            metadata,
            pages: Vec::new(),
            error: None,
        }
    }

    /// A result for a file that failed before or while opening.
    pub fn failed(filename: impl Into<String>, error: impl Into<String>) -> Self {
        let error = error.into();
        let mut result = Self::new(filename);
        result.metadata.insert(ERROR_KEY.to_string(), error.clone());
        result.error = Some(error);
        result
    }

    pub fn page_errors(&self) -> usize {
        self.pages.iter().filter(|p| p.is_error()).count()
    }

    pub fn page_warnings(&self) -> usize {
        self.pages.iter().filter(|p| p.warning.is_some()).count()
    }
}

/// The collected output of one extraction run.
///
/// Files appear in the order their workers completed, not in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchResult {
    /// One output record per file.
    PerFile(Vec<FileResult>),
    /// A single output record holding every file.
    Combined(Vec<FileResult>),
}

impl BatchResult {
    pub fn files(&self) -> &[FileResult] {
        match self {
            BatchResult::PerFile(files) | BatchResult::Combined(files) => files,
        }
    }
}

/// How failures below the configuration level are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorHandling {
    /// Record errors on the smallest enclosing result and keep going.
    Ignore,
    /// Abort the run on the first page or file error.
    #[default]
    RaiseOnError,
    /// Like [`ErrorHandling::RaiseOnError`], and also abort on warnings.
    RaiseOnErrorAndWarning,
}

impl ErrorHandling {
    pub const CHOICES: [&'static str; 3] =
        ["ignore", "raise_on_error", "raise_on_error_and_warning"];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorHandling::Ignore => "ignore",
            ErrorHandling::RaiseOnError => "raise_on_error",
            ErrorHandling::RaiseOnErrorAndWarning => "raise_on_error_and_warning",
        }
    }

    pub fn is_ignore(&self) -> bool {
        matches!(self, ErrorHandling::Ignore)
    }

    pub fn escalates_warnings(&self) -> bool {
        matches!(self, ErrorHandling::RaiseOnErrorAndWarning)
    }
}

impl fmt::Display for ErrorHandling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorHandling {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ignore" => Ok(ErrorHandling::Ignore),
            "raise_on_error" => Ok(ErrorHandling::RaiseOnError),
            "raise_on_error_and_warning" => Ok(ErrorHandling::RaiseOnErrorAndWarning),
            other => Err(ConfigError::UnknownErrorHandling(other.to_string())),
        }
    }
}

/// Whether each file gets its own output record or all files share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    #[default]
    PerFile,
    Combined,
}

/// Progress events emitted during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Started {
        total: usize,
    },
    FileCompleted {
        filename: String,
        completed: usize,
        total: usize,
        /// The file ended with a file-level error (only reported in `ignore` mode).
        failed: bool,
    },
    Finished {
        completed: usize,
        total: usize,
    },
}

impl ProgressEvent {
    /// Number of files completed so far.
    pub fn completed(&self) -> usize {
        match self {
            ProgressEvent::Started { .. } => 0,
            ProgressEvent::FileCompleted { completed, .. }
            | ProgressEvent::Finished { completed, .. } => *completed,
        }
    }

    pub fn total(&self) -> usize {
        match self {
            ProgressEvent::Started { total }
            | ProgressEvent::FileCompleted { total, .. }
            | ProgressEvent::Finished { total, .. } => *total,
        }
    }

    /// Operation description for the reporting channel.
    pub fn description(&self) -> &'static str {
        if self.completed() == 1 {
            "file processed"
        } else {
            "files processed"
        }
    }
}

/// Errors that abort an extraction run.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// The file could not be fetched or opened as a document.
    #[error("File {filename}: {message}")]
    Open { filename: String, message: String },
    /// A page failed or a warning was escalated.
    #[error("File {filename}, page {page}: {failure}")]
    Page {
        filename: String,
        page: u32,
        failure: PageFailure,
    },
    /// The worker processing a file died without producing a result.
    #[error("File {filename}: {message}")]
    Worker { filename: String, message: String },
    /// No resource names matched the filename pattern.
    #[error("No files found matching pattern {pattern:?}")]
    NoInput { pattern: String },
    #[error("extraction cancelled")]
    Cancelled,
    #[error("failed to list workspace resources: {0}")]
    Listing(#[source] ResourceError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ExtractError {
    pub(crate) fn page(filename: &str, error: PageError) -> Self {
        ExtractError::Page {
            filename: filename.to_string(),
            page: error.page_number,
            failure: error.failure,
        }
    }

    /// The message without the `File <name>[, page <n>]:` prefix.
    pub fn underlying_message(&self) -> String {
        match self {
            ExtractError::Open { message, .. } | ExtractError::Worker { message, .. } => {
                message.clone()
            }
            ExtractError::Page { failure, .. } => failure.to_string(),
            other => other.to_string(),
        }
    }

    /// The file this error belongs to, if any.
    pub fn filename(&self) -> Option<&str> {
        match self {
            ExtractError::Open { filename, .. }
            | ExtractError::Page { filename, .. }
            | ExtractError::Worker { filename, .. } => Some(filename),
            _ => None,
        }
    }
}
