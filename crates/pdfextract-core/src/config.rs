use std::sync::Arc;

use regex::Regex;
use thiserror::Error;

use crate::output::TYPE_URI;
use crate::page_selection::{PageSelection, PageSelectionError};
use crate::strategy::{TableSettings, TableStrategy, TextSettings, TextStrategy};
use crate::{ErrorHandling, OutputMode};

/// Errors raised while building a [`Config`]. Always fatal, independent of the
/// error-handling mode.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    PageSelection(#[from] PageSelectionError),
    #[error("Invalid table strategy: {0}")]
    UnknownTableStrategy(String),
    #[error("Invalid text strategy: {0}")]
    UnknownTextStrategy(String),
    #[error("Invalid error handling mode: {0} (expected one of ignore, raise_on_error, raise_on_error_and_warning)")]
    UnknownErrorHandling(String),
    #[error("No custom {kind} strategy defined")]
    EmptyCustomStrategy { kind: &'static str },
    #[error("Invalid custom {kind} strategy: {message}")]
    InvalidCustomStrategy { kind: &'static str, message: String },
    #[error("A file name regex is required")]
    MissingRegex,
    #[error("Invalid file name regex: {0}")]
    InvalidRegex(#[from] regex::Error),
    #[error("{name} must be at least 1")]
    InvalidPoolSize { name: &'static str },
}

/// Number of file workers when none is configured: one less than the
/// available cores, at least one.
pub fn default_max_processes() -> usize {
    available_cores().saturating_sub(1).max(1)
}

/// Number of page threads per file when none is configured.
pub fn default_max_threads() -> usize {
    available_cores()
}

fn available_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Validated, immutable settings for one extraction run.
///
/// Settings that page workers read are behind `Arc` so they can be shared
/// across threads without copying.
#[derive(Debug, Clone)]
pub struct Config {
    /// The user's pattern as entered.
    pub pattern: String,
    /// `pattern` anchored at the start of the resource name.
    pub filename_regex: Regex,
    pub output_mode: OutputMode,
    pub error_handling: ErrorHandling,
    pub table_strategy: TableStrategy,
    pub table_settings: Arc<TableSettings>,
    pub text_strategy: TextStrategy,
    pub text_settings: Arc<TextSettings>,
    pub page_selection: Arc<PageSelection>,
    pub max_processes: usize,
    pub max_threads: usize,
    /// Prefix for output record URIs.
    pub type_uri: String,
}

impl Config {
    /// True if a resource called `name` should be processed.
    pub fn matches(&self, name: &str) -> bool {
        self.filename_regex.is_match(name)
    }
}

/// Builder for [`Config`].
///
/// Takes every parameter in its user-facing string form and validates all of
/// them in [`build()`](Self::build).
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    pattern: Option<String>,
    output_mode: OutputMode,
    error_handling: Option<String>,
    table_strategy: Option<String>,
    custom_table_strategy: String,
    text_strategy: Option<String>,
    custom_text_strategy: String,
    page_selection: String,
    max_processes: Option<usize>,
    max_threads: Option<usize>,
    type_uri: Option<String>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filename_regex(mut self, pattern: &str) -> Self {
        self.pattern = Some(pattern.to_string());
        self
    }

    pub fn output_mode(mut self, mode: OutputMode) -> Self {
        self.output_mode = mode;
        self
    }

    /// Shorthand for [`OutputMode::Combined`] when `all_files` is set.
    pub fn all_files(self, all_files: bool) -> Self {
        self.output_mode(if all_files {
            OutputMode::Combined
        } else {
            OutputMode::PerFile
        })
    }

    pub fn error_handling(mut self, mode: &str) -> Self {
        self.error_handling = Some(mode.to_string());
        self
    }

    pub fn table_strategy(mut self, strategy: &str) -> Self {
        self.table_strategy = Some(strategy.to_string());
        self
    }

    pub fn custom_table_strategy(mut self, definition: &str) -> Self {
        self.custom_table_strategy = definition.to_string();
        self
    }

    pub fn text_strategy(mut self, strategy: &str) -> Self {
        self.text_strategy = Some(strategy.to_string());
        self
    }

    pub fn custom_text_strategy(mut self, definition: &str) -> Self {
        self.custom_text_strategy = definition.to_string();
        self
    }

    pub fn page_selection(mut self, selection: &str) -> Self {
        self.page_selection = selection.to_string();
        self
    }

    pub fn max_processes(mut self, n: usize) -> Self {
        self.max_processes = Some(n);
        self
    }

    pub fn max_threads(mut self, n: usize) -> Self {
        self.max_threads = Some(n);
        self
    }

    pub fn type_uri(mut self, uri: &str) -> Self {
        self.type_uri = Some(uri.to_string());
        self
    }

    /// Validate every parameter and produce a [`Config`].
    pub fn build(self) -> Result<Config, ConfigError> {
        let pattern = self.pattern.ok_or(ConfigError::MissingRegex)?;
        let filename_regex = Regex::new(&format!("^(?:{pattern})"))?;

        let error_handling = match self.error_handling {
            Some(mode) => mode.parse()?,
            None => ErrorHandling::default(),
        };

        let table_strategy: TableStrategy = match self.table_strategy {
            Some(s) => s.parse()?,
            None => TableStrategy::default(),
        };
        let table_settings = table_strategy.resolve(&self.custom_table_strategy)?;

        let text_strategy: TextStrategy = match self.text_strategy {
            Some(s) => s.parse()?,
            None => TextStrategy::default(),
        };
        let text_settings = text_strategy.resolve(&self.custom_text_strategy)?;

        let page_selection = if self.page_selection.trim().is_empty() {
            PageSelection::all()
        } else {
            self.page_selection.parse::<PageSelection>()?
        };

        let max_processes = self.max_processes.unwrap_or_else(default_max_processes);
        if max_processes == 0 {
            return Err(ConfigError::InvalidPoolSize {
                name: "max_processes",
            });
        }
        let max_threads = self.max_threads.unwrap_or_else(default_max_threads);
        if max_threads == 0 {
            return Err(ConfigError::InvalidPoolSize {
                name: "max_threads",
            });
        }

        Ok(Config {
            pattern,
            filename_regex,
            output_mode: self.output_mode,
            error_handling,
            table_strategy,
            table_settings: Arc::new(table_settings),
            text_strategy,
            text_settings: Arc::new(text_settings),
            page_selection: Arc::new(page_selection),
            max_processes,
            max_threads,
            type_uri: self.type_uri.unwrap_or_else(|| TYPE_URI.to_string()),
        })
    }
}
