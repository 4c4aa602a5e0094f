//! Single-file extraction: open, select pages, fan out to the page pool.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::backend::PdfBackend;
use crate::config::Config;
use crate::page::panic_message;
use crate::page_selection::PageSelection;
use crate::pool::{self, PageJobContext};
use crate::strategy::{TableSettings, TextSettings};
use crate::{ErrorHandling, ExtractError, FILENAME_KEY, FileResult};

/// Processes whole files. Cheap to clone; every field is shared.
#[derive(Clone)]
pub struct FileProcessor {
    backend: Arc<dyn PdfBackend>,
    table_settings: Arc<TableSettings>,
    text_settings: Arc<TextSettings>,
    page_selection: Arc<PageSelection>,
    error_handling: ErrorHandling,
    max_threads: usize,
}

impl FileProcessor {
    pub fn new(backend: Arc<dyn PdfBackend>, config: &Config) -> Self {
        Self {
            backend,
            table_settings: Arc::clone(&config.table_settings),
            text_settings: Arc::clone(&config.text_settings),
            page_selection: Arc::clone(&config.page_selection),
            error_handling: config.error_handling,
            max_threads: config.max_threads,
        }
    }

    /// Extract every selected page of one file.
    ///
    /// Blocking; call from a blocking context. In `ignore` mode an unopenable
    /// file yields a [`FileResult`] with an `error` and no pages. In the strict
    /// modes it fails with [`ExtractError::Open`], and the first failing page
    /// fails the whole file with [`ExtractError::Page`].
    pub fn process(
        &self,
        filename: &str,
        bytes: Arc<[u8]>,
        cancel: &CancellationToken,
    ) -> Result<FileResult, ExtractError> {
        let opened = panic::catch_unwind(AssertUnwindSafe(|| {
            self.backend
                .open(&bytes)
                .map(|document| (document.metadata(), document.page_count()))
        }));
        let (metadata, page_count) = match opened {
            Ok(Ok(info)) => info,
            Ok(Err(e)) => return self.open_failed(filename, e.to_string()),
            Err(payload) => {
                return self.open_failed(
                    filename,
                    format!("open panicked: {}", panic_message(payload.as_ref())),
                );
            }
        };

        let mut result = FileResult::new(filename);
        for (key, value) in metadata {
            // The filename entry always wins.
            if key != FILENAME_KEY {
                result.metadata.insert(key, value);
            }
        }

        let page_count = u32::try_from(page_count).unwrap_or(u32::MAX);
        let pages = self.page_selection.filter_pages(page_count);
        tracing::debug!(
            filename,
            page_count,
            selected = pages.len(),
            "opened document"
        );

        let ctx = PageJobContext {
            backend: Arc::clone(&self.backend),
            bytes,
            table_settings: Arc::clone(&self.table_settings),
            text_settings: Arc::clone(&self.text_settings),
            error_handling: self.error_handling,
        };
        result.pages = pool::extract_pages(ctx, pages, self.max_threads, cancel.child_token())
            .map_err(|e| ExtractError::page(filename, e))?;
        Ok(result)
    }

    fn open_failed(&self, filename: &str, message: String) -> Result<FileResult, ExtractError> {
        if self.error_handling.is_ignore() {
            tracing::warn!(filename, error = %message, "could not open file");
            return Ok(FileResult::failed(filename, message));
        }
        Err(ExtractError::Open {
            filename: filename.to_string(),
            message,
        })
    }

    /// Record a failure to fetch the file's bytes, the same way as an open error.
    pub fn fetch_failed(
        &self,
        filename: &str,
        message: String,
    ) -> Result<FileResult, ExtractError> {
        self.open_failed(filename, message)
    }
}
