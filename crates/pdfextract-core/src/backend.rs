use std::collections::BTreeMap;

use thiserror::Error;

use crate::capture::WarningCapture;
use crate::strategy::{TableSettings, TextSettings};
use crate::Table;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("failed to open PDF: {0}")]
    OpenError(String),
    #[error("{0}")]
    ExtractionError(String),
}

/// Trait for PDF extraction backends.
///
/// A backend turns raw file bytes into a [`PdfDocument`]. Documents are opened
/// once per worker thread, so implementors do not need `Send` documents; the
/// backend itself is shared across threads.
pub trait PdfBackend: Send + Sync {
    fn open(&self, bytes: &[u8]) -> Result<Box<dyn PdfDocument>, BackendError>;
}

/// An opened document.
pub trait PdfDocument {
    /// Document information entries (title, author, dates, ...). Empty values
    /// should be omitted.
    fn metadata(&self) -> BTreeMap<String, String>;

    fn page_count(&self) -> usize;

    /// Load a page by 0-based index.
    fn page(&self, index: usize) -> Result<Box<dyn PdfPage + '_>, BackendError>;
}

/// A single loaded page.
///
/// Non-fatal diagnostics produced while extracting go into `capture`, never to
/// stderr or a global logger.
pub trait PdfPage {
    fn extract_text(
        &self,
        settings: &TextSettings,
        capture: &mut WarningCapture,
    ) -> Result<String, BackendError>;

    fn extract_tables(
        &self,
        settings: &TableSettings,
        capture: &mut WarningCapture,
    ) -> Result<Vec<Table>, BackendError>;
}
