//! Single-page extraction and outcome classification.

use thiserror::Error;

use crate::backend::PdfPage;
use crate::capture::WarningCapture;
use crate::strategy::{TableSettings, TextSettings};
use crate::{ErrorHandling, PageResult};

/// Why a page could not produce a result in a strict mode.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PageFailure {
    /// The backend raised while extracting text or tables.
    #[error("{0}")]
    Extraction(String),
    /// A warning escalated under `raise_on_error_and_warning`.
    #[error("{0}")]
    Warning(String),
    /// The backend panicked.
    #[error("extraction panicked: {0}")]
    Panicked(String),
    /// Page work stopped before this page was reported.
    #[error("extraction cancelled")]
    Cancelled,
}

/// A page failure tagged with its 1-based page number.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("page {page_number}: {failure}")]
pub struct PageError {
    pub page_number: u32,
    pub failure: PageFailure,
}

impl PageError {
    pub fn new(page_number: u32, failure: PageFailure) -> Self {
        Self {
            page_number,
            failure,
        }
    }
}

/// Prefix of the warning attached when text comes back empty with diagnostics.
pub const EMPTY_TEXT_WARNING: &str = "Text extraction failed or returned None";

/// Runs text and table extraction for one page and applies the
/// error-handling policy to the outcome.
pub struct PageProcessor;

impl PageProcessor {
    /// Extract `page` and classify the result.
    ///
    /// In `ignore` mode this never fails: backend errors become the page's
    /// `error` field. In the strict modes backend errors, and under
    /// `raise_on_error_and_warning` also warnings, are returned as `Err`.
    pub fn process(
        page: &dyn PdfPage,
        page_number: u32,
        table_settings: &TableSettings,
        text_settings: &TextSettings,
        mode: ErrorHandling,
    ) -> Result<PageResult, PageError> {
        let (outcome, captured) = WarningCapture::scope(|capture| {
            let text = page
                .extract_text(text_settings, capture)
                .map_err(|e| format!("Text extraction error: {e}"))?;
            let tables = page
                .extract_tables(table_settings, capture)
                .map_err(|e| format!("Table extraction error: {e}"))?;
            Ok::<_, String>((text, tables))
        });

        let (text, tables) = match outcome {
            Ok(extracted) => extracted,
            Err(message) => {
                if mode.is_ignore() {
                    tracing::warn!(page = page_number, error = %message, "page extraction failed");
                    return Ok(PageResult::failed(page_number, message));
                }
                return Err(PageError::new(page_number, PageFailure::Extraction(message)));
            }
        };

        if text.is_empty() && !captured.trim().is_empty() {
            let warning = format!("{EMPTY_TEXT_WARNING}: {captured}");
            if mode.escalates_warnings() {
                return Err(PageError::new(page_number, PageFailure::Warning(warning)));
            }
            tracing::debug!(page = page_number, %warning, "page produced a warning");
            return Ok(PageResult::success(page_number, text, tables).with_warning(warning));
        }

        Ok(PageResult::success(page_number, text, tables))
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockPage;

    fn run(page: &MockPage, mode: ErrorHandling) -> Result<PageResult, PageError> {
        PageProcessor::process(
            page,
            4,
            &TableSettings::lines(),
            &TextSettings::default(),
            mode,
        )
    }

    #[test]
    fn clean_page_has_text_and_tables() {
        let page = MockPage::text("hello").with_table(vec![vec!["a".into(), "b".into()]]);
        let result = run(&page, ErrorHandling::RaiseOnErrorAndWarning).unwrap();
        assert_eq!(result.page_number, 4);
        assert_eq!(result.text.as_deref(), Some("hello"));
        assert_eq!(result.tables.unwrap().len(), 1);
        assert!(result.warning.is_none());
        assert!(result.error.is_none());
    }

    #[test]
    fn diagnostics_with_nonempty_text_are_not_a_warning() {
        let page = MockPage::text("hello").with_diagnostic("odd font");
        let result = run(&page, ErrorHandling::RaiseOnErrorAndWarning).unwrap();
        assert!(result.warning.is_none());
    }

    #[test]
    fn empty_text_with_diagnostics_warns() {
        let page =
            MockPage::text("").with_diagnostic("Data-loss while decompressing corrupted data");
        for mode in [ErrorHandling::Ignore, ErrorHandling::RaiseOnError] {
            let result = run(&page, mode).unwrap();
            assert_eq!(result.text.as_deref(), Some(""));
            assert_eq!(
                result.warning.as_deref(),
                Some(
                    "Text extraction failed or returned None: Data-loss while decompressing corrupted data"
                )
            );
        }
    }

    #[test]
    fn warning_escalates_in_strictest_mode() {
        let page = MockPage::text("").with_diagnostic("broken stream");
        let err = run(&page, ErrorHandling::RaiseOnErrorAndWarning).unwrap_err();
        assert_eq!(err.page_number, 4);
        assert!(matches!(err.failure, PageFailure::Warning(ref w) if w.ends_with("broken stream")));
    }

    #[test]
    fn empty_text_without_diagnostics_is_clean() {
        let page = MockPage::text("");
        let result = run(&page, ErrorHandling::RaiseOnErrorAndWarning).unwrap();
        assert_eq!(result.text.as_deref(), Some(""));
        assert!(result.warning.is_none());
    }

    #[test]
    fn backend_errors_follow_mode() {
        let page = MockPage::text("x").failing_text("bad content stream");
        let result = run(&page, ErrorHandling::Ignore).unwrap();
        assert_eq!(
            result.error.as_deref(),
            Some("Text extraction error: bad content stream")
        );
        assert!(result.text.is_none());

        let err = run(&page, ErrorHandling::RaiseOnError).unwrap_err();
        assert_eq!(
            err.to_string(),
            "page 4: Text extraction error: bad content stream"
        );

        let page = MockPage::text("x").failing_tables("no edges");
        let err = run(&page, ErrorHandling::RaiseOnError).unwrap_err();
        assert_eq!(
            err.failure,
            PageFailure::Extraction("Table extraction error: no edges".into())
        );
    }

    #[test]
    fn panic_message_reads_str_and_string() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn std::any::Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
