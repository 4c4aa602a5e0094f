//! Page worker pool used inside one file task.
//!
//! Architecture: the page numbers of a file are queued on an `async_channel`
//! up front. `max_threads` OS threads each open their own handle on the shared
//! file bytes, pull page numbers until the queue is empty, and send one
//! outcome per page back on a result channel. Backend documents never cross
//! threads, so they do not need to be `Send`.
//!
//! The collector runs on the calling (blocking) thread. In the strict modes
//! the first failed page cancels the pool's token and the collector returns
//! immediately; workers finish the page they are on and exit without
//! starting another.

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::backend::{PdfBackend, PdfDocument};
use crate::page::{PageError, PageFailure, PageProcessor, panic_message};
use crate::strategy::{TableSettings, TextSettings};
use crate::{ErrorHandling, PageResult};

/// Read-only inputs shared by every page worker of one file.
#[derive(Clone)]
pub struct PageJobContext {
    pub backend: Arc<dyn PdfBackend>,
    pub bytes: Arc<[u8]>,
    pub table_settings: Arc<TableSettings>,
    pub text_settings: Arc<TextSettings>,
    pub error_handling: ErrorHandling,
}

type PageOutcome = Result<PageResult, PageError>;

/// Extract `pages` (1-based) with up to `max_threads` worker threads.
///
/// Returns the page results sorted by page number. In the strict modes the
/// first failure is returned and remaining page work is abandoned.
pub fn extract_pages(
    ctx: PageJobContext,
    pages: Vec<u32>,
    max_threads: usize,
    cancel: CancellationToken,
) -> Result<Vec<PageResult>, PageError> {
    if pages.is_empty() {
        return Ok(Vec::new());
    }

    let total = pages.len();
    let num_workers = max_threads.clamp(1, total);
    let (job_tx, job_rx) = async_channel::unbounded::<u32>();
    let (result_tx, result_rx) = async_channel::unbounded::<PageOutcome>();

    for page in &pages {
        // Unbounded and the receiver is alive: cannot fail.
        let _ = job_tx.send_blocking(*page);
    }
    job_tx.close();

    tracing::debug!(pages = total, workers = num_workers, "dispatching pages");

    for i in 0..num_workers {
        let ctx = ctx.clone();
        let job_rx = job_rx.clone();
        let result_tx = result_tx.clone();
        let cancel = cancel.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("pdfextract-page-{i}"))
            .spawn(move || page_worker(ctx, job_rx, result_tx, cancel));
        if let Err(e) = spawned {
            // Remaining workers (or none) drain the queue; if none started,
            // the closed result channel reports the unprocessed pages.
            tracing::warn!(error = %e, "failed to spawn page worker");
        }
    }
    // Only workers hold senders/receivers from here on.
    drop(job_rx);
    drop(result_tx);

    let mut results = Vec::with_capacity(total);
    while results.len() < total {
        match result_rx.recv_blocking() {
            Ok(Ok(page)) => results.push(page),
            Ok(Err(err)) => {
                tracing::debug!(page = err.page_number, "page failed, abandoning remaining pages");
                cancel.cancel();
                return Err(err);
            }
            Err(_) => {
                // Every worker exited before all pages were reported.
                cancel.cancel();
                let missing = first_missing(&pages, &results);
                return Err(PageError::new(missing, PageFailure::Cancelled));
            }
        }
    }

    results.sort_by_key(|p| p.page_number);
    Ok(results)
}

fn page_worker(
    ctx: PageJobContext,
    jobs: async_channel::Receiver<u32>,
    results: async_channel::Sender<PageOutcome>,
    cancel: CancellationToken,
) {
    let opened = panic::catch_unwind(AssertUnwindSafe(|| ctx.backend.open(&ctx.bytes)));
    let document: Result<Box<dyn PdfDocument>, String> = match opened {
        Ok(Ok(document)) => Ok(document),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => Err(PageFailure::Panicked(panic_message(payload.as_ref())).to_string()),
    };

    while let Ok(page_number) = jobs.recv_blocking() {
        if cancel.is_cancelled() {
            break;
        }
        let outcome = match &document {
            Ok(document) => process_one(&ctx, document.as_ref(), page_number),
            // The file opened once already, so a failure here is specific to this worker.
            Err(message) => classify(
                ctx.error_handling,
                page_number,
                PageFailure::Extraction(message.clone()),
            ),
        };
        if results.send_blocking(outcome).is_err() {
            // Collector gave up.
            break;
        }
    }
}

fn process_one(ctx: &PageJobContext, document: &dyn PdfDocument, page_number: u32) -> PageOutcome {
    let run = || -> PageOutcome {
        let page = match document.page(page_number as usize - 1) {
            Ok(page) => page,
            Err(e) => {
                return classify(
                    ctx.error_handling,
                    page_number,
                    PageFailure::Extraction(e.to_string()),
                );
            }
        };
        PageProcessor::process(
            page.as_ref(),
            page_number,
            &ctx.table_settings,
            &ctx.text_settings,
            ctx.error_handling,
        )
    };

    match panic::catch_unwind(AssertUnwindSafe(run)) {
        Ok(outcome) => outcome,
        Err(payload) => classify(
            ctx.error_handling,
            page_number,
            PageFailure::Panicked(panic_message(payload.as_ref())),
        ),
    }
}

/// Apply the error-handling mode to a failure that happened outside
/// [`PageProcessor::process`].
fn classify(mode: ErrorHandling, page_number: u32, failure: PageFailure) -> PageOutcome {
    if mode.is_ignore() {
        tracing::warn!(page = page_number, error = %failure, "page extraction failed");
        Ok(PageResult::failed(page_number, failure.to_string()))
    } else {
        Err(PageError::new(page_number, failure))
    }
}

fn first_missing(pages: &[u32], done: &[PageResult]) -> u32 {
    let done: HashSet<u32> = done.iter().map(|r| r.page_number).collect();
    pages
        .iter()
        .copied()
        .find(|p| !done.contains(p))
        .unwrap_or(0)
}
