//! Per-page capture of diagnostic output from an extraction backend.
//!
//! Backends never write warnings to a process-wide stream. Every extraction
//! call receives the [`WarningCapture`] of the page being processed, so
//! concurrent pages each fill their own buffer.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// Diagnostic sink owned by a single page-processing call.
#[derive(Debug, Default)]
pub struct WarningCapture {
    buffer: String,
    /// Text written through `fmt::Write` that has not reached a newline yet.
    partial: String,
}

impl WarningCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with a fresh capture and return its result together with the
    /// captured text.
    ///
    /// If `f` panics, the buffer is dropped and the panic continues unwinding.
    pub fn scope<T>(f: impl FnOnce(&mut WarningCapture) -> T) -> (T, String) {
        let mut capture = WarningCapture::new();
        match panic::catch_unwind(AssertUnwindSafe(|| f(&mut capture))) {
            Ok(value) => (value, capture.into_text()),
            Err(payload) => {
                capture.flush_partial();
                if !capture.is_empty() {
                    tracing::debug!(
                        target: "pdfextract::diagnostics",
                        captured = %capture.buffer.trim_end(),
                        "discarding diagnostics of panicked extraction"
                    );
                }
                panic::resume_unwind(payload)
            }
        }
    }

    /// Record one diagnostic message.
    pub fn emit(&mut self, message: impl fmt::Display) {
        let message = message.to_string();
        let message = message.trim_end();
        if message.is_empty() {
            return;
        }
        tracing::debug!(target: "pdfextract::diagnostics", "{message}");
        self.buffer.push_str(message);
        self.buffer.push('\n');
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.trim().is_empty() && self.partial.trim().is_empty()
    }

    pub fn into_text(mut self) -> String {
        self.flush_partial();
        self.buffer.trim_end().to_string()
    }

    fn flush_partial(&mut self) {
        if !self.partial.is_empty() {
            let line = std::mem::take(&mut self.partial);
            self.emit(line);
        }
    }
}

/// Written text is split into lines, each recorded with [`WarningCapture::emit`].
impl fmt::Write for WarningCapture {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.partial.push_str(s);
        while let Some(end) = self.partial.find('\n') {
            let line: String = self.partial.drain(..=end).collect();
            self.emit(line);
        }
        Ok(())
    }
}
