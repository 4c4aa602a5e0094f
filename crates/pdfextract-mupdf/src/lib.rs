use std::cmp::Ordering;
use std::collections::BTreeMap;

use mupdf::{Document, MetadataName, Page, TextPage, TextPageFlags};

use pdfextract_core::strategy::EdgeStrategy;
use pdfextract_core::{
    BackendError, PdfBackend, PdfDocument, PdfPage, Table, TableSettings, TextSettings,
    WarningCapture,
};

mod layout;

use layout::FragmentBuilder;

/// MuPDF-based implementation of [`PdfBackend`].
///
/// This crate is the sole AGPL island: it isolates the mupdf dependency
/// (which is AGPL-3.0) so that the pipeline crates do not transitively
/// depend on it.
///
/// Tables are detected from text alignment. MuPDF's text API does not expose
/// ruling lines, so the `lines` edge strategies use the same alignment
/// detector. Settings that depend on ruling geometry (`join_tolerance`,
/// `edge_min_length`, `intersection_tolerance`, `min_words_vertical`,
/// `snap_y_tolerance`) and the text `x_tolerance`/`y_tolerance` are accepted
/// but have no effect here.
///
/// MuPDF's internal warnings are not reported; only unmapped glyphs reach
/// the capture.
#[derive(Debug, Default)]
pub struct MupdfBackend;

impl MupdfBackend {
    pub fn new() -> Self {
        Self
    }
}

const METADATA_KEYS: [(MetadataName, &str); 8] = [
    (MetadataName::Title, "Title"),
    (MetadataName::Author, "Author"),
    (MetadataName::Subject, "Subject"),
    (MetadataName::Keywords, "Keywords"),
    (MetadataName::Creator, "Creator"),
    (MetadataName::Producer, "Producer"),
    (MetadataName::CreationDate, "CreationDate"),
    (MetadataName::ModDate, "ModDate"),
];

impl PdfBackend for MupdfBackend {
    fn open(&self, bytes: &[u8]) -> Result<Box<dyn PdfDocument>, BackendError> {
        if bytes.is_empty() {
            return Err(BackendError::OpenError("file is empty".into()));
        }
        let document = Document::from_bytes(bytes, "application/pdf")
            .map_err(|e| BackendError::OpenError(e.to_string()))?;
        let page_count = document
            .page_count()
            .map_err(|e| BackendError::OpenError(e.to_string()))?;
        tracing::trace!(bytes = bytes.len(), page_count, "opened document with mupdf");
        Ok(Box::new(MupdfDocument {
            document,
            page_count: usize::try_from(page_count).unwrap_or(0),
        }))
    }
}

struct MupdfDocument {
    document: Document,
    page_count: usize,
}

impl PdfDocument for MupdfDocument {
    fn metadata(&self) -> BTreeMap<String, String> {
        METADATA_KEYS
            .into_iter()
            .filter_map(|(name, key)| {
                let value = self.document.metadata(name).ok()?;
                let value = value.trim();
                (!value.is_empty()).then(|| (key.to_string(), value.to_string()))
            })
            .collect()
    }

    fn page_count(&self) -> usize {
        self.page_count
    }

    fn page(&self, index: usize) -> Result<Box<dyn PdfPage + '_>, BackendError> {
        let index = i32::try_from(index).map_err(|_| {
            BackendError::ExtractionError(format!("page index {index} out of range"))
        })?;
        let page = self
            .document
            .load_page(index)
            .map_err(|e| BackendError::ExtractionError(e.to_string()))?;
        Ok(Box::new(MupdfPage { page }))
    }
}

struct MupdfPage {
    page: Page,
}

impl MupdfPage {
    fn text_page(&self, flags: TextPageFlags) -> Result<TextPage, BackendError> {
        self.page
            .to_text_page(flags)
            .map_err(|e| BackendError::ExtractionError(e.to_string()))
    }
}

fn report_unmapped(count: usize, capture: &mut WarningCapture) {
    if count > 0 {
        capture.emit(format!(
            "{count} glyph(s) could not be mapped to Unicode and were dropped"
        ));
    }
}

/// Collapse whitespace runs to single spaces.
fn collapse_whitespace(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl PdfPage for MupdfPage {
    fn extract_text(
        &self,
        settings: &TextSettings,
        capture: &mut WarningCapture,
    ) -> Result<String, BackendError> {
        let flags = if settings.keep_blank_chars {
            TextPageFlags::PRESERVE_WHITESPACE
        } else {
            TextPageFlags::empty()
        };
        let text_page = self.text_page(flags)?;

        let mut blocks: Vec<(f32, f32, Vec<String>)> = Vec::new();
        let mut unmapped = 0usize;
        for block in text_page.blocks() {
            let bounds = block.bounds();
            let mut lines = Vec::new();
            for line in block.lines() {
                let mut text = String::new();
                for c in line.chars() {
                    match c.char() {
                        Some(ch) => text.push(ch),
                        None => unmapped += 1,
                    }
                }
                let text = if settings.keep_blank_chars {
                    text
                } else {
                    collapse_whitespace(&text)
                };
                if !text.is_empty() {
                    lines.push(text);
                }
            }
            if !lines.is_empty() {
                blocks.push((bounds.y0, bounds.x0, lines));
            }
        }
        report_unmapped(unmapped, capture);

        if !settings.use_text_flow {
            // Reading order: top to bottom, then left to right.
            blocks.sort_by(|a, b| {
                a.0.partial_cmp(&b.0)
                    .unwrap_or(Ordering::Equal)
                    .then(a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
            });
        }

        let separator = if settings.layout { "\n\n" } else { "\n" };
        Ok(blocks
            .into_iter()
            .map(|(_, _, lines)| lines.join("\n"))
            .collect::<Vec<_>>()
            .join(separator))
    }

    fn extract_tables(
        &self,
        settings: &TableSettings,
        capture: &mut WarningCapture,
    ) -> Result<Vec<Table>, BackendError> {
        if matches!(settings.vertical_strategy, Some(EdgeStrategy::Explicit))
            || matches!(settings.horizontal_strategy, Some(EdgeStrategy::Explicit))
        {
            return Err(BackendError::ExtractionError(
                "explicit table edges are not supported".into(),
            ));
        }

        let text_page = self.text_page(TextPageFlags::empty())?;
        let mut builder = FragmentBuilder::new(settings.effective_x_tolerance() as f32);
        let mut unmapped = 0usize;
        for block in text_page.blocks() {
            for line in block.lines() {
                for c in line.chars() {
                    let Some(ch) = c.char() else {
                        unmapped += 1;
                        continue;
                    };
                    let quad = c.quad();
                    builder.push(
                        ch,
                        quad.ul.x.min(quad.ll.x),
                        quad.ur.x.max(quad.lr.x),
                        quad.ll.y.max(quad.lr.y),
                    );
                }
                builder.end_line();
            }
        }
        report_unmapped(unmapped, capture);

        let y_tolerance = settings.text_y_tolerance.unwrap_or(3.0) as f32;
        let rows = layout::rows(builder.finish(), y_tolerance);
        Ok(layout::tables(rows, settings.effective_min_columns()))
    }
}
