//! In-memory test doubles for the backend and workspace traits.
//!
//! A [`MockDocument`] is serialized to JSON and handed around as file bytes,
//! so the full open-bytes path is exercised. Bytes that are not a serialized
//! mock document fail to open, the same way a corrupt PDF does.

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::{BackendError, PdfBackend, PdfDocument, PdfPage};
use crate::capture::WarningCapture;
use crate::strategy::{TableSettings, TextSettings};
use crate::workspace::{ResourceError, ResourceInfo, ResourceProvider};
use crate::Table;

/// Scripted behaviour of one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MockPage {
    pub text: String,
    #[serde(default)]
    pub tables: Vec<Table>,
    /// Messages written to the capture during text extraction.
    #[serde(default)]
    pub diagnostics: Vec<String>,
    #[serde(default)]
    pub fail_text: Option<String>,
    #[serde(default)]
    pub fail_tables: Option<String>,
    #[serde(default)]
    pub panic: Option<String>,
    #[serde(default)]
    pub delay_ms: u64,
}

impl MockPage {
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Self::default()
        }
    }

    pub fn with_table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    pub fn with_diagnostic(mut self, message: &str) -> Self {
        self.diagnostics.push(message.to_string());
        self
    }

    pub fn failing_text(mut self, message: &str) -> Self {
        self.fail_text = Some(message.to_string());
        self
    }

    pub fn failing_tables(mut self, message: &str) -> Self {
        self.fail_tables = Some(message.to_string());
        self
    }

    pub fn panicking(mut self, message: &str) -> Self {
        self.panic = Some(message.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_ms = delay.as_millis() as u64;
        self
    }
}

impl PdfPage for MockPage {
    fn extract_text(
        &self,
        _settings: &TextSettings,
        capture: &mut WarningCapture,
    ) -> Result<String, BackendError> {
        if self.delay_ms > 0 {
            std::thread::sleep(Duration::from_millis(self.delay_ms));
        }
        if let Some(message) = &self.panic {
            panic!("{message}");
        }
        for diagnostic in &self.diagnostics {
            capture.emit(diagnostic);
        }
        match &self.fail_text {
            Some(message) => Err(BackendError::ExtractionError(message.clone())),
            None => Ok(self.text.clone()),
        }
    }

    fn extract_tables(
        &self,
        _settings: &TableSettings,
        _capture: &mut WarningCapture,
    ) -> Result<Vec<Table>, BackendError> {
        match &self.fail_tables {
            Some(message) => Err(BackendError::ExtractionError(message.clone())),
            None => Ok(self.tables.clone()),
        }
    }
}

/// A scripted document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MockDocument {
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub pages: Vec<MockPage>,
}

impl MockDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// A document of `count` pages with text `"page <n>"`.
    pub fn with_pages(count: usize) -> Self {
        Self {
            metadata: BTreeMap::new(),
            pages: (1..=count)
                .map(|n| MockPage::text(&format!("page {n}")))
                .collect(),
        }
    }

    pub fn meta(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn page(mut self, page: MockPage) -> Self {
        self.pages.push(page);
        self
    }

    /// Serialized form accepted by [`MockBackend::open`].
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap()
    }
}

/// Backend that opens serialized [`MockDocument`]s.
#[derive(Debug, Default)]
pub struct MockBackend {
    opens: AtomicUsize,
    pages_extracted: Arc<AtomicUsize>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times `open()` has been called (including failed opens).
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// How many pages had text extraction started.
    pub fn pages_extracted(&self) -> usize {
        self.pages_extracted.load(Ordering::SeqCst)
    }
}

impl PdfBackend for MockBackend {
    fn open(&self, bytes: &[u8]) -> Result<Box<dyn PdfDocument>, BackendError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if bytes.is_empty() {
            return Err(BackendError::OpenError("file is empty".into()));
        }
        let document: MockDocument = serde_json::from_slice(bytes)
            .map_err(|e| BackendError::OpenError(format!("not a document: {e}")))?;
        Ok(Box::new(OpenedMock {
            document,
            pages_extracted: Arc::clone(&self.pages_extracted),
        }))
    }
}

struct OpenedMock {
    document: MockDocument,
    pages_extracted: Arc<AtomicUsize>,
}

impl PdfDocument for OpenedMock {
    fn metadata(&self) -> BTreeMap<String, String> {
        self.document.metadata.clone()
    }

    fn page_count(&self) -> usize {
        self.document.pages.len()
    }

    fn page(&self, index: usize) -> Result<Box<dyn PdfPage + '_>, BackendError> {
        let page = self.document.pages.get(index).ok_or_else(|| {
            BackendError::ExtractionError(format!("page index {index} out of range"))
        })?;
        Ok(Box::new(CountedPage {
            page,
            counter: &self.pages_extracted,
        }))
    }
}

struct CountedPage<'a> {
    page: &'a MockPage,
    counter: &'a AtomicUsize,
}

impl PdfPage for CountedPage<'_> {
    fn extract_text(
        &self,
        settings: &TextSettings,
        capture: &mut WarningCapture,
    ) -> Result<String, BackendError> {
        self.counter.fetch_add(1, Ordering::SeqCst);
        self.page.extract_text(settings, capture)
    }

    fn extract_tables(
        &self,
        settings: &TableSettings,
        capture: &mut WarningCapture,
    ) -> Result<Vec<Table>, BackendError> {
        self.page.extract_tables(settings, capture)
    }
}

/// In-memory [`ResourceProvider`] holding one or more projects.
#[derive(Debug, Default)]
pub struct MemoryWorkspace {
    /// Resources per project in listing order. `None` bytes cannot be fetched.
    projects: Mutex<BTreeMap<String, Vec<(String, Option<Vec<u8>>)>>>,
    fetches: AtomicUsize,
}

impl MemoryWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a resource. Listing keeps insertion order.
    pub fn insert(&self, project: &str, name: &str, bytes: Vec<u8>) {
        self.store(project, name, Some(bytes));
    }

    fn store(&self, project: &str, name: &str, bytes: Option<Vec<u8>>) {
        let mut projects = self.projects.lock().unwrap();
        let resources = projects.entry(project.to_string()).or_default();
        match resources.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = bytes,
            None => resources.push((name.to_string(), bytes)),
        }
    }

    pub fn with_resource(self, project: &str, name: &str, bytes: Vec<u8>) -> Self {
        self.insert(project, name, bytes);
        self
    }

    pub fn with_document(self, project: &str, name: &str, document: &MockDocument) -> Self {
        self.with_resource(project, name, document.to_bytes())
    }

    /// A resource that is listed but whose bytes cannot be read.
    pub fn with_unreadable(self, project: &str, name: &str) -> Self {
        self.store(project, name, None);
        self
    }

    /// How many times `get_resource()` has been called.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl ResourceProvider for MemoryWorkspace {
    fn list_resources(&self, project: &str) -> Result<Vec<ResourceInfo>, ResourceError> {
        let projects = self.projects.lock().unwrap();
        let resources = projects
            .get(project)
            .ok_or_else(|| ResourceError::ProjectNotFound(project.to_string()))?;
        Ok(resources
            .iter()
            .map(|(name, _)| ResourceInfo { name: name.clone() })
            .collect())
    }

    fn get_resource(&self, project: &str, name: &str) -> Result<Vec<u8>, ResourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let projects = self.projects.lock().unwrap();
        let entry = projects
            .get(project)
            .and_then(|resources| resources.iter().find(|(n, _)| n == name));
        match entry {
            Some((_, Some(bytes))) => Ok(bytes.clone()),
            Some((_, None)) => Err(ResourceError::Io {
                path: PathBuf::from(project).join(name),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"),
            }),
            None => Err(ResourceError::NotFound {
                project: project.to_string(),
                name: name.to_string(),
            }),
        }
    }
}
