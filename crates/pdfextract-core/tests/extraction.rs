//! End-to-end extraction runs against the in-memory workspace and the mock
//! backend.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use pdfextract_core::mock::{MemoryWorkspace, MockBackend, MockDocument, MockPage};
use pdfextract_core::{
    BatchResult, ConfigBuilder, DirectoryWorkspace, ERROR_KEY, ExtractError, ExtractionOrchestrator,
    FileResult, PageFailure, ProgressEvent, RunState, TYPE_URI,
};
use tokio_util::sync::CancellationToken;

const PROJECT: &str = "project";

fn two_documents() -> MemoryWorkspace {
    MemoryWorkspace::new()
        .with_document(
            PROJECT,
            "a_1.pdf",
            &MockDocument::with_pages(3).meta("Title", "First"),
        )
        .with_document(
            PROJECT,
            "a_2.pdf",
            &MockDocument::new()
                .meta("Title", "Second")
                .page(MockPage::text("cells").with_table(vec![
                    vec!["h1".into(), "h2".into()],
                    vec!["1".into(), "2".into()],
                ])),
        )
}

async fn run(
    workspace: MemoryWorkspace,
    builder: ConfigBuilder,
) -> (Result<BatchResult, ExtractError>, Vec<ProgressEvent>) {
    let config = Arc::new(builder.build().unwrap());
    let mut orchestrator = ExtractionOrchestrator::new(
        config,
        Arc::new(MockBackend::new()),
        Arc::new(workspace),
    );
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let result = orchestrator
        .run_project(
            PROJECT,
            move |event| sink.lock().unwrap().push(event),
            CancellationToken::new(),
        )
        .await;
    let events = events.lock().unwrap().clone();
    (result, events)
}

/// Files keyed by name, for comparisons that ignore completion order.
fn by_name(files: &[FileResult]) -> Vec<(String, FileResult)> {
    let mut named: Vec<_> = files.iter().map(|f| (f.filename.clone(), f.clone())).collect();
    named.sort_by(|a, b| a.0.cmp(&b.0));
    named
}

#[tokio::test]
async fn per_file_mode_returns_one_result_per_file() {
    let (result, events) = run(
        two_documents(),
        ConfigBuilder::new().filename_regex(r"a_\d\.pdf").max_processes(2),
    )
    .await;
    let batch = result.unwrap();
    assert!(matches!(batch, BatchResult::PerFile(_)));

    let files = by_name(batch.files());
    assert_eq!(files.len(), 2);
    let (_, first) = &files[0];
    assert_eq!(first.metadata.get("Filename").unwrap(), "a_1.pdf");
    assert_eq!(first.metadata.get("Title").unwrap(), "First");
    assert_eq!(first.pages.len(), 3);
    let (_, second) = &files[1];
    assert_eq!(second.pages.len(), 1);
    assert_eq!(second.pages[0].tables.as_ref().unwrap()[0][1], vec!["1", "2"]);

    assert_eq!(events.first(), Some(&ProgressEvent::Started { total: 2 }));
    assert_eq!(
        events.last(),
        Some(&ProgressEvent::Finished {
            completed: 2,
            total: 2
        })
    );
    let completed: Vec<usize> = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::FileCompleted { .. }))
        .map(|e| e.completed())
        .collect();
    assert_eq!(completed, vec![1, 2]);
    assert_eq!(events[1].description(), "file processed");
    assert_eq!(events[2].description(), "files processed");

    let records = batch.into_records(TYPE_URI).unwrap();
    assert_eq!(records[0].uri, format!("{TYPE_URI}_1"));
    assert_eq!(records[1].uri, format!("{TYPE_URI}_2"));
}

#[tokio::test]
async fn combined_mode_matches_individual_results() {
    let (per_file, _) = run(
        two_documents(),
        ConfigBuilder::new().filename_regex(r"a_\d\.pdf"),
    )
    .await;
    let (combined, _) = run(
        two_documents(),
        ConfigBuilder::new()
            .filename_regex(r"a_\d\.pdf")
            .all_files(true),
    )
    .await;
    let per_file = per_file.unwrap();
    let combined = combined.unwrap();
    assert!(matches!(combined, BatchResult::Combined(_)));
    assert_eq!(by_name(per_file.files()), by_name(combined.files()));

    let records = combined.into_records(TYPE_URI).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].uri, format!("{TYPE_URI}_1"));
    assert_eq!(records[0].value.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn zero_byte_file_is_recorded_in_ignore_mode() {
    let workspace = MemoryWorkspace::new().with_resource(PROJECT, "empty.pdf", Vec::new());
    let (result, events) = run(
        workspace,
        ConfigBuilder::new()
            .filename_regex("empty")
            .error_handling("ignore"),
    )
    .await;
    let batch = result.unwrap();
    let file = &batch.files()[0];
    assert!(file.pages.is_empty());
    assert!(!file.metadata.get(ERROR_KEY).unwrap().is_empty());
    assert!(matches!(
        events[1],
        ProgressEvent::FileCompleted { failed: true, .. }
    ));
}

#[tokio::test]
async fn zero_byte_file_fails_the_run_in_strict_mode() {
    let workspace = MemoryWorkspace::new().with_resource(PROJECT, "empty.pdf", Vec::new());
    let (result, _) = run(
        workspace,
        ConfigBuilder::new()
            .filename_regex("empty")
            .error_handling("raise_on_error"),
    )
    .await;
    let err = result.unwrap_err();
    assert!(err.to_string().contains("empty.pdf"), "{err}");
}

fn warning_workspace() -> MemoryWorkspace {
    MemoryWorkspace::new().with_document(
        PROJECT,
        "warn.pdf",
        &MockDocument::new().page(
            MockPage::text("").with_diagnostic("Data-loss while decompressing corrupted data"),
        ),
    )
}

#[tokio::test]
async fn empty_text_warning_escalates_only_in_strictest_mode() {
    let (result, _) = run(
        warning_workspace(),
        ConfigBuilder::new()
            .filename_regex("warn")
            .error_handling("raise_on_error_and_warning"),
    )
    .await;
    match result.unwrap_err() {
        ExtractError::Page {
            filename,
            page,
            failure: PageFailure::Warning(message),
        } => {
            assert_eq!(filename, "warn.pdf");
            assert_eq!(page, 1);
            assert!(message.contains("Data-loss while decompressing corrupted data"));
        }
        other => panic!("unexpected error: {other}"),
    }

    for mode in ["raise_on_error", "ignore"] {
        let (result, _) = run(
            warning_workspace(),
            ConfigBuilder::new().filename_regex("warn").error_handling(mode),
        )
        .await;
        let batch = result.unwrap();
        let page = &batch.files()[0].pages[0];
        assert_eq!(page.text.as_deref(), Some(""));
        assert!(page.warning.as_ref().unwrap().contains("Data-loss"));
    }
}

#[tokio::test]
async fn selection_beyond_page_count_yields_no_pages() {
    let workspace = MemoryWorkspace::new().with_document(
        PROJECT,
        "five.pdf",
        &MockDocument::with_pages(5),
    );
    let (result, _) = run(
        workspace,
        ConfigBuilder::new().filename_regex("five").page_selection("8"),
    )
    .await;
    let batch = result.unwrap();
    assert!(batch.files()[0].pages.is_empty());
    assert!(batch.files()[0].error.is_none());
}

#[tokio::test]
async fn repeated_runs_are_equal_ignoring_order() {
    let builder = || {
        ConfigBuilder::new()
            .filename_regex(r"a_\d\.pdf")
            .max_processes(2)
            .max_threads(2)
    };
    let (first, _) = run(two_documents(), builder()).await;
    let (second, _) = run(two_documents(), builder()).await;
    assert_eq!(
        by_name(first.unwrap().files()),
        by_name(second.unwrap().files())
    );
}

#[tokio::test]
async fn strict_mode_stops_dispatching_pages_of_failing_file() {
    let mut document = MockDocument::new().page(MockPage::text("").failing_text("corrupt xref"));
    for n in 2..=30 {
        document = document.page(
            MockPage::text(&format!("page {n}")).with_delay(Duration::from_millis(25)),
        );
    }
    let workspace = MemoryWorkspace::new().with_document(PROJECT, "slow.pdf", &document);
    let backend = Arc::new(MockBackend::new());
    let config = Arc::new(
        ConfigBuilder::new()
            .filename_regex("slow")
            .max_threads(2)
            .build()
            .unwrap(),
    );
    let mut orchestrator =
        ExtractionOrchestrator::new(config, backend.clone(), Arc::new(workspace));
    let err = orchestrator
        .run_project(PROJECT, |_| {}, CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "File slow.pdf, page 1: Text extraction error: corrupt xref"
    );
    assert_eq!(orchestrator.state(), RunState::Aborted);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(backend.pages_extracted() < 30, "{}", backend.pages_extracted());
}

#[tokio::test]
async fn strict_file_failure_discards_in_flight_siblings() {
    let slow = |label: &str| {
        (1..=20).fold(MockDocument::new(), |doc, n| {
            doc.page(MockPage::text(&format!("{label} {n}")).with_delay(Duration::from_millis(50)))
        })
    };
    let workspace = MemoryWorkspace::new()
        .with_document(PROJECT, "big_1.pdf", &slow("first"))
        .with_document(PROJECT, "big_2.pdf", &slow("second"))
        .with_resource(PROJECT, "bad.pdf", Vec::new());
    let backend = Arc::new(MockBackend::new());
    let config = Arc::new(
        ConfigBuilder::new()
            .filename_regex(r"(big_\d|bad)\.pdf")
            .error_handling("raise_on_error")
            .max_processes(3)
            .max_threads(1)
            .build()
            .unwrap(),
    );
    let mut orchestrator =
        ExtractionOrchestrator::new(config, backend.clone(), Arc::new(workspace));

    let started = Instant::now();
    let err = orchestrator
        .run_project(PROJECT, |_| {}, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(started.elapsed() < Duration::from_millis(900), "{:?}", started.elapsed());
    assert!(matches!(err, ExtractError::Open { ref filename, .. } if filename == "bad.pdf"));
    assert_eq!(err.to_string(), "File bad.pdf: failed to open PDF: file is empty");
    assert_eq!(orchestrator.state(), RunState::Aborted);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(backend.pages_extracted() < 40, "{}", backend.pages_extracted());
}

#[tokio::test]
async fn unreadable_resource_is_an_open_error_in_ignore_mode() {
    let workspace = Arc::new(two_documents().with_unreadable(PROJECT, "locked.pdf"));
    let config = Arc::new(
        ConfigBuilder::new()
            .filename_regex(r"(a_\d|locked)\.pdf")
            .error_handling("ignore")
            .build()
            .unwrap(),
    );
    let mut orchestrator =
        ExtractionOrchestrator::new(config, Arc::new(MockBackend::new()), workspace.clone());
    let batch = orchestrator
        .run_project(PROJECT, |_| {}, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(workspace.fetch_count(), 3);
    assert_eq!(batch.files().len(), 3);
    let locked = batch
        .files()
        .iter()
        .find(|f| f.filename == "locked.pdf")
        .unwrap();
    assert!(locked.pages.is_empty());
    assert!(
        locked.metadata.get(ERROR_KEY).unwrap().contains("permission denied"),
        "{:?}",
        locked.metadata
    );
    let healthy = batch.files().iter().filter(|f| f.error.is_none()).count();
    assert_eq!(healthy, 2);
}

#[tokio::test]
async fn unreadable_resource_fails_the_run_in_strict_mode() {
    let workspace = Arc::new(MemoryWorkspace::new().with_unreadable(PROJECT, "locked.pdf"));
    let backend = Arc::new(MockBackend::new());
    let config = Arc::new(
        ConfigBuilder::new()
            .filename_regex("locked")
            .error_handling("raise_on_error")
            .build()
            .unwrap(),
    );
    let mut orchestrator = ExtractionOrchestrator::new(config, backend.clone(), workspace.clone());
    let err = orchestrator
        .run_project(PROJECT, |_| {}, CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(workspace.fetch_count(), 1);
    assert_eq!(backend.open_count(), 0);
    assert!(matches!(err, ExtractError::Open { .. }), "{err:?}");
    assert!(err.to_string().starts_with("File locked.pdf: "), "{err}");
    assert!(err.to_string().contains("permission denied"), "{err}");
}

#[tokio::test]
async fn ignore_mode_records_page_errors_and_continues() {
    let document = MockDocument::new()
        .page(MockPage::text("fine"))
        .page(MockPage::text("x").failing_text("bad font"))
        .page(MockPage::text("x").panicking("decoder crashed"))
        .page(MockPage::text("also fine"));
    let workspace = MemoryWorkspace::new().with_document(PROJECT, "mixed.pdf", &document);
    let (result, _) = run(
        workspace,
        ConfigBuilder::new()
            .filename_regex("mixed")
            .error_handling("ignore"),
    )
    .await;
    let batch = result.unwrap();
    let file = &batch.files()[0];
    assert_eq!(file.pages.len(), 4);
    assert_eq!(file.page_errors(), 2);
    assert_eq!(file.pages[3].text.as_deref(), Some("also fine"));
    assert_eq!(
        file.pages[1].error.as_deref(),
        Some("Text extraction error: bad font")
    );
}

#[tokio::test]
async fn one_corrupt_file_does_not_affect_siblings_in_ignore_mode() {
    let workspace = two_documents().with_resource(PROJECT, "a_3.pdf", b"%PDF-garbage".to_vec());
    let (result, _) = run(
        workspace,
        ConfigBuilder::new()
            .filename_regex(r"a_\d\.pdf")
            .error_handling("ignore")
            .max_processes(3),
    )
    .await;
    let batch = result.unwrap();
    let names: BTreeSet<_> = batch.files().iter().map(|f| f.filename.as_str()).collect();
    assert_eq!(names, BTreeSet::from(["a_1.pdf", "a_2.pdf", "a_3.pdf"]));
    let corrupt = batch
        .files()
        .iter()
        .find(|f| f.filename == "a_3.pdf")
        .unwrap();
    assert!(corrupt.metadata.contains_key(ERROR_KEY));
    assert!(corrupt.pages.is_empty());
}

#[tokio::test]
async fn empty_match_is_a_no_input_error() {
    let (result, _) = run(two_documents(), ConfigBuilder::new().filename_regex("zzz")).await;
    assert!(matches!(result, Err(ExtractError::NoInput { .. })));
}

#[tokio::test]
async fn directory_workspace_feeds_the_orchestrator() {
    let dir = tempfile::tempdir().unwrap();
    let project = dir.path().join(PROJECT);
    std::fs::create_dir(&project).unwrap();
    std::fs::write(project.join("doc.pdf"), MockDocument::with_pages(2).to_bytes()).unwrap();
    std::fs::write(project.join("skip.txt"), b"ignored").unwrap();

    let config = Arc::new(
        ConfigBuilder::new()
            .filename_regex(r".*\.pdf")
            .build()
            .unwrap(),
    );
    let mut orchestrator = ExtractionOrchestrator::new(
        config,
        Arc::new(MockBackend::new()),
        Arc::new(DirectoryWorkspace::new(dir.path())),
    );
    let batch = orchestrator
        .run_project(PROJECT, |_| {}, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(batch.files().len(), 1);
    assert_eq!(batch.files()[0].pages.len(), 2);
    assert_eq!(batch.files()[0].pages[1].text.as_deref(), Some("page 2"));
}
