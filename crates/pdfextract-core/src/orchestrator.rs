//! Batch orchestration: fan files out to a bounded pool of blocking workers
//! and gather their results in completion order.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::backend::PdfBackend;
use crate::config::Config;
use crate::file::FileProcessor;
use crate::page::panic_message;
use crate::workspace::ResourceProvider;
use crate::{BatchResult, ExtractError, FileResult, OutputMode, ProgressEvent};

/// Lifecycle of one orchestrator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Dispatching,
    Collecting,
    Completed,
    Aborted,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Dispatching => "dispatching",
            RunState::Collecting => "collecting",
            RunState::Completed => "completed",
            RunState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Names of the project's resources matched by the configured filename
/// regex, in listing order.
pub fn resolve_filenames(
    provider: &dyn ResourceProvider,
    project: &str,
    config: &Config,
) -> Result<Vec<String>, ExtractError> {
    let resources = provider
        .list_resources(project)
        .map_err(ExtractError::Listing)?;
    Ok(resources
        .into_iter()
        .map(|r| r.name)
        .filter(|name| config.matches(name))
        .collect())
}

/// Human-readable count of matching resources, e.g. `"2 files found."`.
pub fn describe_matches(
    provider: &dyn ResourceProvider,
    project: &str,
    config: &Config,
) -> Result<String, ExtractError> {
    let count = resolve_filenames(provider, project, config)?.len();
    let noun = if count == 1 { "file" } else { "files" };
    Ok(format!("{count} {noun} found."))
}

/// Runs one extraction batch.
///
/// A fresh orchestrator starts [`RunState::Idle`]; [`run`](Self::run) moves
/// it to `Completed` or `Aborted`.
pub struct ExtractionOrchestrator {
    config: Arc<Config>,
    backend: Arc<dyn PdfBackend>,
    provider: Arc<dyn ResourceProvider>,
    state: RunState,
}

/// What a file task hands back to the collector.
type FileOutcome = (String, Result<Result<FileResult, ExtractError>, tokio::task::JoinError>);

impl ExtractionOrchestrator {
    pub fn new(
        config: Arc<Config>,
        backend: Arc<dyn PdfBackend>,
        provider: Arc<dyn ResourceProvider>,
    ) -> Self {
        Self {
            config,
            backend,
            provider,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn transition(&mut self, next: RunState) {
        tracing::debug!(from = %self.state, to = %next, "run state");
        self.state = next;
    }

    /// Resolve the project's matching resources and extract them.
    pub async fn run_project(
        &mut self,
        project: &str,
        progress: impl Fn(ProgressEvent) + Send + Sync,
        cancel: CancellationToken,
    ) -> Result<BatchResult, ExtractError> {
        let filenames = resolve_filenames(self.provider.as_ref(), project, &self.config)?;
        tracing::info!(
            project,
            files = filenames.len(),
            pattern = %self.config.pattern,
            "resolved input files"
        );
        self.run(project, filenames, progress, cancel).await
    }

    /// Extract `filenames` from `project`.
    ///
    /// Files are processed by at most `max_processes` blocking workers and
    /// collected as they finish. In the strict modes the first failure aborts
    /// the run: the remaining tasks are dropped and their page pools
    /// cancelled. In `ignore` mode failed files become results with an error.
    pub async fn run(
        &mut self,
        project: &str,
        filenames: Vec<String>,
        progress: impl Fn(ProgressEvent) + Send + Sync,
        cancel: CancellationToken,
    ) -> Result<BatchResult, ExtractError> {
        if filenames.is_empty() {
            self.transition(RunState::Aborted);
            return Err(ExtractError::NoInput {
                pattern: self.config.pattern.clone(),
            });
        }

        let total = filenames.len();
        let mode = self.config.error_handling;
        let run_cancel = cancel.child_token();
        let processor = FileProcessor::new(Arc::clone(&self.backend), &self.config);
        let permits = Arc::new(Semaphore::new(self.config.max_processes));

        self.transition(RunState::Dispatching);
        progress(ProgressEvent::Started { total });

        let mut join_set: JoinSet<FileOutcome> = JoinSet::new();
        let mut task_files = HashMap::with_capacity(total);
        for filename in filenames {
            let processor = processor.clone();
            let provider = Arc::clone(&self.provider);
            let permits = Arc::clone(&permits);
            let cancel = run_cancel.clone();
            let project = project.to_string();
            let name = filename.clone();

            let handle = join_set.spawn(async move {
                // Closed only if the semaphore is dropped, which cannot happen
                // while this task holds an Arc to it.
                let _permit = permits.acquire_owned().await;
                let task_name = name.clone();
                let outcome = tokio::task::spawn_blocking(move || {
                    if cancel.is_cancelled() {
                        return Err(ExtractError::Cancelled);
                    }
                    let bytes = match provider.get_resource(&project, &task_name) {
                        Ok(bytes) => bytes,
                        Err(e) => return processor.fetch_failed(&task_name, e.to_string()),
                    };
                    processor.process(&task_name, Arc::from(bytes), &cancel)
                })
                .await;
                (name, outcome)
            });
            task_files.insert(handle.id(), filename);
        }

        self.transition(RunState::Collecting);

        let mut files = Vec::with_capacity(total);
        loop {
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    run_cancel.cancel();
                    self.transition(RunState::Aborted);
                    return Err(ExtractError::Cancelled);
                }
                joined = join_set.join_next_with_id() => joined,
            };
            let Some(joined) = joined else { break };

            let (filename, result) = match joined {
                Ok((_, (filename, Ok(result)))) => (filename, result),
                Ok((_, (filename, Err(join_err)))) => {
                    let message = worker_message(join_err);
                    (filename.clone(), Err(ExtractError::Worker { filename, message }))
                }
                Err(join_err) => {
                    let filename = task_files
                        .get(&join_err.id())
                        .cloned()
                        .unwrap_or_default();
                    let message = worker_message(join_err);
                    (filename.clone(), Err(ExtractError::Worker { filename, message }))
                }
            };

            let file = match result {
                Ok(file) => file,
                Err(err) if mode.is_ignore() => {
                    tracing::warn!(filename = %filename, error = %err, "file failed");
                    FileResult::failed(&filename, err.underlying_message())
                }
                Err(err) => {
                    tracing::debug!(filename = %filename, "aborting run after file failure");
                    run_cancel.cancel();
                    join_set.abort_all();
                    self.transition(RunState::Aborted);
                    return Err(err);
                }
            };

            let failed = file.error.is_some();
            files.push(file);
            let completed = files.len();
            tracing::info!(filename = %filename, completed, total, "processed file");
            progress(ProgressEvent::FileCompleted {
                filename,
                completed,
                total,
                failed,
            });
        }

        tracing::info!(files = files.len(), "finished processing all files");
        progress(ProgressEvent::Finished {
            completed: files.len(),
            total,
        });
        self.transition(RunState::Completed);

        Ok(match self.config.output_mode {
            OutputMode::PerFile => BatchResult::PerFile(files),
            OutputMode::Combined => BatchResult::Combined(files),
        })
    }
}

fn worker_message(err: tokio::task::JoinError) -> String {
    if err.is_panic() {
        format!("worker panicked: {}", panic_message(err.into_panic().as_ref()))
    } else {
        "worker was cancelled".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MemoryWorkspace, MockBackend, MockDocument};
    use crate::ConfigBuilder;

    fn workspace() -> MemoryWorkspace {
        MemoryWorkspace::new()
            .with_document("p", "report_1.pdf", &MockDocument::with_pages(1))
            .with_document("p", "report_2.pdf", &MockDocument::with_pages(2))
            .with_resource("p", "notes.txt", b"plain".to_vec())
    }

    fn config(pattern: &str) -> Config {
        ConfigBuilder::new().filename_regex(pattern).build().unwrap()
    }

    #[test]
    fn test_resolve_filenames_is_anchored() {
        let ws = workspace();
        assert_eq!(
            resolve_filenames(&ws, "p", &config(r"report_\d\.pdf")).unwrap(),
            vec!["report_1.pdf", "report_2.pdf"]
        );
        assert!(resolve_filenames(&ws, "p", &config("pdf")).unwrap().is_empty());
        assert!(matches!(
            resolve_filenames(&ws, "missing", &config(".*")),
            Err(ExtractError::Listing(_))
        ));
    }

    #[test]
    fn test_describe_matches() {
        let ws = workspace();
        assert_eq!(
            describe_matches(&ws, "p", &config(r"report_.*\.pdf")).unwrap(),
            "2 files found."
        );
        assert_eq!(
            describe_matches(&ws, "p", &config("notes")).unwrap(),
            "1 file found."
        );
        assert_eq!(
            describe_matches(&ws, "p", &config("zzz")).unwrap(),
            "0 files found."
        );
    }

    #[tokio::test]
    async fn test_state_moves_to_completed() {
        let mut orchestrator = ExtractionOrchestrator::new(
            Arc::new(config(r"report_.*")),
            Arc::new(MockBackend::new()),
            Arc::new(workspace()),
        );
        assert_eq!(orchestrator.state(), RunState::Idle);
        let batch = orchestrator
            .run_project("p", |_| {}, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(batch.files().len(), 2);
        assert_eq!(orchestrator.state(), RunState::Completed);
    }

    #[tokio::test]
    async fn test_no_input_is_fatal() {
        let mut orchestrator = ExtractionOrchestrator::new(
            Arc::new(config("nothing_matches")),
            Arc::new(MockBackend::new()),
            Arc::new(workspace()),
        );
        let err = orchestrator
            .run_project("p", |_| {}, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::NoInput { .. }));
        assert_eq!(orchestrator.state(), RunState::Aborted);
    }

    #[tokio::test]
    async fn test_caller_cancellation_aborts() {
        let mut orchestrator = ExtractionOrchestrator::new(
            Arc::new(config(r"report_.*")),
            Arc::new(MockBackend::new()),
            Arc::new(workspace()),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = orchestrator
            .run_project("p", |_| {}, cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Cancelled));
        assert_eq!(orchestrator.state(), RunState::Aborted);
    }
}
