use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use pdfextract_core::config_file::{self, ConfigFile};
use pdfextract_core::{
    ConfigBuilder, DirectoryWorkspace, ErrorHandling, ExtractionOrchestrator, ProgressEvent,
    TableStrategy, TextStrategy, describe_matches, resolve_filenames,
};
use pdfextract_mupdf::MupdfBackend;

mod output;

use output::ColorMode;

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Extract text and tables from the PDF files of a workspace project
#[derive(Parser, Debug)]
#[command(name = "pdfextract", version, about, long_about = None)]
struct Cli {
    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct Target {
    /// Project (subdirectory of the workspace) to read resources from
    project: String,

    /// Regular expression matched against the start of each resource name
    #[arg(short, long)]
    regex: String,

    /// Workspace directory [default: from config file, else current directory]
    #[arg(short, long)]
    workspace: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract matching PDF files and write the output records as JSON
    Extract {
        #[command(flatten)]
        target: Target,

        /// Output the content of all files as one record
        #[arg(long)]
        combined: bool,

        /// Error handling mode
        #[arg(long, value_parser = ErrorHandling::CHOICES)]
        error_handling: Option<String>,

        /// Table extraction strategy
        #[arg(long, value_parser = TableStrategy::CHOICES)]
        table_strategy: Option<String>,

        /// YAML file with a custom table strategy (used with --table-strategy custom)
        #[arg(long)]
        custom_table_strategy: Option<PathBuf>,

        /// Text extraction strategy
        #[arg(long, value_parser = TextStrategy::CHOICES)]
        text_strategy: Option<String>,

        /// YAML file with a custom text strategy (used with --text-strategy custom)
        #[arg(long)]
        custom_text_strategy: Option<PathBuf>,

        /// Pages to extract, e.g. "1,3-5". Empty means all pages
        #[arg(long)]
        page_selection: Option<String>,

        /// Maximum number of files processed concurrently
        #[arg(long)]
        max_processes: Option<usize>,

        /// Maximum number of page threads per file
        #[arg(long)]
        max_threads: Option<usize>,

        /// Write records to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Do not show a progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// List the resources a regex would select
    List {
        #[command(flatten)]
        target: Target,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_file.as_deref())?;
    let color = ColorMode(!cli.no_color);
    let file_config = config_file::load_config();

    match cli.command {
        Command::List { target } => list(target, &file_config, color),
        Command::Extract {
            target,
            combined,
            error_handling,
            table_strategy,
            custom_table_strategy,
            text_strategy,
            custom_text_strategy,
            page_selection,
            max_processes,
            max_threads,
            output,
            no_progress,
        } => {
            let mut builder = file_config.apply(ConfigBuilder::new().filename_regex(&target.regex));
            if combined {
                builder = builder.all_files(true);
            }
            if let Some(mode) = &error_handling {
                builder = builder.error_handling(mode);
            }
            if let Some(strategy) = &table_strategy {
                builder = builder.table_strategy(strategy);
            }
            if let Some(path) = &custom_table_strategy {
                builder = builder.custom_table_strategy(&read_strategy_file(path)?);
            }
            if let Some(strategy) = &text_strategy {
                builder = builder.text_strategy(strategy);
            }
            if let Some(path) = &custom_text_strategy {
                builder = builder.custom_text_strategy(&read_strategy_file(path)?);
            }
            if let Some(selection) = &page_selection {
                builder = builder.page_selection(selection);
            }
            if let Some(n) = max_processes {
                builder = builder.max_processes(n);
            }
            if let Some(n) = max_threads {
                builder = builder.max_threads(n);
            }
            extract(target, builder, &file_config, output, no_progress, color).await
        }
    }
}

/// Install the global subscriber. The returned guard flushes the log file on drop.
fn init_tracing(
    log_file: Option<&Path>,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,pdfextract=info"));

    match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .with_context(|| format!("invalid log file path: {}", path.display()))?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(writer).with_ansi(false).with_target(true))
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
                .init();
            Ok(None)
        }
    }
}

fn read_strategy_file(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("failed to read strategy file {}", path.display()))
}

fn workspace_for(target: &Target, file_config: &ConfigFile) -> anyhow::Result<DirectoryWorkspace> {
    let root = target
        .workspace
        .clone()
        .or_else(|| file_config.workspace_root().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));
    if !root.is_dir() {
        anyhow::bail!("Workspace directory not found: {}", root.display());
    }
    let workspace = DirectoryWorkspace::new(root);
    tracing::debug!(root = %workspace.root().display(), "using workspace directory");
    Ok(workspace)
}

fn list(target: Target, file_config: &ConfigFile, color: ColorMode) -> anyhow::Result<()> {
    let workspace = workspace_for(&target, file_config)?;
    let config = ConfigBuilder::new().filename_regex(&target.regex).build()?;
    let names = resolve_filenames(&workspace, &target.project, &config)?;
    let description = describe_matches(&workspace, &target.project, &config)?;
    let mut stdout = std::io::stdout();
    output::print_matches(&mut stdout, &names, &description, color)?;
    Ok(())
}

async fn extract(
    target: Target,
    builder: ConfigBuilder,
    file_config: &ConfigFile,
    output: Option<PathBuf>,
    no_progress: bool,
    color: ColorMode,
) -> anyhow::Result<()> {
    use indicatif::{ProgressBar, ProgressStyle};

    let workspace = workspace_for(&target, file_config)?;
    let config = Arc::new(builder.build()?);

    let bar = if no_progress {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(0)
    };
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.green/dim}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("=> "),
    );
    let progress = {
        let bar = bar.clone();
        move |event: ProgressEvent| match &event {
            ProgressEvent::Started { total } => {
                bar.set_length(*total as u64);
                bar.set_message(event.description());
            }
            ProgressEvent::FileCompleted { filename, completed, .. } => {
                bar.set_position(*completed as u64);
                bar.set_message(format!("{} ({filename})", event.description()));
            }
            ProgressEvent::Finished { .. } => {
                bar.finish_with_message(event.description());
            }
        }
    };

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_clone.cancel();
        }
    });

    let mut orchestrator = ExtractionOrchestrator::new(
        config,
        Arc::new(MupdfBackend::new()),
        Arc::new(workspace),
    );
    let batch = match orchestrator.run_project(&target.project, progress, cancel).await {
        Ok(batch) => batch,
        Err(e) => {
            bar.abandon();
            return Err(e.into());
        }
    };

    let mut stderr = std::io::stderr();
    output::print_summary(&mut stderr, batch.files(), color)?;

    let records = batch.into_records(&orchestrator.config().type_uri)?;
    let json = serde_json::to_string_pretty(&records)?;
    match output {
        Some(path) => {
            std::fs::write(&path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), records = records.len(), "wrote output");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{json}")?;
        }
    }
    Ok(())
}
