use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::ConfigBuilder;

/// File name looked up in the working directory.
pub const LOCAL_CONFIG_NAME: &str = ".pdfextract.toml";

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub workspace: Option<WorkspaceConfig>,
    pub extraction: Option<ExtractionConfig>,
    pub concurrency: Option<ConcurrencyConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Directory whose subdirectories are projects.
    pub root: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    pub error_handling: Option<String>,
    pub table_strategy: Option<String>,
    pub custom_table_strategy: Option<String>,
    pub text_strategy: Option<String>,
    pub custom_text_strategy: Option<String>,
    pub page_selection: Option<String>,
    pub all_files: Option<bool>,
    pub type_uri: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    pub max_processes: Option<usize>,
    pub max_threads: Option<usize>,
}

/// Platform config directory path: `<config_dir>/pdfextract/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("pdfextract").join("config.toml"))
}

/// Load config by cascading CWD `.pdfextract.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(LOCAL_CONFIG_NAME));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparsable config file");
            None
        }
    }
}

fn pick<S, T: Clone>(
    overlay: &Option<S>,
    base: &Option<S>,
    field: impl Fn(&S) -> Option<T>,
) -> Option<T> {
    overlay
        .as_ref()
        .and_then(&field)
        .or_else(|| base.as_ref().and_then(&field))
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let (bw, ow) = (&base.workspace, &overlay.workspace);
    let (be, oe) = (&base.extraction, &overlay.extraction);
    let (bc, oc) = (&base.concurrency, &overlay.concurrency);
    ConfigFile {
        workspace: Some(WorkspaceConfig {
            root: pick(ow, bw, |w| w.root.clone()),
        }),
        extraction: Some(ExtractionConfig {
            error_handling: pick(oe, be, |e| e.error_handling.clone()),
            table_strategy: pick(oe, be, |e| e.table_strategy.clone()),
            custom_table_strategy: pick(oe, be, |e| e.custom_table_strategy.clone()),
            text_strategy: pick(oe, be, |e| e.text_strategy.clone()),
            custom_text_strategy: pick(oe, be, |e| e.custom_text_strategy.clone()),
            page_selection: pick(oe, be, |e| e.page_selection.clone()),
            all_files: pick(oe, be, |e| e.all_files),
            type_uri: pick(oe, be, |e| e.type_uri.clone()),
        }),
        concurrency: Some(ConcurrencyConfig {
            max_processes: pick(oc, bc, |c| c.max_processes),
            max_threads: pick(oc, bc, |c| c.max_threads),
        }),
    }
}

impl ConfigFile {
    /// Seed a [`ConfigBuilder`] with the values present in this file.
    /// Later builder calls (e.g. from CLI flags) override them.
    pub fn apply(&self, mut builder: ConfigBuilder) -> ConfigBuilder {
        if let Some(e) = &self.extraction {
            if let Some(v) = &e.error_handling {
                builder = builder.error_handling(v);
            }
            if let Some(v) = &e.table_strategy {
                builder = builder.table_strategy(v);
            }
            if let Some(v) = &e.custom_table_strategy {
                builder = builder.custom_table_strategy(v);
            }
            if let Some(v) = &e.text_strategy {
                builder = builder.text_strategy(v);
            }
            if let Some(v) = &e.custom_text_strategy {
                builder = builder.custom_text_strategy(v);
            }
            if let Some(v) = &e.page_selection {
                builder = builder.page_selection(v);
            }
            if let Some(v) = e.all_files {
                builder = builder.all_files(v);
            }
            if let Some(v) = &e.type_uri {
                builder = builder.type_uri(v);
            }
        }
        if let Some(c) = &self.concurrency {
            if let Some(n) = c.max_processes {
                builder = builder.max_processes(n);
            }
            if let Some(n) = c.max_threads {
                builder = builder.max_threads(n);
            }
        }
        builder
    }

    pub fn workspace_root(&self) -> Option<&str> {
        self.workspace.as_ref().and_then(|w| w.root.as_deref())
    }
}
