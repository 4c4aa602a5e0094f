//! Access to the resources (files) of a workspace project.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("project not found: {0}")]
    ProjectNotFound(String),
    #[error("resource {name:?} not found in project {project:?}")]
    NotFound { project: String, name: String },
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A resource listed in a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfo {
    pub name: String,
}

/// Source of project resources.
///
/// Implementations are shared between file workers and must be callable
/// from blocking threads.
pub trait ResourceProvider: Send + Sync {
    fn list_resources(&self, project: &str) -> Result<Vec<ResourceInfo>, ResourceError>;

    fn get_resource(&self, project: &str, name: &str) -> Result<Vec<u8>, ResourceError>;
}

/// A workspace on disk: each project is a subdirectory of `root` and its
/// resources are the regular files directly inside it.
#[derive(Debug, Clone)]
pub struct DirectoryWorkspace {
    root: PathBuf,
}

impl DirectoryWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn project_dir(&self, project: &str) -> Result<PathBuf, ResourceError> {
        let dir = self.root.join(project);
        if !dir.is_dir() {
            return Err(ResourceError::ProjectNotFound(project.to_string()));
        }
        Ok(dir)
    }
}

impl ResourceProvider for DirectoryWorkspace {
    fn list_resources(&self, project: &str) -> Result<Vec<ResourceInfo>, ResourceError> {
        let dir = self.project_dir(project)?;
        let io_err = |source| ResourceError::Io {
            path: dir.clone(),
            source,
        };

        let mut resources = Vec::new();
        for entry in std::fs::read_dir(&dir).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            if !entry.file_type().map_err(io_err)?.is_file() {
                continue;
            }
            // Names that are not valid UTF-8 cannot be matched by the filename regex.
            if let Some(name) = entry.file_name().to_str() {
                resources.push(ResourceInfo {
                    name: name.to_string(),
                });
            }
        }
        resources.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(resources)
    }

    fn get_resource(&self, project: &str, name: &str) -> Result<Vec<u8>, ResourceError> {
        let dir = self.project_dir(project)?;
        let path = dir.join(name);
        // Reject names that would escape the project directory.
        if Path::new(name).components().count() != 1 || !path.is_file() {
            return Err(ResourceError::NotFound {
                project: project.to_string(),
                name: name.to_string(),
            });
        }
        std::fs::read(&path).map_err(|source| ResourceError::Io { path, source })
    }
}
