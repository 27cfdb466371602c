//! Per-execution staging directories
//!
//! A workspace holds the submitted source and optional stdin file and is
//! bind-mounted into the sandbox. It is removed on every exit path: explicitly
//! through [`Workspace::remove`], or by `Drop` if the owner unwinds first.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::config::{INPUT_FILE_NAME, Language};

/// Errors while staging or removing a workspace
#[derive(Debug, Error)]
pub enum StagingError {
    #[error("failed to create workspace under {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {path}: {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to remove workspace {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A staged workspace directory
#[derive(Debug)]
pub struct Workspace {
    /// `None` once removed
    dir: Option<TempDir>,
    path: PathBuf,
    entry_file: &'static str,
    has_input: bool,
}

impl Workspace {
    /// Create a fresh directory under `root` and write the source (and input) into it
    ///
    /// The directory name embeds the execution id plus a random suffix, so
    /// concurrent executions never collide.
    #[instrument(skip(code, input))]
    pub async fn stage(
        root: &Path,
        execution_id: &str,
        language: Language,
        code: &str,
        input: Option<&str>,
    ) -> Result<Self, StagingError> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("execbox-{execution_id}-"))
            .tempdir_in(root)
            .map_err(|source| StagingError::CreateDir {
                path: root.to_path_buf(),
                source,
            })?;

        // From here on, dropping `dir` on an error path deletes the directory.
        let path = dir.path().to_path_buf();
        make_traversable(&path).await?;

        let entry_file = language.profile().entry_file;
        write_file(&path.join(entry_file), code.as_bytes()).await?;

        if let Some(input) = input {
            write_file(&path.join(INPUT_FILE_NAME), input.as_bytes()).await?;
        }

        debug!(?path, entry_file, has_input = input.is_some(), "workspace staged");

        Ok(Self {
            dir: Some(dir),
            path,
            entry_file,
            has_input: input.is_some(),
        })
    }

    /// Host path of the workspace directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name of the staged source file
    pub fn entry_file(&self) -> &'static str {
        self.entry_file
    }

    /// Whether an input file was staged
    pub fn has_input(&self) -> bool {
        self.has_input
    }

    /// Remove the directory and everything in it
    #[must_use = "removal errors should be handled"]
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn remove(mut self) -> Result<(), StagingError> {
        let Some(dir) = self.dir.take() else {
            return Ok(());
        };

        let path = self.path.clone();
        let closed = tokio::task::spawn_blocking(move || dir.close())
            .await
            .map_err(io::Error::other)
            .and_then(|result| result);

        let Err(first) = closed else {
            debug!("workspace removed");
            return Ok(());
        };

        // The guard is spent; retry once on whatever is left of the tree.
        warn!(error = %first, "workspace removal failed, retrying");
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => {
                debug!("workspace removed on retry");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => {
                warn!(error = %source, "workspace removal retry failed");
                Err(StagingError::Remove { path, source })
            }
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.dir.is_some() {
            // TempDir removes the directory when it drops right after this.
            warn!(
                path = %self.path.display(),
                "workspace dropped without explicit removal, deleting synchronously"
            );
        }
    }
}

async fn write_file(path: &Path, content: &[u8]) -> Result<(), StagingError> {
    tokio::fs::write(path, content)
        .await
        .map_err(|source| StagingError::WriteFile {
            path: path.to_path_buf(),
            source,
        })
}

/// Let non-root users inside the sandbox enter the directory
#[cfg(unix)]
async fn make_traversable(path: &Path) -> Result<(), StagingError> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .await
        .map_err(|source| StagingError::CreateDir {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(not(unix))]
async fn make_traversable(_path: &Path) -> Result<(), StagingError> {
    Ok(())
}
