use async_trait::async_trait;
use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command as AsyncCommand;
use tracing::debug;

use crate::error::ClonerError;

/// What currently sits at a repository's local path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalState {
    /// Nothing there yet
    Absent,
    /// An empty directory
    Empty,
    /// A directory holding a git repository
    Repository,
    /// A file, or a non-empty directory that is not a repository
    NotARepository,
}

impl LocalState {
    /// Inspect `path` without modifying anything
    pub fn inspect(path: &Path) -> io::Result<Self> {
        let meta = match std::fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::Absent),
            Err(e) => return Err(e),
        };

        if !meta.is_dir() {
            return Ok(Self::NotARepository);
        }

        if path.join(".git").exists() {
            return Ok(Self::Repository);
        }

        if std::fs::read_dir(path)?.next().is_none() {
            Ok(Self::Empty)
        } else {
            Ok(Self::NotARepository)
        }
    }
}

/// The git operations a sync needs
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GitRunner: Send + Sync {
    /// Check that the executable runs; returns its version string
    async fn version(&self) -> Result<String, ClonerError>;

    /// Clone `remote_url` into `local_path`
    async fn clone_repo(&self, remote_url: &str, local_path: &Path) -> Result<(), ClonerError>;

    /// Update all remote refs of the repository at `local_path` without merging
    async fn fetch(&self, local_path: &Path) -> Result<(), ClonerError>;
}

/// Runs the `git` executable as a subprocess
#[derive(Debug, Clone)]
pub struct GitClient {
    program: PathBuf,
}

impl Default for GitClient {
    fn default() -> Self {
        Self::new("git")
    }
}

impl GitClient {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, args: &[&OsStr]) -> Result<Output, ClonerError> {
        debug!("Running {} {:?}", self.program.display(), args);

        AsyncCommand::new(&self.program)
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => ClonerError::GitNotFound,
                _ => ClonerError::Io(e),
            })
    }
}

fn stderr_message(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        format!("git exited with {}", output.status)
    } else {
        stderr
    }
}

#[async_trait]
impl GitRunner for GitClient {
    async fn version(&self) -> Result<String, ClonerError> {
        let output = self.run(&[OsStr::new("--version")]).await?;
        if !output.status.success() {
            return Err(ClonerError::GitNotFound);
        }

        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!("git: {}", version);
        Ok(version)
    }

    async fn clone_repo(&self, remote_url: &str, local_path: &Path) -> Result<(), ClonerError> {
        debug!("Cloning {} -> {}", remote_url, local_path.display());

        let output = self
            .run(&[
                OsStr::new("clone"),
                OsStr::new("--"),
                OsStr::new(remote_url),
                local_path.as_os_str(),
            ])
            .await?;

        if !output.status.success() {
            return Err(ClonerError::Clone {
                path: local_path.to_path_buf(),
                message: stderr_message(&output),
            });
        }

        Ok(())
    }

    async fn fetch(&self, local_path: &Path) -> Result<(), ClonerError> {
        debug!("Fetching {}", local_path.display());

        let output = self
            .run(&[
                OsStr::new("-C"),
                local_path.as_os_str(),
                OsStr::new("fetch"),
                OsStr::new("--all"),
            ])
            .await?;

        if !output.status.success() {
            return Err(ClonerError::Fetch {
                path: local_path.to_path_buf(),
                message: stderr_message(&output),
            });
        }

        Ok(())
    }
}
