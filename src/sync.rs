//! Sync Engine - Orchestrates namespace mirroring
//!
//! This module ties the pieces together: it verifies git and the API token,
//! resolves the namespace, enumerates its repositories and then clones or
//! fetches them one at a time, recording every outcome in the [`Reporter`].

use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{RunOptions, TokenSource};
use crate::discovery::{Enumerator, ExcludedKind, RepoSpec};
use crate::error::ClonerError;
use crate::git::{GitClient, GitRunner, LocalState};
use crate::gitlab::{GitLabClient, NamespaceApi};
use crate::paths::PathMapper;
use crate::report::Reporter;

/// What a dry run would do with a repository
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannedAction {
    Clone,
    Fetch,
    /// The local path is occupied by something that is not a repository
    Blocked,
}

/// Result of handling one repository
#[derive(Debug)]
pub enum SyncOutcome {
    /// Repository was cloned
    Cloned { path: PathBuf },
    /// Existing repository was fetched
    Fetched { path: PathBuf },
    /// Dry run: repository was listed only
    Listed { path: PathBuf, action: PlannedAction },
    /// Subgroup or project dropped by the exclusion pattern
    Excluded { kind: ExcludedKind },
    /// Clone or fetch failed
    Failed { path: PathBuf, error: ClonerError },
}

/// Totals for a complete run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub total_repositories: usize,
    pub cloned: usize,
    pub fetched: usize,
    pub listed: usize,
    pub excluded: usize,
    pub failed: usize,
    pub duration: Duration,
}

/// Mirrors one namespace according to [`RunOptions`]
pub struct SyncEngine {
    options: RunOptions,
    api: Box<dyn NamespaceApi>,
    git: Box<dyn GitRunner>,
}

impl SyncEngine {
    pub fn new(options: RunOptions, api: Box<dyn NamespaceApi>, git: Box<dyn GitRunner>) -> Self {
        Self { options, api, git }
    }

    /// Engine backed by the GitLab REST API and the `git` executable
    pub fn from_options(options: RunOptions) -> Result<Self, ClonerError> {
        let api = GitLabClient::new(&options.url, &options.token)?;
        Ok(Self::new(options, Box::new(api), Box::new(GitClient::default())))
    }

    /// Run a complete mirror: checks, discovery, then clone/fetch of every repository
    ///
    /// Errors returned here abort the whole run. Per-repository clone and fetch
    /// failures are recorded in `reporter` instead and processing continues.
    pub async fn run(&self, reporter: &mut Reporter) -> Result<(), ClonerError> {
        let opts = &self.options;
        reporter.debug(format!("path: {}", opts.destination.display()));
        if let Some(pattern) = &opts.exclude {
            reporter.debug(format!("exclude: {}", pattern.as_str()));
        }

        if opts.token_source == TokenSource::CommandLine {
            reporter.warn(
                "warning: token provided via command line argument (consider using environment variable)",
            );
        }

        // Dry runs never start a git process, not even to probe the version.
        if !opts.dry_run {
            let version = self.git.version().await?;
            reporter.debug(format!("git: {}", version));
        }

        reporter.info(format!("init gitlab API: {}", opts.url));
        let user = self.api.authenticate().await?;
        reporter.debug(format!("user: {}", user.username));

        reporter.info(format!("getting root group: {}", opts.namespace));
        let root = self.api.resolve_namespace(&opts.namespace).await?;
        let mapper = PathMapper::new(&opts.destination, &root.full_path, opts.disable_root);

        reporter.info("getting projects and sub-groups");
        let enumeration = Enumerator::new(self.api.as_ref(), &mapper, opts.clone_method)
            .with_exclusion(opts.exclude.as_ref())
            .enumerate(root)
            .await?;

        for excluded in enumeration.excluded {
            reporter.record(
                &excluded.full_path,
                SyncOutcome::Excluded {
                    kind: excluded.kind,
                },
            );
        }

        info!(
            "Discovered {} repositories in {}",
            enumeration.repositories.len(),
            opts.namespace
        );

        for repo in &enumeration.repositories {
            let outcome = if opts.dry_run {
                self.plan(repo)
            } else {
                reporter.info(format!("processing: {}", repo.full_name()));
                reporter.debug(format!("remote: {}", repo.clone_url));
                reporter.debug(format!("path: {}", repo.local_path.display()));
                self.sync_repository(repo).await?
            };
            reporter.record(repo.full_name(), outcome);
        }

        Ok(())
    }

    /// Decide what syncing `repo` would do, without touching anything
    pub fn plan(&self, repo: &RepoSpec) -> SyncOutcome {
        let action = match LocalState::inspect(&repo.local_path) {
            Ok(LocalState::Absent) | Ok(LocalState::Empty) => PlannedAction::Clone,
            Ok(LocalState::Repository) => PlannedAction::Fetch,
            Ok(LocalState::NotARepository) => PlannedAction::Blocked,
            Err(e) => {
                warn!("Cannot inspect {}: {}", repo.local_path.display(), e);
                PlannedAction::Blocked
            }
        };

        SyncOutcome::Listed {
            path: repo.local_path.clone(),
            action,
        }
    }

    /// Clone or fetch a single repository
    ///
    /// Only a missing git executable is returned as an error; every other
    /// failure becomes [`SyncOutcome::Failed`].
    pub async fn sync_repository(&self, repo: &RepoSpec) -> Result<SyncOutcome, ClonerError> {
        let path = repo.local_path.clone();

        let result = match LocalState::inspect(&path) {
            Ok(LocalState::Absent) | Ok(LocalState::Empty) => self
                .clone_repository(repo)
                .await
                .map(|_| SyncOutcome::Cloned { path: path.clone() }),
            Ok(LocalState::Repository) => self
                .git
                .fetch(&path)
                .await
                .map(|_| SyncOutcome::Fetched { path: path.clone() }),
            Ok(LocalState::NotARepository) => Err(ClonerError::Fetch {
                path: path.clone(),
                message: "path exists but is not a git repository".to_string(),
            }),
            Err(e) => Err(ClonerError::Io(e)),
        };

        match result {
            Ok(outcome) => {
                debug!("Sync completed: {:?}", outcome);
                Ok(outcome)
            }
            Err(ClonerError::GitNotFound) => Err(ClonerError::GitNotFound),
            Err(error) => Ok(SyncOutcome::Failed { path, error }),
        }
    }

    async fn clone_repository(&self, repo: &RepoSpec) -> Result<(), ClonerError> {
        if let Some(parent) = repo.local_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ClonerError::Clone {
                    path: repo.local_path.clone(),
                    message: format!("failed to create parent directory: {}", e),
                })?;
        }

        let result = self.git.clone_repo(&repo.clone_url, &repo.local_path).await;
        match (result, &repo.clone_url_alt) {
            (Err(ClonerError::Clone { message, .. }), Some(alt)) => {
                warn!(
                    "Clone from {} failed ({}), retrying with {}",
                    repo.clone_url, message, alt
                );
                self.git.clone_repo(alt, &repo.local_path).await
            }
            (result, _) => result,
        }
    }
}
