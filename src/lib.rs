//! gitlab-cloner - Mirror a GitLab namespace onto the local filesystem
//!
//! Given a group path, gitlab-cloner walks the group and all of its subgroups,
//! drops anything matching an exclusion pattern and then clones every project
//! it has not seen before or fetches the ones already present.
//!
//! ## Modules
//!
//! - [`config`]: Configuration file, CLI/environment merging and validation
//! - [`gitlab`]: GitLab REST API client
//! - [`discovery`]: Breadth-first namespace enumeration and exclusion
//! - [`paths`]: Mapping of namespace paths onto local directories
//! - [`git`]: Local state inspection and git subprocesses
//! - [`sync`]: Run orchestration
//! - [`report`]: Progress lines and exit status
//! - [`error`]: Error taxonomy and exit codes

pub mod config;
pub mod discovery;
pub mod error;
pub mod git;
pub mod gitlab;
pub mod paths;
pub mod report;
pub mod sync;

pub use config::{Config, RunOptions};
pub use discovery::{Enumerator, ExclusionPattern, RepoSpec};
pub use error::ClonerError;
pub use git::{GitClient, GitRunner, LocalState};
pub use gitlab::{GitLabClient, NamespaceApi};
pub use paths::PathMapper;
pub use report::Reporter;
pub use sync::{SyncEngine, SyncOutcome, SyncSummary};
