//! Repository discovery across a GitLab namespace tree
//!
//! The enumerator walks the root group and every nested subgroup breadth-first
//! with an explicit work queue, drops entities matching the exclusion pattern,
//! and produces a flat, ordered list of [`RepoSpec`] ready to be synced.

use regex::Regex;
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use tracing::debug;

use crate::config::CloneMethod;
use crate::error::ClonerError;
use crate::gitlab::{GitLabGroup, GitLabProject, NamespaceApi};
use crate::paths::PathMapper;

/// Deepest subgroup nesting the enumerator will follow below the root
pub const MAX_NAMESPACE_DEPTH: usize = 32;

/// Pattern matched against subgroup and project names
///
/// A plain string matches as a substring. A pattern containing `*` is a glob
/// anchored at both ends, where `*` stands for any run of characters.
#[derive(Debug, Clone)]
pub struct ExclusionPattern {
    raw: String,
    glob: Option<Regex>,
}

impl ExclusionPattern {
    pub fn new(raw: &str) -> Result<Self, ClonerError> {
        if raw.is_empty() {
            return Err(ClonerError::Argument(
                "exclusion pattern must not be empty".to_string(),
            ));
        }

        let glob = if raw.contains('*') {
            let pattern = raw
                .split('*')
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(".*");
            let regex = Regex::new(&format!("^{}$", pattern)).map_err(|e| {
                ClonerError::Argument(format!("invalid exclusion pattern '{}': {}", raw, e))
            })?;
            Some(regex)
        } else {
            None
        };

        Ok(Self {
            raw: raw.to_string(),
            glob,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, name: &str) -> bool {
        match &self.glob {
            Some(regex) => regex.is_match(name),
            None => name.contains(&self.raw),
        }
    }

    /// True if either the display name or the slug matches
    fn matches_entity(&self, name: &str, slug: &str) -> bool {
        self.matches(name) || self.matches(slug)
    }
}

/// A repository to mirror, with everything needed to clone or fetch it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSpec {
    /// Project name (e.g., "api")
    pub name: String,

    /// Namespace-qualified path (e.g., "acme/platform/api")
    pub full_path: String,

    /// Clone URL for the preferred protocol
    pub clone_url: String,

    /// Clone URL for the other protocol, when GitLab reported one
    pub clone_url_alt: Option<String>,

    /// Local directory this repository maps to
    pub local_path: PathBuf,
}

impl RepoSpec {
    /// Get display name (namespace/name format)
    pub fn full_name(&self) -> &str {
        &self.full_path
    }
}

/// Kind of entity dropped by the exclusion pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExcludedKind {
    Subgroup,
    Project,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Excluded {
    pub full_path: String,
    pub kind: ExcludedKind,
}

/// Result of walking a namespace
#[derive(Debug, Default)]
pub struct Enumeration {
    pub repositories: Vec<RepoSpec>,
    pub excluded: Vec<Excluded>,
}

/// Walks a namespace tree and collects its repositories
pub struct Enumerator<'a> {
    api: &'a dyn NamespaceApi,
    mapper: &'a PathMapper,
    clone_method: CloneMethod,
    exclude: Option<&'a ExclusionPattern>,
}

impl<'a> Enumerator<'a> {
    pub fn new(api: &'a dyn NamespaceApi, mapper: &'a PathMapper, clone_method: CloneMethod) -> Self {
        Self {
            api,
            mapper,
            clone_method,
            exclude: None,
        }
    }

    pub fn with_exclusion(mut self, exclude: Option<&'a ExclusionPattern>) -> Self {
        self.exclude = exclude;
        self
    }

    fn is_excluded(&self, name: &str, slug: &str) -> bool {
        self.exclude
            .map(|pattern| pattern.matches_entity(name, slug))
            .unwrap_or(false)
    }

    /// Collect every non-excluded project below `root`
    ///
    /// The root group's own projects come first, then subgroups in
    /// breadth-first order. The root itself is never matched against the
    /// exclusion pattern. Any API failure aborts the walk.
    pub async fn enumerate(&self, root: GitLabGroup) -> Result<Enumeration, ClonerError> {
        let mut queue = VecDeque::from([(root, 0usize)]);
        let mut visited = HashSet::new();
        let mut seen_projects = HashSet::new();
        let mut result = Enumeration::default();

        while let Some((group, depth)) = queue.pop_front() {
            if !visited.insert(group.id) {
                debug!("Skipping already visited group: {}", group.full_path);
                continue;
            }

            if depth > MAX_NAMESPACE_DEPTH {
                return Err(ClonerError::api(format!(
                    "namespace {} is nested deeper than {} levels",
                    group.full_path, MAX_NAMESPACE_DEPTH
                )));
            }

            debug!("Expanding group {} (depth {})", group.full_path, depth);

            for project in self.api.list_projects(group.id).await? {
                if !seen_projects.insert(project.id) {
                    debug!("Skipping already listed project: {}", project.path_with_namespace);
                    continue;
                }

                if self.is_excluded(&project.name, &project.path) {
                    debug!("Excluding project: {}", project.path_with_namespace);
                    result.excluded.push(Excluded {
                        full_path: project.path_with_namespace,
                        kind: ExcludedKind::Project,
                    });
                    continue;
                }

                debug!("Found project: {}", project.path_with_namespace);
                result.repositories.push(self.repo_to_spec(project)?);
            }

            for subgroup in self.api.list_subgroups(group.id).await? {
                if self.is_excluded(&subgroup.name, &subgroup.path) {
                    debug!("Excluding subgroup: {}", subgroup.full_path);
                    result.excluded.push(Excluded {
                        full_path: subgroup.full_path,
                        kind: ExcludedKind::Subgroup,
                    });
                    continue;
                }

                queue.push_back((subgroup, depth + 1));
            }
        }

        Ok(result)
    }

    /// Convert a GitLab project to our RepoSpec
    fn repo_to_spec(&self, project: GitLabProject) -> Result<RepoSpec, ClonerError> {
        let (preferred, other) = match self.clone_method {
            CloneMethod::Https => (project.http_url_to_repo, project.ssh_url_to_repo),
            CloneMethod::Ssh => (project.ssh_url_to_repo, project.http_url_to_repo),
        };

        let (clone_url, clone_url_alt) = match (preferred, other) {
            (Some(url), alt) => (url, alt),
            (None, Some(url)) => (url, None),
            (None, None) => {
                return Err(ClonerError::api(format!(
                    "project {} has no clone URL",
                    project.path_with_namespace
                )))
            }
        };

        let local_path = self.mapper.local_path(&project.path_with_namespace);

        Ok(RepoSpec {
            name: project.name,
            full_path: project.path_with_namespace,
            clone_url,
            clone_url_alt,
            local_path,
        })
    }
}
