//! Mapping of remote namespace paths onto the local directory tree.

use path_clean::PathClean;
use std::path::PathBuf;

/// Computes where a repository lives under the destination directory
#[derive(Debug, Clone)]
pub struct PathMapper {
    destination: PathBuf,
    root_segments: Vec<String>,
    disable_root: bool,
}

impl PathMapper {
    /// `root_namespace` is the full path of the namespace being mirrored;
    /// with `disable_root` its segments are left out of every local path.
    pub fn new(destination: impl Into<PathBuf>, root_namespace: &str, disable_root: bool) -> Self {
        Self {
            destination: destination.into(),
            root_segments: split_segments(root_namespace),
            disable_root,
        }
    }

    /// Local directory for a repository given its namespace-qualified path
    pub fn local_path(&self, full_path: &str) -> PathBuf {
        let mut segments = split_segments(full_path);

        if self.disable_root && segments.starts_with(&self.root_segments) {
            segments.drain(..self.root_segments.len());
        }

        let mut path = self.destination.clone();
        path.extend(segments);
        path.clean()
    }
}

fn split_segments(path: &str) -> Vec<String> {
    path.split('/')
        .map(sanitize_segment)
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// Make one path segment safe to use as a directory name
pub fn sanitize_segment(segment: &str) -> String {
    let cleaned: String = segment
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    match cleaned.as_str() {
        "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}
