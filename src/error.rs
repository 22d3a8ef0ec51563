//! Error taxonomy and process exit codes.

use std::path::PathBuf;
use thiserror::Error;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_EXECUTION_ERROR: i32 = 1;
pub const EXIT_MISSING_ARGUMENTS: i32 = 2;
pub const EXIT_PATH_ERROR: i32 = 10;
pub const EXIT_GIT_NOT_FOUND: i32 = 20;
pub const EXIT_GIT_CLONE_ERROR: i32 = 21;
pub const EXIT_GIT_FETCH_ERROR: i32 = 22;
pub const EXIT_GITLAB_ERROR: i32 = 30;
pub const EXIT_AUTH_ERROR: i32 = 40;

/// Errors raised while resolving, enumerating or syncing a namespace.
#[derive(Debug, Error)]
pub enum ClonerError {
    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("destination path {}: {reason}", path.display())]
    Path { path: PathBuf, reason: String },

    #[error("git executable not installed or not in $PATH")]
    GitNotFound,

    #[error("git clone failed for {}: {message}", path.display())]
    Clone { path: PathBuf, message: String },

    #[error("git fetch failed for {}: {message}", path.display())]
    Fetch { path: PathBuf, message: String },

    #[error("GitLab API error: {0}")]
    Api(String),

    #[error("namespace not found: {0}")]
    NamespaceNotFound(String),

    #[error("authentication error: {0}")]
    Authentication(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ClonerError {
    pub fn api(msg: impl Into<String>) -> Self {
        Self::Api(msg.into())
    }

    pub fn path(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Path {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Classify an HTTP status and response body returned by the GitLab API.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            Self::Authentication(format!("{}: {}", status, body.trim()))
        } else {
            Self::Api(format!("{}: {}", status, body.trim()))
        }
    }

    /// Process exit code for this error class.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Argument(_) => EXIT_MISSING_ARGUMENTS,
            Self::Path { .. } => EXIT_PATH_ERROR,
            Self::GitNotFound => EXIT_GIT_NOT_FOUND,
            Self::Clone { .. } => EXIT_GIT_CLONE_ERROR,
            Self::Fetch { .. } => EXIT_GIT_FETCH_ERROR,
            Self::Api(_) | Self::NamespaceNotFound(_) => EXIT_GITLAB_ERROR,
            Self::Authentication(_) => EXIT_AUTH_ERROR,
            Self::Io(_) => EXIT_EXECUTION_ERROR,
        }
    }
}

impl From<reqwest::Error> for ClonerError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status)
                if status == reqwest::StatusCode::UNAUTHORIZED
                    || status == reqwest::StatusCode::FORBIDDEN =>
            {
                Self::Authentication(err.to_string())
            }
            _ => Self::Api(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_exit_codes() {
        assert_eq!(ClonerError::Argument("x".into()).exit_code(), 2);
        assert_eq!(ClonerError::path("/tmp/x", "not a directory").exit_code(), 10);
        assert_eq!(ClonerError::GitNotFound.exit_code(), 20);
        assert_eq!(
            ClonerError::Clone {
                path: "/tmp/a".into(),
                message: "boom".into()
            }
            .exit_code(),
            21
        );
        assert_eq!(
            ClonerError::Fetch {
                path: "/tmp/a".into(),
                message: "boom".into()
            }
            .exit_code(),
            22
        );
        assert_eq!(ClonerError::api("500").exit_code(), 30);
        assert_eq!(ClonerError::NamespaceNotFound("acme".into()).exit_code(), 30);
        assert_eq!(ClonerError::Authentication("401".into()).exit_code(), 40);
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(ClonerError::from(io).exit_code(), 1);
    }

    #[test]
    fn test_from_status() {
        let err = ClonerError::from_status(reqwest::StatusCode::UNAUTHORIZED, "bad token");
        assert_matches!(err, ClonerError::Authentication(_));

        let err = ClonerError::from_status(reqwest::StatusCode::FORBIDDEN, "no scope");
        assert_matches!(err, ClonerError::Authentication(_));

        let err = ClonerError::from_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR, "oops");
        assert_matches!(err, ClonerError::Api(msg) if msg.contains("oops"));
    }

    #[test]
    fn test_path_error_message() {
        let err = ClonerError::path("/srv/mirror", "not a directory");
        assert_eq!(
            err.to_string(),
            "destination path /srv/mirror: not a directory"
        );
    }
}
