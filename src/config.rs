use anyhow::{Context, Result};
use dirs::config_dir;
use path_clean::PathClean;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::discovery::ExclusionPattern;
use crate::error::ClonerError;

/// GitLab instance used when neither the command line nor the config file names one
pub const DEFAULT_URL: &str = "https://gitlab.com";

/// Environment variable consulted when no token is given on the command line
pub const TOKEN_ENV_VAR: &str = "GITLAB_TOKEN";

/// Optional configuration file contents
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Base URL of the GitLab instance
    #[serde(default = "default_url")]
    pub url: String,

    /// Protocol used for clone URLs
    #[serde(default)]
    pub clone_method: CloneMethod,

    /// Destination directory for cloned repositories
    #[serde(default)]
    pub base_directory: Option<String>,

    /// Do not create the root namespace folder
    #[serde(default)]
    pub disable_root: bool,

    /// Exclusion pattern applied to subgroups and projects
    #[serde(default)]
    pub exclude: Option<String>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Clone URL protocol
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum CloneMethod {
    /// Use HTTPS (https://gitlab.com/group/repo.git)
    #[default]
    Https,
    /// Use SSH (git@gitlab.com:group/repo.git)
    Ssh,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Diagnostic log level when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Enable colored output
    #[serde(default = "default_true")]
    pub color: bool,
}

fn default_url() -> String {
    DEFAULT_URL.to_string()
}
fn default_log_level() -> String {
    "warn".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            color: default_true(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: default_url(),
            clone_method: CloneMethod::default(),
            base_directory: None,
            disable_root: false,
            exclude: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, falling back to defaults
    ///
    /// The file is never created here: a run must not touch the filesystem
    /// beyond the destination tree.
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            tracing::debug!("No configuration file at {:?}, using defaults", config_path);
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.expand_paths()?;

        tracing::debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("gitlab-cloner").join("config.yml"))
    }

    /// Expand environment variables and `~` in configuration paths
    pub fn expand_paths(&mut self) -> Result<()> {
        if let Some(base) = &self.base_directory {
            let expanded = shellexpand::full(base)
                .context("Failed to expand base_directory path")?
                .into_owned();
            self.base_directory = Some(expanded);
        }

        Ok(())
    }
}

/// Values taken from the command line. `None` means the flag was not given.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub url: Option<String>,
    pub token: Option<String>,
    pub namespace: String,
    pub path: Option<PathBuf>,
    pub disable_root: bool,
    pub dry_run: bool,
    pub exclude: Option<String>,
    pub clone_method: Option<CloneMethod>,
}

/// Where the API token came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    CommandLine,
    Environment,
}

/// Settings for a single run, resolved from CLI flags, environment and config file
#[derive(Clone)]
pub struct RunOptions {
    pub url: String,
    pub token: String,
    pub token_source: TokenSource,
    pub namespace: String,
    pub destination: PathBuf,
    pub disable_root: bool,
    pub dry_run: bool,
    pub exclude: Option<ExclusionPattern>,
    pub clone_method: CloneMethod,
}

impl fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("token_source", &self.token_source)
            .field("namespace", &self.namespace)
            .field("destination", &self.destination)
            .field("disable_root", &self.disable_root)
            .field("dry_run", &self.dry_run)
            .field("exclude", &self.exclude)
            .field("clone_method", &self.clone_method)
            .finish()
    }
}

impl RunOptions {
    /// Merge command line, environment and config file into run settings.
    ///
    /// Checks run in a fixed order: arguments, then token, then destination.
    /// None of them touches the network.
    pub fn resolve(
        cli: CliOverrides,
        config: &Config,
        env_token: Option<String>,
    ) -> Result<Self, ClonerError> {
        let namespace = cli.namespace.trim().trim_matches('/').to_string();
        if namespace.is_empty() {
            return Err(ClonerError::Argument("namespace must not be empty".to_string()));
        }

        let url = cli
            .url
            .unwrap_or_else(|| config.url.clone())
            .trim_end_matches('/')
            .to_string();
        reqwest::Url::parse(&url)
            .map_err(|e| ClonerError::Argument(format!("invalid GitLab URL '{}': {}", url, e)))?;

        let (token, token_source) = match cli.token.filter(|t| !t.trim().is_empty()) {
            Some(token) => (token, TokenSource::CommandLine),
            None => match env_token.filter(|t| !t.trim().is_empty()) {
                Some(token) => (token, TokenSource::Environment),
                None => {
                    return Err(ClonerError::Authentication(format!(
                        "gitlab token not provided. use -t or set {} environment variable",
                        TOKEN_ENV_VAR
                    )))
                }
            },
        };

        let exclude = cli
            .exclude
            .or_else(|| config.exclude.clone())
            .map(|raw| ExclusionPattern::new(&raw))
            .transpose()?;

        let destination = match cli.path {
            Some(path) => path,
            None => config
                .base_directory
                .as_ref()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
        };
        let destination = validate_destination(&destination)?;

        Ok(Self {
            url,
            token,
            token_source,
            namespace,
            destination,
            disable_root: cli.disable_root || config.disable_root,
            dry_run: cli.dry_run,
            exclude,
            clone_method: cli.clone_method.unwrap_or(config.clone_method),
        })
    }
}

/// Read the API token from the environment, ignoring empty values
pub fn token_from_env() -> Option<String> {
    std::env::var(TOKEN_ENV_VAR)
        .ok()
        .filter(|token| !token.trim().is_empty())
}

/// Check that the destination exists and is a directory; return it absolute and normalized
pub fn validate_destination(path: &Path) -> Result<PathBuf, ClonerError> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| ClonerError::path(path, format!("cannot resolve current directory: {}", e)))?
            .join(path)
    };
    let absolute = absolute.clean();

    match std::fs::metadata(&absolute) {
        Ok(meta) if meta.is_dir() => Ok(absolute),
        Ok(_) => Err(ClonerError::path(absolute, "not a directory")),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ClonerError::path(absolute, "does not exist"))
        }
        Err(e) => Err(ClonerError::path(absolute, e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serial_test::serial;
    use std::env;
    use tempfile::TempDir;

    fn overrides(namespace: &str, dest: &Path) -> CliOverrides {
        CliOverrides {
            namespace: namespace.to_string(),
            path: Some(dest.to_path_buf()),
            ..Default::default()
        }
    }

    #[test]
    fn test_config_default_values() {
        let config = Config::default();

        assert_eq!(config.url, "https://gitlab.com");
        assert_eq!(config.clone_method, CloneMethod::Https);
        assert!(config.base_directory.is_none());
        assert!(!config.disable_root);
        assert!(config.exclude.is_none());
        assert_eq!(config.logging.level, "warn");
        assert!(config.logging.color);
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml_content = r#"
url: "https://gitlab.example.com"
clone_method: ssh
base_directory: "/srv/mirror"
disable_root: true
exclude: "archived"
logging:
  level: "debug"
  color: false
"#;

        let config: Config = serde_yaml::from_str(yaml_content).expect("Failed to parse YAML");

        assert_eq!(config.url, "https://gitlab.example.com");
        assert_eq!(config.clone_method, CloneMethod::Ssh);
        assert_eq!(config.base_directory.as_deref(), Some("/srv/mirror"));
        assert!(config.disable_root);
        assert_eq!(config.exclude.as_deref(), Some("archived"));
        assert_eq!(config.logging.level, "debug");
        assert!(!config.logging.color);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: Config = serde_yaml::from_str("disable_root: true\n").unwrap();
        assert_eq!(config.url, DEFAULT_URL);
        assert_eq!(config.clone_method, CloneMethod::Https);
        assert!(config.logging.color);
    }

    #[test]
    fn test_config_load_nonexistent_file() {
        let result = Config::load(Path::new("/nonexistent/path/config.yml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_config_load_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yml");
        std::fs::write(&path, "url: [unterminated").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse config file"));
    }

    #[test]
    #[serial]
    fn test_expand_paths() {
        env::set_var("TEST_GITLAB_CLONER_HOME", "/test/home");

        let mut config = Config {
            base_directory: Some("${TEST_GITLAB_CLONER_HOME}/mirror".to_string()),
            ..Default::default()
        };
        config.expand_paths().expect("Failed to expand paths");

        assert_eq!(config.base_directory.as_deref(), Some("/test/home/mirror"));

        env::remove_var("TEST_GITLAB_CLONER_HOME");
    }

    #[test]
    fn test_config_default_path_xdg() {
        let default_path = Config::default_config_path().expect("Failed to get default path");
        assert!(default_path.to_string_lossy().contains("gitlab-cloner"));
        assert!(default_path.to_string_lossy().ends_with("config.yml"));
    }

    #[test]
    fn test_resolve_prefers_command_line_token() {
        let dest = TempDir::new().unwrap();
        let mut cli = overrides("acme", dest.path());
        cli.token = Some("cli-token".to_string());

        let opts =
            RunOptions::resolve(cli, &Config::default(), Some("env-token".to_string())).unwrap();
        assert_eq!(opts.token, "cli-token");
        assert_eq!(opts.token_source, TokenSource::CommandLine);
    }

    #[test]
    fn test_resolve_falls_back_to_env_token() {
        let dest = TempDir::new().unwrap();
        let opts = RunOptions::resolve(
            overrides("acme", dest.path()),
            &Config::default(),
            Some("env-token".to_string()),
        )
        .unwrap();

        assert_eq!(opts.token, "env-token");
        assert_eq!(opts.token_source, TokenSource::Environment);
        assert_eq!(opts.url, DEFAULT_URL);
        assert_eq!(opts.clone_method, CloneMethod::Https);
        assert!(opts.exclude.is_none());
    }

    #[test]
    fn test_resolve_missing_token_is_auth_error() {
        let dest = TempDir::new().unwrap();
        let err = RunOptions::resolve(overrides("acme", dest.path()), &Config::default(), None)
            .unwrap_err();

        assert_matches!(err, ClonerError::Authentication(_));
        assert_eq!(err.exit_code(), 40);
    }

    #[test]
    fn test_resolve_blank_token_is_auth_error() {
        let dest = TempDir::new().unwrap();
        let mut cli = overrides("acme", dest.path());
        cli.token = Some("   ".to_string());

        let err = RunOptions::resolve(cli, &Config::default(), Some(String::new())).unwrap_err();
        assert_matches!(err, ClonerError::Authentication(_));
    }

    #[test]
    fn test_resolve_checks_token_before_destination() {
        let err = RunOptions::resolve(
            overrides("acme", Path::new("/nonexistent/destination")),
            &Config::default(),
            None,
        )
        .unwrap_err();

        assert_eq!(err.exit_code(), 40);
    }

    #[test]
    fn test_resolve_destination_is_a_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, "x").unwrap();

        let err = RunOptions::resolve(
            overrides("acme", &file),
            &Config::default(),
            Some("t".to_string()),
        )
        .unwrap_err();

        assert_matches!(err, ClonerError::Path { ref reason, .. } if reason == "not a directory");
        assert_eq!(err.exit_code(), 10);
    }

    #[test]
    fn test_resolve_destination_missing() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing");

        let err = RunOptions::resolve(
            overrides("acme", &missing),
            &Config::default(),
            Some("t".to_string()),
        )
        .unwrap_err();

        assert_matches!(err, ClonerError::Path { ref reason, .. } if reason == "does not exist");
    }

    #[test]
    fn test_resolve_empty_namespace_is_argument_error() {
        let dest = TempDir::new().unwrap();
        let err = RunOptions::resolve(
            overrides(" / ", dest.path()),
            &Config::default(),
            Some("t".to_string()),
        )
        .unwrap_err();

        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_resolve_invalid_url_is_argument_error() {
        let dest = TempDir::new().unwrap();
        let mut cli = overrides("acme", dest.path());
        cli.url = Some("not a url".to_string());

        let err = RunOptions::resolve(cli, &Config::default(), Some("t".to_string())).unwrap_err();
        assert_matches!(err, ClonerError::Argument(_));
    }

    #[test]
    fn test_resolve_merges_config_file() {
        let dest = TempDir::new().unwrap();
        let config = Config {
            url: "https://gitlab.example.com/".to_string(),
            clone_method: CloneMethod::Ssh,
            base_directory: Some(dest.path().to_string_lossy().into_owned()),
            disable_root: true,
            exclude: Some("legacy".to_string()),
            logging: LoggingConfig::default(),
        };
        let cli = CliOverrides {
            namespace: "/acme/".to_string(),
            ..Default::default()
        };

        let opts = RunOptions::resolve(cli, &config, Some("t".to_string())).unwrap();

        assert_eq!(opts.url, "https://gitlab.example.com");
        assert_eq!(opts.namespace, "acme");
        assert_eq!(opts.clone_method, CloneMethod::Ssh);
        assert!(opts.disable_root);
        assert_eq!(opts.destination, dest.path().to_path_buf().clean());
        assert!(opts.exclude.unwrap().matches("legacy"));
    }

    #[test]
    fn test_debug_redacts_token() {
        let dest = TempDir::new().unwrap();
        let opts = RunOptions::resolve(
            overrides("acme", dest.path()),
            &Config::default(),
            Some("glpat-secret".to_string()),
        )
        .unwrap();

        let rendered = format!("{:?}", opts);
        assert!(!rendered.contains("glpat-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    #[serial]
    fn test_token_from_env() {
        let original = env::var(TOKEN_ENV_VAR).ok();

        env::set_var(TOKEN_ENV_VAR, "glpat-123");
        assert_eq!(token_from_env().as_deref(), Some("glpat-123"));

        env::set_var(TOKEN_ENV_VAR, "");
        assert!(token_from_env().is_none());

        env::remove_var(TOKEN_ENV_VAR);
        assert!(token_from_env().is_none());

        if let Some(value) = original {
            env::set_var(TOKEN_ENV_VAR, value);
        }
    }
}
