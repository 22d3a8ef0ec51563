/// Common test utilities and helpers for gitlab-cloner tests

use assert_fs::TempDir;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Isolated home, config directory and destination for one CLI invocation
pub struct TestEnvironment {
    pub home: TempDir,
    pub destination: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Self {
        Self {
            home: TempDir::new().expect("Failed to create home dir"),
            destination: TempDir::new().expect("Failed to create destination dir"),
        }
    }

    pub fn config_home(&self) -> PathBuf {
        self.home.path().join(".config")
    }

    /// Write `content` as a config file outside the default location
    pub fn create_config(&self, content: &str) -> PathBuf {
        let config_path = self.home.path().join("custom-config.yml");
        std::fs::write(&config_path, content).expect("Failed to write test config");
        config_path
    }

    /// The binary with no token, no inherited config and no colors
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_gitlab-cloner"));
        cmd.env("HOME", self.home.path())
            .env("XDG_CONFIG_HOME", self.config_home())
            .env("NO_COLOR", "1")
            .env_remove("GITLAB_TOKEN")
            .env_remove("RUST_LOG")
            .current_dir(self.destination.path());
        cmd
    }

    pub fn destination_entries(&self) -> usize {
        count_entries(self.destination.path())
    }
}

fn count_entries(path: &Path) -> usize {
    std::fs::read_dir(path)
        .map(|entries| entries.count())
        .unwrap_or_default()
}

/// GitLab API payload for a group
pub fn group_json(id: u64, full_path: &str) -> Value {
    let slug = full_path.rsplit('/').next().unwrap_or(full_path);
    json!({
        "id": id,
        "name": slug,
        "path": slug,
        "full_path": full_path,
    })
}

/// GitLab API payload for a project
pub fn project_json(id: u64, full_path: &str) -> Value {
    let slug = full_path.rsplit('/').next().unwrap_or(full_path);
    json!({
        "id": id,
        "name": slug,
        "path": slug,
        "path_with_namespace": full_path,
        "http_url_to_repo": format!("https://gitlab.example.com/{}.git", full_path),
        "ssh_url_to_repo": format!("git@gitlab.example.com:{}.git", full_path),
    })
}

/// Assertion helpers for test validation
pub fn assert_contains_all(text: &str, expected: &[&str]) {
    for item in expected {
        assert!(
            text.contains(item),
            "Expected text to contain '{}', but it didn't. Text: {}",
            item,
            text
        );
    }
}
