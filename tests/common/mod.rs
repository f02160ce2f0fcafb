/// Common test utilities and helpers for RepoVault tests

use async_trait::async_trait;
use repovault::config::{ConfigRecord, Provider, SecretToken};
use repovault::error::MirrorError;
use repovault::git::Git;
use repovault::Config;
use reqwest::Url;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;
use wiremock::MockServer;

pub const TOKEN: &str = "ghp_test_token_0123456789";

/// A git call observed by [`RecordingGit`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitCall {
    Init(PathBuf),
    Fetch(PathBuf, Url),
}

/// [`Git`] that records calls instead of running git
#[derive(Default)]
pub struct RecordingGit {
    calls: Mutex<Vec<GitCall>>,
}

impl RecordingGit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<GitCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fetched_dirs(&self) -> Vec<PathBuf> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                GitCall::Fetch(dir, _) => Some(dir),
                GitCall::Init(_) => None,
            })
            .collect()
    }
}

#[async_trait]
impl Git for RecordingGit {
    async fn init_bare(&self, repo_dir: &Path) -> Result<(), MirrorError> {
        self.calls
            .lock()
            .unwrap()
            .push(GitCall::Init(repo_dir.to_path_buf()));
        Ok(())
    }

    async fn fetch_mirror(&self, repo_dir: &Path, remote: &Url) -> Result<(), MirrorError> {
        self.calls
            .lock()
            .unwrap()
            .push(GitCall::Fetch(repo_dir.to_path_buf(), remote.clone()));
        Ok(())
    }
}

/// Test workspace: a temp dir plus the backup directory inside it
pub struct TestEnvironment {
    pub temp_dir: TempDir,
    pub backup_dir: PathBuf,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let backup_dir = temp_dir.path().join("out");
        Self {
            temp_dir,
            backup_dir,
        }
    }

    pub fn record(&self, provider: Provider, server: &MockServer) -> ConfigRecord {
        ConfigRecord {
            token: SecretToken::new(TOKEN),
            method: Some(provider),
            host: Some(server.uri()),
            directory: Some(self.backup_dir.display().to_string()),
            ..Default::default()
        }
    }

    pub fn config(&self, record: ConfigRecord) -> Config {
        Config::from_record(record).expect("Test config should be valid")
    }

    /// Write a configuration list to a file and return its path
    pub fn write_config(&self, records: &Value) -> PathBuf {
        let path = self.temp_dir.path().join("config.json");
        std::fs::write(&path, records.to_string()).expect("Failed to write test config");
        path
    }
}

/// GitHub repository listing entry
pub fn github_repo(server: &MockServer, owner: &str, name: &str) -> Value {
    json!({
        "id": 1,
        "name": name,
        "full_name": format!("{}/{}", owner, name),
        "owner": {"login": owner},
        "clone_url": format!("{}/{}/{}.git", server.uri(), owner, name),
    })
}

/// GitLab project listing entry
pub fn gitlab_project(server: &MockServer, namespace: &str, path: &str) -> Value {
    json!({
        "id": 1,
        "name": path.to_uppercase(),
        "path": path,
        "namespace": {"path": namespace, "kind": "user"},
        "http_url_to_repo": format!("{}/{}/{}.git", server.uri(), namespace, path),
    })
}

/// `Link` header value pointing at `url` as the next page
pub fn next_link(url: &str) -> String {
    format!("<{}>; rel=\"next\"", url)
}
