use async_trait::async_trait;
use reqwest::Url;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command as AsyncCommand;
use tokio::time::timeout;
use tracing::debug;

use crate::error::MirrorError;

/// Refspec mirroring every remote branch onto the same local branch
pub const BRANCH_REFSPEC: &str = "refs/heads/*:refs/heads/*";

/// The git operations a mirror needs.
///
/// Both operations must be idempotent: running them against an existing bare
/// repository converges on the remote's state instead of failing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Git: Send + Sync {
    /// Initialize a bare repository; a no-op when one already exists
    async fn init_bare(&self, repo_dir: &Path) -> Result<(), MirrorError>;

    /// Forced, pruning, tag-including fetch of all branches from `remote`
    async fn fetch_mirror(&self, repo_dir: &Path, remote: &Url) -> Result<(), MirrorError>;
}

/// [`Git`] implementation that shells out to the `git` binary
#[derive(Debug, Clone)]
pub struct GitCli {
    timeout: Duration,
}

impl GitCli {
    /// Create a git runner that kills any command running longer than `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn run(
        &self,
        command: &'static str,
        args: &[&str],
        repo_dir: &Path,
        remote: Option<&Url>,
    ) -> Result<(), MirrorError> {
        debug!("Running git {} in {}", command, repo_dir.display());

        let mut cmd = AsyncCommand::new("git");
        cmd.args(args)
            .current_dir(repo_dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match timeout(self.timeout, cmd.output()).await {
            Ok(result) => result.map_err(|source| MirrorError::Spawn { command, source })?,
            Err(_) => {
                return Err(MirrorError::TimedOut {
                    command,
                    path: repo_dir.to_path_buf(),
                    seconds: self.timeout.as_secs(),
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = match remote {
                Some(remote) => scrub_credentials(stderr.trim(), remote),
                None => stderr.trim().to_string(),
            };
            return Err(MirrorError::Failed {
                command,
                path: repo_dir.to_path_buf(),
                status: output.status.to_string(),
                stderr,
            });
        }

        Ok(())
    }
}

#[async_trait]
impl Git for GitCli {
    async fn init_bare(&self, repo_dir: &Path) -> Result<(), MirrorError> {
        // "Running git init in an existing repository is safe."
        self.run("init", &["init", "--bare", "--quiet"], repo_dir, None)
            .await
    }

    async fn fetch_mirror(&self, repo_dir: &Path, remote: &Url) -> Result<(), MirrorError> {
        // Fetching into a bare repo keeps the token out of .git/config
        self.run(
            "fetch",
            &[
                "fetch",
                "--force",
                "--prune",
                "--tags",
                remote.as_str(),
                BRANCH_REFSPEC,
            ],
            repo_dir,
            Some(remote),
        )
        .await
    }
}

/// Copy of `url` with its password replaced by `***`
pub fn redacted(url: &Url) -> Url {
    let mut redacted = url.clone();
    if redacted.password().is_some() {
        let _ = redacted.set_password(Some("***"));
    }
    redacted
}

/// Copy of `url` with no userinfo at all, for log lines
pub fn without_credentials(url: &Url) -> Url {
    let mut plain = url.clone();
    let _ = plain.set_password(None);
    let _ = plain.set_username("");
    plain
}

/// Remove the credentials of `remote` from command output
pub fn scrub_credentials(text: &str, remote: &Url) -> String {
    let mut scrubbed = text.replace(remote.as_str(), redacted(remote).as_str());
    if let Some(password) = remote.password().filter(|p| !p.is_empty()) {
        scrubbed = scrubbed.replace(password, "***");
    }
    scrubbed
}
