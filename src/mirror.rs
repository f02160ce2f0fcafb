//! Mirror driver - keeps one bare repository in sync with its remote
//!
//! A mirror lives at `<directory>/<owner>/<repo>`. Every step is safe to
//! repeat: directories are created only when missing, `git init --bare` is a
//! no-op on an existing repository, and the forced, pruning fetch makes the
//! local refs match the remote regardless of what a previous run left behind.

use reqwest::Url;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::SecretToken;
use crate::error::MirrorError;
use crate::git::{self, Git};
use crate::naming::ValidName;

/// Credentials embedded into clone URLs for the duration of one fetch
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub token: SecretToken,
}

/// On-disk location of one mirror
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MirrorTarget {
    /// `<directory>/<owner>`
    pub owner_dir: PathBuf,

    /// `<directory>/<owner>/<repo>`
    pub repo_dir: PathBuf,
}

impl MirrorTarget {
    pub fn new(directory: &Path, owner: &ValidName, repo: &ValidName) -> Self {
        let owner_dir = directory.join(owner);
        let repo_dir = owner_dir.join(repo);
        Self {
            owner_dir,
            repo_dir,
        }
    }
}

/// Rewrite `clone_url` so its userinfo is `username:token`.
///
/// Any userinfo already present is replaced; scheme, host, port, path and
/// query are kept. URLs without a host (such as `file://`) cannot carry
/// credentials and are returned unchanged.
pub fn embed_credentials(clone_url: &str, username: &str, token: &str) -> Result<Url, MirrorError> {
    let invalid = |reason: &str| MirrorError::InvalidUrl {
        url: clone_url.to_string(),
        reason: reason.to_string(),
    };

    let mut url = Url::parse(clone_url).map_err(|e| invalid(&e.to_string()))?;

    if !url.has_host() || url.scheme() == "file" {
        debug!("Clone URL has no host, using it without credentials");
        return Ok(url);
    }

    url.set_username(username)
        .map_err(|_| invalid("URL cannot carry a username"))?;
    url.set_password(Some(token))
        .map_err(|_| invalid("URL cannot carry a password"))?;

    Ok(url)
}

/// Drives the git operations that create and refresh a mirror
pub struct MirrorDriver<G> {
    git: G,
}

impl<G: Git> MirrorDriver<G> {
    pub fn new(git: G) -> Self {
        Self { git }
    }

    pub fn git(&self) -> &G {
        &self.git
    }

    /// Ensure `<owner_dir>/<repo_name>` is a bare mirror of `clone_url`.
    ///
    /// Returns the repository directory. The git exit status is the only
    /// success signal; output is not parsed.
    pub async fn mirror(
        &self,
        repo_name: &ValidName,
        clone_url: &str,
        owner_dir: &Path,
        credentials: &Credentials,
    ) -> Result<PathBuf, MirrorError> {
        let remote = embed_credentials(
            clone_url,
            &credentials.username,
            credentials.token.expose(),
        )?;

        let repo_dir = owner_dir.join(repo_name);
        tokio::fs::create_dir_all(&repo_dir)
            .await
            .map_err(|source| MirrorError::CreateDirectory {
                path: repo_dir.clone(),
                source,
            })?;

        self.git.init_bare(&repo_dir).await?;
        self.git.fetch_mirror(&repo_dir, &remote).await?;

        info!(
            "Mirrored {} into {}",
            git::without_credentials(&remote),
            repo_dir.display()
        );
        Ok(repo_dir)
    }
}
