//! GitLab REST API (v4) mapping

use reqwest::header::{HeaderName, HeaderValue, InvalidHeaderValue};
use serde::Deserialize;

use super::{ForgeApi, RepositoryDescriptor};
use crate::config::Provider;

/// Header GitLab reads personal access tokens from
pub const PRIVATE_TOKEN: &str = "private-token";

/// GitLab provider (`/user`, `/projects?membership=true`)
pub struct GitLab;

#[derive(Debug, Deserialize)]
pub struct GitLabUser {
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct GitLabNamespace {
    pub path: String,
}

/// A project; `path` is the URL slug, which may differ from the display name
#[derive(Debug, Deserialize)]
pub struct GitLabProject {
    pub path: String,
    pub namespace: GitLabNamespace,
    pub http_url_to_repo: String,
}

impl ForgeApi for GitLab {
    const PROVIDER: Provider = Provider::Gitlab;
    const USER_ENDPOINT: &'static str = "user";
    const REPOSITORIES_ENDPOINT: &'static str = "projects?membership=true&per_page=100";

    type User = GitLabUser;
    type Repository = GitLabProject;

    fn auth_header(token: &str) -> Result<(HeaderName, HeaderValue), InvalidHeaderValue> {
        Ok((
            HeaderName::from_static(PRIVATE_TOKEN),
            HeaderValue::from_str(token)?,
        ))
    }

    fn login(user: GitLabUser) -> String {
        user.username
    }

    fn describe(project: GitLabProject) -> RepositoryDescriptor {
        RepositoryDescriptor {
            name: project.path,
            owner: project.namespace.path,
            clone_url: project.http_url_to_repo,
        }
    }
}
