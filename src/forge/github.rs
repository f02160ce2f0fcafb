//! GitHub REST API mapping

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue, ACCEPT, AUTHORIZATION};
use serde::Deserialize;

use super::{ForgeApi, RepositoryDescriptor};
use crate::config::Provider;

/// GitHub provider (`/user`, `/user/repos`)
pub struct GitHub;

#[derive(Debug, Deserialize)]
pub struct GitHubUser {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub struct GitHubOwner {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub struct GitHubRepository {
    pub name: String,
    pub owner: GitHubOwner,
    pub clone_url: String,
}

impl ForgeApi for GitHub {
    const PROVIDER: Provider = Provider::Github;
    const USER_ENDPOINT: &'static str = "user";
    const REPOSITORIES_ENDPOINT: &'static str = "user/repos?per_page=100";

    type User = GitHubUser;
    type Repository = GitHubRepository;

    fn auth_header(token: &str) -> Result<(HeaderName, HeaderValue), InvalidHeaderValue> {
        Ok((AUTHORIZATION, HeaderValue::from_str(&format!("token {}", token))?))
    }

    fn default_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_MEDIA_TYPE));
        headers
    }

    fn login(user: GitHubUser) -> String {
        user.login
    }

    fn describe(repository: GitHubRepository) -> RepositoryDescriptor {
        RepositoryDescriptor {
            name: repository.name,
            owner: repository.owner.login,
            clone_url: repository.clone_url,
        }
    }
}

/// Media type GitHub recommends for REST requests
pub const GITHUB_MEDIA_TYPE: &str = "application/vnd.github+json";
