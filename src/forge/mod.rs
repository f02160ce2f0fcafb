//! Repository discovery over the provider REST APIs
//!
//! Both GitHub and GitLab list repositories as JSON arrays split across pages
//! linked through the `Link` response header. [`ApiSource`] walks those pages
//! lazily for any [`ForgeApi`] implementation; the provider modules only
//! describe endpoints, the authentication header and the JSON field mapping.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue, LINK};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use tracing::debug;

use crate::config::{Config, Provider};
use crate::error::{BackupError, ConfigError, ListingError};

pub mod github;
pub mod gitlab;

pub use github::GitHub;
pub use gitlab::GitLab;

/// Repository as reported by a provider, before name validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryDescriptor {
    /// Repository name (e.g., "repovault")
    pub name: String,

    /// Owner, organization or namespace name
    pub owner: String,

    /// HTTPS clone URL without credentials
    pub clone_url: String,
}

impl RepositoryDescriptor {
    /// Get display name (owner/name format)
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// One page of a repository listing
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub repositories: Vec<RepositoryDescriptor>,

    /// Where the following page starts; `None` ends the listing
    pub next: Option<Url>,
}

/// The authenticated account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub login: String,
}

/// Source of repository listings for one provider account
#[async_trait]
pub trait RepositorySource: Send + Sync {
    /// Provider name for display/logging
    fn provider(&self) -> Provider;

    /// Look up the account the token belongs to
    async fn current_user(&self) -> Result<CurrentUser, ListingError>;

    /// Lazily stream listing pages.
    ///
    /// A page is only requested once the previous one has been pulled from the
    /// stream. The stream ends after the first page without a next link, or
    /// after the first error.
    fn pages(&self) -> BoxStream<'_, Result<Page, ListingError>>;
}

/// Provider-specific pieces of the REST API
pub trait ForgeApi: Send + Sync + 'static {
    const PROVIDER: Provider;

    /// Path of the current-user endpoint, relative to the API host
    const USER_ENDPOINT: &'static str;

    /// Path and query of the first repository listing page
    const REPOSITORIES_ENDPOINT: &'static str;

    type User: DeserializeOwned + Send;
    type Repository: DeserializeOwned + Send;

    /// Authentication header carrying the token
    fn auth_header(token: &str) -> Result<(HeaderName, HeaderValue), InvalidHeaderValue>;

    /// Headers sent with every request besides authentication
    fn default_headers() -> HeaderMap {
        HeaderMap::new()
    }

    fn login(user: Self::User) -> String;

    fn describe(repository: Self::Repository) -> RepositoryDescriptor;
}

/// Paged listing client for one provider, authenticated with one token
pub struct ApiSource<F> {
    client: Client,
    user_url: Url,
    repositories_url: Url,
    _forge: PhantomData<F>,
}

impl<F: ForgeApi> ApiSource<F> {
    /// Build a client for the configured host and token
    pub fn new(config: &Config) -> Result<Self, BackupError> {
        let (name, mut value) =
            F::auth_header(config.token.expose()).map_err(|_| ConfigError::InvalidToken)?;
        value.set_sensitive(true);

        let mut headers = F::default_headers();
        headers.insert(name, value);

        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(config.http_timeout)
            .connect_timeout(config.http_timeout)
            .build()
            .map_err(ListingError::Client)?;

        Ok(Self {
            client,
            user_url: endpoint(&config.host, F::USER_ENDPOINT)?,
            repositories_url: endpoint(&config.host, F::REPOSITORIES_ENDPOINT)?,
            _forge: PhantomData,
        })
    }

    /// Fetch a single listing page
    pub async fn fetch_page(&self, url: Url) -> Result<Page, ListingError> {
        debug!("Fetching repository page: {}", url);

        let (body, headers) = self.get(&url).await?;
        let next = next_link(&headers)
            .map(|link| {
                url.join(&link).map_err(|e| ListingError::InvalidLink {
                    link,
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        let items: Vec<F::Repository> =
            serde_json::from_slice(&body).map_err(|source| ListingError::Decode {
                url: url.to_string(),
                source,
            })?;

        Ok(Page {
            repositories: items.into_iter().map(F::describe).collect(),
            next,
        })
    }

    async fn get(&self, url: &Url) -> Result<(Vec<u8>, HeaderMap), ListingError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| ListingError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ListingError::Status {
                url: url.to_string(),
                status,
            });
        }

        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|source| ListingError::Request {
                url: url.to_string(),
                source,
            })?;

        Ok((body.to_vec(), headers))
    }
}

#[async_trait]
impl<F: ForgeApi> RepositorySource for ApiSource<F> {
    fn provider(&self) -> Provider {
        F::PROVIDER
    }

    async fn current_user(&self) -> Result<CurrentUser, ListingError> {
        let (body, _) = self.get(&self.user_url).await?;
        let user: F::User = serde_json::from_slice(&body).map_err(|source| ListingError::Decode {
            url: self.user_url.to_string(),
            source,
        })?;

        Ok(CurrentUser {
            login: F::login(user),
        })
    }

    fn pages(&self) -> BoxStream<'_, Result<Page, ListingError>> {
        stream::try_unfold(Some(self.repositories_url.clone()), move |cursor| async move {
            let Some(url) = cursor else {
                return Ok(None);
            };
            let page = self.fetch_page(url).await?;
            let next = page.next.clone();
            Ok(Some((page, next)))
        })
        .boxed()
    }
}

fn endpoint(host: &Url, path: &str) -> Result<Url, ListingError> {
    host.join(path).map_err(|e| ListingError::InvalidLink {
        link: path.to_string(),
        reason: e.to_string(),
    })
}

/// Extract the `rel="next"` target from `Link` headers (RFC 8288)
pub fn next_link(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .find_map(|link| {
            let mut parts = link.split(';');
            let target = parts
                .next()?
                .trim()
                .strip_prefix('<')?
                .strip_suffix('>')?;

            let is_next = parts.any(|param| {
                let Some((key, value)) = param.split_once('=') else {
                    return false;
                };
                key.trim().eq_ignore_ascii_case("rel")
                    && value
                        .trim()
                        .trim_matches('"')
                        .split_whitespace()
                        .any(|rel| rel.eq_ignore_ascii_case("next"))
            });

            is_next.then(|| target.to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link_headers(values: &[&str]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for value in values {
            headers.append(LINK, HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    #[test]
    fn test_next_link_github_style() {
        let headers = link_headers(&[
            r#"<https://api.github.com/user/repos?page=2>; rel="next", <https://api.github.com/user/repos?page=5>; rel="last""#,
        ]);
        assert_eq!(
            next_link(&headers).as_deref(),
            Some("https://api.github.com/user/repos?page=2")
        );
    }

    #[test]
    fn test_next_link_not_first() {
        let headers = link_headers(&[
            r#"<https://gitlab.com/api/v4/projects?page=1>; rel="first", <https://gitlab.com/api/v4/projects?page=3>; rel="next""#,
        ]);
        assert_eq!(
            next_link(&headers).as_deref(),
            Some("https://gitlab.com/api/v4/projects?page=3")
        );
    }

    #[test]
    fn test_next_link_unquoted_and_multiple_rels() {
        assert_eq!(
            next_link(&link_headers(&["</page/2>; rel=next"])).as_deref(),
            Some("/page/2")
        );
        assert_eq!(
            next_link(&link_headers(&[r#"</page/2>; rel="prefetch next""#])).as_deref(),
            Some("/page/2")
        );
    }

    #[test]
    fn test_next_link_across_header_values() {
        let headers = link_headers(&[r#"</page/1>; rel="prev""#, r#"</page/3>; rel="next""#]);
        assert_eq!(next_link(&headers).as_deref(), Some("/page/3"));
    }

    #[test]
    fn test_no_next_link() {
        assert_eq!(next_link(&HeaderMap::new()), None);
        assert_eq!(
            next_link(&link_headers(&[r#"<https://x/?page=1>; rel="prev", <https://x/?page=1>; rel="first""#])),
            None
        );
        assert_eq!(next_link(&link_headers(&["garbage"])), None);
    }

    #[test]
    fn test_descriptor_full_name() {
        let descriptor = RepositoryDescriptor {
            name: "repovault".to_string(),
            owner: "MKSG".to_string(),
            clone_url: "https://github.com/MKSG/repovault.git".to_string(),
        };
        assert_eq!(descriptor.full_name(), "MKSG/repovault");
    }
}
