use anyhow::{bail, Context, Result};
use reqwest::header::HeaderValue;
use reqwest::Url;
use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::naming::ValidName;

/// Environment variable selecting the base save directory
pub const BACKUP_DIR_ENV: &str = "BACKUP_DIR";

/// Base directory used when neither the record nor the environment sets one
pub const DEFAULT_DIRECTORY: &str = ".";

/// Upper bound for concurrent mirror operations per record
pub const MAX_PARALLEL_LIMIT: usize = 32;

/// Supported git hosting providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Github,
    Gitlab,
}

impl Provider {
    /// Default REST API base URL
    pub fn default_host(self) -> &'static str {
        match self {
            Provider::Github => "https://api.github.com/",
            Provider::Gitlab => "https://gitlab.com/api/v4/",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Github => "github",
            Provider::Gitlab => "gitlab",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Access token that never shows up in `Debug` output
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SecretToken(String);

impl SecretToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Borrow the raw token. Only for request headers and the transient clone URL.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretToken(***)")
    }
}

/// Accepts any scalar so a mistyped token is never echoed by a type error.
/// Numbers and booleans are kept as their text form; `null` is empty.
impl<'de> Deserialize<'de> for SecretToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TokenVisitor;

        impl<'de> Visitor<'de> for TokenVisitor {
            type Value = SecretToken;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a token string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<SecretToken, E> {
                Ok(SecretToken::new(v))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<SecretToken, E> {
                Ok(SecretToken(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<SecretToken, E> {
                Ok(SecretToken(v.to_string()))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<SecretToken, E> {
                Ok(SecretToken(v.to_string()))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<SecretToken, E> {
                Ok(SecretToken(v.to_string()))
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<SecretToken, E> {
                Ok(SecretToken(v.to_string()))
            }

            fn visit_unit<E: de::Error>(self) -> Result<SecretToken, E> {
                Ok(SecretToken::default())
            }

            fn visit_none<E: de::Error>(self) -> Result<SecretToken, E> {
                Ok(SecretToken::default())
            }

            // Reject containers without describing their content
            fn visit_seq<A: de::SeqAccess<'de>>(self, _: A) -> Result<SecretToken, A::Error> {
                Err(de::Error::custom("token must be a string"))
            }

            fn visit_map<A: de::MapAccess<'de>>(self, _: A) -> Result<SecretToken, A::Error> {
                Err(de::Error::custom("token must be a string"))
            }
        }

        deserializer.deserialize_any(TokenVisitor)
    }
}

/// One entry of the configuration list, as written by the user
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigRecord {
    /// Access token for the provider API and for fetching
    #[serde(default)]
    pub token: SecretToken,

    /// Owner allowlist; empty allows every owner
    #[serde(default)]
    pub owners: Vec<String>,

    /// Repository name allowlist; empty allows every repository
    #[serde(default)]
    pub repos: Vec<String>,

    /// Base directory for the mirrors
    #[serde(default)]
    pub directory: Option<String>,

    /// Git hosting provider
    #[serde(default, alias = "provider")]
    pub method: Option<Provider>,

    /// REST API base URL, defaults per provider
    #[serde(default)]
    pub host: Option<String>,

    /// Maximum concurrent mirror operations
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Timeout for each git command in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Timeout for each API request in seconds
    #[serde(default = "default_http_timeout")]
    pub http_timeout: u64,
}

// Default value functions
fn default_max_parallel() -> usize {
    4
}
fn default_timeout() -> u64 {
    300
}
fn default_http_timeout() -> u64 {
    30
}

impl Default for ConfigRecord {
    fn default() -> Self {
        Self {
            token: SecretToken::default(),
            owners: Vec::new(),
            repos: Vec::new(),
            directory: None,
            method: None,
            host: None,
            max_parallel: default_max_parallel(),
            timeout: default_timeout(),
            http_timeout: default_http_timeout(),
        }
    }
}

/// Validated, immutable configuration for one backup run
#[derive(Debug, Clone)]
pub struct Config {
    pub provider: Provider,
    /// API base URL, always ending in `/`
    pub host: Url,
    pub token: SecretToken,
    pub owners: BTreeSet<String>,
    pub repos: BTreeSet<String>,
    pub directory: PathBuf,
    pub max_parallel: usize,
    pub git_timeout: Duration,
    pub http_timeout: Duration,
}

impl Config {
    /// Validate a record into a usable configuration
    pub fn from_record(record: ConfigRecord) -> Result<Self, ConfigError> {
        if record.token.is_empty() {
            return Err(ConfigError::MissingToken);
        }
        if HeaderValue::from_str(record.token.expose()).is_err() {
            return Err(ConfigError::InvalidToken);
        }

        let provider = record.method.ok_or(ConfigError::MissingProvider)?;
        let host = parse_host(record.host.as_deref(), provider)?;
        let directory = resolve_directory(record.directory.as_deref())?;
        check_directory(&directory)?;

        Ok(Self {
            provider,
            host,
            token: record.token,
            owners: record.owners.into_iter().collect(),
            repos: record.repos.into_iter().collect(),
            directory,
            max_parallel: record.max_parallel.clamp(1, MAX_PARALLEL_LIMIT),
            git_timeout: Duration::from_secs(record.timeout.max(1)),
            http_timeout: Duration::from_secs(record.http_timeout.max(1)),
        })
    }

    /// Allowlist policy: an empty list leaves its dimension unrestricted
    pub fn should_backup(&self, owner: &ValidName, repo: &ValidName) -> bool {
        let owner_allowed = self.owners.is_empty() || self.owners.contains(owner.as_str());
        let repo_allowed = self.repos.is_empty() || self.repos.contains(repo.as_str());
        owner_allowed && repo_allowed
    }
}

fn parse_host(host: Option<&str>, provider: Provider) -> Result<Url, ConfigError> {
    let host = host
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| provider.default_host());

    // Url::join drops the last path segment unless the base ends in a slash
    let normalized = if host.ends_with('/') {
        host.to_string()
    } else {
        format!("{host}/")
    };

    let url = Url::parse(&normalized).map_err(|e| ConfigError::InvalidHost {
        host: host.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidHost {
            host: host.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

/// Resolve the base directory from the record and the `BACKUP_DIR` environment
fn resolve_directory(directory: Option<&str>) -> Result<PathBuf, ConfigError> {
    let env_root = std::env::var(BACKUP_DIR_ENV)
        .ok()
        .filter(|d| !d.trim().is_empty());

    let explicit = directory.map(str::trim).filter(|d| !d.is_empty());
    let raw = match explicit {
        Some(directory) => directory.to_string(),
        None => env_root.clone().unwrap_or_else(|| DEFAULT_DIRECTORY.to_string()),
    };

    let expanded = shellexpand::full(&raw).map_err(|e| ConfigError::InvalidDirectory {
        path: raw.clone(),
        reason: e.to_string(),
    })?;

    let mut path = PathBuf::from(expanded.as_ref());
    if path.is_relative() && explicit.is_some() {
        if let Some(root) = env_root {
            let root = shellexpand::full(&root).map_err(|e| ConfigError::InvalidDirectory {
                path: root.clone(),
                reason: e.to_string(),
            })?;
            path = Path::new(root.as_ref()).join(path);
        }
    }

    Ok(path_clean::clean(path))
}

/// The directory must be a writable directory, or creatable below its
/// nearest existing ancestor.
fn check_directory(path: &Path) -> Result<(), ConfigError> {
    if path.exists() {
        if !path.is_dir() {
            return Err(ConfigError::InvalidDirectory {
                path: path.display().to_string(),
                reason: "not a directory".to_string(),
            });
        }
        return if is_writable(path) {
            Ok(())
        } else {
            Err(ConfigError::DirectoryNotWritable {
                path: path.to_path_buf(),
            })
        };
    }

    for ancestor in path.ancestors().skip(1) {
        let candidate = if ancestor.as_os_str().is_empty() {
            Path::new(".")
        } else {
            ancestor
        };

        if candidate.exists() {
            return if candidate.is_dir() && is_writable(candidate) {
                Ok(())
            } else {
                Err(ConfigError::DirectoryNotWritable {
                    path: path.to_path_buf(),
                })
            };
        }
    }

    Err(ConfigError::DirectoryNotWritable {
        path: path.to_path_buf(),
    })
}

#[cfg(unix)]
fn is_writable(path: &Path) -> bool {
    nix::unistd::access(path, nix::unistd::AccessFlags::W_OK).is_ok()
}

#[cfg(not(unix))]
fn is_writable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| !m.permissions().readonly())
        .unwrap_or(false)
}

/// Serialization format of a configuration document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    /// `.yml` and `.yaml` files are YAML, everything else is JSON
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yml") || ext.eq_ignore_ascii_case("yaml") => {
                ConfigFormat::Yaml
            }
            _ => ConfigFormat::Json,
        }
    }
}

/// Parse a configuration document into its records.
///
/// The document itself must be a non-empty list. Each entry is deserialized
/// on its own so a broken record does not take the others down with it.
pub fn parse_records(
    content: &str,
    format: ConfigFormat,
) -> Result<Vec<Result<ConfigRecord, ConfigError>>> {
    let values: Vec<serde_json::Value> = match format {
        ConfigFormat::Json => {
            serde_json::from_str(content).context("Failed to parse configuration as a JSON list")?
        }
        ConfigFormat::Yaml => {
            serde_yaml::from_str(content).context("Failed to parse configuration as a YAML list")?
        }
    };

    if values.is_empty() {
        bail!("Configuration list is empty");
    }

    Ok(values
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            serde_json::from_value(value).map_err(|source| ConfigError::Parse { index, source })
        })
        .collect())
}

/// Load configuration records from a file, or from stdin when no path is given
pub fn load(path: Option<&Path>) -> Result<Vec<Result<Config, ConfigError>>> {
    let (content, format) = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            (content, ConfigFormat::from_path(path))
        }
        None => {
            let mut content = String::new();
            std::io::stdin()
                .read_to_string(&mut content)
                .context("Failed to read configuration from stdin")?;
            (content, ConfigFormat::Json)
        }
    };

    let records = parse_records(&content, format)?;

    Ok(records
        .into_iter()
        .map(|record| record.and_then(Config::from_record))
        .collect())
}
