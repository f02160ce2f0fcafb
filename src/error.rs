//! Error taxonomy for a backup run.
//!
//! Each enum maps to one failure category: configuration records, identity
//! validation, repository listing, and mirroring. None of the messages carry
//! the access token.

use std::path::PathBuf;

use reqwest::StatusCode;

/// A configuration record cannot be used. Fatal for that record only.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The record is not a valid configuration object.
    #[error("record {index} could not be parsed: {source}")]
    Parse {
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("token is missing or empty")]
    MissingToken,

    #[error("token contains characters that cannot be sent in an HTTP header")]
    InvalidToken,

    #[error("provider is missing (expected \"github\" or \"gitlab\")")]
    MissingProvider,

    #[error("invalid host '{host}': {reason}")]
    InvalidHost { host: String, reason: String },

    #[error("invalid directory '{path}': {reason}")]
    InvalidDirectory { path: String, reason: String },

    #[error("directory {path:?} is neither writable nor creatable")]
    DirectoryNotWritable { path: PathBuf },
}

/// A repository or owner name fails the naming policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid name '{0}'")]
pub struct NameError(pub String);

/// Listing repositories or the current user failed.
///
/// Fatal for the enumeration of one record: remaining pages are not fetched.
#[derive(Debug, thiserror::Error)]
pub enum ListingError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: StatusCode },

    #[error("unexpected response body from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid link '{link}': {reason}")]
    InvalidLink { link: String, reason: String },
}

/// Mirroring a single repository failed. Never aborts the batch.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("failed to create directory {path:?}: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid clone URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to run git {command}: {source}")]
    Spawn {
        command: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("git {command} failed in {path:?} ({status}): {stderr}")]
    Failed {
        command: &'static str,
        path: PathBuf,
        status: String,
        stderr: String,
    },

    #[error("git {command} in {path:?} timed out after {seconds}s")]
    TimedOut {
        command: &'static str,
        path: PathBuf,
        seconds: u64,
    },
}

/// A configuration record could not complete its backup.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Listing(#[from] ListingError),

    #[error("failed to create base directory {path:?}: {source}")]
    BaseDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
