//! RepoVault - Bare mirror backups of hosted git repositories
//!
//! RepoVault asks GitHub or GitLab for every repository an access token can
//! see and keeps a bare mirror of each one under `<directory>/<owner>/<repo>`.
//! Re-running a backup refreshes the mirrors in place.
//!
//! ## Core Features
//!
//! - **Provider Discovery**: Paginated listing over the GitHub and GitLab REST APIs
//! - **Allowlist Filtering**: Optional owner and repository allowlists per record
//! - **Safe Naming**: Only names matching `^\w[-.\w]*$` ever become directories
//! - **Idempotent Mirrors**: Forced, pruning fetches converge on the remote state
//! - **Multiple Records**: One configuration list, each record backed up independently
//!
//! ## Modules
//!
//! - [`config`]: Configuration records, validation and the allowlist policy
//! - [`forge`]: Provider APIs and lazy page streaming
//! - [`naming`]: Repository and owner name validation
//! - [`mirror`]: Mirror layout, credential embedding and the mirror driver
//! - [`git`]: The git command runner
//! - [`backup`]: Per-record orchestration and batch runs

pub mod backup;
pub mod config;
pub mod error;
pub mod forge;
pub mod git;
pub mod mirror;
pub mod naming;

pub use backup::{backup, backup_all, BackupEngine, BackupSummary, BatchReport, MirrorResult, RunOptions};
pub use config::{Config, ConfigRecord, Provider};
pub use error::{BackupError, ConfigError, ListingError, MirrorError, NameError};
pub use git::{Git, GitCli};
pub use mirror::MirrorDriver;
pub use naming::ValidName;
