//! Backup Engine - orchestrates discovery, filtering and mirroring
//!
//! For one configuration record the engine authenticates, walks the listing
//! pages in order, validates and filters each repository, and mirrors the
//! survivors. Mirrors of one page run concurrently up to `max_parallel`; the
//! next page is only requested after the current one is done.

use futures::stream::{FuturesUnordered, StreamExt, TryStreamExt};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::config::{Config, Provider};
use crate::error::{BackupError, ConfigError, MirrorError};
use crate::forge::{ApiSource, GitHub, GitLab, Page, RepositorySource};
use crate::git::{Git, GitCli};
use crate::mirror::{Credentials, MirrorDriver, MirrorTarget};
use crate::naming::{self, ValidName};

/// Outcome for one repository
#[derive(Debug)]
pub enum MirrorResult {
    /// The bare mirror was created or refreshed
    Mirrored { full_name: String, path: PathBuf },
    /// Dry run: the repository would have been mirrored here
    Planned { full_name: String, path: PathBuf },
    /// Mirroring failed; the batch went on
    Failed {
        full_name: String,
        path: PathBuf,
        error: MirrorError,
    },
}

impl MirrorResult {
    pub fn full_name(&self) -> &str {
        match self {
            MirrorResult::Mirrored { full_name, .. }
            | MirrorResult::Planned { full_name, .. }
            | MirrorResult::Failed { full_name, .. } => full_name,
        }
    }

    pub fn path(&self) -> &PathBuf {
        match self {
            MirrorResult::Mirrored { path, .. }
            | MirrorResult::Planned { path, .. }
            | MirrorResult::Failed { path, .. } => path,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, MirrorResult::Failed { .. })
    }
}

/// Results of backing up one configuration record
#[derive(Debug)]
pub struct BackupSummary {
    pub provider: Provider,
    pub username: String,
    pub pages: usize,
    pub discovered: usize,
    /// Raw names of listings skipped by name validation
    pub invalid_names: Vec<String>,
    pub filtered_out: usize,
    /// Listings that repeated an already handled repository
    pub duplicates: usize,
    /// Per-repository results in discovery order
    pub results: Vec<MirrorResult>,
    pub duration: Duration,
}

impl BackupSummary {
    fn new(provider: Provider, username: String) -> Self {
        Self {
            provider,
            username,
            pages: 0,
            discovered: 0,
            invalid_names: Vec::new(),
            filtered_out: 0,
            duplicates: 0,
            results: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    pub fn mirrored(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r, MirrorResult::Mirrored { .. }))
            .count()
    }

    pub fn planned(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r, MirrorResult::Planned { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.is_failure()).count()
    }
}

/// Options that apply to every record of a run
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Enumerate and filter only; no directories, no git
    pub dry_run: bool,
    /// Count per-repository mirror failures as record failures
    pub strict: bool,
}

/// A repository that passed validation and policy
struct MirrorJob {
    full_name: String,
    name: ValidName,
    clone_url: String,
    target: MirrorTarget,
}

/// Backup orchestration for one configuration record
pub struct BackupEngine<S, G> {
    config: Config,
    source: S,
    driver: MirrorDriver<G>,
    dry_run: bool,
}

impl<S: RepositorySource, G: Git> BackupEngine<S, G> {
    pub fn new(config: Config, source: S, git: G) -> Self {
        Self {
            config,
            source,
            driver: MirrorDriver::new(git),
            dry_run: false,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn git(&self) -> &G {
        self.driver.git()
    }

    /// Run the backup to completion.
    ///
    /// Returns once every page has been consumed, whatever the individual
    /// mirror outcomes. Authentication, listing and base directory failures
    /// abort the run.
    pub async fn run(&self) -> Result<BackupSummary, BackupError> {
        let start_time = Instant::now();
        let provider = self.source.provider();

        info!(
            "Starting {} backup into {}",
            provider,
            self.config.directory.display()
        );

        if !self.dry_run {
            self.ensure_base_directory().await?;
        }

        let user = self.source.current_user().await?;
        info!("Authenticated as {} user: {}", provider, user.login);

        let credentials = Credentials {
            username: user.login.clone(),
            token: self.config.token.clone(),
        };
        let mut summary = BackupSummary::new(provider, user.login);
        let mut seen = HashSet::new();

        let mut pages = self.source.pages();
        while let Some(page) = pages.try_next().await? {
            summary.pages += 1;
            summary.discovered += page.repositories.len();
            debug!(
                "Page {} lists {} repositories",
                summary.pages,
                page.repositories.len()
            );

            let jobs = self.plan(page, &mut summary, &mut seen);
            let results = self.mirror_all(jobs, &credentials).await;
            summary.results.extend(results);
        }

        summary.duration = start_time.elapsed();

        info!(
            "Backup completed in {:.2}s: {} mirrored, {} failed, {} invalid, {} filtered",
            summary.duration.as_secs_f64(),
            summary.mirrored(),
            summary.failed(),
            summary.invalid_names.len(),
            summary.filtered_out
        );

        Ok(summary)
    }

    async fn ensure_base_directory(&self) -> Result<(), BackupError> {
        let directory = &self.config.directory;
        if directory.is_dir() {
            return Ok(());
        }

        tokio::fs::create_dir_all(directory)
            .await
            .map_err(|source| BackupError::BaseDirectory {
                path: directory.clone(),
                source,
            })?;
        info!("Created directory: {}", directory.display());
        Ok(())
    }

    /// Validate and filter one page into mirror jobs
    fn plan(
        &self,
        page: Page,
        summary: &mut BackupSummary,
        seen: &mut HashSet<PathBuf>,
    ) -> Vec<MirrorJob> {
        let mut jobs = Vec::new();

        for repository in page.repositories {
            let full_name = repository.full_name();

            let (owner, name) = match (
                naming::validate(&repository.owner),
                naming::validate(&repository.name),
            ) {
                (Ok(owner), Ok(name)) => (owner, name),
                (Err(e), _) | (_, Err(e)) => {
                    warn!("Skipping {:?}: {}", full_name, e);
                    summary.invalid_names.push(full_name);
                    continue;
                }
            };

            if !self.config.should_backup(&owner, &name) {
                debug!("Excluding repository by allowlist: {}", full_name);
                summary.filtered_out += 1;
                continue;
            }

            let target = MirrorTarget::new(&self.config.directory, &owner, &name);
            if !seen.insert(target.repo_dir.clone()) {
                warn!("Repository listed more than once, skipping: {}", full_name);
                summary.duplicates += 1;
                continue;
            }

            jobs.push(MirrorJob {
                full_name,
                name,
                clone_url: repository.clone_url,
                target,
            });
        }

        jobs
    }

    /// Mirror a batch of jobs with bounded concurrency, keeping input order
    async fn mirror_all(&self, jobs: Vec<MirrorJob>, credentials: &Credentials) -> Vec<MirrorResult> {
        let semaphore = Semaphore::new(self.config.max_parallel);
        let semaphore = &semaphore;
        let mut futures = FuturesUnordered::new();

        for (index, job) in jobs.into_iter().enumerate() {
            futures.push(async move {
                let _permit = semaphore.acquire().await;
                (index, self.mirror_one(job, credentials).await)
            });
        }

        let mut results = Vec::with_capacity(futures.len());
        while let Some(result) = futures.next().await {
            results.push(result);
        }

        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, result)| result).collect()
    }

    async fn mirror_one(&self, job: MirrorJob, credentials: &Credentials) -> MirrorResult {
        let MirrorJob {
            full_name,
            name,
            clone_url,
            target,
        } = job;

        if self.dry_run {
            info!("Would back up {} into {}", full_name, target.repo_dir.display());
            return MirrorResult::Planned {
                full_name,
                path: target.repo_dir,
            };
        }

        info!("Backing up repository: {}", full_name);

        let outcome = match tokio::fs::create_dir_all(&target.owner_dir).await {
            Ok(()) => {
                self.driver
                    .mirror(&name, &clone_url, &target.owner_dir, credentials)
                    .await
            }
            Err(source) => Err(MirrorError::CreateDirectory {
                path: target.owner_dir.clone(),
                source,
            }),
        };

        match outcome {
            Ok(path) => MirrorResult::Mirrored { full_name, path },
            Err(error) => {
                error!("Failed to back up {}: {}", full_name, error);
                MirrorResult::Failed {
                    full_name,
                    path: target.repo_dir,
                    error,
                }
            }
        }
    }
}

/// Back up one validated configuration with the provider's API and the git CLI
pub async fn backup(config: &Config, options: RunOptions) -> Result<BackupSummary, BackupError> {
    let git = GitCli::new(config.git_timeout);

    match config.provider {
        Provider::Github => {
            let source = ApiSource::<GitHub>::new(config)?;
            BackupEngine::new(config.clone(), source, git)
                .with_dry_run(options.dry_run)
                .run()
                .await
        }
        Provider::Gitlab => {
            let source = ApiSource::<GitLab>::new(config)?;
            BackupEngine::new(config.clone(), source, git)
                .with_dry_run(options.dry_run)
                .run()
                .await
        }
    }
}

/// Outcome of every record in a configuration list
#[derive(Debug, Default)]
pub struct BatchReport {
    pub records: Vec<Result<BackupSummary, BackupError>>,
}

impl BatchReport {
    pub fn failed_records(&self) -> usize {
        self.records.iter().filter(|r| r.is_err()).count()
    }

    pub fn failed_mirrors(&self) -> usize {
        self.records
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .map(BackupSummary::failed)
            .sum()
    }

    /// `0` when every record succeeded, `1` otherwise. With `strict`, a
    /// failed repository mirror also fails the run.
    pub fn exit_code(&self, strict: bool) -> u8 {
        if self.failed_records() > 0 || (strict && self.failed_mirrors() > 0) {
            1
        } else {
            0
        }
    }
}

/// Back up every record in order; a failing record never stops the others
pub async fn backup_all(
    configs: Vec<Result<Config, ConfigError>>,
    options: RunOptions,
) -> BatchReport {
    let mut report = BatchReport::default();

    for (index, config) in configs.into_iter().enumerate() {
        let outcome = match config {
            Ok(config) => backup(&config, options).await,
            Err(e) => Err(BackupError::Config(e)),
        };

        if let Err(e) = &outcome {
            error!("Configuration record {} failed: {}", index, e);
        }
        report.records.push(outcome);
    }

    report
}
