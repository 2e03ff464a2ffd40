//! Per-suite orchestration and the process-wide run lock.
//!
//! Each suite runs the strict sequence validate -> repair -> remove ->
//! build -> sign; suites themselves are independent and run concurrently
//! on a bounded pool. Every stage returns its results by value and the
//! caller aggregates them into a [`SuiteReport`], so concurrent suite
//! workers share no mutable state. Only the build and sign stages can
//! fail a suite; everything before them degrades.

use crate::build::build_release;
use crate::config::Config;
use crate::discover::Suite;
use crate::remove::remove_unrepairable;
use crate::repair::{RepairOutcome, repair};
use crate::sign::{SignError, Signer, sign_release};
use crate::validate::validate_entries;
use debmend_schema::{HashAlgorithm, checksum_entries};
use futures::StreamExt;
use futures::stream;
use reqwest::Client;
use std::collections::HashSet;
use std::fs::{File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Terminal state of one suite after a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuiteStatus {
    /// The suite was rebuilt and both signature artifacts written.
    Signed,
    /// A precondition failed (e.g. no Release manifest); the suite was
    /// left untouched. Not fatal to the run.
    Skipped(String),
    /// The manifest could not be regenerated. Fatal to the run.
    BuildFailed(String),
    /// The manifest was rebuilt but could not be signed. Fatal to the run.
    SignFailed(String),
}

impl SuiteStatus {
    /// Whether this status must fail the overall process exit code.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::BuildFailed(_) | Self::SignFailed(_))
    }
}

/// Counters and terminal state for one suite, returned by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteReport {
    /// Suite name.
    pub suite: String,
    /// Tracked assets that validated clean.
    pub valid: usize,
    /// Assets replaced from upstream.
    pub repaired: usize,
    /// Assets deleted as unrepairable.
    pub removed: usize,
    /// Untracked manifest entries not validated.
    pub skipped: usize,
    /// Terminal state.
    pub status: SuiteStatus,
}

impl SuiteReport {
    fn skipped(suite: &Suite, reason: impl Into<String>) -> Self {
        Self {
            suite: suite.name.clone(),
            valid: 0,
            repaired: 0,
            removed: 0,
            skipped: 0,
            status: SuiteStatus::Skipped(reason.into()),
        }
    }
}

/// Error acquiring the advisory run lock.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another pipeline run holds the lock.
    #[error("another debmend run holds the lock at {0}")]
    Busy(PathBuf),

    /// The lock file could not be created or locked.
    #[error("cannot acquire lock at {path}: {source}")]
    Io {
        /// Lock file path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
}

/// Advisory process-wide lock over a mirror root.
///
/// Prevents a cron-triggered run from overlapping a manual one. Released
/// when dropped; the lock file itself is left in place.
#[derive(Debug)]
pub struct RunLock {
    _file: File,
}

impl RunLock {
    /// Acquire the lock, failing immediately if it is already held.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Busy`] if another process holds the lock, or
    /// [`LockError::Io`] if the lock file cannot be opened.
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| LockError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        match file.try_lock() {
            Ok(()) => Ok(Self { _file: file }),
            Err(TryLockError::WouldBlock) => Err(LockError::Busy(path.to_path_buf())),
            Err(TryLockError::Error(source)) => Err(LockError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

/// Run the full pipeline over the given suites.
///
/// Verifies the signing key once up front (no point validating anything
/// if nothing can be signed), then processes suites concurrently with at
/// most `config.jobs` in flight. Returns one report per suite; the order
/// matches completion, not discovery.
///
/// # Errors
///
/// Returns [`SignError`] only for the up-front key check. Per-suite
/// failures are reported in the returned [`SuiteReport`]s instead.
pub async fn run(
    config: &Config,
    signer: &dyn Signer,
    suites: Vec<Suite>,
) -> Result<Vec<SuiteReport>, SignError> {
    signer.verify_key().await?;

    let client = Client::new();
    let reports: Vec<SuiteReport> = stream::iter(suites)
        .map(|suite| {
            let client = client.clone();
            async move { process_suite(&client, config, signer, &suite).await }
        })
        .buffer_unordered(config.jobs.max(1))
        .collect()
        .await;
    Ok(reports)
}

/// Validate, repair, remove, rebuild, and re-sign one suite.
pub async fn process_suite(
    client: &Client,
    config: &Config,
    signer: &dyn Signer,
    suite: &Suite,
) -> SuiteReport {
    let manifest_text = match tokio::fs::read_to_string(suite.release_path()).await {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!(suite = %suite.name, %err, "no readable Release manifest, skipping suite");
            return SuiteReport::skipped(suite, "missing Release manifest");
        }
    };

    let entries = parse_with_best_algorithm(&manifest_text);
    let results = validate_entries(&suite.dist_dir, &entries, |p| config.is_tracked(p)).await;
    let skipped = entries.len() - results.len();

    let mut valid = 0;
    let mut repaired = 0;
    let mut repaired_paths: HashSet<&str> = HashSet::new();
    for (entry, outcome) in &results {
        if !outcome.needs_repair() {
            valid += 1;
            continue;
        }
        tracing::info!(suite = %suite.name, path = %entry.path, ?outcome, "attempting repair");
        if repair(client, config, suite, entry).await == RepairOutcome::Repaired {
            repaired += 1;
            repaired_paths.insert(entry.path.as_str());
        }
    }

    // Independent second pass: catches failed repairs and anything repair
    // never reached. Entries just installed are exempt, even when their
    // digest no longer matches the old manifest (upstream may have moved
    // on); the rebuilt manifest records their new digests.
    let removed = remove_unrepairable(&suite.dist_dir, &entries, |p| {
        config.is_tracked(p) && !repaired_paths.contains(p)
    })
    .await;

    if let Err(err) = build_release(suite).await {
        tracing::error!(suite = %suite.name, %err, "release rebuild failed");
        return SuiteReport {
            suite: suite.name.clone(),
            valid,
            repaired,
            removed,
            skipped,
            status: SuiteStatus::BuildFailed(err.to_string()),
        };
    }

    let status = match sign_release(
        signer,
        &suite.release_path(),
        &suite.inrelease_path(),
        &suite.release_gpg_path(),
    )
    .await
    {
        Ok(()) => SuiteStatus::Signed,
        Err(err) => {
            tracing::error!(suite = %suite.name, %err, "signing failed");
            SuiteStatus::SignFailed(err.to_string())
        }
    };

    tracing::info!(
        suite = %suite.name,
        valid,
        repaired,
        removed,
        skipped,
        ?status,
        "suite processed"
    );
    SuiteReport {
        suite: suite.name.clone(),
        valid,
        repaired,
        removed,
        skipped,
        status,
    }
}

/// Parse the manifest with the strongest algorithm that has entries.
pub fn parse_with_best_algorithm(text: &str) -> Vec<debmend_schema::ReleaseEntry> {
    for algorithm in [
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha1,
        HashAlgorithm::Md5Sum,
    ] {
        let entries = checksum_entries(text, algorithm);
        if !entries.is_empty() {
            return entries;
        }
    }
    Vec::new()
}
