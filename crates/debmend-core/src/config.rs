//! Pipeline configuration.
//!
//! Everything the pipeline needs is resolved once at startup into one
//! explicit [`Config`] and passed down by reference. No component reads
//! the environment on its own; the env fallbacks live in the CLI layer
//! and the keyring probe below.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the mirrored tree to discover suites under.
    pub mirror_root: PathBuf,
    /// GPG key id used for signing.
    pub key_id: String,
    /// Explicit GNUPG home, if any; otherwise probed (see [`Config::gnupg_home`]).
    pub gnupg_home_override: Option<PathBuf>,
    /// Path segment that marks an entry as a tracked metadata asset.
    pub tracked_segment: String,
    /// URL scheme used when deriving a suite's upstream origin.
    pub origin_scheme: String,
    /// Maximum number of suites processed concurrently.
    pub jobs: usize,
    /// Download attempts per asset before it is declared unrepairable.
    pub fetch_attempts: u32,
    /// Per-attempt download timeout.
    pub fetch_timeout: Duration,
    /// Fixed delay between retry attempts.
    pub fetch_backoff: Duration,
    /// Minimum plausible download size; smaller bodies are rejected as
    /// error pages.
    pub min_fetch_size: u64,
}

impl Config {
    /// Build a config with default knobs for the given mirror root and key.
    pub fn new(mirror_root: impl Into<PathBuf>, key_id: impl Into<String>) -> Self {
        Self {
            mirror_root: mirror_root.into(),
            key_id: key_id.into(),
            gnupg_home_override: None,
            tracked_segment: "i18n".to_string(),
            origin_scheme: "https".to_string(),
            jobs: num_cpus::get(),
            fetch_attempts: 3,
            fetch_timeout: Duration::from_secs(30),
            fetch_backoff: Duration::from_secs(2),
            min_fetch_size: 128,
        }
    }

    /// Resolve the GNUPG home directory.
    ///
    /// Probes, in order: the explicit override, `$GNUPGHOME`, then
    /// `~/.gnupg`. Returns the first candidate that exists on disk, or
    /// `None` if no keyring directory can be found.
    pub fn gnupg_home(&self) -> Option<PathBuf> {
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(explicit) = &self.gnupg_home_override {
            candidates.push(explicit.clone());
        }
        if let Ok(env_home) = std::env::var("GNUPGHOME") {
            candidates.push(PathBuf::from(env_home));
        }
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(".gnupg"));
        }
        candidates.into_iter().find(|p| p.is_dir())
    }

    /// Path of the advisory run lock under the mirror root.
    pub fn lock_path(&self) -> PathBuf {
        self.mirror_root.join(".debmend.lock")
    }

    /// Whether a suite-relative path counts as a tracked metadata asset.
    pub fn is_tracked(&self, path: &str) -> bool {
        path.split('/').any(|seg| seg == self.tracked_segment)
    }

    /// Mirror root as a `Path`.
    pub fn mirror_root(&self) -> &Path {
        &self.mirror_root
    }
}
