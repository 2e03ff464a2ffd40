//! debmend - self-healing integrity and signing for mirrored apt repositories.
//!
//! # Overview
//!
//! debmend walks a mirror tree, finds every suite (a `dists/<name>`
//! directory with its own Release manifest), validates the suite's tracked
//! metadata assets against the manifest, redownloads what it can repair,
//! deletes what it cannot, and finally regenerates and re-signs the
//! Release so clients never see a manifest referencing a broken file.
//!
//! # Exit policy
//!
//! Unrepairable assets are an expected, non-fatal outcome: the run exits
//! zero as long as every suite was rebuilt and signed. Only a build or
//! signing failure (or an unusable mirror root) is fatal.

pub mod cmd;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line interface for debmend.
#[derive(Debug, Parser)]
#[command(name = "debmend", version, about)]
pub struct Cli {
    /// Root of the mirrored repository tree.
    #[arg(long, env = "DEBMEND_MIRROR_ROOT", global = true, default_value = "/var/spool/apt-mirror/mirror")]
    pub mirror_root: PathBuf,

    /// Path segment that marks tracked metadata assets.
    #[arg(long, env = "DEBMEND_TRACKED_PATTERN", global = true, default_value = "i18n")]
    pub tracked: String,

    /// Maximum number of suites processed concurrently.
    #[arg(long, env = "DEBMEND_JOBS", global = true)]
    pub jobs: Option<usize>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Validate, repair, and re-sign all discovered suites.
    Run {
        /// GPG key id used for signing.
        #[arg(long, env = "DEBMEND_KEY_ID")]
        key_id: String,

        /// GNUPG home directory holding the signing key.
        #[arg(long, env = "DEBMEND_GNUPGHOME")]
        gnupg_home: Option<PathBuf>,

        /// Process only the suite whose dist directory matches this path.
        suite: Option<PathBuf>,
    },

    /// Validate only: report asset status without repairing or signing.
    Check,
}

impl Cli {
    /// Build the pipeline configuration from the parsed arguments.
    pub fn to_config(&self, key_id: String, gnupg_home: Option<PathBuf>) -> debmend_core::Config {
        let mut config = debmend_core::Config::new(&self.mirror_root, key_id);
        config.tracked_segment = self.tracked.clone();
        config.gnupg_home_override = gnupg_home;
        if let Some(jobs) = self.jobs {
            config.jobs = jobs.max(1);
        }
        config
    }
}
