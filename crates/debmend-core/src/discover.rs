//! Suite discovery.
//!
//! An apt-mirror tree nests one directory per upstream host under the
//! mirror root, e.g. `mirror/deb.debian.org/debian/dists/bookworm/`. A
//! repository root is any directory containing a `dists` marker
//! subdirectory; each child of `dists/` is an independently signed suite.

use crate::config::Config;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Name of the marker subdirectory that identifies a repository root.
pub const DIST_MARKER: &str = "dists";

/// One discovered suite: a dist directory with its own Release manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suite {
    /// Suite name, i.e. the directory name under `dists/`.
    pub name: String,
    /// The suite's dist directory (`<repo-root>/dists/<name>`).
    pub dist_dir: PathBuf,
    /// Upstream URL of the dist directory, derived from the mirror layout.
    pub dist_url: String,
    /// Upstream origin base URL of the repository root.
    pub origin_base: String,
}

impl Suite {
    /// Path of this suite's Release manifest.
    pub fn release_path(&self) -> PathBuf {
        self.dist_dir.join("Release")
    }

    /// Path of this suite's inline-signed manifest.
    pub fn inrelease_path(&self) -> PathBuf {
        self.dist_dir.join("InRelease")
    }

    /// Path of this suite's detached signature.
    pub fn release_gpg_path(&self) -> PathBuf {
        self.dist_dir.join("Release.gpg")
    }
}

/// Discover all suites under the configured mirror root.
///
/// Read-only walk. A missing or unreadable root is not an error: an empty
/// mirror is valid, so this logs and returns no suites. Heterogeneous
/// subtrees (different hosts, different component counts per suite) are
/// expected; nothing is hardcoded beyond the `dists` marker name.
pub fn discover(config: &Config) -> Vec<Suite> {
    let root = config.mirror_root();
    if !root.is_dir() {
        tracing::warn!(root = %root.display(), "mirror root does not exist, nothing to do");
        return Vec::new();
    }

    let mut suites = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.file_type().is_dir())
        .filter_map(Result::ok)
    {
        if entry.file_name() != DIST_MARKER {
            continue;
        }
        let Some(repo_root) = entry.path().parent() else {
            continue;
        };
        let Some(origin_base) = origin_base_for(root, repo_root, &config.origin_scheme) else {
            tracing::warn!(repo = %repo_root.display(), "cannot derive origin for repository, skipping");
            continue;
        };
        suites.extend(suites_in_dists(entry.path(), &origin_base));
    }

    suites.sort_by(|a, b| a.dist_dir.cmp(&b.dist_dir));
    tracing::info!(count = suites.len(), "discovered suites");
    suites
}

/// Enumerate the suites under one `dists/` directory.
fn suites_in_dists(dists_dir: &Path, origin_base: &str) -> Vec<Suite> {
    let Ok(read_dir) = std::fs::read_dir(dists_dir) else {
        return Vec::new();
    };
    read_dir
        .filter_map(Result::ok)
        .filter(|e| e.path().is_dir())
        .map(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            let dist_dir = e.path();
            Suite {
                dist_url: format!("{origin_base}/{DIST_MARKER}/{name}"),
                origin_base: origin_base.to_string(),
                name,
                dist_dir,
            }
        })
        .collect()
}

/// Derive the upstream origin base URL for a repository root.
///
/// The mirror layout encodes the upstream host as the first path component
/// below the mirror root, so `mirror/deb.debian.org/debian` becomes
/// `https://deb.debian.org/debian`.
fn origin_base_for(mirror_root: &Path, repo_root: &Path, scheme: &str) -> Option<String> {
    let rel = repo_root.strip_prefix(mirror_root).ok()?;
    let mut parts = rel.components().map(|c| c.as_os_str().to_string_lossy());
    let host = parts.next()?;
    let mut url = format!("{scheme}://{host}");
    for part in parts {
        url.push('/');
        url.push_str(&part);
    }
    Some(url)
}
