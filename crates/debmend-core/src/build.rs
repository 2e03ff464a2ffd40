//! Release manifest regeneration.
//!
//! The new Release is generated from the current on-disk tree, never
//! patched: components and architectures are whatever package indexes
//! actually exist under the dist directory, and the checksum block covers
//! exactly the files present at build time. Together with the removal
//! pass this guarantees the signed manifest never references a missing
//! file.

use crate::discover::Suite;
use crate::origin::origin_identity;
use crate::validate::sha256_file;
use debmend_schema::{HashAlgorithm, HexDigest, Release, ReleaseEntry, ReleaseHeader};
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;
use walkdir::WalkDir;

/// Error returned when a Release cannot be rebuilt.
///
/// This is one of the two fatal per-suite error classes; everything
/// upstream of the builder degrades instead of failing.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A file under the dist directory could not be read or written.
    #[error("IO error under {path}: {source}")]
    Io {
        /// The file or directory the operation failed on.
        path: String,
        /// The underlying error.
        source: std::io::Error,
    },

    /// The enumeration walk itself failed.
    #[error("failed to walk dist directory: {0}")]
    Walk(#[from] walkdir::Error),
}

impl BuildError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Rebuild the suite's Release file from the on-disk tree.
///
/// Deletes stale signature artifacts first (a stale signature must never
/// sit beside a newer unsigned manifest), then writes the new Release with
/// canonical permissions. Returns the rendered manifest body for signing.
///
/// # Errors
///
/// Returns [`BuildError`] if the dist tree cannot be enumerated or the
/// manifest cannot be written.
pub async fn build_release(suite: &Suite) -> Result<String, BuildError> {
    remove_stale_artifact(&suite.inrelease_path()).await?;
    remove_stale_artifact(&suite.release_gpg_path()).await?;

    let (components, architectures) = enumerate_indexes(&suite.dist_dir)?;
    if components.is_empty() {
        tracing::warn!(suite = %suite.name, "no package indexes found, building bare manifest");
    }

    let entries = checksum_tree(&suite.dist_dir).await?;
    let (origin, label) = origin_identity(&suite.origin_base);

    let release = Release {
        header: ReleaseHeader {
            origin: origin.to_string(),
            label: label.to_string(),
            suite: suite.name.clone(),
            codename: suite.name.clone(),
            architectures: architectures.into_iter().collect(),
            components: components.into_iter().collect(),
            date: chrono::Utc::now()
                .format("%a, %d %b %Y %H:%M:%S UTC")
                .to_string(),
        },
        sha256: entries,
    };

    let body = release.render();
    let release_path = suite.release_path();
    tokio::fs::write(&release_path, &body)
        .await
        .map_err(|e| BuildError::io(&release_path, e))?;
    set_canonical_permissions(&release_path)
        .await
        .map_err(|e| BuildError::io(&release_path, e))?;

    tracing::info!(
        suite = %suite.name,
        entries = release.sha256.len(),
        "release manifest rebuilt"
    );
    Ok(body)
}

/// Names the builder itself writes; excluded from the checksum block.
const ARTIFACT_NAMES: [&str; 3] = ["Release", "InRelease", "Release.gpg"];

/// Delete a previously generated signature artifact if present.
async fn remove_stale_artifact(path: &Path) -> Result<(), BuildError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "removed stale artifact");
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(BuildError::io(path, err)),
    }
}

/// Discover the component and architecture lists from package indexes.
///
/// A component is any top-level directory holding a `binary-<arch>`
/// subdirectory; architectures are the union of `<arch>` parts found.
/// Nothing is hardcoded, so heterogeneous suites (different component or
/// architecture counts) come out right by construction.
fn enumerate_indexes(dist_dir: &Path) -> Result<(BTreeSet<String>, BTreeSet<String>), BuildError> {
    let mut components = BTreeSet::new();
    let mut architectures = BTreeSet::new();

    for entry in WalkDir::new(dist_dir).min_depth(2).max_depth(2) {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let Some(arch) = entry
            .file_name()
            .to_str()
            .and_then(|n| n.strip_prefix("binary-"))
        else {
            continue;
        };
        let component = entry
            .path()
            .parent()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned());
        if let Some(component) = component {
            components.insert(component);
            architectures.insert(arch.to_string());
        }
    }
    Ok((components, architectures))
}

/// Hash every file under the dist directory into checksum entries.
///
/// The builder's own artifacts are excluded; everything else present on
/// disk is referenced, tracked or not. Entries are ordered by path.
async fn checksum_tree(dist_dir: &Path) -> Result<Vec<ReleaseEntry>, BuildError> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(dist_dir).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        let depth_one = entry.depth() == 1;
        if depth_one && ARTIFACT_NAMES.contains(&name.as_ref()) {
            continue;
        }
        if name.starts_with(".debmend-") {
            continue;
        }

        let path = entry.path();
        let Ok(rel) = path.strip_prefix(dist_dir) else {
            continue;
        };
        let rel = rel.to_string_lossy().replace('\\', "/");
        let size = entry
            .metadata()
            .map_err(|e| BuildError::io(path, e.into()))?
            .len();
        let digest = sha256_file(path)
            .await
            .map_err(|e| BuildError::io(path, e))?;
        let digest = HexDigest::new(digest, HashAlgorithm::Sha256)
            .map_err(|e| BuildError::io(path, std::io::Error::other(e)))?;

        entries.push(ReleaseEntry {
            digest,
            size,
            path: rel,
        });
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

/// Apply the canonical 0644 mode to a generated artifact.
pub(crate) async fn set_canonical_permissions(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = tokio::fs::metadata(path).await?.permissions();
        perms.set_mode(0o644);
        tokio::fs::set_permissions(path, perms).await?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}
