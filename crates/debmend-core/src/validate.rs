//! Asset validation against Release entries.
//!
//! Only tracked metadata assets are validated; package payloads are left
//! to the external mirroring tool, since re-hashing every pool file on
//! each run would be prohibitively expensive. Size is checked before
//! hashing so obviously-wrong files are classified without reading them.

use debmend_schema::ReleaseEntry;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Outcome of validating one asset against its Release entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// File exists with matching size and digest.
    Valid,
    /// File does not exist on disk.
    Missing,
    /// File exists but its size differs from the entry.
    SizeMismatch {
        /// Size declared by the Release entry.
        expected: u64,
        /// Size found on disk.
        actual: u64,
    },
    /// File exists with the right size but a different digest.
    HashMismatch,
}

impl ValidationOutcome {
    /// Whether this outcome calls for a repair attempt.
    pub fn needs_repair(&self) -> bool {
        !matches!(self, Self::Valid)
    }
}

/// Validate every tracked entry against the on-disk tree.
///
/// Untracked entries are skipped entirely. Returns one `(entry, outcome)`
/// pair per tracked entry, in manifest order.
pub async fn validate_entries(
    dist_dir: &Path,
    entries: &[ReleaseEntry],
    is_tracked: impl Fn(&str) -> bool,
) -> Vec<(ReleaseEntry, ValidationOutcome)> {
    let mut results = Vec::new();
    for entry in entries.iter().filter(|e| is_tracked(&e.path)) {
        let outcome = validate_one(dist_dir, entry).await;
        if outcome.needs_repair() {
            tracing::debug!(path = %entry.path, ?outcome, "asset failed validation");
        }
        results.push((entry.clone(), outcome));
    }
    results
}

/// Validate a single entry: existence, then size, then digest.
pub async fn validate_one(dist_dir: &Path, entry: &ReleaseEntry) -> ValidationOutcome {
    let path = dist_dir.join(&entry.path);
    let metadata = match tokio::fs::metadata(&path).await {
        Ok(m) if m.is_file() => m,
        _ => return ValidationOutcome::Missing,
    };
    if metadata.len() != entry.size {
        return ValidationOutcome::SizeMismatch {
            expected: entry.size,
            actual: metadata.len(),
        };
    }
    match sha256_file(&path).await {
        Ok(actual) if entry.digest.matches(&actual) => ValidationOutcome::Valid,
        Ok(_) => ValidationOutcome::HashMismatch,
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "failed to hash asset");
            ValidationOutcome::Missing
        }
    }
}

/// Compute the SHA-256 digest of a file as a lowercase hex string.
///
/// Reads in 8 KiB chunks on a blocking thread so large indices do not
/// stall the runtime.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be opened or read.
pub async fn sha256_file(path: &Path) -> std::io::Result<String> {
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut hasher = Sha256::new();
        let mut file = std::fs::File::open(&path)?;
        let mut buffer = [0u8; 8192];
        loop {
            let count = file.read(&mut buffer)?;
            if count == 0 {
                break;
            }
            hasher.update(&buffer[..count]);
        }
        Ok(hex::encode(hasher.finalize()))
    })
    .await
    .map_err(std::io::Error::other)?
}
