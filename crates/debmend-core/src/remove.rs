//! Removal of unrepairable assets.
//!
//! A second, independent pass after repair: any tracked asset still on
//! disk whose digest does not match its manifest entry is deleted, so the
//! rebuilt Release will not reference it. A manifest that omits a file
//! degrades softly on clients; a manifest that references a missing or
//! corrupt file hard-fails their verification. Deletion is the intended
//! outcome here, not an error.

use crate::validate::{ValidationOutcome, validate_one};
use debmend_schema::ReleaseEntry;
use std::path::Path;

/// Delete every tracked asset that still fails digest validation.
///
/// Runs over all tracked entries, including ones repair never attempted.
/// Idempotent: already-absent files are the goal state and are skipped.
/// Returns the number of files removed.
pub async fn remove_unrepairable(
    dist_dir: &Path,
    entries: &[ReleaseEntry],
    is_tracked: impl Fn(&str) -> bool,
) -> usize {
    let mut removed = 0;
    for entry in entries.iter().filter(|e| is_tracked(&e.path)) {
        match validate_one(dist_dir, entry).await {
            ValidationOutcome::Valid | ValidationOutcome::Missing => {}
            outcome => {
                let path = dist_dir.join(&entry.path);
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => {
                        tracing::info!(path = %entry.path, ?outcome, "removed unrepairable asset");
                        removed += 1;
                    }
                    Err(err) => {
                        tracing::warn!(path = %entry.path, %err, "failed to remove asset");
                    }
                }
            }
        }
    }
    removed
}
