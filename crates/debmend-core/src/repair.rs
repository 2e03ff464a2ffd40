//! Repair of assets that failed validation.
//!
//! An asset is repaired by redownloading it from the suite's upstream
//! origin into a temporary file, structurally validating the blob, and
//! atomically renaming it into place. Every failure mode is caught here
//! and classified [`RepairOutcome::Unrepairable`]; nothing raises past
//! this module.

use crate::config::Config;
use crate::discover::Suite;
use crate::origin::{UrlJoinError, join_url};
use crate::structural::{self, AssetFormat, StructuralError};
use crate::validate::sha256_file;
use debmend_schema::ReleaseEntry;
use futures::StreamExt;
use reqwest::Client;
use std::path::Path;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// Outcome of a repair attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairOutcome {
    /// A structurally valid replacement was installed.
    Repaired,
    /// The asset could not be restored from upstream.
    Unrepairable,
}

/// Internal per-attempt failure classification.
#[derive(Debug, Error)]
enum FetchError {
    #[error("bad upstream URL: {0}")]
    Url(#[from] UrlJoinError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {0}")]
    Status(reqwest::StatusCode),

    #[error("body too small: {actual} bytes (minimum {minimum})")]
    Undersized {
        actual: u64,
        minimum: u64,
    },

    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// Transport-level failures are retried; content-level ones are not,
    /// since re-fetching corrupt content yields the same bytes.
    fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Status(_) | Self::Undersized { .. } | Self::Io(_) => true,
            Self::Url(_) | Self::Structural(_) => false,
        }
    }
}

/// Attempt to repair one asset from the suite's upstream origin.
///
/// Runs up to `config.fetch_attempts` download attempts with a fixed
/// backoff between them. A download is installed only after passing the
/// minimum-size guard and its structural check; the final rename is
/// atomic, so readers never observe a partial file. Hash and size are
/// re-verified advisorily: a structurally valid download that no longer
/// matches the manifest (upstream may have moved on since the manifest
/// was captured) is still installed and reported repaired.
pub async fn repair(
    client: &Client,
    config: &Config,
    suite: &Suite,
    entry: &ReleaseEntry,
) -> RepairOutcome {
    let url = match join_url(&suite.dist_url, &entry.path) {
        Ok(url) => url,
        Err(err) => {
            tracing::warn!(path = %entry.path, %err, "refusing to fetch, unrepairable");
            return RepairOutcome::Unrepairable;
        }
    };

    for attempt in 1..=config.fetch_attempts {
        match fetch_once(client, config, suite, entry, &url).await {
            Ok(()) => {
                tracing::info!(path = %entry.path, attempt, "asset repaired");
                return RepairOutcome::Repaired;
            }
            Err(err) if err.is_retryable() && attempt < config.fetch_attempts => {
                tracing::warn!(path = %entry.path, attempt, %err, "fetch attempt failed, retrying");
                tokio::time::sleep(config.fetch_backoff).await;
            }
            Err(err) => {
                tracing::warn!(path = %entry.path, attempt, %err, "asset unrepairable");
                return RepairOutcome::Unrepairable;
            }
        }
    }
    RepairOutcome::Unrepairable
}

/// One download attempt: fetch to a temp file, guard, check, install.
async fn fetch_once(
    client: &Client,
    config: &Config,
    suite: &Suite,
    entry: &ReleaseEntry,
    url: &str,
) -> Result<(), FetchError> {
    let dest = suite.dist_dir.join(&entry.path);
    let parent = dest.parent().unwrap_or(&suite.dist_dir);
    tokio::fs::create_dir_all(parent).await?;

    let response = client
        .get(url)
        .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
        .timeout(config.fetch_timeout)
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(FetchError::Status(response.status()));
    }

    // Download into a sibling temp file so the final rename stays on one
    // filesystem. The temp path is cleaned up on drop if anything fails.
    let tmp = tempfile::Builder::new()
        .prefix(".debmend-")
        .tempfile_in(parent)?
        .into_temp_path();

    let mut file = tokio::fs::File::create(&tmp).await?;
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    drop(file);

    if written < config.min_fetch_size {
        return Err(FetchError::Undersized {
            actual: written,
            minimum: config.min_fetch_size,
        });
    }

    let format = AssetFormat::from_path(Path::new(&entry.path));
    structural::check(&tmp, format).await?;

    verify_advisory(&tmp, entry, written).await;

    tmp.persist(&dest).map_err(|e| FetchError::Io(e.error))?;
    set_canonical_permissions(&dest).await?;
    Ok(())
}

/// Advisory hash/size comparison against the manifest entry.
///
/// Mismatches are logged, not failed: a newer upstream asset is preferable
/// to a deleted one, and the rebuilt manifest will record the new digest.
async fn verify_advisory(path: &Path, entry: &ReleaseEntry, written: u64) {
    if written != entry.size {
        tracing::warn!(
            path = %entry.path,
            expected = entry.size,
            actual = written,
            "repaired asset size differs from manifest, installing anyway"
        );
        return;
    }
    match sha256_file(path).await {
        Ok(actual) if entry.digest.matches(&actual) => {}
        Ok(_) => {
            tracing::warn!(
                path = %entry.path,
                "repaired asset hash differs from manifest, installing anyway"
            );
        }
        Err(err) => {
            tracing::warn!(path = %entry.path, %err, "could not hash repaired asset");
        }
    }
}

/// Apply the canonical 0644 mode to an installed asset.
async fn set_canonical_permissions(path: &Path) -> std::io::Result<()> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use debmend_schema::{HashAlgorithm, HexDigest};
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use sha2::{Digest, Sha256};
    use std::io::Write;
    use std::path::PathBuf;

    fn gzip_bytes(content: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(content).unwrap();
        encoder.finish().unwrap()
    }

    fn suite_at(dist_dir: PathBuf, dist_url: String) -> Suite {
        Suite {
            name: "bookworm".into(),
            dist_dir,
            origin_base: dist_url.clone(),
            dist_url,
        }
    }

    fn entry_for(path: &str, content: &[u8]) -> ReleaseEntry {
        ReleaseEntry {
            digest: HexDigest::new(hex::encode(Sha256::digest(content)), HashAlgorithm::Sha256)
                .unwrap(),
            size: content.len() as u64,
            path: path.to_string(),
        }
    }

    fn test_config(root: &Path) -> Config {
        let mut config = Config::new(root, "ABCD1234");
        config.fetch_attempts = 3;
        config.fetch_backoff = std::time::Duration::from_millis(10);
        config.min_fetch_size = 16;
        config
    }

    #[tokio::test]
    async fn successful_repair_replaces_file() {
        let mut server = mockito::Server::new_async().await;
        let tmp = tempfile::tempdir().unwrap();
        let body = gzip_bytes(&b"x".repeat(64));
        let mock = server
            .mock("GET", "/dists/bookworm/main/i18n/Translation-en.gz")
            .with_body(body.clone())
            .create_async()
            .await;

        let dist_dir = tmp.path().join("dists/bookworm");
        std::fs::create_dir_all(dist_dir.join("main/i18n")).unwrap();
        std::fs::write(dist_dir.join("main/i18n/Translation-en.gz"), b"junk").unwrap();

        let suite = suite_at(dist_dir.clone(), format!("{}/dists/bookworm", server.url()));
        let entry = entry_for("main/i18n/Translation-en.gz", &body);
        let config = test_config(tmp.path());
        let client = Client::new();

        let outcome = repair(&client, &config, &suite, &entry).await;
        assert_eq!(outcome, RepairOutcome::Repaired);
        assert_eq!(
            std::fs::read(dist_dir.join("main/i18n/Translation-en.gz")).unwrap(),
            body
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn repeated_500_is_unrepairable_after_retries() {
        let mut server = mockito::Server::new_async().await;
        let tmp = tempfile::tempdir().unwrap();
        let mock = server
            .mock("GET", "/dists/bookworm/main/i18n/Translation-en.gz")
            .with_status(500)
            .expect(3)
            .create_async()
            .await;

        let dist_dir = tmp.path().join("dists/bookworm");
        std::fs::create_dir_all(&dist_dir).unwrap();
        let suite = suite_at(dist_dir, format!("{}/dists/bookworm", server.url()));
        let entry = entry_for("main/i18n/Translation-en.gz", b"whatever");
        let config = test_config(tmp.path());

        let outcome = repair(&Client::new(), &config, &suite, &entry).await;
        assert_eq!(outcome, RepairOutcome::Unrepairable);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn undersized_body_rejected() {
        let mut server = mockito::Server::new_async().await;
        let tmp = tempfile::tempdir().unwrap();
        server
            .mock("GET", "/dists/bookworm/main/i18n/Translation-en.gz")
            .with_body("tiny")
            .create_async()
            .await;

        let dist_dir = tmp.path().join("dists/bookworm");
        std::fs::create_dir_all(&dist_dir).unwrap();
        let suite = suite_at(dist_dir.clone(), format!("{}/dists/bookworm", server.url()));
        let entry = entry_for("main/i18n/Translation-en.gz", b"tiny");
        let config = test_config(tmp.path());

        let outcome = repair(&Client::new(), &config, &suite, &entry).await;
        assert_eq!(outcome, RepairOutcome::Unrepairable);
        assert!(!dist_dir.join("main/i18n/Translation-en.gz").exists());
    }

    #[tokio::test]
    async fn structural_corruption_fails_without_retry() {
        let mut server = mockito::Server::new_async().await;
        let tmp = tempfile::tempdir().unwrap();
        // Served body is big enough but is not a gzip stream; exactly one
        // request must be made.
        let mock = server
            .mock("GET", "/dists/bookworm/main/i18n/Translation-en.gz")
            .with_body("<html>error page that is long enough to pass the size guard</html>")
            .expect(1)
            .create_async()
            .await;

        let dist_dir = tmp.path().join("dists/bookworm");
        std::fs::create_dir_all(&dist_dir).unwrap();
        let suite = suite_at(dist_dir, format!("{}/dists/bookworm", server.url()));
        let entry = entry_for("main/i18n/Translation-en.gz", b"whatever");
        let config = test_config(tmp.path());

        let outcome = repair(&Client::new(), &config, &suite, &entry).await;
        assert_eq!(outcome, RepairOutcome::Unrepairable);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn hash_mismatch_still_installs() {
        let mut server = mockito::Server::new_async().await;
        let tmp = tempfile::tempdir().unwrap();
        let body = gzip_bytes(&b"newer upstream content".repeat(8));
        server
            .mock("GET", "/dists/bookworm/main/i18n/Translation-en.gz")
            .with_body(body.clone())
            .create_async()
            .await;

        let dist_dir = tmp.path().join("dists/bookworm");
        std::fs::create_dir_all(&dist_dir).unwrap();
        let suite = suite_at(dist_dir.clone(), format!("{}/dists/bookworm", server.url()));
        // Manifest entry describes different bytes than upstream serves.
        let entry = entry_for("main/i18n/Translation-en.gz", b"old manifest bytes");
        let config = test_config(tmp.path());

        let outcome = repair(&Client::new(), &config, &suite, &entry).await;
        assert_eq!(outcome, RepairOutcome::Repaired);
        assert_eq!(
            std::fs::read(dist_dir.join("main/i18n/Translation-en.gz")).unwrap(),
            body
        );
    }

    #[tokio::test]
    async fn traversal_path_is_never_fetched() {
        let tmp = tempfile::tempdir().unwrap();
        let dist_dir = tmp.path().join("dists/bookworm");
        std::fs::create_dir_all(&dist_dir).unwrap();
        let suite = suite_at(dist_dir, "https://127.0.0.1:1/dists/bookworm".to_string());
        let entry = ReleaseEntry {
            digest: HexDigest::new("a".repeat(64), HashAlgorithm::Sha256).unwrap(),
            size: 1,
            path: "../../../etc/passwd".to_string(),
        };
        let config = test_config(tmp.path());
        let outcome = repair(&Client::new(), &config, &suite, &entry).await;
        assert_eq!(outcome, RepairOutcome::Unrepairable);
    }
}
