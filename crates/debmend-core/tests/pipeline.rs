//! End-to-end pipeline tests over a fixture mirror tree.

use debmend_core::pipeline::{self, SuiteStatus};
use debmend_core::sign::{SignError, Signer};
use debmend_core::{Config, Suite, discover};
use debmend_schema::{HashAlgorithm, checksum_entries};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// Signer that writes deterministic pseudo-signatures instead of calling gpg.
#[derive(Debug, Default)]
struct StubSigner {
    missing_key: bool,
}

#[async_trait::async_trait]
impl Signer for StubSigner {
    async fn verify_key(&self) -> Result<(), SignError> {
        if self.missing_key {
            return Err(SignError::MissingKey {
                key_id: "STUB".into(),
                detail: "no secret key".into(),
            });
        }
        Ok(())
    }

    async fn clearsign(&self, manifest: &Path, output: &Path) -> Result<(), SignError> {
        let body = fs::read_to_string(manifest)?;
        fs::write(
            output,
            format!("-----BEGIN PGP SIGNED MESSAGE-----\n\n{body}\n-----BEGIN PGP SIGNATURE-----\nstub\n-----END PGP SIGNATURE-----\n"),
        )?;
        Ok(())
    }

    async fn detach_sign(&self, manifest: &Path, output: &Path) -> Result<(), SignError> {
        let body = fs::read(manifest)?;
        let digest = hex::encode(Sha256::digest(&body));
        fs::write(
            output,
            format!("-----BEGIN PGP SIGNATURE-----\n{digest}\n-----END PGP SIGNATURE-----\n"),
        )?;
        Ok(())
    }
}

/// Lay down one suite with three tracked i18n assets and a Packages index.
fn write_suite(mirror_root: &Path, contents: &[(&str, &[u8])]) -> PathBuf {
    let dist_dir = mirror_root.join("mirror.invalid/debian/dists/bookworm");
    fs::create_dir_all(dist_dir.join("main/binary-amd64")).unwrap();
    fs::create_dir_all(dist_dir.join("main/i18n")).unwrap();
    fs::write(dist_dir.join("main/binary-amd64/Packages"), b"Package: a\n").unwrap();

    let mut manifest = String::from(
        "Origin: Debian\nLabel: Debian\nSuite: bookworm\nCodename: bookworm\n\
         Date: Thu, 01 Jan 2026 00:00:00 UTC\nArchitectures: amd64\nComponents: main\nSHA256:\n",
    );
    for (name, content) in contents {
        let path = dist_dir.join("main/i18n").join(name);
        fs::write(&path, content).unwrap();
        let _ = writeln!(
            manifest,
            " {} {} main/i18n/{}",
            hex::encode(Sha256::digest(content)),
            content.len(),
            name
        );
    }
    // The Packages index is in the manifest too, but untracked.
    let _ = writeln!(
        manifest,
        " {} {} main/binary-amd64/Packages",
        hex::encode(Sha256::digest(b"Package: a\n")),
        b"Package: a\n".len()
    );
    fs::write(dist_dir.join("Release"), manifest).unwrap();
    dist_dir
}

fn test_config(root: &Path) -> Config {
    let mut config = Config::new(root, "STUB");
    config.fetch_attempts = 2;
    config.fetch_backoff = std::time::Duration::from_millis(5);
    config.min_fetch_size = 1;
    config.jobs = 2;
    config
}

#[tokio::test]
async fn happy_path_signs_without_touching_assets() {
    let tmp = tempfile::tempdir().unwrap();
    let dist_dir = write_suite(
        tmp.path(),
        &[
            ("Translation-en", b"english strings"),
            ("Translation-de", b"german strings"),
            ("Translation-fr", b"french strings"),
        ],
    );

    let config = test_config(tmp.path());
    let suites = discover::discover(&config);
    assert_eq!(suites.len(), 1);

    let reports = pipeline::run(&config, &StubSigner::default(), suites)
        .await
        .unwrap();
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.status, SuiteStatus::Signed);
    assert_eq!(report.valid, 3);
    assert_eq!(report.repaired, 0);
    assert_eq!(report.removed, 0);
    assert_eq!(report.skipped, 1);

    // All three artifacts exist and the signed copies cover the manifest.
    let body = fs::read_to_string(dist_dir.join("Release")).unwrap();
    let inrelease = fs::read_to_string(dist_dir.join("InRelease")).unwrap();
    assert!(inrelease.contains(&body));
    assert!(dist_dir.join("Release.gpg").exists());

    // The rebuilt manifest references all three tracked assets.
    let entries = checksum_entries(&body, HashAlgorithm::Sha256);
    let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
    assert!(paths.contains(&"main/i18n/Translation-en"));
    assert!(paths.contains(&"main/i18n/Translation-de"));
    assert!(paths.contains(&"main/i18n/Translation-fr"));
}

/// Suite pointing at a mockito server instead of the layout-derived origin.
fn suite_with_upstream(dist_dir: PathBuf, server_url: &str) -> Suite {
    Suite {
        name: "bookworm".into(),
        dist_dir,
        dist_url: format!("{server_url}/dists/bookworm"),
        origin_base: format!("{server_url}/debian"),
    }
}

#[tokio::test]
async fn corrupt_asset_is_repaired_from_upstream() {
    let mut server = mockito::Server::new_async().await;
    let tmp = tempfile::tempdir().unwrap();
    let dist_dir = write_suite(
        tmp.path(),
        &[
            ("Translation-en", b"english strings"),
            ("Translation-de", b"german strings"),
            ("Translation-fr", b"french strings"),
        ],
    );
    // Corrupt one asset after the manifest was written; upstream still
    // serves the body the manifest describes.
    fs::write(dist_dir.join("main/i18n/Translation-de"), b"CORRUPTED").unwrap();
    let mock = server
        .mock("GET", "/dists/bookworm/main/i18n/Translation-de")
        .with_body("german strings")
        .create_async()
        .await;

    let config = test_config(tmp.path());
    let suite = suite_with_upstream(dist_dir.clone(), &server.url());
    let report =
        pipeline::process_suite(&Client::new(), &config, &StubSigner::default(), &suite).await;

    assert_eq!(report.status, SuiteStatus::Signed);
    assert_eq!(report.valid, 2);
    assert_eq!(report.repaired, 1);
    assert_eq!(report.removed, 0);
    mock.assert_async().await;

    assert_eq!(
        fs::read(dist_dir.join("main/i18n/Translation-de")).unwrap(),
        b"german strings"
    );
    // The rebuilt manifest references all three tracked assets.
    let body = fs::read_to_string(dist_dir.join("Release")).unwrap();
    let entries = checksum_entries(&body, HashAlgorithm::Sha256);
    for name in ["Translation-en", "Translation-de", "Translation-fr"] {
        assert!(
            entries
                .iter()
                .any(|e| e.path == format!("main/i18n/{name}"))
        );
    }
}

#[tokio::test]
async fn newer_upstream_asset_survives_the_removal_pass() {
    // Upstream has moved on since the manifest was captured: the served
    // body is structurally fine but hashes differently from the entry. It
    // must be installed, kept through the removal pass, and referenced by
    // the rebuilt manifest under its new digest.
    let mut server = mockito::Server::new_async().await;
    let tmp = tempfile::tempdir().unwrap();
    let dist_dir = write_suite(
        tmp.path(),
        &[
            ("Translation-en", b"english strings"),
            ("Translation-de", b"german strings"),
        ],
    );
    fs::write(dist_dir.join("main/i18n/Translation-de"), b"CORRUPTED").unwrap();
    server
        .mock("GET", "/dists/bookworm/main/i18n/Translation-de")
        .with_body("newer german strings")
        .create_async()
        .await;

    let config = test_config(tmp.path());
    let suite = suite_with_upstream(dist_dir.clone(), &server.url());
    let report =
        pipeline::process_suite(&Client::new(), &config, &StubSigner::default(), &suite).await;

    assert_eq!(report.status, SuiteStatus::Signed);
    assert_eq!(report.repaired, 1);
    assert_eq!(
        report.removed, 0,
        "a successfully repaired asset must not then be removed"
    );
    assert_eq!(
        fs::read(dist_dir.join("main/i18n/Translation-de")).unwrap(),
        b"newer german strings"
    );

    let body = fs::read_to_string(dist_dir.join("Release")).unwrap();
    let entries = checksum_entries(&body, HashAlgorithm::Sha256);
    let entry = entries
        .iter()
        .find(|e| e.path == "main/i18n/Translation-de")
        .expect("repaired asset stays referenced");
    assert_eq!(
        entry.digest.as_str(),
        hex::encode(Sha256::digest(b"newer german strings"))
    );
}

#[tokio::test]
async fn unrepairable_asset_is_dropped_but_suite_still_signs() {
    let tmp = tempfile::tempdir().unwrap();
    let dist_dir = write_suite(
        tmp.path(),
        &[
            ("Translation-en", b"english strings"),
            ("Translation-de", b"german strings"),
        ],
    );
    // Corrupt one asset after the manifest was written; there is no
    // upstream to repair from, so it must end up removed.
    fs::write(dist_dir.join("main/i18n/Translation-de"), b"CORRUPTED").unwrap();

    let config = test_config(tmp.path());
    let suites = discover::discover(&config);
    let reports = pipeline::run(&config, &StubSigner::default(), suites)
        .await
        .unwrap();
    let report = &reports[0];

    assert_eq!(report.status, SuiteStatus::Signed);
    assert_eq!(report.valid, 1);
    assert_eq!(report.repaired, 0);
    assert_eq!(report.removed, 1);
    assert!(!dist_dir.join("main/i18n/Translation-de").exists());

    // Removal safety: the rebuilt manifest no longer references the asset.
    let body = fs::read_to_string(dist_dir.join("Release")).unwrap();
    let entries = checksum_entries(&body, HashAlgorithm::Sha256);
    assert!(entries.iter().all(|e| e.path != "main/i18n/Translation-de"));
    assert!(entries.iter().any(|e| e.path == "main/i18n/Translation-en"));
}

#[tokio::test]
async fn second_run_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let dist_dir = write_suite(tmp.path(), &[("Translation-en", b"english strings")]);

    let config = test_config(tmp.path());
    let strip_date = |body: &str| -> String {
        body.lines()
            .filter(|l| !l.starts_with("Date:"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let first = pipeline::run(&config, &StubSigner::default(), discover::discover(&config))
        .await
        .unwrap();
    assert_eq!(first[0].status, SuiteStatus::Signed);
    let first_body = fs::read_to_string(dist_dir.join("Release")).unwrap();

    let second = pipeline::run(&config, &StubSigner::default(), discover::discover(&config))
        .await
        .unwrap();
    let second_body = fs::read_to_string(dist_dir.join("Release")).unwrap();

    assert_eq!(second[0].repaired, 0);
    assert_eq!(second[0].removed, 0);
    assert_eq!(strip_date(&first_body), strip_date(&second_body));
}

#[tokio::test]
async fn suite_without_manifest_is_skipped_not_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    write_suite(tmp.path(), &[("Translation-en", b"english strings")]);
    // A second suite directory with no Release file at all.
    fs::create_dir_all(tmp.path().join("mirror.invalid/debian/dists/empty")).unwrap();

    let config = test_config(tmp.path());
    let reports = pipeline::run(&config, &StubSigner::default(), discover::discover(&config))
        .await
        .unwrap();
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().any(|r| r.status == SuiteStatus::Signed));
    assert!(
        reports
            .iter()
            .any(|r| matches!(r.status, SuiteStatus::Skipped(_)))
    );
    assert!(!reports.iter().any(|r| r.status.is_fatal()));
}

#[tokio::test]
async fn missing_key_fails_fast_before_any_mutation() {
    let tmp = tempfile::tempdir().unwrap();
    let dist_dir = write_suite(tmp.path(), &[("Translation-en", b"english strings")]);
    let before = fs::read_to_string(dist_dir.join("Release")).unwrap();

    let config = test_config(tmp.path());
    let signer = StubSigner { missing_key: true };
    let result = pipeline::run(&config, &signer, discover::discover(&config)).await;
    assert!(matches!(result, Err(SignError::MissingKey { .. })));

    // Nothing was rebuilt.
    let after = fs::read_to_string(dist_dir.join("Release")).unwrap();
    assert_eq!(before, after);
}
