//! Release signing via GPG.
//!
//! The pipeline only consumes two external key operations: a clearsign
//! and a detached sign, both over the identical manifest body. They sit
//! behind the [`Signer`] trait so the pipeline can be exercised without
//! key material; [`GpgSigner`] is the production implementation, shelling
//! out to the system `gpg`.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;

/// Error returned by a signing operation.
#[derive(Debug, Error)]
pub enum SignError {
    /// The signing tool could not be spawned.
    #[error("failed to run gpg: {0}")]
    Spawn(#[from] std::io::Error),

    /// No secret key material exists for the configured identity.
    #[error("no secret key for '{key_id}': {detail}")]
    MissingKey {
        /// The configured key id.
        key_id: String,
        /// Tool output explaining the failure.
        detail: String,
    },

    /// The signing tool ran but reported failure.
    #[error("gpg failed: {0}")]
    Gpg(String),
}

/// A signing identity capable of producing both Release signature artifacts.
#[async_trait::async_trait]
pub trait Signer: Send + Sync {
    /// Verify the secret key material exists. Called once per run, before
    /// any suite is signed, so a missing key fails fast.
    async fn verify_key(&self) -> Result<(), SignError>;

    /// Write an inline clear-signed copy of `manifest` to `output`.
    async fn clearsign(&self, manifest: &Path, output: &Path) -> Result<(), SignError>;

    /// Write a detached ASCII-armored signature of `manifest` to `output`.
    async fn detach_sign(&self, manifest: &Path, output: &Path) -> Result<(), SignError>;
}

/// Production signer backed by the system `gpg` binary.
#[derive(Debug, Clone)]
pub struct GpgSigner {
    key_id: String,
    gnupg_home: Option<PathBuf>,
}

impl GpgSigner {
    /// Create a signer for the given key id and optional keyring home.
    pub fn new(key_id: impl Into<String>, gnupg_home: Option<PathBuf>) -> Self {
        Self {
            key_id: key_id.into(),
            gnupg_home,
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("gpg");
        cmd.arg("--batch").arg("--yes");
        if let Some(home) = &self.gnupg_home {
            cmd.env("GNUPGHOME", home);
        }
        cmd
    }

    async fn run(&self, cmd: &mut Command) -> Result<(), SignError> {
        let output = cmd.output().await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(SignError::Gpg(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }
}

#[async_trait::async_trait]
impl Signer for GpgSigner {
    async fn verify_key(&self) -> Result<(), SignError> {
        let output = self
            .command()
            .arg("--list-secret-keys")
            .arg(&self.key_id)
            .output()
            .await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(SignError::MissingKey {
                key_id: self.key_id.clone(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    async fn clearsign(&self, manifest: &Path, output: &Path) -> Result<(), SignError> {
        let mut cmd = self.command();
        cmd.arg("--local-user")
            .arg(&self.key_id)
            .arg("--clearsign")
            .arg("--output")
            .arg(output)
            .arg(manifest);
        self.run(&mut cmd).await
    }

    async fn detach_sign(&self, manifest: &Path, output: &Path) -> Result<(), SignError> {
        let mut cmd = self.command();
        cmd.arg("--local-user")
            .arg(&self.key_id)
            .arg("--armor")
            .arg("--detach-sign")
            .arg("--output")
            .arg(output)
            .arg(manifest);
        self.run(&mut cmd).await
    }
}

/// Produce both signature artifacts for a freshly built Release.
///
/// The inline and detached signatures cover byte-for-byte the same
/// manifest file, and both get canonical permissions.
///
/// # Errors
///
/// Returns the first [`SignError`] encountered; the caller marks the
/// suite failed.
pub async fn sign_release(
    signer: &dyn Signer,
    manifest: &Path,
    inrelease: &Path,
    release_gpg: &Path,
) -> Result<(), SignError> {
    signer.clearsign(manifest, inrelease).await?;
    signer.detach_sign(manifest, release_gpg).await?;
    crate::build::set_canonical_permissions(inrelease).await?;
    crate::build::set_canonical_permissions(release_gpg).await?;
    Ok(())
}
