//! Structural validation of downloaded assets.
//!
//! A redownloaded blob is only trusted after its container format checks
//! out: a gzip/xz/bzip2 stream must decode to the end, a tar archive must
//! list cleanly. This catches truncated bodies and HTML error pages that
//! made it past the size guard, before the file is moved into place.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Container/compression format of an asset, sniffed from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetFormat {
    /// Gzip-compressed tar archive (`.tar.gz`, `.tgz`).
    TarGz,
    /// Plain tar archive (`.tar`).
    Tar,
    /// Gzip stream (`.gz`).
    Gzip,
    /// XZ stream (`.xz`).
    Xz,
    /// Bzip2 stream (`.bz2`).
    Bzip2,
    /// Anything else; only checked for being non-empty.
    Plain,
}

impl AssetFormat {
    /// Sniff the format from a file name or relative path.
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Self::TarGz
        } else if name.ends_with(".tar") {
            Self::Tar
        } else if name.ends_with(".gz") {
            Self::Gzip
        } else if name.ends_with(".xz") {
            Self::Xz
        } else if name.ends_with(".bz2") {
            Self::Bzip2
        } else {
            Self::Plain
        }
    }
}

/// Error returned when a blob fails its structural check.
#[derive(Debug, Error)]
pub enum StructuralError {
    /// The underlying file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The blob does not decode as its declared format.
    #[error("corrupt {format:?} stream: {reason}")]
    Corrupt {
        /// The format the blob was checked as.
        format: AssetFormat,
        /// Decoder error message.
        reason: String,
    },
}

/// Structurally validate a file against its declared format.
///
/// Decodes the entire stream (or lists the entire archive) and discards
/// the output; success means the bytes are self-consistent, not that they
/// match any manifest hash.
///
/// # Errors
///
/// Returns [`StructuralError::Corrupt`] if decoding fails, or an I/O error
/// if the file cannot be read.
pub async fn check(path: &Path, format: AssetFormat) -> Result<(), StructuralError> {
    match format {
        AssetFormat::Gzip => drain_decoder(path, format, Decoder::Gzip).await,
        AssetFormat::Xz => drain_decoder(path, format, Decoder::Xz).await,
        AssetFormat::Bzip2 => drain_decoder(path, format, Decoder::Bzip2).await,
        AssetFormat::Tar => list_tar(path.to_path_buf(), false).await,
        AssetFormat::TarGz => list_tar(path.to_path_buf(), true).await,
        AssetFormat::Plain => {
            let metadata = tokio::fs::metadata(path).await?;
            if metadata.len() == 0 {
                return Err(StructuralError::Corrupt {
                    format,
                    reason: "empty file".to_string(),
                });
            }
            if looks_like_html(path).await {
                return Err(StructuralError::Corrupt {
                    format,
                    reason: "looks like an HTML error page".to_string(),
                });
            }
            Ok(())
        }
    }
}

enum Decoder {
    Gzip,
    Xz,
    Bzip2,
}

/// Run a compressed stream through its decoder to completion.
async fn drain_decoder(
    path: &Path,
    format: AssetFormat,
    decoder: Decoder,
) -> Result<(), StructuralError> {
    use async_compression::tokio::bufread::{BzDecoder, GzipDecoder, XzDecoder};

    let file = tokio::fs::File::open(path).await?;
    let reader = BufReader::new(file);
    let mut sink = tokio::io::sink();

    let result = match decoder {
        Decoder::Gzip => tokio::io::copy(&mut GzipDecoder::new(reader), &mut sink).await,
        Decoder::Xz => tokio::io::copy(&mut XzDecoder::new(reader), &mut sink).await,
        Decoder::Bzip2 => tokio::io::copy(&mut BzDecoder::new(reader), &mut sink).await,
    };

    match result {
        Ok(0) => Err(StructuralError::Corrupt {
            format,
            reason: "decoded to zero bytes".to_string(),
        }),
        Ok(_) => Ok(()),
        Err(err) => Err(StructuralError::Corrupt {
            format,
            reason: err.to_string(),
        }),
    }
}

/// List every entry of a tar (optionally gzipped) archive.
async fn list_tar(path: PathBuf, gzipped: bool) -> Result<(), StructuralError> {
    let format = if gzipped {
        AssetFormat::TarGz
    } else {
        AssetFormat::Tar
    };
    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&path)?;
        let walk = |mut archive: tar::Archive<Box<dyn std::io::Read>>| -> std::io::Result<()> {
            for entry in archive.entries()? {
                entry?;
            }
            Ok(())
        };
        let reader: Box<dyn std::io::Read> = if gzipped {
            Box::new(flate2::read::GzDecoder::new(file))
        } else {
            Box::new(file)
        };
        walk(tar::Archive::new(reader)).map_err(|err| StructuralError::Corrupt {
            format,
            reason: err.to_string(),
        })
    })
    .await
    .map_err(std::io::Error::other)?
}

/// Peek at the first line of a file to spot HTML masquerading as data.
///
/// Extra guard for `Plain` assets, where no decoder can vouch for the
/// bytes.
async fn looks_like_html(path: &Path) -> bool {
    let Ok(file) = tokio::fs::File::open(path).await else {
        return false;
    };
    let mut reader = BufReader::new(file);
    let mut line = String::new();
    if reader.read_line(&mut line).await.is_err() {
        return false;
    }
    let lowered = line.trim_start().to_lowercase();
    lowered.starts_with("<!doctype html") || lowered.starts_with("<html")
}
