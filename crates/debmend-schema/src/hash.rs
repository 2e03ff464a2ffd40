//! Hash algorithms and validated digest strings.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Error returned when a digest string fails validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DigestError {
    /// The digest length does not match the algorithm's fixed hex length.
    #[error("invalid {algorithm} digest: expected {expected} hex chars, got {actual}")]
    BadLength {
        /// The algorithm the digest was validated against.
        algorithm: HashAlgorithm,
        /// The required number of hex characters.
        expected: usize,
        /// The number of characters actually supplied.
        actual: usize,
    },

    /// The digest contains characters outside `[0-9a-fA-F]`.
    #[error("invalid digest: contains non-hex characters in '{0}'")]
    NonHex(String),
}

/// A hash algorithm as named by a Release checksum section.
///
/// The section names are fixed by the wire format (`MD5Sum:`, `SHA1:`,
/// `SHA256:`), as are the hex digest lengths, which the parser uses to
/// reject malformed lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    /// Legacy MD5 block (`MD5Sum:`), 32 hex characters.
    Md5Sum,
    /// Legacy SHA-1 block (`SHA1:`), 40 hex characters.
    Sha1,
    /// SHA-256 block (`SHA256:`), 64 hex characters.
    Sha256,
}

impl HashAlgorithm {
    /// The section header name as it appears in a Release file.
    pub fn section_name(self) -> &'static str {
        match self {
            Self::Md5Sum => "MD5Sum",
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
        }
    }

    /// The fixed hex length of a digest produced by this algorithm.
    pub fn hex_len(self) -> usize {
        match self {
            Self::Md5Sum => 32,
            Self::Sha1 => 40,
            Self::Sha256 => 64,
        }
    }

    /// Parse a section header name back into an algorithm.
    pub fn from_section_name(name: &str) -> Option<Self> {
        match name {
            "MD5Sum" => Some(Self::Md5Sum),
            "SHA1" => Some(Self::Sha1),
            "SHA256" => Some(Self::Sha256),
            _ => None,
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.section_name())
    }
}

/// A validated hex digest of fixed length.
///
/// Ensures digests are validated where they enter the system, so invalid
/// hex strings never propagate into comparisons or rendered manifests.
/// Stored lowercase; comparisons are therefore plain string equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct HexDigest(String);

impl HexDigest {
    /// Create a validated digest for the given algorithm.
    ///
    /// # Errors
    ///
    /// Returns [`DigestError`] if the string is not exactly the algorithm's
    /// hex length or contains non-hex characters.
    pub fn new(s: impl Into<String>, algorithm: HashAlgorithm) -> Result<Self, DigestError> {
        let s = s.into();
        if s.len() != algorithm.hex_len() {
            return Err(DigestError::BadLength {
                algorithm,
                expected: algorithm.hex_len(),
                actual: s.len(),
            });
        }
        if !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DigestError::NonHex(s));
        }
        Ok(Self(s.to_lowercase()))
    }

    /// Get the digest as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compare against an unvalidated hex string, case-insensitively.
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl<'de> Deserialize<'de> for HexDigest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        // Length is algorithm-dependent; accept any of the known lengths here.
        let algorithm = match s.len() {
            32 => HashAlgorithm::Md5Sum,
            40 => HashAlgorithm::Sha1,
            _ => HashAlgorithm::Sha256,
        };
        Self::new(s, algorithm).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for HexDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for HexDigest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
