//! Parsing and rendering of Release manifests.
//!
//! The parser is deliberately lenient: a single malformed checksum line is
//! skipped with a warning rather than aborting, since one corrupt line must
//! not block validation of the remaining thousands of entries. The renderer
//! is deterministic so that rebuilding an unchanged suite reproduces the
//! same body modulo the `Date:` field.

use crate::hash::{HashAlgorithm, HexDigest};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// One checksum line of a Release file: digest, size, and suite-relative path.
///
/// Immutable once parsed. Paths are normalized at parse time (leading `./`
/// stripped, repeated separators collapsed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseEntry {
    /// Validated hex digest of the referenced file.
    pub digest: HexDigest,
    /// Size of the referenced file in bytes.
    pub size: u64,
    /// Path of the file relative to the suite's dist directory.
    pub path: String,
}

/// The scalar header fields of a Release file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseHeader {
    /// Repository origin (e.g. `Debian`).
    pub origin: String,
    /// Repository label.
    pub label: String,
    /// Suite name (e.g. `stable`).
    pub suite: String,
    /// Release codename (e.g. `bookworm`).
    pub codename: String,
    /// Architectures covered by the suite.
    pub architectures: Vec<String>,
    /// Components covered by the suite.
    pub components: Vec<String>,
    /// Generation timestamp, verbatim.
    pub date: String,
}

impl ReleaseHeader {
    /// Parse the header fields from Release text.
    ///
    /// Unknown fields are ignored; checksum sections and their indented
    /// lines are not header fields and end nothing (the header is simply
    /// every non-indented `Key: value` line).
    pub fn parse(text: &str) -> Self {
        let mut header = Self::default();
        for line in text.lines() {
            if line.starts_with(' ') || line.starts_with('\t') {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match key {
                "Origin" => header.origin = value.to_string(),
                "Label" => header.label = value.to_string(),
                "Suite" => header.suite = value.to_string(),
                "Codename" => header.codename = value.to_string(),
                "Date" => header.date = value.to_string(),
                "Architectures" => {
                    header.architectures =
                        value.split_whitespace().map(str::to_string).collect();
                }
                "Components" => {
                    header.components = value.split_whitespace().map(str::to_string).collect();
                }
                _ => {}
            }
        }
        header
    }
}

/// A complete Release manifest: header plus one SHA-256 checksum block.
///
/// The builder always regenerates a Release from scratch rather than
/// patching one in place, so this type only ever represents a manifest
/// that is consistent with the file tree it was computed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    /// Scalar header fields.
    pub header: ReleaseHeader,
    /// SHA-256 entries, ordered by path.
    pub sha256: Vec<ReleaseEntry>,
}

impl Release {
    /// Render the manifest body in Release wire format.
    ///
    /// Field order and entry order are fixed, so two renders of the same
    /// data are byte-identical.
    pub fn render(&self) -> String {
        let h = &self.header;
        let mut out = String::new();
        let _ = writeln!(out, "Origin: {}", h.origin);
        let _ = writeln!(out, "Label: {}", h.label);
        let _ = writeln!(out, "Suite: {}", h.suite);
        let _ = writeln!(out, "Codename: {}", h.codename);
        let _ = writeln!(out, "Date: {}", h.date);
        let _ = writeln!(out, "Architectures: {}", h.architectures.join(" "));
        let _ = writeln!(out, "Components: {}", h.components.join(" "));
        let _ = writeln!(out, "{}:", HashAlgorithm::Sha256.section_name());
        for entry in &self.sha256 {
            let _ = writeln!(out, " {} {:>12} {}", entry.digest, entry.size, entry.path);
        }
        out
    }
}

/// Normalize a suite-relative path from a checksum line.
///
/// Strips a leading `./`, collapses repeated `/` separators, and drops a
/// trailing slash. Does not resolve `..` segments; the URL join layer
/// rejects those outright.
pub fn normalize_path(raw: &str) -> String {
    let trimmed = raw.strip_prefix("./").unwrap_or(raw);
    let mut parts = trimmed.split('/').filter(|s| !s.is_empty() && *s != ".");
    let mut out = String::new();
    if let Some(first) = parts.next() {
        out.push_str(first);
        for part in parts {
            out.push('/');
            out.push_str(part);
        }
    }
    out
}

/// Extract the checksum entries for one algorithm from Release text.
///
/// Scans for the section named after `algorithm` and parses its indented
/// `hash size path` lines. Lines that do not match the expected shape
/// (wrong field count, bad digest length, unparseable size) are skipped
/// and logged. Entries in other sections are ignored.
pub fn checksum_entries(text: &str, algorithm: HashAlgorithm) -> Vec<ReleaseEntry> {
    let section_header = format!("{}:", algorithm.section_name());
    let mut entries = Vec::new();
    let mut in_section = false;

    for line in text.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if !in_section {
                continue;
            }
            let mut fields = line.split_whitespace();
            let (Some(digest), Some(size), Some(path), None) =
                (fields.next(), fields.next(), fields.next(), fields.next())
            else {
                tracing::warn!(line, "skipping malformed checksum line");
                continue;
            };
            let digest = match HexDigest::new(digest, algorithm) {
                Ok(d) => d,
                Err(err) => {
                    tracing::warn!(line, %err, "skipping checksum line with bad digest");
                    continue;
                }
            };
            let size = match size.parse::<u64>() {
                Ok(s) => s,
                Err(err) => {
                    tracing::warn!(line, %err, "skipping checksum line with bad size");
                    continue;
                }
            };
            entries.push(ReleaseEntry {
                digest,
                size,
                path: normalize_path(path),
            });
        } else {
            in_section = line.trim_end() == section_header;
        }
    }
    entries
}
