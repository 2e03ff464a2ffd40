//! Upstream origin handling: typed URL joining and origin identity lookup.
//!
//! Origin base strings ultimately come from mirror-list content, so the
//! join rejects anything that could escape the origin's path space instead
//! of concatenating strings blindly.

use thiserror::Error;

/// Error returned when a relative path cannot be joined onto an origin base.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UrlJoinError {
    /// The relative path is empty after normalization.
    #[error("empty relative path")]
    Empty,

    /// The relative path is absolute or escapes the base via `..`.
    #[error("path '{0}' escapes the origin base")]
    Traversal(String),

    /// The relative path contains characters the mirror layout never uses.
    #[error("path '{0}' contains forbidden characters")]
    Forbidden(String),
}

/// Join a suite-relative path onto an origin base URL.
///
/// Separators are normalized (repeated `/` collapsed, `.` segments
/// dropped); `..` segments, leading slashes, backslashes, and embedded
/// query/fragment characters are rejected.
///
/// # Errors
///
/// Returns [`UrlJoinError`] if the relative path is empty, absolute, or
/// contains traversal or forbidden characters.
pub fn join_url(base: &str, rel: &str) -> Result<String, UrlJoinError> {
    if rel.contains('\\') || rel.contains('?') || rel.contains('#') {
        return Err(UrlJoinError::Forbidden(rel.to_string()));
    }
    if rel.starts_with('/') {
        return Err(UrlJoinError::Traversal(rel.to_string()));
    }

    let mut segments = Vec::new();
    for seg in rel.split('/') {
        match seg {
            "" | "." => {}
            ".." => return Err(UrlJoinError::Traversal(rel.to_string())),
            other => segments.push(other),
        }
    }
    if segments.is_empty() {
        return Err(UrlJoinError::Empty);
    }

    Ok(format!(
        "{}/{}",
        base.trim_end_matches('/'),
        segments.join("/")
    ))
}

/// Select the `Origin`/`Label` pair for a suite from its upstream origin.
///
/// Matched against the origin host; unknown hosts fall back to a generic
/// mirror identity.
pub fn origin_identity(origin_base: &str) -> (&'static str, &'static str) {
    let host = origin_base
        .split("://")
        .nth(1)
        .unwrap_or(origin_base)
        .split('/')
        .next()
        .unwrap_or("");

    if host.contains("raspbian") {
        ("Raspbian", "Raspbian")
    } else if host.contains("raspberrypi") {
        ("Raspberry Pi Foundation", "Raspberry Pi Foundation")
    } else if host.contains("ubuntu") {
        ("Ubuntu", "Ubuntu")
    } else if host.contains("debian") {
        ("Debian", "Debian")
    } else {
        ("Mirror", "Mirror")
    }
}
