//! Shared types and the Release wire format for debmend.
//!
//! A mirrored apt suite is indexed by a `Release` file: a header of scalar
//! fields followed by one checksum block per hash algorithm, each block
//! listing `<hex-digest> <decimal-size> <relative-path>` for every asset in
//! the suite. This crate owns the parsing and rendering of that format plus
//! the validated digest newtypes the rest of the workspace passes around.

pub mod hash;
pub mod release;

pub use hash::{DigestError, HashAlgorithm, HexDigest};
pub use release::{Release, ReleaseEntry, ReleaseHeader, checksum_entries, normalize_path};
