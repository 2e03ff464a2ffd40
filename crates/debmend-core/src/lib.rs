//! Core library for debmend.
//!
//! Implements the self-healing pipeline over a mirrored apt tree: discover
//! suites, validate tracked metadata assets against the suite's Release
//! manifest, redownload what can be repaired, delete what cannot, then
//! rebuild and re-sign the Release so it never references a missing or
//! corrupt file.

pub mod build;
pub mod config;
pub mod discover;
pub mod origin;
pub mod pipeline;
pub mod remove;
pub mod repair;
pub mod sign;
pub mod structural;
pub mod validate;

pub use config::Config;
pub use discover::Suite;
pub use pipeline::{SuiteReport, SuiteStatus};
pub use sign::{GpgSigner, Signer};

/// User Agent string for upstream fetches.
pub const USER_AGENT: &str = concat!("debmend/", env!("CARGO_PKG_VERSION"));
