//! Validation-only report: the read-only half of `run`.

use anyhow::Result;
use debmend_core::discover;
use debmend_core::pipeline::parse_with_best_algorithm;
use debmend_core::validate::{ValidationOutcome, validate_entries};
use debmend_schema::ReleaseHeader;

use crate::Cli;

/// Validate every suite's tracked assets and print what a run would do.
///
/// No repairs, removals, or signing; always exits zero unless the mirror
/// root itself cannot be read.
pub async fn check(cli: &Cli) -> Result<()> {
    // Key material is irrelevant for a read-only check.
    let config = cli.to_config(String::new(), None);
    let suites = discover::discover(&config);
    if suites.is_empty() {
        println!("no suites found under {}", config.mirror_root.display());
        return Ok(());
    }

    for suite in &suites {
        let Ok(text) = tokio::fs::read_to_string(suite.release_path()).await else {
            println!("{}: no Release manifest", suite.name);
            continue;
        };
        let header = ReleaseHeader::parse(&text);
        let entries = parse_with_best_algorithm(&text);
        let results =
            validate_entries(&suite.dist_dir, &entries, |p| config.is_tracked(p)).await;

        let broken: Vec<_> = results
            .iter()
            .filter(|(_, outcome)| outcome.needs_repair())
            .collect();
        println!(
            "{} ({} {}): {} entries, {} tracked, {} broken",
            suite.name,
            header.origin,
            header.codename,
            entries.len(),
            results.len(),
            broken.len()
        );
        for (entry, outcome) in broken {
            let label = match outcome {
                ValidationOutcome::Missing => "missing",
                ValidationOutcome::SizeMismatch { .. } => "size mismatch",
                ValidationOutcome::HashMismatch => "hash mismatch",
                ValidationOutcome::Valid => continue,
            };
            println!("  {label:<14} {}", entry.path);
        }
    }
    Ok(())
}
