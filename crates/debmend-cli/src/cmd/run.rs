//! Full pipeline run: validate, repair, remove, rebuild, sign.

use anyhow::{Context, Result, bail};
use debmend_core::pipeline::{RunLock, SuiteReport};
use debmend_core::{GpgSigner, discover, pipeline};
use std::path::{Path, PathBuf};

use crate::Cli;

/// Process every discovered suite, or just the one at `suite_path`.
pub async fn run(
    cli: &Cli,
    key_id: String,
    gnupg_home: Option<PathBuf>,
    suite_path: Option<&Path>,
) -> Result<()> {
    let config = cli.to_config(key_id, gnupg_home);
    if !config.mirror_root.is_dir() {
        bail!(
            "mirror root {} is not accessible",
            config.mirror_root.display()
        );
    }

    let _lock = RunLock::acquire(&config.lock_path())
        .context("a concurrent debmend run is already active")?;

    let mut suites = discover::discover(&config);
    if let Some(wanted) = suite_path {
        suites.retain(|s| s.dist_dir == wanted || s.dist_dir.ends_with(wanted));
        if suites.is_empty() {
            bail!("no discovered suite matches {}", wanted.display());
        }
    }
    if suites.is_empty() {
        println!("no suites found under {}", config.mirror_root.display());
        return Ok(());
    }

    let signer = GpgSigner::new(&config.key_id, config.gnupg_home());
    let reports = pipeline::run(&config, &signer, suites)
        .await
        .context("signing key unavailable")?;

    print_summary(&reports);

    let failed: Vec<_> = reports.iter().filter(|r| r.status.is_fatal()).collect();
    if !failed.is_empty() {
        bail!(
            "{} suite(s) failed to rebuild or sign: {}",
            failed.len(),
            failed
                .iter()
                .map(|r| r.suite.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    Ok(())
}

/// Print the per-suite counters and terminal states.
fn print_summary(reports: &[SuiteReport]) {
    println!("{:<24} {:>6} {:>9} {:>8} {:>8}  status", "suite", "valid", "repaired", "removed", "skipped");
    for report in reports {
        println!(
            "{:<24} {:>6} {:>9} {:>8} {:>8}  {:?}",
            report.suite, report.valid, report.repaired, report.removed, report.skipped, report.status
        );
    }
}
