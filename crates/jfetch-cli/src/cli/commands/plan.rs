//! `jfetch plan` – resolve the target list into jobs without fetching.

use anyhow::Result;
use jfetch_core::config::JfetchConfig;
use jfetch_core::manifest;
use std::path::Path;

pub fn run_plan(cfg: &JfetchConfig, targets: &Path, output_dir: &Path) -> Result<()> {
    let jobs = manifest::load_jobs(targets, output_dir, cfg.max_attempts)?;
    if jobs.is_empty() {
        println!("No targets in {}.", targets.display());
        return Ok(());
    }

    println!("{:<6} {:<40} {}", "ID", "ARTIFACT", "URL");
    for job in &jobs {
        println!(
            "{:<6} {:<40} {}",
            job.id,
            job.artifact_path.display().to_string(),
            job.url
        );
    }
    println!(
        "{} job(s), up to {} attempt(s) each, {} concurrent",
        jobs.len(),
        cfg.max_attempts,
        cfg.max_concurrent
    );
    Ok(())
}
