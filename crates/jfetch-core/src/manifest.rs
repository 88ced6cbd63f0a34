//! Target-list parsing: one URL per line, resolved into immutable jobs.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use url::Url;

use crate::artifact::artifact_filename;
use crate::job::{Job, JobId};

/// Reads a target list and resolves it into jobs.
///
/// Blank lines and `#` comments are skipped. Job ids follow file order,
/// starting at 1. Each job's artifact path lands in `output_dir`, with name
/// collisions de-duplicated by a numeric suffix.
pub fn load_jobs(list_path: &Path, output_dir: &Path, max_attempts: u32) -> Result<Vec<Job>> {
    let text = fs::read_to_string(list_path)
        .with_context(|| format!("read target list {}", list_path.display()))?;
    parse_jobs(&text, output_dir, max_attempts)
}

pub fn parse_jobs(text: &str, output_dir: &Path, max_attempts: u32) -> Result<Vec<Job>> {
    let mut used_names: HashSet<String> = HashSet::new();
    let mut jobs = Vec::new();

    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let url = Url::parse(line)
            .with_context(|| format!("target list line {}: invalid URL `{line}`", lineno + 1))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            bail!(
                "target list line {}: unsupported scheme `{}` (http/https only)",
                lineno + 1,
                url.scheme()
            );
        }

        let id = jobs.len() as JobId + 1;
        let base = artifact_filename(&url).unwrap_or_else(|| format!("job-{id}.json"));
        let name = dedupe_name(base, &mut used_names);
        jobs.push(Job {
            id,
            url: url.to_string(),
            artifact_path: output_dir.join(name),
            max_attempts,
        });
    }

    Ok(jobs)
}

/// Returns `name` if unused, otherwise `stem-2.json`, `stem-3.json`, ...
fn dedupe_name(name: String, used: &mut HashSet<String>) -> String {
    if used.insert(name.clone()) {
        return name;
    }
    let stem = name.strip_suffix(".json").unwrap_or(&name);
    for n in 2.. {
        let candidate = format!("{stem}-{n}.json");
        if used.insert(candidate.clone()) {
            return candidate;
        }
    }
    unreachable!("suffix space exhausted");
}
