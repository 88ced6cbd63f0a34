//! Single-shot fetch execution.
//!
//! One `fetch` call is one GET attempt: stream the body to a temporary
//! artifact, classify the result, and on success move the artifact into
//! place. Retrying is the scheduler's business, not the executor's.

mod executor;

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;

use crate::job::Job;
use crate::outcome::FetchOutcome;

pub use executor::CurlFetcher;

/// One GET attempt for a job.
///
/// Implementations classify everything the remote side can do into a
/// [`FetchOutcome`]; an `Err` is reserved for local failures (disk I/O,
/// task join) that no amount of retrying the network will fix.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, job: &Job) -> Result<FetchOutcome>;
}

/// Temporary artifact path used while a body is streaming: `<final>.part`.
pub fn part_path(artifact: &Path) -> PathBuf {
    let mut os = artifact.as_os_str().to_os_string();
    os.push(".part");
    PathBuf::from(os)
}
