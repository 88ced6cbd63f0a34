//! Append-only error log: one line per classified failure event.
//!
//! Lines carry a unix timestamp, the job id, the error classification, and
//! whatever detail was available. Appends are serialized through a mutex so
//! concurrent jobs never interleave mid-line.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};

use crate::job::JobId;

#[derive(Debug)]
pub struct ErrorLog {
    file: Mutex<File>,
    path: PathBuf,
}

impl ErrorLog {
    /// Opens (creating if needed) the log in append mode. A failure here is
    /// a startup failure: the run must not dispatch without a working log.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open error log {}", path.display()))?;
        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
        })
    }

    /// Appends one failure event. Write failures are logged and swallowed:
    /// a broken log line never aborts a job.
    pub fn append(&self, job_id: JobId, class: &str, detail: &str) {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let detail = detail.replace(['\n', '\r'], " ");
        let mut file = self.file.lock().unwrap();
        if let Err(e) = writeln!(file, "{} job={} error={} detail={}", ts, job_id, class, detail) {
            tracing::warn!(job = job_id, "error log append failed: {}", e);
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
