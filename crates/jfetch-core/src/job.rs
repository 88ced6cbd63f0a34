//! Job descriptions and lifecycle states.

use std::fmt;
use std::path::PathBuf;

use crate::outcome::FailureClass;

/// Job identifier, unique within a run (assigned from target-list order).
pub type JobId = u64;

/// Immutable description of one fetch task. Built once at run start from the
/// target list.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub url: String,
    /// Final artifact path; the body streams to `<path>.part` until validated.
    pub artifact_path: PathBuf,
    /// Attempt limit for this job, including the first attempt.
    pub max_attempts: u32,
}

/// Lifecycle state of a job.
///
/// Transitions are monotonic: once a job reaches `Succeeded`, `Failed`, or
/// `Cancelled` it never changes again, and the status tracker rejects any
/// attempt to move it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Not yet dispatched.
    Pending,
    /// A fetch attempt is in flight.
    Running,
    /// Last attempt failed transiently; backoff timer active.
    AwaitingRetry,
    /// Artifact stored and valid.
    Succeeded,
    /// Retries exhausted or a permanent error hit.
    Failed,
    /// Terminated by an external interrupt before a natural terminal state.
    Cancelled,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::AwaitingRetry => "awaiting-retry",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current view of one job, owned by the status tracker.
#[derive(Debug, Clone)]
pub struct StatusEntry {
    pub state: JobState,
    /// Attempts started so far.
    pub attempts: u32,
    pub last_error: Option<FailureClass>,
}

impl StatusEntry {
    pub fn new() -> Self {
        Self {
            state: JobState::Pending,
            attempts: 0,
            last_error: None,
        }
    }
}

impl Default for StatusEntry {
    fn default() -> Self {
        Self::new()
    }
}
