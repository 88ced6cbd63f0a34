//! Per-state job counts for the progress monitor.
//!
//! The monitor polls the status tracker, folds a snapshot into counts, and
//! renders them. It never mutates job state.

use std::collections::HashMap;
use std::fmt;

use crate::job::{JobId, JobState, StatusEntry};

/// Counts of jobs per lifecycle state at one sampled instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressCounts {
    pub pending: usize,
    pub running: usize,
    pub awaiting_retry: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl ProgressCounts {
    pub fn from_snapshot(snapshot: &HashMap<JobId, StatusEntry>) -> Self {
        let mut counts = Self::default();
        for entry in snapshot.values() {
            match entry.state {
                JobState::Pending => counts.pending += 1,
                JobState::Running => counts.running += 1,
                JobState::AwaitingRetry => counts.awaiting_retry += 1,
                JobState::Succeeded => counts.succeeded += 1,
                JobState::Failed => counts.failed += 1,
                JobState::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.pending
            + self.running
            + self.awaiting_retry
            + self.succeeded
            + self.failed
            + self.cancelled
    }

    pub fn terminal(&self) -> usize {
        self.succeeded + self.failed + self.cancelled
    }

    /// True once every tracked job has reached a terminal state.
    pub fn all_terminal(&self) -> bool {
        self.terminal() == self.total()
    }
}

impl fmt::Display for ProgressCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} done | running {} | retrying {} | pending {} | ok {} | failed {} | cancelled {}",
            self.terminal(),
            self.total(),
            self.running,
            self.awaiting_retry,
            self.pending,
            self.succeeded,
            self.failed,
            self.cancelled
        )
    }
}
