//! Shared job status map: the single source of truth for job state.
//!
//! Workers transition the job they own; the progress monitor and the report
//! builder only take snapshots. A whole-map lock keeps every entry's fields
//! consistent under concurrent mutation, so a snapshot never observes a
//! half-applied transition.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::job::{JobId, JobState, StatusEntry};
use crate::outcome::FailureClass;

/// Rejected status-tracker mutation. Both variants indicate a scheduler bug,
/// not an environmental condition.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("job {0} is not tracked")]
    UnknownJob(JobId),
    #[error("job {id}: illegal transition {from} -> {to} (terminal states are final)")]
    AlreadyTerminal {
        id: JobId,
        from: JobState,
        to: JobState,
    },
}

#[derive(Debug, Default)]
pub struct StatusTracker {
    entries: RwLock<HashMap<JobId, StatusEntry>>,
}

impl StatusTracker {
    /// Creates a tracker with every given job seeded as `Pending`.
    pub fn new(ids: impl IntoIterator<Item = JobId>) -> Self {
        let entries = ids.into_iter().map(|id| (id, StatusEntry::new())).collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Transitions a job to `new_state`. Rejects unknown jobs and any
    /// transition out of a terminal state.
    pub fn set_state(&self, id: JobId, new_state: JobState) -> Result<(), StateError> {
        let mut entries = self.entries.write().unwrap();
        let entry = entries.get_mut(&id).ok_or(StateError::UnknownJob(id))?;
        if entry.state.is_terminal() {
            return Err(StateError::AlreadyTerminal {
                id,
                from: entry.state,
                to: new_state,
            });
        }
        entry.state = new_state;
        Ok(())
    }

    /// Bumps the attempt counter; returns the attempt number just started.
    pub fn record_attempt(&self, id: JobId) -> Result<u32, StateError> {
        let mut entries = self.entries.write().unwrap();
        let entry = entries.get_mut(&id).ok_or(StateError::UnknownJob(id))?;
        entry.attempts += 1;
        Ok(entry.attempts)
    }

    /// Records the classification of the most recent failure.
    pub fn record_error(&self, id: JobId, class: FailureClass) -> Result<(), StateError> {
        let mut entries = self.entries.write().unwrap();
        let entry = entries.get_mut(&id).ok_or(StateError::UnknownJob(id))?;
        entry.last_error = Some(class);
        Ok(())
    }

    /// Point-in-time copy of all entries, taken under the read lock.
    pub fn snapshot(&self) -> HashMap<JobId, StatusEntry> {
        self.entries.read().unwrap().clone()
    }
}
