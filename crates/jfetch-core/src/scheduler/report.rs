//! Final aggregate report, compiled once the run is quiescent.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::job::{Job, JobId, JobState, StatusEntry};

/// One job's final line in the report.
#[derive(Debug, Clone)]
pub struct ReportEntry {
    pub id: JobId,
    pub url: String,
    pub state: JobState,
    pub attempts: u32,
    pub error: Option<String>,
    /// Artifact path, present only for succeeded jobs.
    pub artifact: Option<PathBuf>,
}

/// Aggregate outcome of a whole run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// One entry per dispatched job, in job-id order.
    pub entries: Vec<ReportEntry>,
}

impl RunReport {
    /// Folds the tracker snapshot into the report. Every job appears exactly
    /// once, with its state at invocation time.
    pub fn compile(jobs: &[Job], snapshot: &HashMap<JobId, StatusEntry>) -> Self {
        let mut entries: Vec<ReportEntry> = jobs
            .iter()
            .map(|job| {
                let fallback = StatusEntry::new();
                let entry = snapshot.get(&job.id).unwrap_or(&fallback);
                ReportEntry {
                    id: job.id,
                    url: job.url.clone(),
                    state: entry.state,
                    attempts: entry.attempts,
                    error: entry.last_error.map(|class| class.to_string()),
                    artifact: (entry.state == JobState::Succeeded)
                        .then(|| job.artifact_path.clone()),
                }
            })
            .collect();
        entries.sort_by_key(|e| e.id);

        let succeeded = entries
            .iter()
            .filter(|e| e.state == JobState::Succeeded)
            .count();
        let failed = entries.iter().filter(|e| e.state == JobState::Failed).count();
        let cancelled = entries
            .iter()
            .filter(|e| e.state == JobState::Cancelled)
            .count();

        Self {
            total: entries.len(),
            succeeded,
            failed,
            cancelled,
            entries,
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.succeeded == self.total
    }

    /// Exit code for a naturally completed run: 0 on full success, 1 if any
    /// job failed. Interrupted runs exit through the CLI's interrupt path.
    pub fn exit_code(&self) -> i32 {
        if self.all_succeeded() {
            0
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::FailureClass;
    use crate::status::StatusTracker;
    use std::path::Path;

    fn job(id: JobId) -> Job {
        Job {
            id,
            url: format!("http://example.com/{id}.json"),
            artifact_path: Path::new("/out").join(format!("{id}.json")),
            max_attempts: 3,
        }
    }

    #[test]
    fn every_job_appears_once_with_final_state() {
        let jobs = vec![job(1), job(2), job(3)];
        let tracker = StatusTracker::new(jobs.iter().map(|j| j.id));
        tracker.record_attempt(1).unwrap();
        tracker.set_state(1, JobState::Succeeded).unwrap();
        tracker.record_attempt(2).unwrap();
        tracker.record_error(2, FailureClass::NotFound).unwrap();
        tracker.set_state(2, JobState::Failed).unwrap();
        tracker.set_state(3, JobState::Cancelled).unwrap();

        let report = RunReport::compile(&jobs, &tracker.snapshot());
        assert_eq!(report.total, 3);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.cancelled, 1);
        assert_eq!(report.entries.len(), 3);
        assert_eq!(report.entries[0].id, 1);
        assert!(report.entries[0].artifact.is_some());
        assert_eq!(report.entries[1].error.as_deref(), Some("not_found"));
        assert!(report.entries[1].artifact.is_none());
        assert_eq!(report.entries[2].state, JobState::Cancelled);
    }

    #[test]
    fn exit_codes() {
        let jobs = vec![job(1)];
        let tracker = StatusTracker::new([1]);
        tracker.set_state(1, JobState::Succeeded).unwrap();
        assert_eq!(RunReport::compile(&jobs, &tracker.snapshot()).exit_code(), 0);

        let tracker = StatusTracker::new([1]);
        tracker.set_state(1, JobState::Failed).unwrap();
        assert_eq!(RunReport::compile(&jobs, &tracker.snapshot()).exit_code(), 1);
    }
}
