//! Run orchestration: one task per job, slot-gated attempts, per-job retry
//! loops, and cooperative cancellation with a forced-termination grace
//! period.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::JfetchConfig;
use crate::errlog::ErrorLog;
use crate::fetch::{part_path, Fetcher};
use crate::job::{Job, JobId, JobState};
use crate::outcome::FetchOutcome;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::status::StatusTracker;

use super::report::RunReport;
use super::slots::FetchSlots;

/// Everything a run shares across job tasks.
#[derive(Clone)]
pub struct RunContext {
    pub fetcher: Arc<dyn Fetcher>,
    pub tracker: Arc<StatusTracker>,
    pub errlog: Arc<ErrorLog>,
    pub cancel: CancellationToken,
}

/// Runs every job to a terminal state and compiles the final report.
///
/// Jobs complete in no particular order relative to each other. On
/// cancellation, pending jobs finalize as cancelled without running, in-flight
/// jobs get the grace period to reach a terminal state, and whatever is left
/// after that is aborted and marked cancelled.
pub async fn run_jobs(jobs: Vec<Job>, cfg: &JfetchConfig, ctx: RunContext) -> RunReport {
    let slots = FetchSlots::new(cfg.max_concurrent);
    let policy = cfg.retry_policy();

    let mut join_set = JoinSet::new();
    for job in &jobs {
        let job = job.clone();
        let ctx = ctx.clone();
        let slots = slots.clone();
        join_set.spawn(async move { run_job(job, policy, slots, ctx).await });
    }

    drain(&mut join_set, &ctx.cancel, cfg.grace_period()).await;

    sweep_after_run(&jobs, &ctx);
    RunReport::compile(&jobs, &ctx.tracker.snapshot())
}

/// Joins job tasks; once cancelled, bounds the remaining drain by the grace
/// period and then force-terminates.
async fn drain(join_set: &mut JoinSet<()>, cancel: &CancellationToken, grace: std::time::Duration) {
    loop {
        tokio::select! {
            res = join_set.join_next() => {
                if res.is_none() {
                    return;
                }
            }
            _ = cancel.cancelled() => break,
        }
    }

    let deadline = tokio::time::Instant::now() + grace;
    loop {
        match tokio::time::timeout_at(deadline, join_set.join_next()).await {
            Ok(Some(_)) => {}
            Ok(None) => return,
            Err(_) => break,
        }
    }
    tracing::warn!("grace period elapsed, aborting in-flight jobs");
    join_set.abort_all();
    while join_set.join_next().await.is_some() {}
}

/// After the task pool drains: finalize anything still non-terminal as
/// cancelled (forced termination leaves no other way out) and sweep partial
/// artifacts for jobs that did not succeed.
fn sweep_after_run(jobs: &[Job], ctx: &RunContext) {
    let snapshot = ctx.tracker.snapshot();
    for job in jobs {
        let Some(entry) = snapshot.get(&job.id) else {
            continue;
        };
        if !entry.state.is_terminal() {
            set_state_or_log(ctx, job.id, JobState::Cancelled);
        }
        if entry.state != JobState::Succeeded {
            let part = part_path(&job.artifact_path);
            if part.exists() {
                let _ = std::fs::remove_file(&part);
            }
        }
    }
}

/// One job's retry loop, run to a terminal state.
async fn run_job(job: Job, policy: RetryPolicy, slots: FetchSlots, ctx: RunContext) {
    let policy = RetryPolicy {
        max_attempts: job.max_attempts,
        ..policy
    };
    let mut attempt: u32 = 1;
    loop {
        if ctx.cancel.is_cancelled() {
            set_state_or_log(&ctx, job.id, JobState::Cancelled);
            return;
        }

        // Biased so a cancellation firing together with a freed slot never
        // lets a pending job start running.
        let slot = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                set_state_or_log(&ctx, job.id, JobState::Cancelled);
                return;
            }
            slot = slots.acquire() => slot,
        };

        set_state_or_log(&ctx, job.id, JobState::Running);
        if let Err(err) = ctx.tracker.record_attempt(job.id) {
            tracing::error!(job = job.id, %err, "attempt bookkeeping failed");
        }
        let started = std::time::Instant::now();
        let outcome = match ctx.fetcher.fetch(&job).await {
            Ok(outcome) => outcome,
            Err(err) => {
                // Local failure (disk, task join): no remote retry will fix it.
                tracing::error!(job = job.id, "attempt failed locally: {:#}", err);
                ctx.errlog.append(job.id, "local", &format!("{err:#}"));
                set_state_or_log(&ctx, job.id, JobState::Failed);
                return;
            }
        };
        drop(slot);
        let elapsed = started.elapsed();

        if ctx.cancel.is_cancelled() && !matches!(outcome, FetchOutcome::Success) {
            // Attempt was (or may have been) cut short by shutdown; the
            // outcome is not a fair classification.
            set_state_or_log(&ctx, job.id, JobState::Cancelled);
            return;
        }

        if let FetchOutcome::Failure { class, detail } = &outcome {
            if let Err(err) = ctx.tracker.record_error(job.id, *class) {
                tracing::error!(job = job.id, %err, "error bookkeeping failed");
            }
            ctx.errlog.append(job.id, &class.to_string(), detail);
        }

        match policy.decide(attempt, &outcome) {
            RetryDecision::Succeed => {
                tracing::info!(
                    job = job.id,
                    attempts = attempt,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "job succeeded"
                );
                set_state_or_log(&ctx, job.id, JobState::Succeeded);
                return;
            }
            RetryDecision::Fail => {
                tracing::warn!(job = job.id, attempts = attempt, "job failed");
                set_state_or_log(&ctx, job.id, JobState::Failed);
                return;
            }
            RetryDecision::RetryAfter(delay) => {
                tracing::debug!(
                    job = job.id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after backoff"
                );
                set_state_or_log(&ctx, job.id, JobState::AwaitingRetry);
                tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => {
                        set_state_or_log(&ctx, job.id, JobState::Cancelled);
                        return;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
        }
    }
}

fn set_state_or_log(ctx: &RunContext, id: JobId, state: JobState) {
    if let Err(err) = ctx.tracker.set_state(id, state) {
        tracing::error!(job = id, %err, "illegal state transition");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::FailureClass;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Scripted fetcher: pops the next outcome per job; repeats success once
    /// the script runs dry. Tracks the peak number of concurrent attempts.
    struct MockFetcher {
        script: Mutex<HashMap<JobId, VecDeque<FetchOutcome>>>,
        attempt_delay: Duration,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
    }

    impl MockFetcher {
        fn new(script: HashMap<JobId, VecDeque<FetchOutcome>>, attempt_delay: Duration) -> Self {
            Self {
                script: Mutex::new(script),
                attempt_delay,
                in_flight: AtomicUsize::new(0),
                peak_in_flight: AtomicUsize::new(0),
            }
        }

        fn peak(&self) -> usize {
            self.peak_in_flight.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Fetcher for MockFetcher {
        async fn fetch(&self, job: &Job) -> Result<FetchOutcome> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
            if !self.attempt_delay.is_zero() {
                tokio::time::sleep(self.attempt_delay).await;
            }
            let outcome = self
                .script
                .lock()
                .unwrap()
                .get_mut(&job.id)
                .and_then(|q| q.pop_front())
                .unwrap_or(FetchOutcome::Success);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(outcome)
        }
    }

    fn mk_jobs(n: u64, max_attempts: u32, dir: &std::path::Path) -> Vec<Job> {
        (1..=n)
            .map(|id| Job {
                id,
                url: format!("http://example.com/{id}.json"),
                artifact_path: dir.join(format!("{id}.json")),
                max_attempts,
            })
            .collect()
    }

    fn mk_ctx(
        jobs: &[Job],
        fetcher: Arc<dyn Fetcher>,
        dir: &std::path::Path,
    ) -> (RunContext, Arc<StatusTracker>, std::path::PathBuf) {
        let tracker = Arc::new(StatusTracker::new(jobs.iter().map(|j| j.id)));
        let log_path = dir.join("errors.log");
        let errlog = Arc::new(ErrorLog::open(&log_path).unwrap());
        let ctx = RunContext {
            fetcher,
            tracker: Arc::clone(&tracker),
            errlog,
            cancel: CancellationToken::new(),
        };
        (ctx, tracker, log_path)
    }

    fn cfg(max_concurrent: usize, max_attempts: u32, base_delay_secs: f64) -> JfetchConfig {
        JfetchConfig {
            max_concurrent,
            max_attempts,
            base_delay_secs,
            grace_period_secs: 5,
            ..JfetchConfig::default()
        }
    }

    #[tokio::test]
    async fn all_jobs_reach_terminal_state_and_report_is_complete() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = mk_jobs(5, 3, dir.path());
        let fetcher = Arc::new(MockFetcher::new(HashMap::new(), Duration::ZERO));
        let (ctx, tracker, _) = mk_ctx(&jobs, fetcher, dir.path());

        let report = run_jobs(jobs, &cfg(2, 3, 0.0), ctx).await;
        assert_eq!(report.total, 5);
        assert_eq!(report.succeeded, 5);
        assert!(report.entries.iter().all(|e| e.state == JobState::Succeeded));
        assert!(report.entries.iter().all(|e| e.attempts == 1));
        let snapshot = tracker.snapshot();
        assert!(snapshot.values().all(|e| e.state.is_terminal()));
    }

    #[tokio::test]
    async fn not_found_fails_after_exactly_one_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = mk_jobs(1, 3, dir.path());
        let mut script = HashMap::new();
        script.insert(
            1,
            VecDeque::from([FetchOutcome::failure(FailureClass::NotFound, "HTTP 404")]),
        );
        let fetcher = Arc::new(MockFetcher::new(script, Duration::ZERO));
        let (ctx, _, log_path) = mk_ctx(&jobs, fetcher, dir.path());

        let report = run_jobs(jobs, &cfg(2, 3, 0.0), ctx).await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.entries[0].attempts, 1);
        assert_eq!(report.entries[0].error.as_deref(), Some("not_found"));
        let log = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(log.lines().count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_backoff_doubles_then_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = mk_jobs(1, 3, dir.path());
        let mut script = HashMap::new();
        script.insert(
            1,
            VecDeque::from([
                FetchOutcome::failure(FailureClass::RateLimited, "HTTP 429"),
                FetchOutcome::failure(FailureClass::RateLimited, "HTTP 429"),
                FetchOutcome::Success,
            ]),
        );
        let fetcher = Arc::new(MockFetcher::new(script, Duration::ZERO));
        let (ctx, _, _) = mk_ctx(&jobs, fetcher, dir.path());

        let started = tokio::time::Instant::now();
        let report = run_jobs(jobs, &cfg(2, 3, 0.5), ctx).await;
        let elapsed = started.elapsed();

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.entries[0].attempts, 3);
        // Backoffs: 0.5s after attempt 1, then 1.0s after attempt 2.
        assert!(elapsed >= Duration::from_millis(1500), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(1700), "elapsed {elapsed:?}");
    }

    #[tokio::test]
    async fn invalid_payload_exhausts_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = mk_jobs(1, 3, dir.path());
        let mut script = HashMap::new();
        script.insert(
            1,
            VecDeque::from(vec![
                FetchOutcome::failure(FailureClass::InvalidPayload, "expected value");
                3
            ]),
        );
        let fetcher = Arc::new(MockFetcher::new(script, Duration::ZERO));
        let (ctx, _, log_path) = mk_ctx(&jobs, fetcher, dir.path());

        let report = run_jobs(jobs, &cfg(2, 3, 0.0), ctx).await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.entries[0].attempts, 3);
        assert_eq!(report.entries[0].error.as_deref(), Some("invalid_payload"));
        let log = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(log.lines().count(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_attempts_never_exceed_the_slot_limit() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = mk_jobs(6, 1, dir.path());
        let fetcher = Arc::new(MockFetcher::new(HashMap::new(), Duration::from_millis(30)));
        let (ctx, _, _) = mk_ctx(&jobs, Arc::clone(&fetcher) as Arc<dyn Fetcher>, dir.path());

        let report = run_jobs(jobs, &cfg(2, 1, 0.0), ctx).await;
        assert_eq!(report.succeeded, 6);
        assert!(fetcher.peak() <= 2, "peak in-flight was {}", fetcher.peak());
        assert!(fetcher.peak() >= 1);
    }

    #[tokio::test]
    async fn cancelled_before_dispatch_never_runs() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = mk_jobs(3, 3, dir.path());
        let fetcher = Arc::new(MockFetcher::new(HashMap::new(), Duration::ZERO));
        let (ctx, _, _) = mk_ctx(&jobs, fetcher, dir.path());
        ctx.cancel.cancel();

        let report = run_jobs(jobs, &cfg(2, 3, 0.0), ctx).await;
        assert_eq!(report.cancelled, 3);
        assert!(report.entries.iter().all(|e| e.attempts == 0));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_mid_run_escalates_after_grace_period() {
        let dir = tempfile::tempdir().unwrap();
        // Two jobs fetch "forever"; the third waits on a slot.
        let jobs = mk_jobs(3, 3, dir.path());
        let fetcher = Arc::new(MockFetcher::new(HashMap::new(), Duration::from_secs(600)));
        let (ctx, tracker, _) = mk_ctx(&jobs, fetcher, dir.path());

        let cancel = ctx.cancel.clone();
        let run_cfg = cfg(2, 3, 0.0);
        let handle = tokio::spawn(async move { run_jobs(jobs, &run_cfg, ctx).await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Two running, one still pending behind the slot limit.
        let counts =
            crate::scheduler::ProgressCounts::from_snapshot(&tracker.snapshot());
        assert_eq!(counts.running, 2);
        assert_eq!(counts.pending, 1);

        cancel.cancel();
        let report = handle.await.unwrap();

        assert_eq!(report.cancelled, 3);
        let snapshot = tracker.snapshot();
        assert!(snapshot.values().all(|e| e.state == JobState::Cancelled));
        // The pending job never started an attempt.
        assert!(snapshot.values().any(|e| e.attempts == 0));
    }
}
