//! `jfetch run` – fetch every target with bounded concurrency and retries.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use jfetch_core::config::JfetchConfig;
use jfetch_core::errlog::ErrorLog;
use jfetch_core::fetch::CurlFetcher;
use jfetch_core::manifest;
use jfetch_core::scheduler::{run_jobs, ProgressCounts, RunContext, RunReport};
use jfetch_core::status::StatusTracker;

/// Exit code for a run that ended via the interrupt path (conventional
/// SIGINT code).
const EXIT_INTERRUPTED: i32 = 130;

pub async fn run_fetch(cfg: &JfetchConfig, targets: &Path, output_dir: &Path) -> Result<i32> {
    // Environment failures here abort before any job dispatches.
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("create output directory {}", output_dir.display()))?;
    let jobs = manifest::load_jobs(targets, output_dir, cfg.max_attempts)?;
    if jobs.is_empty() {
        println!("No targets in {}.", targets.display());
        return Ok(0);
    }
    let errlog = Arc::new(ErrorLog::open(&output_dir.join("errors.log"))?);

    let tracker = Arc::new(StatusTracker::new(jobs.iter().map(|j| j.id)));
    let cancel = CancellationToken::new();

    // First interrupt requests a graceful stop; the orchestrator escalates
    // to forced termination after the grace period.
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            wait_for_signal().await;
            tracing::info!("interrupt received, stopping dispatch");
            cancel.cancel();
        }
    });

    let monitor_stop = CancellationToken::new();
    let monitor = tokio::spawn(run_progress_monitor(
        Arc::clone(&tracker),
        cfg.poll_interval(),
        monitor_stop.clone(),
    ));

    let ctx = RunContext {
        fetcher: Arc::new(CurlFetcher::new(
            cfg.connect_timeout(),
            cfg.request_timeout(),
            cancel.clone(),
        )),
        tracker: Arc::clone(&tracker),
        errlog: Arc::clone(&errlog),
        cancel: cancel.clone(),
    };
    let report = run_jobs(jobs, cfg, ctx).await;

    monitor_stop.cancel();
    let _ = monitor.await;

    render_report(&report);
    tracing::info!(
        total = report.total,
        succeeded = report.succeeded,
        failed = report.failed,
        cancelled = report.cancelled,
        "run finished"
    );
    if report.failed > 0 || report.cancelled > 0 {
        println!("Failure details: {}", errlog.path().display());
    }

    if cancel.is_cancelled() {
        Ok(EXIT_INTERRUPTED)
    } else {
        Ok(report.exit_code())
    }
}

/// Polls the tracker on the configured interval and rewrites a one-line
/// summary. Read-only; a rendering hiccup never touches job execution.
async fn run_progress_monitor(
    tracker: Arc<StatusTracker>,
    poll_interval: Duration,
    stop: CancellationToken,
) {
    let mut interval = tokio::time::interval(poll_interval);
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = interval.tick() => {}
        }
        let counts = ProgressCounts::from_snapshot(&tracker.snapshot());
        print!("\r  {}    ", counts);
        let _ = std::io::stdout().flush();
        if counts.all_terminal() {
            break;
        }
    }
    println!();
}

fn render_report(report: &RunReport) {
    println!("{:<6} {:<15} {:<9} {:<22} {}", "ID", "STATE", "ATTEMPTS", "ERROR", "ARTIFACT");
    for entry in &report.entries {
        let error = entry.error.as_deref().unwrap_or("-");
        let artifact = entry
            .artifact
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<6} {:<15} {:<9} {:<22} {}",
            entry.id,
            entry.state.as_str(),
            entry.attempts,
            error,
            artifact
        );
    }
    println!(
        "{} job(s): {} succeeded, {} failed, {} cancelled",
        report.total, report.succeeded, report.failed, report.cancelled
    );
}

/// Waits for SIGINT or SIGTERM on unix (ctrl-c elsewhere), with a ctrl-c
/// fallback when handler registration fails.
#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
        (Ok(mut sigint), Ok(mut sigterm)) => {
            tokio::select! {
                _ = sigint.recv() => tracing::info!("received SIGINT"),
                _ = sigterm.recv() => tracing::info!("received SIGTERM"),
            }
        }
        _ => {
            tracing::warn!("signal handler registration failed, falling back to ctrl-c");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
