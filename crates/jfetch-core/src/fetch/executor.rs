//! libcurl-backed fetch executor.
//!
//! Each attempt runs a blocking curl easy transfer inside `spawn_blocking`,
//! writing the body to `<artifact>.part`. The run's cancellation token is
//! checked in the progress callback so an interrupt aborts in-flight
//! transfers without waiting for the next body chunk.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::job::Job;
use crate::outcome::{classify_status, classify_transport, FetchOutcome};

use super::{part_path, Fetcher};

#[derive(Debug, Clone)]
pub struct CurlFetcher {
    connect_timeout: Duration,
    request_timeout: Duration,
    cancel: CancellationToken,
}

impl CurlFetcher {
    pub fn new(
        connect_timeout: Duration,
        request_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            connect_timeout,
            request_timeout,
            cancel,
        }
    }
}

#[async_trait]
impl Fetcher for CurlFetcher {
    async fn fetch(&self, job: &Job) -> Result<FetchOutcome> {
        let url = job.url.clone();
        let artifact = job.artifact_path.clone();
        let connect_timeout = self.connect_timeout;
        let request_timeout = self.request_timeout;
        let cancel = self.cancel.clone();

        tokio::task::spawn_blocking(move || {
            fetch_blocking(&url, &artifact, connect_timeout, request_timeout, &cancel)
        })
        .await
        .context("fetch task join")?
    }
}

/// Performs the GET, streaming to the part file. Runs on a blocking thread.
fn fetch_blocking(
    url: &str,
    artifact: &Path,
    connect_timeout: Duration,
    request_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<FetchOutcome> {
    let part = part_path(artifact);
    let mut file = fs::File::create(&part)
        .with_context(|| format!("create temp artifact {}", part.display()))?;
    let mut io_err: Option<std::io::Error> = None;

    let mut easy = curl::easy::Easy::new();
    easy.url(url).context("invalid URL")?;
    easy.follow_location(true)?;
    easy.max_redirections(10)?;
    easy.connect_timeout(connect_timeout)?;
    easy.timeout(request_timeout)?;

    let mut headers = curl::easy::List::new();
    headers.append("Accept: application/json")?;
    easy.http_headers(headers)?;

    easy.progress(true)?;

    let transfer_result = {
        let mut transfer = easy.transfer();
        // Returning false aborts the transfer; fires even while the
        // connection is idle, so shutdown does not wait on a stalled server.
        transfer.progress_function(|_, _, _, _| !cancel.is_cancelled())?;
        transfer.write_function(|data| {
            match file.write_all(data) {
                Ok(()) => Ok(data.len()),
                Err(e) => {
                    io_err = Some(e);
                    Ok(0) // abort transfer
                }
            }
        })?;
        transfer.perform()
    };

    if let Err(e) = transfer_result {
        let _ = fs::remove_file(&part);
        if let Some(io_err) = io_err {
            return Err(io_err).with_context(|| format!("write temp artifact {}", part.display()));
        }
        if cancel.is_cancelled() {
            // The scheduler finalizes the job as cancelled; the class here
            // is never consulted.
            return Ok(FetchOutcome::failure(
                crate::outcome::FailureClass::Network(crate::outcome::NetworkErrorKind::Connect),
                "transfer aborted by shutdown",
            ));
        }
        let kind = classify_transport(&e);
        return Ok(FetchOutcome::failure(
            crate::outcome::FailureClass::Network(kind),
            e.to_string(),
        ));
    }
    drop(file);

    let code = easy.response_code().context("no response code")? as u16;
    if code != 200 {
        let _ = fs::remove_file(&part);
        return Ok(FetchOutcome::failure(
            classify_status(code),
            format!("HTTP {}", code),
        ));
    }

    let body = fs::read(&part).with_context(|| format!("read temp artifact {}", part.display()))?;
    match serde_json::from_slice::<serde_json::Value>(&body) {
        Ok(_) => {
            fs::rename(&part, artifact)
                .with_context(|| format!("move artifact into place at {}", artifact.display()))?;
            Ok(FetchOutcome::Success)
        }
        Err(e) => {
            let _ = fs::remove_file(&part);
            Ok(FetchOutcome::failure(
                crate::outcome::FailureClass::InvalidPayload,
                e.to_string(),
            ))
        }
    }
}
