//! In-process HTTP transport with conditional, resumable transfers.
//!
//! One request per transfer in the common case:
//!
//! | Status | Meaning                                   | Action                        |
//! |--------|-------------------------------------------|-------------------------------|
//! | 304    | stored validator still current            | nothing read or written       |
//! | 416    | local file already covers the artifact    | headers-only re-fetch for ETag|
//! | 206    | resumed                                   | append body                   |
//! | 200    | full response                             | truncate, write body          |
//! | other  | failure                                   | `DownloadError::Transfer`     |
//!
//! A 416 or 206 carrying an ETag different from the stored validator means the
//! local bytes belong to an older artifact: the transfer restarts from zero.

use std::path::Path;

use reqwest::header::{IF_NONE_MATCH, RANGE, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::error::{DownloadError, DownloadResult};
use super::headers::{content_length, etag, if_none_match, is_stale, range_from};
use super::progress::ProgressEvent;
use super::session::Outcome;
use super::transport::{report_complete, BoxFuture, TransferRequest, TransferResult, Transport};
use crate::release::{status_text, DEFAULT_USER_AGENT};

/// Buffer size for writing during downloads (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// HTTP transport backed by a shared reqwest client.
///
/// No request timeout is configured: a stalled connection waits until the
/// caller cancels.
#[derive(Debug, Clone)]
pub struct FetchTransport {
    client: Client,
}

impl FetchTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn run(&self, req: TransferRequest<'_>) -> DownloadResult<TransferResult> {
        let mut request = self.client.get(req.url).header(USER_AGENT, DEFAULT_USER_AGENT);
        if req.existing_length > 0 {
            request = request.header(RANGE, range_from(req.existing_length));
        }
        if !req.validator.is_empty() {
            request = request.header(IF_NONE_MATCH, if_none_match(req.validator));
        }

        let response = send(request, req.url, req.cancel).await?;
        let status = response.status();
        debug!(url = req.url, status = status.as_u16(), "Artifact response");

        match status {
            StatusCode::NOT_MODIFIED => {
                report_complete(req.progress, req.filename, req.existing_length, req.existing_length);
                Ok(TransferResult {
                    outcome: Outcome::NotModified,
                    total_length: req.existing_length,
                    bytes_written: 0,
                    validator: None,
                })
            }
            StatusCode::RANGE_NOT_SATISFIABLE => {
                drop(response);
                self.recover_validator(&req).await
            }
            StatusCode::PARTIAL_CONTENT => {
                let validator = etag(response.headers());
                if is_stale(req.validator, validator.as_deref()) {
                    debug!(url = req.url, "Remote artifact changed since partial download, restarting");
                    drop(response);
                    let response = self.unconditional(&req).await?;
                    return write_full(response, &req).await;
                }

                let total = req.existing_length + content_length(response.headers());
                req.progress.emit(ProgressEvent::start(req.filename, total));

                let written = stream_body(response, &req, true).await?;
                Ok(TransferResult {
                    outcome: Outcome::Resumed,
                    total_length: total,
                    bytes_written: written,
                    validator,
                })
            }
            StatusCode::OK => write_full(response, &req).await,
            other => Err(DownloadError::Transfer {
                url: req.url.to_string(),
                status: other.as_u16(),
                status_text: status_text(other),
            }),
        }
    }

    /// The local file covers the artifact's length: re-issue an unconditional
    /// GET and keep only the headers, unless they show a different artifact.
    async fn recover_validator(&self, req: &TransferRequest<'_>) -> DownloadResult<TransferResult> {
        debug!(url = req.url, "Range not satisfiable, recovering validator");
        let response = self.unconditional(req).await?;

        let validator = etag(response.headers());
        if is_stale(req.validator, validator.as_deref()) {
            debug!(url = req.url, "Remote artifact changed, downloading it again");
            return write_full(response, req).await;
        }

        let total = match content_length(response.headers()) {
            0 => req.existing_length,
            n => n,
        };
        // Dropping the response closes the connection without reading the body.
        drop(response);

        report_complete(req.progress, req.filename, total, req.existing_length);
        Ok(TransferResult {
            outcome: Outcome::AlreadyComplete,
            total_length: total,
            bytes_written: 0,
            validator,
        })
    }

    /// GET without `Range` or `If-None-Match`; non-success is a transfer error.
    async fn unconditional(&self, req: &TransferRequest<'_>) -> DownloadResult<Response> {
        let request = self.client.get(req.url).header(USER_AGENT, DEFAULT_USER_AGENT);
        let response = send(request, req.url, req.cancel).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Transfer {
                url: req.url.to_string(),
                status: status.as_u16(),
                status_text: status_text(status),
            });
        }
        Ok(response)
    }
}

impl Transport for FetchTransport {
    fn name(&self) -> &'static str {
        "fetch"
    }

    fn transfer<'a>(
        &'a self,
        request: TransferRequest<'a>,
    ) -> BoxFuture<'a, DownloadResult<TransferResult>> {
        Box::pin(self.run(request))
    }
}

/// Dispatch a request, racing the response headers against cancellation.
async fn send(request: RequestBuilder, url: &str, cancel: &CancellationToken) -> DownloadResult<Response> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DownloadError::Cancelled),
        result = request.send() => result.map_err(|e| DownloadError::Request {
            url: url.to_string(),
            source: e,
        }),
    }
}

/// Replace the local file with a full response body.
async fn write_full(response: Response, req: &TransferRequest<'_>) -> DownloadResult<TransferResult> {
    let total = content_length(response.headers());
    let validator = etag(response.headers());
    req.progress.emit(ProgressEvent::start(req.filename, total));

    let written = stream_body(response, req, false).await?;
    Ok(TransferResult {
        outcome: Outcome::Fresh,
        total_length: total,
        bytes_written: written,
        validator,
    })
}

/// Stream the response body to disk, one progress event per chunk.
async fn stream_body(mut response: Response, req: &TransferRequest<'_>, append: bool) -> DownloadResult<u64> {
    let file = open_destination(req.dest, append).await?;
    let mut writer = BufWriter::with_capacity(BUFFER_SIZE, file);
    let mut written = 0u64;

    loop {
        let next = tokio::select! {
            biased;
            _ = req.cancel.cancelled() => Err(DownloadError::Cancelled),
            chunk = response.chunk() => chunk.map_err(|e| DownloadError::Request {
                url: req.url.to_string(),
                source: e,
            }),
        };

        let chunk = match next {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                // Keep what arrived so the next run can resume from it.
                let _ = writer.flush().await;
                return Err(e);
            }
        };

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(req.dest, e))?;
        written += chunk.len() as u64;
        trace!(chunk = chunk.len(), written, "Chunk written");
        req.progress.emit(ProgressEvent::progress(chunk.len() as u64));
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(req.dest, e))?;
    Ok(written)
}

/// Open the destination in append mode (resume) or truncate mode (fresh).
async fn open_destination(dest: &Path, append: bool) -> DownloadResult<File> {
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| DownloadError::io(parent, e))?;
    }

    let result = if append {
        OpenOptions::new().create(true).append(true).open(dest).await
    } else {
        File::create(dest).await
    };
    result.map_err(|e| DownloadError::io(dest, e))
}
