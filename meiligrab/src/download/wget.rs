//! External-process transport driving `wget --continue`.
//!
//! A drop-in alternative to [`FetchTransport`](super::FetchTransport) for
//! hosts where an in-process client is undesirable. Resumption is delegated
//! to wget's `--continue`; the conditional header is passed with `--header`.
//! The HTTP exchange is recovered from `--server-response` output on stderr.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use super::error::{DownloadError, DownloadResult};
use super::headers::{if_none_match, is_stale, parse_length, strip_quotes};
use super::progress::ProgressEvent;
use super::session::Outcome;
use super::transport::{report_complete, BoxFuture, TransferRequest, TransferResult, Transport};

/// Lines of stderr kept in error messages.
const STDERR_TAIL_LINES: usize = 20;

/// Transport that shells out to wget.
#[derive(Debug, Clone)]
pub struct WgetTransport {
    program: PathBuf,
}

impl Default for WgetTransport {
    fn default() -> Self {
        Self::new("wget")
    }
}

impl WgetTransport {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Command line for one transfer.
    pub fn build_args(&self, req: &TransferRequest<'_>) -> Vec<String> {
        let mut args = vec![
            "--continue".to_string(),
            "--server-response".to_string(),
            "--progress=dot:mega".to_string(),
            "--output-document".to_string(),
            req.dest.display().to_string(),
        ];
        if !req.validator.is_empty() {
            args.push("--header".to_string());
            args.push(format!("If-None-Match: {}", if_none_match(req.validator)));
        }
        args.push(req.url.to_string());
        args
    }

    async fn run(&self, req: TransferRequest<'_>) -> DownloadResult<TransferResult> {
        let exchange = self.invoke(&req).await?;
        if !exchange.is_stale(req.validator) {
            return exchange.interpret(&req);
        }

        // The partial or complete file belongs to an older artifact.
        debug!(url = req.url, "Remote artifact changed, downloading it again");
        remove_file(req.dest).await?;
        let fresh = TransferRequest {
            existing_length: 0,
            validator: "",
            ..req
        };
        self.invoke(&fresh).await?.interpret(&fresh)
    }

    /// Run wget once and collect what it reported.
    async fn invoke(&self, req: &TransferRequest<'_>) -> DownloadResult<Exchange> {
        let program = self.program.display().to_string();
        if let Some(parent) = req.dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::io(parent, e))?;
        }

        let args = self.build_args(req);
        debug!(program = %program, ?args, "Spawning external download");

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DownloadError::Spawn {
                program: program.clone(),
                source: e,
            })?;

        // Dropping the wait future drops the child, which kills it.
        let output = tokio::select! {
            biased;
            _ = req.cancel.cancelled() => return Err(DownloadError::Cancelled),
            output = child.wait_with_output() => output.map_err(|e| DownloadError::Spawn {
                program: program.clone(),
                source: e,
            })?,
        };

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        Ok(Exchange {
            response: ServerResponse::parse(&stderr),
            final_length: file_length(req.dest).await,
            success: output.status.success(),
            code: output.status.to_string(),
            program,
            stderr,
        })
    }
}

/// One finished wget invocation.
struct Exchange {
    program: String,
    success: bool,
    code: String,
    stderr: String,
    response: ServerResponse,
    final_length: u64,
}

impl Exchange {
    /// A 416 or 206 whose ETag differs from the validator sent with it.
    fn is_stale(&self, validator: &str) -> bool {
        matches!(self.response.status, Some(416) | Some(206))
            && is_stale(validator, self.response.etag.as_deref())
    }

    fn interpret(self, req: &TransferRequest<'_>) -> DownloadResult<TransferResult> {
        let response = self.response;
        let final_length = self.final_length;

        let outcome = match response.status {
            Some(304) => Outcome::NotModified,
            Some(416) => Outcome::AlreadyComplete,
            Some(status) if !self.success => {
                return Err(DownloadError::Transfer {
                    url: req.url.to_string(),
                    status,
                    status_text: response.reason,
                });
            }
            _ if !self.success => {
                return Err(DownloadError::ExternalTool {
                    program: self.program,
                    code: self.code,
                    stderr: tail(&self.stderr, STDERR_TAIL_LINES),
                });
            }
            Some(206) => Outcome::Resumed,
            Some(200) => Outcome::Fresh,
            Some(status) => {
                return Err(DownloadError::Transfer {
                    url: req.url.to_string(),
                    status,
                    status_text: response.reason,
                });
            }
            // wget skipped the request body entirely: the file is complete.
            None => Outcome::AlreadyComplete,
        };

        let result = match outcome {
            Outcome::Fresh | Outcome::Resumed => {
                let base = if outcome == Outcome::Resumed {
                    req.existing_length
                } else {
                    0
                };
                let written = final_length.saturating_sub(base);
                req.progress.emit(ProgressEvent::start(req.filename, final_length));
                req.progress.emit(ProgressEvent::progress(written));
                TransferResult {
                    outcome,
                    total_length: final_length,
                    bytes_written: written,
                    validator: response.etag,
                }
            }
            Outcome::NotModified => {
                report_complete(req.progress, req.filename, req.existing_length, req.existing_length);
                TransferResult {
                    outcome,
                    total_length: req.existing_length,
                    bytes_written: 0,
                    validator: None,
                }
            }
            Outcome::AlreadyComplete => {
                let total = final_length.max(req.existing_length);
                report_complete(req.progress, req.filename, total, req.existing_length);
                TransferResult {
                    outcome,
                    total_length: total,
                    bytes_written: 0,
                    validator: response.etag,
                }
            }
        };
        Ok(result)
    }
}

impl Transport for WgetTransport {
    fn name(&self) -> &'static str {
        "wget"
    }

    fn transfer<'a>(
        &'a self,
        request: TransferRequest<'a>,
    ) -> BoxFuture<'a, DownloadResult<TransferResult>> {
        Box::pin(self.run(request))
    }
}

/// The last HTTP response block printed by `--server-response`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerResponse {
    pub status: Option<u16>,
    pub reason: String,
    pub etag: Option<String>,
    pub content_length: Option<u64>,
}

impl ServerResponse {
    /// Parse wget stderr; later responses (after redirects) win.
    pub fn parse(stderr: &str) -> Self {
        let mut current = ServerResponse::default();

        for line in stderr.lines().map(str::trim) {
            if let Some(rest) = line.strip_prefix("HTTP/") {
                let mut parts = rest.splitn(3, ' ');
                let _version = parts.next();
                let status = parts.next().and_then(|s| s.parse::<u16>().ok());
                if status.is_some() {
                    current = ServerResponse {
                        status,
                        reason: parts.next().unwrap_or("").trim().to_string(),
                        ..ServerResponse::default()
                    };
                }
                continue;
            }

            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            if name.eq_ignore_ascii_case("etag") {
                let value = strip_quotes(value);
                current.etag = (!value.is_empty()).then_some(value);
            } else if name.eq_ignore_ascii_case("content-length") {
                current.content_length = Some(parse_length(value));
            }
        }

        current
    }
}

async fn remove_file(path: &Path) -> DownloadResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DownloadError::io(path, e)),
    }
}

async fn file_length(path: &Path) -> u64 {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.len())
        .unwrap_or(0)
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<_> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::progress::NoProgress;
    use tokio_util::sync::CancellationToken;

    const REDIRECTED_200: &str = "\
--2025-01-01 10:00:00--  https://github.com/meilisearch/meilisearch/releases/download/v1.12.1/meilisearch-linux-amd64
Resolving github.com (github.com)... 140.82.121.3
  HTTP/1.1 302 Found
  Server: GitHub.com
  Location: https://objects.githubusercontent.com/x
  Content-Length: 0
--2025-01-01 10:00:01--  https://objects.githubusercontent.com/x
  HTTP/1.1 200 OK
  Content-Type: application/octet-stream
  Content-Length: 104857600
  ETag: \"0x8DD1B\"
Length: 104857600 (100M) [application/octet-stream]
Saving to: 'packages/linux-amd64/meilisearch-linux-amd64'
";

    #[test]
    fn test_parse_takes_last_response() {
        let response = ServerResponse::parse(REDIRECTED_200);
        assert_eq!(response.status, Some(200));
        assert_eq!(response.reason, "OK");
        assert_eq!(response.etag.as_deref(), Some("0x8DD1B"));
        assert_eq!(response.content_length, Some(104_857_600));
    }

    #[test]
    fn test_parse_not_found() {
        let response = ServerResponse::parse("  HTTP/1.1 404 Not Found\n  Content-Length: 9\n");
        assert_eq!(response.status, Some(404));
        assert_eq!(response.reason, "Not Found");
        assert_eq!(response.etag, None);
    }

    #[test]
    fn test_parse_no_response() {
        let response =
            ServerResponse::parse("The file is already fully retrieved; nothing to do.\n");
        assert_eq!(response, ServerResponse::default());
    }

    #[test]
    fn test_build_args_conditional() {
        let transport = WgetTransport::default();
        let cancel = CancellationToken::new();
        let req = TransferRequest {
            url: "https://example.com/a",
            filename: "a",
            dest: Path::new("packages/linux-amd64/a"),
            existing_length: 10,
            validator: "abc123",
            progress: &NoProgress,
            cancel: &cancel,
        };

        let args = transport.build_args(&req);
        assert_eq!(args[0], "--continue");
        assert!(args.contains(&"If-None-Match: \"abc123\"".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("https://example.com/a"));
    }

    #[test]
    fn test_build_args_unconditional() {
        let transport = WgetTransport::new("/usr/local/bin/wget");
        let cancel = CancellationToken::new();
        let req = TransferRequest {
            url: "https://example.com/a",
            filename: "a",
            dest: Path::new("a"),
            existing_length: 0,
            validator: "",
            progress: &NoProgress,
            cancel: &cancel,
        };

        let args = transport.build_args(&req);
        assert!(!args.iter().any(|a| a == "--header"));
        assert_eq!(transport.program(), Path::new("/usr/local/bin/wget"));
    }

    fn exchange(status: u16, etag: Option<&str>) -> Exchange {
        Exchange {
            program: "wget".to_string(),
            success: true,
            code: "exit status: 0".to_string(),
            stderr: String::new(),
            response: ServerResponse {
                status: Some(status),
                etag: etag.map(str::to_string),
                ..ServerResponse::default()
            },
            final_length: 0,
        }
    }

    #[test]
    fn test_exchange_stale_only_for_changed_partial_or_range_responses() {
        assert!(exchange(416, Some("new")).is_stale("old"));
        assert!(exchange(206, Some("new")).is_stale("old"));
        assert!(!exchange(206, Some("old")).is_stale("old"));
        assert!(!exchange(200, Some("new")).is_stale("old"));
        assert!(!exchange(416, Some("new")).is_stale(""));
        assert!(!exchange(416, None).is_stale("old"));
    }

    #[test]
    fn test_tail() {
        assert_eq!(tail("a\nb\nc", 2), "b\nc");
        assert_eq!(tail("a", 5), "a");
    }
}
