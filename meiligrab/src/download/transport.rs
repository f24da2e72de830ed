//! Transport abstraction for single-artifact transfers.
//!
//! The engine owns everything around a transfer (local state, URL building,
//! metadata persistence); a [`Transport`] owns the wire exchange itself:
//!
//! ```text
//! DownloadEngine
//!     │
//!     ├── Transport (trait)
//!     │       ├── FetchTransport   (in-process HTTP, reqwest)
//!     │       └── WgetTransport    (external `wget --continue`)
//!     │
//!     └── metadata sidecar read / write
//! ```

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

use super::error::DownloadResult;
use super::progress::{ProgressEvent, ProgressSink};
use super::session::Outcome;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Everything a transport needs for one conditional, resumable transfer.
pub struct TransferRequest<'a> {
    /// Fully built (possibly proxied) asset URL.
    pub url: &'a str,
    /// Name reported in progress events.
    pub filename: &'a str,
    /// Local binary path.
    pub dest: &'a Path,
    /// Bytes already on disk at `dest`.
    pub existing_length: u64,
    /// Stored validator; empty when unknown.
    pub validator: &'a str,
    pub progress: &'a dyn ProgressSink,
    pub cancel: &'a CancellationToken,
}

/// What the transport observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResult {
    pub outcome: Outcome,
    pub total_length: u64,
    /// Body bytes written to `dest`.
    pub bytes_written: u64,
    /// Fresh validator from the server; `None` keeps the stored one.
    pub validator: Option<String>,
}

/// A way of moving one artifact from the release host to disk.
///
/// Implementations must:
/// - send `Range` only when `existing_length > 0` and a validator-based
///   conditional only when `validator` is non-empty;
/// - append on partial content, truncate on a full response;
/// - emit `progress` events summing to the bytes written, in order;
/// - return `DownloadError::Cancelled` promptly once `cancel` fires.
pub trait Transport: Send + Sync {
    /// Short name used in logs and configuration (`fetch`, `wget`).
    fn name(&self) -> &'static str;

    /// Perform the transfer described by `request`.
    fn transfer<'a>(
        &'a self,
        request: TransferRequest<'a>,
    ) -> BoxFuture<'a, DownloadResult<TransferResult>>;
}

/// Emit the uniform "fully loaded" pair used when nothing was transferred.
pub(crate) fn report_complete(
    progress: &dyn ProgressSink,
    filename: &str,
    total: u64,
    existing: u64,
) {
    progress.emit(ProgressEvent::start(filename, total));
    progress.emit(ProgressEvent::progress(existing));
}
