//! Conditional, resumable artifact downloads.
//!
//! # Architecture
//!
//! - [`DownloadEngine`] - per-target driver: local state, URL, sidecar
//! - [`Transport`] - the wire exchange, implemented by [`FetchTransport`]
//!   (reqwest) and [`WgetTransport`] (external process)
//! - [`ProgressSink`] - receives the [`ProgressEvent`] stream
//! - [`DownloadSession`] - what happened to one target
//!
//! # Example
//!
//! ```ignore
//! use meiligrab::download::{DownloadEngine, FetchOptions, FetchTransport};
//! use meiligrab::release::ReleaseSource;
//!
//! let engine = DownloadEngine::new(
//!     Box::new(FetchTransport::new(reqwest::Client::new())),
//!     ReleaseSource::default(),
//!     "2.0.0",
//! );
//! let session = engine.fetch(&target, "v1.12.1", &FetchOptions::default()).await?;
//! println!("{}: {}", session.platform_arch, session.outcome);
//! ```

mod engine;
mod error;
pub mod headers;
mod http;
mod progress;
mod session;
mod transport;
mod wget;

pub use engine::{DownloadEngine, FetchOptions};
pub use error::{DownloadError, DownloadResult};
pub use http::FetchTransport;
pub use progress::{
    ChannelProgress, LogProgress, NoProgress, ProgressEvent, ProgressSink, RecordingProgress,
};
pub use session::{DownloadSession, Outcome};
pub use transport::{BoxFuture, TransferRequest, TransferResult, Transport};
pub use wget::{ServerResponse, WgetTransport};
