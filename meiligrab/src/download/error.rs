//! Error types for the download engine.

use std::io;
use std::path::PathBuf;

use crate::metadata::MetadataError;

/// Result type for download operations.
pub type DownloadResult<T> = Result<T, DownloadError>;

/// Errors that can occur while acquiring one artifact.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// The release host answered with a status the engine does not handle.
    #[error("failed to download {url}: server returned {status} {status_text}")]
    Transfer {
        url: String,
        status: u16,
        status_text: String,
    },

    /// The caller cancelled the run.
    #[error("download cancelled")]
    Cancelled,

    /// Connection or body read failure.
    #[error("failed to download {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Local file operation failed.
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Sidecar could not be persisted.
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// The external download tool could not be started.
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The external download tool exited unsuccessfully.
    #[error("{program} exited with {code}: {stderr}")]
    ExternalTool {
        program: String,
        code: String,
        stderr: String,
    },
}

impl DownloadError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DownloadError::Cancelled)
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        DownloadError::Io {
            path: path.into(),
            source,
        }
    }
}
