//! Per-artifact sidecar metadata.
//!
//! Each binary has a small JSON file next to it recording which release it
//! came from and the ETag the release host served for those exact bytes:
//!
//! ```json
//! { "name": "meilisearch-linux-amd64", "version": "2.0.0-v1.12.1", "ETag": "abc123" }
//! ```
//!
//! The sidecar doubles as the per-platform package manifest, so fields this
//! module does not own are preserved on every write.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Result type for metadata writes.
pub type MetadataResult<T> = Result<T, MetadataError>;

/// Errors writing a sidecar. Reads never fail.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("failed to serialize metadata for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to create directory {path}: {source}")]
    CreateDirFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Provenance of the bytes currently on disk for one target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// `<packageVersion>-<releaseTag>`.
    #[serde(default)]
    pub version: String,

    /// ETag without surrounding quotes; empty when unknown.
    #[serde(rename = "ETag", default)]
    pub validator: String,

    /// Fields owned by someone else.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ArtifactMetadata {
    pub fn new(version: impl Into<String>, validator: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            validator: validator.into(),
            extra: Map::new(),
        }
    }

    /// Whether a validator is known for the bytes on disk.
    pub fn has_validator(&self) -> bool {
        !self.validator.is_empty()
    }
}

/// Compose the version string recorded for an artifact.
///
/// # Example
///
/// ```
/// use meiligrab::metadata::artifact_version;
///
/// assert_eq!(artifact_version("2.0.0", "v1.12.1"), "2.0.0-v1.12.1");
/// ```
pub fn artifact_version(package_version: &str, tag: &str) -> String {
    format!("{}-{}", package_version, tag)
}

/// Read a sidecar, falling back to the zero value when missing or unreadable.
pub async fn read(path: &Path) -> ArtifactMetadata {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return ArtifactMetadata::default(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Unreadable sidecar, treating as absent");
            return ArtifactMetadata::default();
        }
    };

    match serde_json::from_slice::<ArtifactMetadata>(&bytes) {
        Ok(metadata) => metadata,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Malformed sidecar, treating as absent");
            ArtifactMetadata::default()
        }
    }
}

/// Write a sidecar, overwriting any previous content.
///
/// Not atomic: a crash mid-write can leave a truncated file, which the next
/// `read` treats as absent.
pub async fn write(path: &Path, metadata: &ArtifactMetadata) -> MetadataResult<()> {
    let mut json = serde_json::to_string_pretty(metadata).map_err(|e| MetadataError::Serialize {
        path: path.to_path_buf(),
        source: e,
    })?;
    json.push('\n');

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| MetadataError::CreateDirFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
    }

    tokio::fs::write(path, json)
        .await
        .map_err(|e| MetadataError::WriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
}
