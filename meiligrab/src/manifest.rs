//! Package manifest bookkeeping.
//!
//! Two JSON manifests live alongside the binaries:
//!
//! - the **root manifest**, which owns the package version and records the
//!   release tag resolved by the last run;
//! - the **launcher manifest**, whose version and optional dependencies must
//!   follow the per-platform packages so the launcher picks the right binary.
//!
//! Both are edited in place; keys this module does not touch are preserved
//! in their original order.

use std::io;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

/// Result type for manifest operations.
pub type ManifestResult<T> = Result<T, ManifestError>;

/// Errors reading or writing a manifest.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse manifest {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("manifest {0} is not a JSON object")]
    NotAnObject(PathBuf),

    #[error("failed to serialize manifest {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write manifest {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A JSON object manifest loaded from disk.
#[derive(Debug, Clone)]
pub struct PackageManifest {
    path: PathBuf,
    fields: Map<String, Value>,
}

impl PackageManifest {
    /// Load a manifest. The file must exist and hold a JSON object.
    pub async fn load(path: impl Into<PathBuf>) -> ManifestResult<Self> {
        let path = path.into();
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| ManifestError::ReadFailed {
                path: path.clone(),
                source: e,
            })?;

        let value: Value =
            serde_json::from_slice(&bytes).map_err(|e| ManifestError::ParseFailed {
                path: path.clone(),
                source: e,
            })?;

        match value {
            Value::Object(fields) => Ok(Self { path, fields }),
            _ => Err(ManifestError::NotAnObject(path)),
        }
    }

    /// Load a manifest, returning `None` when the file does not exist.
    pub async fn load_optional(path: impl Into<PathBuf>) -> ManifestResult<Option<Self>> {
        match Self::load(path).await {
            Ok(manifest) => Ok(Some(manifest)),
            Err(ManifestError::ReadFailed { source, .. })
                if source.kind() == io::ErrorKind::NotFound =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// String value of a top-level key.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Set a top-level string key.
    pub fn set_str(&mut self, key: &str, value: impl Into<String>) {
        self.fields.insert(key.to_string(), Value::String(value.into()));
    }

    /// Package name (`name` key).
    pub fn name(&self) -> Option<&str> {
        self.get_str("name")
    }

    /// Package version (`version` key).
    pub fn version(&self) -> Option<&str> {
        self.get_str("version")
    }

    /// Rewrite the version of every listed dependency already present in the
    /// given dependency table. Returns the number of entries updated.
    pub fn pin_dependencies(&mut self, table: &str, names: &[String], version: &str) -> usize {
        let Some(Value::Object(deps)) = self.fields.get_mut(table) else {
            return 0;
        };

        let mut updated = 0;
        for name in names {
            if let Some(entry) = deps.get_mut(name) {
                *entry = Value::String(version.to_string());
                updated += 1;
            }
        }
        updated
    }

    /// Write the manifest back to its path (pretty JSON, trailing newline).
    pub async fn save(&self) -> ManifestResult<()> {
        let mut json =
            serde_json::to_string_pretty(&self.fields).map_err(|e| ManifestError::Serialize {
                path: self.path.clone(),
                source: e,
            })?;
        json.push('\n');

        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| ManifestError::WriteFailed {
                path: self.path.clone(),
                source: e,
            })
    }
}

/// Version stamped into the launcher manifest.
///
/// The leading `v` of the release tag is dropped so the result stays a valid
/// semantic version.
///
/// # Example
///
/// ```
/// use meiligrab::manifest::launcher_version;
///
/// assert_eq!(launcher_version("2.0.0", "v1.12.1"), "2.0.0-1.12.1");
/// assert_eq!(launcher_version("2.0.0", "1.12.1"), "2.0.0-1.12.1");
/// ```
pub fn launcher_version(package_version: &str, tag: &str) -> String {
    format!("{}-{}", package_version, tag.strip_prefix('v').unwrap_or(tag))
}
