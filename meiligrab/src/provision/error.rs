//! Provisioning errors.

use thiserror::Error;

use crate::config::ConfigError;
use crate::download::DownloadError;
use crate::manifest::ManifestError;
use crate::release::ResolutionError;
use crate::target::PlatformArch;

/// Result type for provisioning runs.
pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// Errors that abort a provisioning run.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("failed to resolve release tag: {0}")]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A target failed; targets after it were not attempted.
    #[error("{target}: {source}")]
    Target {
        target: PlatformArch,
        #[source]
        source: DownloadError,
    },

    #[error("no package version: set package_version or add \"version\" to {0}")]
    MissingPackageVersion(String),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl ProvisionError {
    /// Whether the run stopped because it was cancelled.
    pub fn is_cancelled(&self) -> bool {
        match self {
            ProvisionError::Resolution(ResolutionError::Cancelled) => true,
            ProvisionError::Download(e) => e.is_cancelled(),
            ProvisionError::Target { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// The target that failed, if the error is tied to one.
    pub fn target(&self) -> Option<PlatformArch> {
        match self {
            ProvisionError::Target { target, .. } => Some(*target),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_cancelled() {
        assert!(ProvisionError::Resolution(ResolutionError::Cancelled).is_cancelled());
        assert!(ProvisionError::Target {
            target: PlatformArch::LinuxAmd64,
            source: DownloadError::Cancelled,
        }
        .is_cancelled());
        assert!(!ProvisionError::MissingPackageVersion("package.json".to_string()).is_cancelled());
    }

    #[test]
    fn test_target_error_display() {
        let err = ProvisionError::Target {
            target: PlatformArch::MacosAppleSilicon,
            source: DownloadError::Transfer {
                url: "https://example.com/x".to_string(),
                status: 404,
                status_text: "Not Found".to_string(),
            },
        };
        assert_eq!(err.target(), Some(PlatformArch::MacosAppleSilicon));
        assert!(err.to_string().starts_with("macos-apple-silicon: "));
    }
}
