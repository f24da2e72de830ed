//! Per-target download driver.
//!
//! The engine wraps a [`Transport`] with the local bookkeeping around a
//! transfer: it measures what is already on disk, loads the stored validator,
//! builds the asset URL and persists the sidecar once the body is complete.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::error::{DownloadError, DownloadResult};
use super::progress::{NoProgress, ProgressEvent, ProgressSink};
use super::session::{DownloadSession, Outcome};
use super::transport::{TransferRequest, Transport};
use crate::metadata::{self, artifact_version, ArtifactMetadata};
use crate::release::ReleaseSource;
use crate::target::TargetDescriptor;

/// Permission bits applied to downloaded binaries.
#[cfg(unix)]
const EXECUTABLE_MODE: u32 = 0o755;

/// Per-call options for [`DownloadEngine::fetch`].
#[derive(Clone)]
pub struct FetchOptions {
    /// Mirror prefix for the asset URL; `None` downloads directly.
    pub proxy: Option<String>,
    pub cancel: CancellationToken,
    pub progress: Arc<dyn ProgressSink>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            proxy: None,
            cancel: CancellationToken::new(),
            progress: Arc::new(NoProgress),
        }
    }
}

impl std::fmt::Debug for FetchOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchOptions")
            .field("proxy", &self.proxy)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Downloads release artifacts for individual targets.
pub struct DownloadEngine {
    transport: Box<dyn Transport>,
    source: ReleaseSource,
    package_version: String,
}

impl DownloadEngine {
    /// Create an engine stamping sidecars with `package_version`.
    pub fn new(
        transport: Box<dyn Transport>,
        source: ReleaseSource,
        package_version: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            source,
            package_version: package_version.into(),
        }
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    pub fn package_version(&self) -> &str {
        &self.package_version
    }

    /// Asset URL for `target` at `tag`, honouring the proxy option.
    pub fn asset_url(&self, target: &TargetDescriptor, tag: &str, options: &FetchOptions) -> String {
        self.source
            .asset_url(tag, &target.remote_artifact_name, options.proxy.as_deref())
    }

    /// Bring one target's binary up to date with `tag`.
    ///
    /// On success the sidecar holds the new version and the validator matching
    /// the bytes on disk. On error (including cancellation) the sidecar is left
    /// as it was; a partially written binary stays behind for the next run to
    /// resume.
    pub async fn fetch(
        &self,
        target: &TargetDescriptor,
        tag: &str,
        options: &FetchOptions,
    ) -> DownloadResult<DownloadSession> {
        let filename = target.remote_artifact_name.as_str();
        let dest = target.local_binary_path.as_path();
        let url = self.asset_url(target, tag, options);

        let existing_length = existing_length(dest).await;
        let stored = metadata::read(&target.local_metadata_path).await;

        // A validator only describes bytes that exist; with nothing on disk it
        // could only produce a 304 for a missing file.
        let validator = if existing_length > 0 {
            stored.validator.as_str()
        } else {
            if stored.has_validator() {
                debug!(target = %target.platform_arch, "Binary missing, ignoring stored validator");
            }
            ""
        };

        debug!(
            target = %target.platform_arch,
            url = %url,
            existing_length,
            has_validator = !validator.is_empty(),
            transport = self.transport.name(),
            "Starting artifact transfer"
        );

        options.progress.emit(ProgressEvent::start(filename, 0));

        let result = self
            .transport
            .transfer(TransferRequest {
                url: &url,
                filename,
                dest,
                existing_length,
                validator,
                progress: options.progress.as_ref(),
                cancel: &options.cancel,
            })
            .await?;

        // The body is complete and flushed; only now does the validator
        // describe the bytes on disk. A fresh body without an ETag has none.
        let validator = match result.validator {
            Some(v) => v,
            None if result.outcome == Outcome::Fresh => String::new(),
            None => validator.to_string(),
        };
        let updated = ArtifactMetadata {
            version: artifact_version(&self.package_version, tag),
            validator,
            extra: stored.extra,
        };
        metadata::write(&target.local_metadata_path, &updated).await?;
        make_executable(dest).await?;

        let transferred_this_run = if result.outcome.wrote_body() {
            result.bytes_written
        } else {
            existing_length
        };

        info!(
            target = %target.platform_arch,
            outcome = %result.outcome,
            bytes = result.bytes_written,
            total = result.total_length,
            "Artifact ready"
        );

        Ok(DownloadSession {
            platform_arch: target.platform_arch,
            existing_length,
            total_length: result.total_length,
            transferred_this_run,
            bytes_written: result.bytes_written,
            outcome: result.outcome,
            validator: updated.validator,
        })
    }

    /// Restamp a target's sidecar version for `tag` without any transfer.
    ///
    /// The stored validator is kept.
    pub async fn restamp(
        &self,
        target: &TargetDescriptor,
        tag: &str,
    ) -> DownloadResult<ArtifactMetadata> {
        let mut stored = metadata::read(&target.local_metadata_path).await;
        stored.version = artifact_version(&self.package_version, tag);
        metadata::write(&target.local_metadata_path, &stored).await?;
        debug!(target = %target.platform_arch, version = %stored.version, "Sidecar restamped");
        Ok(stored)
    }
}

impl std::fmt::Debug for DownloadEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadEngine")
            .field("transport", &self.transport.name())
            .field("source", &self.source)
            .field("package_version", &self.package_version)
            .finish()
    }
}

async fn existing_length(path: &Path) -> u64 {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => meta.len(),
        _ => 0,
    }
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> DownloadResult<()> {
    use std::os::unix::fs::PermissionsExt;

    if tokio::fs::metadata(path).await.is_err() {
        return Ok(());
    }
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(EXECUTABLE_MODE))
        .await
        .map_err(|e| DownloadError::io(path, e))
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> DownloadResult<()> {
    Ok(())
}
