//! Provisioning run orchestration.
//!
//! One run resolves the release tag once, then walks the selected targets in
//! matrix order, strictly one after another:
//!
//! ```text
//! package version ─► resolve tag ─► [record releaseTag] ─► fetch target 1
//!                                                          fetch target 2
//!                                                          ...
//!                                                        ─► stamp launcher ─► done
//! ```
//!
//! The first failing target stops the run. Targets completed before it keep
//! their binaries and sidecars.

use std::sync::Arc;

use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::error::{ProvisionError, ProvisionResult};
use crate::config::{EffectiveConfig, TransportKind};
use crate::download::{
    DownloadEngine, DownloadSession, FetchOptions, FetchTransport, NoProgress, ProgressEvent,
    ProgressSink, Transport, WgetTransport,
};
use crate::manifest::{launcher_version, PackageManifest};
use crate::metadata::artifact_version;
use crate::release::{ReleaseResolver, DEFAULT_USER_AGENT};
use crate::target::{PlatformArch, TargetDescriptor};

/// Dependency table of the launcher manifest that lists platform packages.
const LAUNCHER_DEPENDENCY_TABLE: &str = "optionalDependencies";

/// Outcome of a successful provisioning run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    /// Concrete release tag that was provisioned.
    pub tag: String,
    /// True when the tag was resolved from the `latest` release.
    pub from_latest: bool,
    /// Package version the sidecars were stamped with.
    pub package_version: String,
    /// One session per downloaded target, in matrix order. Empty when
    /// downloads were skipped.
    pub sessions: Vec<DownloadSession>,
    /// Targets whose sidecar was restamped without a transfer.
    pub restamped: Vec<PlatformArch>,
    /// Whether the launcher manifest was found and stamped.
    pub launcher_stamped: bool,
}

impl ProvisionReport {
    /// Body bytes written across all sessions.
    pub fn bytes_written(&self) -> u64 {
        self.sessions.iter().map(|s| s.bytes_written).sum()
    }
}

/// Drives a full provisioning run.
pub struct Provisioner {
    config: EffectiveConfig,
    client: Client,
    cancel: CancellationToken,
    progress: Arc<dyn ProgressSink>,
}

impl Provisioner {
    /// Create a provisioner with its own HTTP client.
    pub fn new(config: EffectiveConfig) -> ProvisionResult<Self> {
        let client = Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .map_err(ProvisionError::Client)?;
        Ok(Self::with_client(config, client))
    }

    /// Create a provisioner sharing an existing HTTP client.
    pub fn with_client(config: EffectiveConfig, client: Client) -> Self {
        Self {
            config,
            client,
            cancel: CancellationToken::new(),
            progress: Arc::new(NoProgress),
        }
    }

    /// Report progress to `progress` instead of discarding it.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Observe an externally owned cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token cancelling this provisioner's runs.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &EffectiveConfig {
        &self.config
    }

    /// Targets this run will touch, in matrix order.
    pub fn selected_targets(&self) -> Vec<TargetDescriptor> {
        self.config.matrix.targets_for(self.config.targets.as_deref())
    }

    /// Run the provisioning sequence once.
    pub async fn run(&self) -> ProvisionResult<ProvisionReport> {
        let mut root_manifest = PackageManifest::load_optional(&self.config.root_manifest).await?;
        let package_version = self.package_version(root_manifest.as_ref())?;

        let resolver = ReleaseResolver::new(self.client.clone(), self.config.source.clone());
        let resolved = resolver.resolve_tag(&self.config.tag, &self.cancel).await?;
        let tag = resolved.tag;

        if resolved.from_latest {
            match root_manifest.as_mut() {
                Some(manifest) => {
                    manifest.set_str(&self.config.release_tag_key, tag.as_str());
                    manifest.save().await?;
                    info!(tag = %tag, key = %self.config.release_tag_key, "Recorded release tag");
                }
                None => warn!(
                    path = %self.config.root_manifest.display(),
                    "Root manifest not found, release tag not recorded"
                ),
            }
        }

        let targets = self.selected_targets();
        let engine = DownloadEngine::new(self.transport(), self.config.source.clone(), &package_version);
        let options = FetchOptions {
            proxy: self.config.proxy.clone(),
            cancel: self.cancel.clone(),
            progress: Arc::clone(&self.progress),
        };

        info!(
            tag = %tag,
            version = %artifact_version(&package_version, &tag),
            targets = targets.len(),
            transport = engine.transport_name(),
            skip_download = self.config.skip_download,
            "Provisioning binaries"
        );

        let mut sessions = Vec::new();
        let mut restamped = Vec::new();
        for target in &targets {
            if self.config.skip_download {
                engine
                    .restamp(target, &tag)
                    .await
                    .map_err(|source| ProvisionError::Target {
                        target: target.platform_arch,
                        source,
                    })?;
                restamped.push(target.platform_arch);
                continue;
            }

            let session = engine
                .fetch(target, &tag, &options)
                .await
                .map_err(|source| ProvisionError::Target {
                    target: target.platform_arch,
                    source,
                })?;
            sessions.push(session);
        }

        let launcher_stamped = self.stamp_launcher(&targets, &package_version, &tag).await?;

        self.progress.emit(ProgressEvent::Done);

        Ok(ProvisionReport {
            tag,
            from_latest: resolved.from_latest,
            package_version,
            sessions,
            restamped,
            launcher_stamped,
        })
    }

    fn package_version(&self, root_manifest: Option<&PackageManifest>) -> ProvisionResult<String> {
        self.config
            .package_version
            .clone()
            .or_else(|| root_manifest.and_then(|m| m.version()).map(str::to_string))
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                ProvisionError::MissingPackageVersion(self.config.root_manifest.display().to_string())
            })
    }

    fn transport(&self) -> Box<dyn Transport> {
        match self.config.mode {
            TransportKind::Fetch => Box::new(FetchTransport::new(self.client.clone())),
            TransportKind::Wget => Box::new(WgetTransport::new(self.config.wget_program.clone())),
        }
    }

    /// Point the launcher at the freshly provisioned platform packages.
    async fn stamp_launcher(
        &self,
        targets: &[TargetDescriptor],
        package_version: &str,
        tag: &str,
    ) -> ProvisionResult<bool> {
        let Some(mut launcher) = PackageManifest::load_optional(&self.config.launcher_manifest).await? else {
            warn!(
                path = %self.config.launcher_manifest.display(),
                "Launcher manifest not found, skipping version stamp"
            );
            return Ok(false);
        };

        let version = launcher_version(package_version, tag);
        if let Err(e) = semver::Version::parse(&version) {
            warn!(version = %version, error = %e, "Launcher version is not valid semver");
        }
        let names: Vec<String> = targets.iter().map(|t| t.package_name.clone()).collect();

        launcher.set_str("version", version.as_str());
        let pinned = launcher.pin_dependencies(LAUNCHER_DEPENDENCY_TABLE, &names, &version);
        launcher.save().await?;

        info!(version = %version, pinned, "Stamped launcher manifest");
        Ok(true)
    }
}

impl std::fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner")
            .field("config", &self.config)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
