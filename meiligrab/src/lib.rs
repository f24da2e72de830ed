//! meiligrab - provision prebuilt Meilisearch binaries.
//!
//! Downloads the per-platform release artifacts of a Meilisearch release into
//! a package layout, one directory per target, each with a JSON sidecar
//! recording the provisioned version and the server's validator. Re-runs are
//! cheap: unchanged artifacts are confirmed with a conditional request and
//! interrupted downloads resume where they stopped.
//!
//! # Modules
//!
//! - [`target`] - the artifact matrix
//! - [`release`] - release tag resolution
//! - [`metadata`] - sidecar read/write
//! - [`manifest`] - root and launcher package manifests
//! - [`download`] - conditional, resumable transfers
//! - [`provision`] - the full run
//! - [`config`] - layered configuration
//! - [`logging`] - subscriber setup for binaries

pub mod config;
pub mod download;
pub mod logging;
pub mod manifest;
pub mod metadata;
pub mod provision;
pub mod release;
pub mod target;

pub use config::{ConfigOverrides, EffectiveConfig, ProvisionConfig, TransportKind};
pub use download::{DownloadEngine, DownloadError, DownloadSession, Outcome, ProgressEvent, ProgressSink};
pub use provision::{ProvisionError, ProvisionReport, Provisioner};
pub use target::{ArtifactMatrix, PlatformArch, TargetDescriptor};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
