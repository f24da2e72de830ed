//! `meiligrab fetch`: provision binaries for a release.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use console::style;
use indicatif::HumanBytes;
use meiligrab::config::ConfigOverrides;
use meiligrab::download::{ChannelProgress, LogProgress, ProgressSink};
use meiligrab::provision::ProvisionResult;
use meiligrab::{Outcome, PlatformArch, ProvisionReport, Provisioner};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::common::{resolve_config, runtime, ModeArg};
use crate::error::CliError;
use crate::ui::spawn_renderer;

/// Arguments for `fetch`.
#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Release tag to provision, or "latest"
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Show live progress bars instead of log lines
    #[arg(short, long)]
    pub interactive: bool,

    /// Only restamp versions; do not download anything
    #[arg(long)]
    pub skip_download: bool,

    /// Download through a mirror prefix (--use-proxy=false to disable)
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub use_proxy: Option<bool>,

    /// Mirror prefix prepended to asset URLs
    #[arg(long)]
    pub proxy_url: Option<String>,

    /// Transfer mode
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Limit the run to these targets (repeatable), e.g. linux-amd64
    #[arg(long = "target", value_name = "TARGET")]
    pub targets: Vec<PlatformArch>,

    /// Repository root containing package.json and packages/
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Package version to stamp, instead of the root manifest's
    #[arg(long)]
    pub package_version: Option<String>,
}

impl FetchArgs {
    /// Overrides from the flags that were actually given.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            tag: self.tag.clone(),
            mode: self.mode.map(Into::into),
            skip_download: self.skip_download.then_some(true),
            use_proxy: self.use_proxy,
            proxy_url: self.proxy_url.clone(),
            targets: (!self.targets.is_empty()).then(|| self.targets.clone()),
            root: self.root.clone(),
            package_version: self.package_version.clone(),
            ..ConfigOverrides::default()
        }
    }
}

/// Run `fetch`.
pub fn run(args: FetchArgs, config_path: Option<&Path>) -> Result<(), CliError> {
    let config = resolve_config(args.overrides(), config_path)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("Interrupted, stopping after the current chunk...");
        on_signal.cancel();
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    let rt = runtime()?;
    let result: ProvisionResult<ProvisionReport> = rt.block_on(async {
        let provisioner = Provisioner::new(config)?.with_cancellation(cancel);

        if args.interactive {
            let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
            let renderer = spawn_renderer(rx);
            let sink: Arc<dyn ProgressSink> = Arc::new(ChannelProgress::new(tx));
            let result = provisioner.with_progress(sink).run().await;
            // The provisioner (and its sender) is gone; the renderer drains and exits.
            if let Err(e) = renderer.await {
                warn!(error = %e, "Progress renderer stopped unexpectedly");
            }
            result
        } else {
            provisioner
                .with_progress(Arc::new(LogProgress::default()))
                .run()
                .await
        }
    });
    let report = result?;

    print_summary(&report);
    Ok(())
}

fn print_summary(report: &ProvisionReport) {
    println!();
    println!(
        "{} Meilisearch {} (version {}-{})",
        style("Provisioned").green().bold(),
        style(&report.tag).cyan(),
        report.package_version,
        report.tag
    );

    for session in &report.sessions {
        let detail = match session.outcome {
            Outcome::Fresh | Outcome::Resumed => {
                format!("{} written", HumanBytes(session.bytes_written))
            }
            Outcome::NotModified | Outcome::AlreadyComplete => {
                format!("{} on disk", HumanBytes(session.existing_length))
            }
        };
        println!(
            "  {:<22} {:<18} {}",
            session.platform_arch.to_string(),
            style(session.outcome.to_string()).yellow(),
            style(detail).dim()
        );
    }

    for target in &report.restamped {
        println!(
            "  {:<22} {}",
            target.to_string(),
            style("version restamped").yellow()
        );
    }

    if !report.launcher_stamped {
        println!("  {}", style("launcher manifest not found, not stamped").dim());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> FetchArgs {
        FetchArgs {
            tag: None,
            interactive: false,
            skip_download: false,
            use_proxy: None,
            proxy_url: None,
            mode: None,
            targets: Vec::new(),
            root: None,
            package_version: None,
        }
    }

    #[test]
    fn test_unset_flags_leave_overrides_empty() {
        assert_eq!(args().overrides(), ConfigOverrides::default());
    }

    #[test]
    fn test_flags_become_overrides() {
        let overrides = FetchArgs {
            tag: Some("v1.12.1".to_string()),
            skip_download: true,
            use_proxy: Some(false),
            mode: Some(ModeArg::Wget),
            targets: vec![PlatformArch::MacosAppleSilicon],
            ..args()
        }
        .overrides();

        assert_eq!(overrides.tag.as_deref(), Some("v1.12.1"));
        assert_eq!(overrides.skip_download, Some(true));
        assert_eq!(overrides.use_proxy, Some(false));
        assert_eq!(overrides.mode, Some(meiligrab::TransportKind::Wget));
        assert_eq!(overrides.targets, Some(vec![PlatformArch::MacosAppleSilicon]));
    }
}
