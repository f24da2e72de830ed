//! `meiligrab targets`: list the artifact matrix and local state.

use std::path::{Path, PathBuf};

use console::style;
use indicatif::HumanBytes;
use meiligrab::metadata;

use super::common::{resolve_config, root_override, runtime};
use crate::error::CliError;

/// Run `targets`.
pub fn run(root: Option<PathBuf>, config_path: Option<&Path>) -> Result<(), CliError> {
    let config = resolve_config(root_override(root), config_path)?;
    let host = config.matrix.host_target().map(|t| t.platform_arch);
    let rt = runtime()?;

    println!("{}", style("Targets").bold());
    for target in config.matrix.targets_for(None) {
        let sidecar = rt.block_on(metadata::read(&target.local_metadata_path));
        let size = std::fs::metadata(&target.local_binary_path)
            .map(|m| HumanBytes(m.len()).to_string())
            .unwrap_or_else(|_| "-".to_string());
        let version = if sidecar.version.is_empty() {
            "-".to_string()
        } else {
            sidecar.version
        };
        let marker = if Some(target.platform_arch) == host {
            style("*").green().to_string()
        } else {
            " ".to_string()
        };

        println!(
            "{} {:<22} {:<34} {:>10}  {}",
            marker,
            target.platform_arch.to_string(),
            target.remote_artifact_name,
            size,
            style(version).dim()
        );
    }
    Ok(())
}
