//! `meiligrab which`: print the binary the launcher would run on this host.

use std::path::{Path, PathBuf};

use super::common::{resolve_config, root_override};
use crate::error::CliError;

/// Run `which`.
pub fn run(root: Option<PathBuf>, config_path: Option<&Path>) -> Result<(), CliError> {
    let config = resolve_config(root_override(root), config_path)?;

    let target = config
        .matrix
        .host_target()
        .ok_or_else(|| CliError::UnsupportedHost {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        })?;

    if !target.local_binary_path.is_file() {
        return Err(CliError::NotProvisioned(target.local_binary_path.clone()));
    }

    println!("{}", target.local_binary_path.display());
    Ok(())
}
