//! Common types and utilities shared across CLI commands.

use std::path::{Path, PathBuf};

use clap::ValueEnum;
use meiligrab::config::{ConfigFile, ConfigOverrides, EffectiveConfig, ProvisionConfig, TransportKind};
use tracing::debug;

use crate::error::CliError;

/// Transfer mode selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum ModeArg {
    /// In-process HTTP download (resumable, conditional)
    Fetch,
    /// Delegate to an external `wget --continue`
    Wget,
}

impl From<ModeArg> for TransportKind {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Fetch => TransportKind::Fetch,
            ModeArg::Wget => TransportKind::Wget,
        }
    }
}

/// Log level selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Filter directive for this level, keeping HTTP internals quiet.
    pub fn directive(&self) -> String {
        let level = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        format!("{level},hyper=warn,reqwest=warn")
    }
}

/// Load overrides from the config file, if one is found.
pub fn load_file_overrides(explicit: Option<&Path>) -> Result<ConfigOverrides, CliError> {
    match ConfigFile::discover(explicit) {
        Some(path) => {
            debug!(path = %path.display(), "Using config file");
            Ok(ConfigFile::load(&path)?)
        }
        None => Ok(ConfigOverrides::default()),
    }
}

/// Resolve settings: CLI takes precedence, then config file, then defaults.
pub fn resolve_config(
    cli: ConfigOverrides,
    config_path: Option<&Path>,
) -> Result<EffectiveConfig, CliError> {
    let file = load_file_overrides(config_path)?;
    Ok(ProvisionConfig::resolve(ProvisionConfig::default(), cli.or(file))?)
}

/// Overrides carrying only a repository root.
pub fn root_override(root: Option<PathBuf>) -> ConfigOverrides {
    ConfigOverrides {
        root,
        ..ConfigOverrides::default()
    }
}

/// Build the multi-threaded runtime used by async commands.
pub fn runtime() -> Result<tokio::runtime::Runtime, CliError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_conversion() {
        assert_eq!(TransportKind::from(ModeArg::Wget), TransportKind::Wget);
        assert_eq!(TransportKind::from(ModeArg::Fetch), TransportKind::Fetch);
    }

    #[test]
    fn test_log_directive() {
        assert_eq!(LogLevel::Debug.directive(), "debug,hyper=warn,reqwest=warn");
    }

    #[test]
    fn test_explicit_config_file_is_used() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("custom.ini");
        std::fs::write(&path, "[release]\ntag = v1.11.0\n").unwrap();

        let cli = root_override(Some(dir.path().to_path_buf()));
        let config = resolve_config(cli, Some(&path)).unwrap();
        assert_eq!(config.tag, "v1.11.0");
        assert_eq!(config.root, dir.path());
    }

    #[test]
    fn test_missing_explicit_config_file_fails() {
        let err = resolve_config(ConfigOverrides::default(), Some(Path::new("/nonexistent.ini")))
            .unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }
}
