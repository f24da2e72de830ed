//! CLI error type and exit codes.

use std::fmt;
use std::path::PathBuf;

use meiligrab::config::ConfigError;
use meiligrab::logging::LoggingError;
use meiligrab::provision::ProvisionError;

/// Exit status for a run interrupted with Ctrl+C.
pub const EXIT_CANCELLED: i32 = 130;

/// Errors surfaced to the user.
#[derive(Debug)]
pub enum CliError {
    /// Invalid configuration or arguments.
    Config(String),
    /// Logging could not be initialised.
    Logging(LoggingError),
    /// The async runtime could not be started.
    Runtime(std::io::Error),
    /// A provisioning run failed.
    Provision(ProvisionError),
    /// No prebuilt binary exists for this machine.
    UnsupportedHost { os: String, arch: String },
    /// The host binary has not been downloaded yet.
    NotProvisioned(PathBuf),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Provision(e) if e.is_cancelled() => EXIT_CANCELLED,
            CliError::Config(_) => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Logging(e) => write!(f, "Failed to initialise logging: {}", e),
            CliError::Runtime(e) => write!(f, "Failed to start async runtime: {}", e),
            CliError::Provision(e) if e.is_cancelled() => write!(f, "Cancelled"),
            CliError::Provision(e) => write!(f, "{}", e),
            CliError::UnsupportedHost { os, arch } => {
                write!(f, "No prebuilt Meilisearch binary for {}/{}", os, arch)
            }
            CliError::NotProvisioned(path) => write!(
                f,
                "Binary not found at {} (run `meiligrab fetch` first)",
                path.display()
            ),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Logging(e) => Some(e),
            CliError::Runtime(e) => Some(e),
            CliError::Provision(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<ProvisionError> for CliError {
    fn from(e: ProvisionError) -> Self {
        CliError::Provision(e)
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meiligrab::download::DownloadError;
    use meiligrab::PlatformArch;

    #[test]
    fn test_cancelled_exit_code() {
        let err = CliError::Provision(ProvisionError::Target {
            target: PlatformArch::LinuxAmd64,
            source: DownloadError::Cancelled,
        });
        assert_eq!(err.exit_code(), EXIT_CANCELLED);
        assert_eq!(err.to_string(), "Cancelled");
    }

    #[test]
    fn test_other_exit_codes() {
        assert_eq!(CliError::Config("bad".to_string()).exit_code(), 2);
        assert_eq!(
            CliError::NotProvisioned(PathBuf::from("packages/linux-amd64/meilisearch-linux-amd64"))
                .exit_code(),
            1
        );
    }
}
