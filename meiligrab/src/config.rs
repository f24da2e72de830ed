//! Provisioning configuration.
//!
//! Values come from three layers, highest precedence first:
//!
//! 1. command-line flags
//! 2. an INI file (`--config`, `./meiligrab.ini`, or the user config dir)
//! 3. [`ProvisionConfig::default()`]
//!
//! The first two are expressed as [`ConfigOverrides`] (every field optional),
//! merged with [`ConfigOverrides::or`] and applied once per run by
//! [`ProvisionConfig::resolve`], yielding an [`EffectiveConfig`].
//!
//! # INI format
//!
//! ```ini
//! [release]
//! tag = latest
//! repository = meilisearch/meilisearch
//!
//! [download]
//! mode = fetch
//! use_proxy = true
//! proxy_url = https://ghfast.top/
//! targets = linux-amd64, macos-apple-silicon
//!
//! [layout]
//! packages_dir = packages
//! launcher_manifest = packages/cli/package.json
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ini::Ini;
use thiserror::Error;
use tracing::debug;

use crate::release::{ReleaseSource, LATEST};
use crate::target::{ArtifactMatrix, MatrixError, MatrixLayout, PlatformArch};

/// Default mirror prefix used when proxying is enabled.
pub const DEFAULT_PROXY_URL: &str = "https://ghfast.top/";

/// Config filename looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "meiligrab.ini";

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config file {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] ini::ParseError),

    #[error("invalid value '{value}' for [{section}] {key}: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    #[error("proxy is enabled but no proxy URL is configured")]
    MissingProxyUrl,

    #[error("invalid artifact matrix: {0}")]
    Matrix(#[from] MatrixError),
}

/// How artifacts are transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    /// In-process HTTP client.
    #[default]
    Fetch,
    /// External `wget` process.
    Wget,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Fetch => "fetch",
            TransportKind::Wget => "wget",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fetch" => Ok(TransportKind::Fetch),
            "wget" => Ok(TransportKind::Wget),
            other => Err(format!("unknown mode '{}' (expected fetch or wget)", other)),
        }
    }
}

/// Default provisioning configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionConfig {
    /// Release selector: a literal tag or `latest`.
    pub tag: String,
    pub mode: TransportKind,
    /// Restamp versions without transferring anything.
    pub skip_download: bool,
    pub use_proxy: bool,
    pub proxy_url: String,
    /// Restrict the run to these targets; `None` means the whole matrix.
    pub targets: Option<Vec<PlatformArch>>,
    /// Repository root; relative layout paths resolve against it.
    pub root: PathBuf,
    /// Matrix layout; `packages_dir` is relative to `root`.
    pub layout: MatrixLayout,
    /// Root package manifest, relative to `root`.
    pub root_manifest: PathBuf,
    /// Launcher package manifest, relative to `root`.
    pub launcher_manifest: PathBuf,
    /// Root manifest key receiving a resolved `latest` tag.
    pub release_tag_key: String,
    pub source: ReleaseSource,
    /// Overrides the root manifest's `version`.
    pub package_version: Option<String>,
    /// Program used by the wget transport.
    pub wget_program: PathBuf,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            tag: LATEST.to_string(),
            mode: TransportKind::Fetch,
            skip_download: false,
            use_proxy: false,
            proxy_url: DEFAULT_PROXY_URL.to_string(),
            targets: None,
            root: PathBuf::from("."),
            layout: MatrixLayout::default(),
            root_manifest: PathBuf::from("package.json"),
            launcher_manifest: PathBuf::from("packages/cli/package.json"),
            release_tag_key: "releaseTag".to_string(),
            source: ReleaseSource::default(),
            package_version: None,
            wget_program: PathBuf::from("wget"),
        }
    }
}

/// Partial configuration from one layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub tag: Option<String>,
    pub mode: Option<TransportKind>,
    pub skip_download: Option<bool>,
    pub use_proxy: Option<bool>,
    pub proxy_url: Option<String>,
    pub targets: Option<Vec<PlatformArch>>,
    pub root: Option<PathBuf>,
    pub packages_dir: Option<PathBuf>,
    pub sidecar_name: Option<String>,
    pub engine: Option<String>,
    pub package_prefix: Option<String>,
    pub root_manifest: Option<PathBuf>,
    pub launcher_manifest: Option<PathBuf>,
    pub release_tag_key: Option<String>,
    pub api_base: Option<String>,
    pub download_base: Option<String>,
    pub repository: Option<String>,
    pub package_version: Option<String>,
    pub wget_program: Option<PathBuf>,
}

impl ConfigOverrides {
    /// Fill unset fields from a lower-precedence layer.
    pub fn or(self, lower: ConfigOverrides) -> ConfigOverrides {
        ConfigOverrides {
            tag: self.tag.or(lower.tag),
            mode: self.mode.or(lower.mode),
            skip_download: self.skip_download.or(lower.skip_download),
            use_proxy: self.use_proxy.or(lower.use_proxy),
            proxy_url: self.proxy_url.or(lower.proxy_url),
            targets: self.targets.or(lower.targets),
            root: self.root.or(lower.root),
            packages_dir: self.packages_dir.or(lower.packages_dir),
            sidecar_name: self.sidecar_name.or(lower.sidecar_name),
            engine: self.engine.or(lower.engine),
            package_prefix: self.package_prefix.or(lower.package_prefix),
            root_manifest: self.root_manifest.or(lower.root_manifest),
            launcher_manifest: self.launcher_manifest.or(lower.launcher_manifest),
            release_tag_key: self.release_tag_key.or(lower.release_tag_key),
            api_base: self.api_base.or(lower.api_base),
            download_base: self.download_base.or(lower.download_base),
            repository: self.repository.or(lower.repository),
            package_version: self.package_version.or(lower.package_version),
            wget_program: self.wget_program.or(lower.wget_program),
        }
    }
}

/// Configuration after all layers are applied, with paths anchored at the root.
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub tag: String,
    pub mode: TransportKind,
    pub skip_download: bool,
    /// Mirror prefix, present only when proxying is enabled.
    pub proxy: Option<String>,
    pub targets: Option<Vec<PlatformArch>>,
    pub root: PathBuf,
    pub matrix: ArtifactMatrix,
    pub root_manifest: PathBuf,
    pub launcher_manifest: PathBuf,
    pub release_tag_key: String,
    pub source: ReleaseSource,
    pub package_version: Option<String>,
    pub wget_program: PathBuf,
}

impl ProvisionConfig {
    /// Apply `overrides` on top of `defaults` and validate the result.
    pub fn resolve(
        defaults: ProvisionConfig,
        overrides: ConfigOverrides,
    ) -> ConfigResult<EffectiveConfig> {
        let root = overrides.root.unwrap_or(defaults.root);
        let use_proxy = overrides.use_proxy.unwrap_or(defaults.use_proxy);
        let proxy_url = overrides.proxy_url.unwrap_or(defaults.proxy_url);

        let proxy = if use_proxy {
            let url = proxy_url.trim();
            if url.is_empty() {
                return Err(ConfigError::MissingProxyUrl);
            }
            Some(url.to_string())
        } else {
            None
        };

        let layout = MatrixLayout {
            engine: overrides.engine.unwrap_or(defaults.layout.engine),
            packages_dir: root.join(overrides.packages_dir.unwrap_or(defaults.layout.packages_dir)),
            sidecar_name: overrides.sidecar_name.unwrap_or(defaults.layout.sidecar_name),
            package_prefix: overrides
                .package_prefix
                .unwrap_or(defaults.layout.package_prefix),
        };
        let matrix = ArtifactMatrix::new(&layout)?;

        let source = ReleaseSource {
            api_base: overrides.api_base.unwrap_or(defaults.source.api_base),
            download_base: overrides
                .download_base
                .unwrap_or(defaults.source.download_base),
            repository: overrides.repository.unwrap_or(defaults.source.repository),
        };

        let effective = EffectiveConfig {
            tag: overrides.tag.unwrap_or(defaults.tag).trim().to_string(),
            mode: overrides.mode.unwrap_or(defaults.mode),
            skip_download: overrides.skip_download.unwrap_or(defaults.skip_download),
            proxy,
            targets: overrides.targets.or(defaults.targets),
            matrix,
            root_manifest: root.join(overrides.root_manifest.unwrap_or(defaults.root_manifest)),
            launcher_manifest: root.join(
                overrides
                    .launcher_manifest
                    .unwrap_or(defaults.launcher_manifest),
            ),
            release_tag_key: overrides
                .release_tag_key
                .unwrap_or(defaults.release_tag_key),
            source,
            package_version: overrides.package_version.or(defaults.package_version),
            wget_program: overrides.wget_program.unwrap_or(defaults.wget_program),
            root,
        };

        debug!(
            tag = %effective.tag,
            mode = %effective.mode,
            proxy = ?effective.proxy,
            root = %effective.root.display(),
            "Configuration resolved"
        );
        Ok(effective)
    }
}

/// INI configuration file reader.
pub struct ConfigFile;

impl ConfigFile {
    /// Pick the config file to use, if any.
    ///
    /// An explicit path is returned as-is (a missing file is reported when it
    /// is loaded); otherwise `./meiligrab.ini`, then the per-user config file,
    /// whichever exists first.
    pub fn discover(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.is_file() {
            return Some(local);
        }
        Self::user_config_path().filter(|p| p.is_file())
    }

    /// `<config dir>/meiligrab/config.ini`.
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("meiligrab").join("config.ini"))
    }

    /// Load overrides from an INI file.
    pub fn load(path: &Path) -> ConfigResult<ConfigOverrides> {
        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Load {
            path: path.to_path_buf(),
            source: e,
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Self::from_ini(&ini)
    }

    /// Parse overrides from INI text.
    pub fn parse(text: &str) -> ConfigResult<ConfigOverrides> {
        let ini = Ini::load_from_str(text)?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> ConfigResult<ConfigOverrides> {
        let get = |section: &str, key: &str| -> Option<String> {
            ini.section(Some(section))
                .and_then(|props| props.get(key))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut overrides = ConfigOverrides {
            tag: get("release", "tag"),
            api_base: get("release", "api_base"),
            download_base: get("release", "download_base"),
            repository: get("release", "repository"),
            package_version: get("release", "package_version"),
            proxy_url: get("download", "proxy_url"),
            wget_program: get("download", "wget").map(PathBuf::from),
            root: get("layout", "root").map(PathBuf::from),
            packages_dir: get("layout", "packages_dir").map(PathBuf::from),
            sidecar_name: get("layout", "sidecar"),
            engine: get("layout", "engine"),
            package_prefix: get("layout", "package_prefix"),
            root_manifest: get("layout", "root_manifest").map(PathBuf::from),
            launcher_manifest: get("layout", "launcher_manifest").map(PathBuf::from),
            release_tag_key: get("layout", "release_tag_key"),
            ..ConfigOverrides::default()
        };

        if let Some(value) = get("download", "mode") {
            overrides.mode = Some(
                value
                    .parse()
                    .map_err(|reason| invalid("download", "mode", &value, reason))?,
            );
        }
        if let Some(value) = get("download", "skip_download") {
            overrides.skip_download = Some(parse_bool("download", "skip_download", &value)?);
        }
        if let Some(value) = get("download", "use_proxy") {
            overrides.use_proxy = Some(parse_bool("download", "use_proxy", &value)?);
        }
        if let Some(value) = get("download", "targets") {
            overrides.targets = Some(parse_targets(&value)?);
        }

        Ok(overrides)
    }
}

fn parse_bool(section: &str, key: &str, value: &str) -> ConfigResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(section, key, value, "expected true or false".to_string())),
    }
}

fn parse_targets(value: &str) -> ConfigResult<Vec<PlatformArch>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().map_err(|reason| invalid("download", "targets", s, reason)))
        .collect()
}

fn invalid(section: &str, key: &str, value: &str, reason: String) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason,
    }
}
