//! Artifact matrix: which prebuilt binaries exist and where they live locally.
//!
//! Every supported platform/architecture pair maps to exactly one release
//! asset on the release host and one package directory on disk:
//!
//! ```text
//! packages/
//! ├── linux-amd64/
//! │   ├── meilisearch-linux-amd64        (binary)
//! │   └── package.json                   (sidecar: version + ETag)
//! ├── macos-apple-silicon/
//! │   ├── meilisearch-macos-apple-silicon
//! │   └── package.json
//! └── ...
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Operating system and CPU combination a binary is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformArch {
    LinuxAmd64,
    LinuxAarch64,
    MacosAmd64,
    MacosAppleSilicon,
    WindowsAmd64,
}

impl PlatformArch {
    /// All supported combinations, in matrix order.
    pub const ALL: [PlatformArch; 5] = [
        PlatformArch::LinuxAmd64,
        PlatformArch::LinuxAarch64,
        PlatformArch::MacosAmd64,
        PlatformArch::MacosAppleSilicon,
        PlatformArch::WindowsAmd64,
    ];

    /// Directory and artifact slug.
    ///
    /// # Example
    ///
    /// ```
    /// use meiligrab::target::PlatformArch;
    ///
    /// assert_eq!(PlatformArch::LinuxAmd64.slug(), "linux-amd64");
    /// assert_eq!(PlatformArch::MacosAppleSilicon.slug(), "macos-apple-silicon");
    /// ```
    pub fn slug(&self) -> &'static str {
        match self {
            PlatformArch::LinuxAmd64 => "linux-amd64",
            PlatformArch::LinuxAarch64 => "linux-aarch64",
            PlatformArch::MacosAmd64 => "macos-amd64",
            PlatformArch::MacosAppleSilicon => "macos-apple-silicon",
            PlatformArch::WindowsAmd64 => "windows-amd64",
        }
    }

    /// Executable suffix required on this platform.
    pub fn executable_suffix(&self) -> &'static str {
        match self {
            PlatformArch::WindowsAmd64 => ".exe",
            _ => "",
        }
    }

    /// Map an OS/CPU pair as reported by `std::env::consts` to a target.
    pub fn from_os_arch(os: &str, arch: &str) -> Option<Self> {
        match (os, arch) {
            ("linux", "x86_64") => Some(PlatformArch::LinuxAmd64),
            ("linux", "aarch64") => Some(PlatformArch::LinuxAarch64),
            ("macos", "x86_64") => Some(PlatformArch::MacosAmd64),
            ("macos", "aarch64") => Some(PlatformArch::MacosAppleSilicon),
            ("windows", "x86_64") => Some(PlatformArch::WindowsAmd64),
            _ => None,
        }
    }

    /// The target matching the machine this process runs on, if supported.
    pub fn host() -> Option<Self> {
        Self::from_os_arch(std::env::consts::OS, std::env::consts::ARCH)
    }
}

impl fmt::Display for PlatformArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for PlatformArch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        PlatformArch::ALL
            .into_iter()
            .find(|p| p.slug() == needle)
            .ok_or_else(|| {
                let known: Vec<_> = PlatformArch::ALL.iter().map(|p| p.slug()).collect();
                format!("unknown target '{}' (expected one of: {})", s, known.join(", "))
            })
    }
}

/// Immutable description of one artifact to provision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    pub platform_arch: PlatformArch,
    /// Exact asset filename on the release host.
    pub remote_artifact_name: String,
    pub local_binary_path: PathBuf,
    /// Sidecar JSON next to the binary.
    pub local_metadata_path: PathBuf,
    /// Package name of the per-platform package, as referenced by the launcher.
    pub package_name: String,
}

impl TargetDescriptor {
    /// Directory holding the binary and its sidecar.
    pub fn directory(&self) -> &Path {
        self.local_binary_path.parent().unwrap_or_else(|| Path::new("."))
    }
}

/// Layout inputs for building the matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixLayout {
    /// Engine name used as the artifact prefix (`meilisearch`).
    pub engine: String,
    /// Directory containing one sub-directory per target.
    pub packages_dir: PathBuf,
    /// Sidecar filename inside each target directory.
    pub sidecar_name: String,
    /// Prefix prepended to the slug to form the per-platform package name.
    pub package_prefix: String,
}

impl Default for MatrixLayout {
    fn default() -> Self {
        Self {
            engine: "meilisearch".to_string(),
            packages_dir: PathBuf::from("packages"),
            sidecar_name: "package.json".to_string(),
            package_prefix: "meilisearch-".to_string(),
        }
    }
}

/// Errors raised while validating the matrix at startup.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MatrixError {
    #[error("engine name must not be empty")]
    EmptyEngine,

    #[error("sidecar filename must not be empty")]
    EmptySidecar,

    #[error("sidecar filename '{0}' collides with an artifact name")]
    SidecarCollision(String),

    #[error("duplicate target '{0}' in artifact matrix")]
    DuplicateTarget(PlatformArch),
}

/// Ordered, validated table of target descriptors.
#[derive(Debug, Clone)]
pub struct ArtifactMatrix {
    targets: Vec<TargetDescriptor>,
}

impl ArtifactMatrix {
    /// Build the full matrix for a layout.
    pub fn new(layout: &MatrixLayout) -> Result<Self, MatrixError> {
        Self::from_table(layout, &PlatformArch::ALL)
    }

    /// Build a matrix from an explicit table of targets.
    pub fn from_table(layout: &MatrixLayout, table: &[PlatformArch]) -> Result<Self, MatrixError> {
        if layout.engine.trim().is_empty() {
            return Err(MatrixError::EmptyEngine);
        }
        if layout.sidecar_name.trim().is_empty() {
            return Err(MatrixError::EmptySidecar);
        }

        let mut seen = HashSet::new();
        let mut targets = Vec::with_capacity(table.len());
        for &platform_arch in table {
            if !seen.insert(platform_arch) {
                return Err(MatrixError::DuplicateTarget(platform_arch));
            }
            let descriptor = describe(layout, platform_arch);
            if descriptor.remote_artifact_name == layout.sidecar_name {
                return Err(MatrixError::SidecarCollision(layout.sidecar_name.clone()));
            }
            targets.push(descriptor);
        }

        Ok(Self { targets })
    }

    /// Targets in matrix order, optionally restricted to a selection.
    ///
    /// The selection never reorders: targets come back in matrix order, and
    /// combinations not present in the matrix are simply absent.
    pub fn targets_for(&self, selection: Option<&[PlatformArch]>) -> Vec<TargetDescriptor> {
        match selection {
            None => self.targets.clone(),
            Some(wanted) => self
                .targets
                .iter()
                .filter(|t| wanted.contains(&t.platform_arch))
                .cloned()
                .collect(),
        }
    }

    /// Look up a single target.
    pub fn get(&self, platform_arch: PlatformArch) -> Option<&TargetDescriptor> {
        self.targets.iter().find(|t| t.platform_arch == platform_arch)
    }

    /// Descriptor the launcher would spawn on this machine.
    pub fn host_target(&self) -> Option<&TargetDescriptor> {
        PlatformArch::host().and_then(|p| self.get(p))
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

fn describe(layout: &MatrixLayout, platform_arch: PlatformArch) -> TargetDescriptor {
    let slug = platform_arch.slug();
    let remote_artifact_name = format!(
        "{}-{}{}",
        layout.engine,
        slug,
        platform_arch.executable_suffix()
    );
    let dir = layout.packages_dir.join(slug);

    TargetDescriptor {
        platform_arch,
        local_binary_path: dir.join(&remote_artifact_name),
        local_metadata_path: dir.join(&layout.sidecar_name),
        package_name: format!("{}{}", layout.package_prefix, slug),
        remote_artifact_name,
    }
}
