//! Static catalog of standalone proxy builds.
//!
//! Every (operating system, CPU architecture) pair the proxy is published for
//! has exactly one entry naming the release archive and the executable inside
//! it. A host without an entry cannot run the standalone proxy; callers get an
//! error rather than a guessed default.

use std::fmt;

/// Archive container format of a release asset.
///
/// Chosen once from the catalog entry so extraction never re-inspects paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// `.zip` archive.
    Zip,
    /// gzip-compressed tarball (`.tar.gz`).
    TarGz,
}

impl ArchiveKind {
    /// Infer the archive kind from an asset file name.
    pub fn from_file_name(name: &str) -> Option<Self> {
        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else {
            None
        }
    }
}

/// A published proxy build for one host platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformTarget {
    /// Operating system name as reported by `std::env::consts::OS`.
    pub os: &'static str,
    /// CPU architecture as reported by `std::env::consts::ARCH`.
    pub arch: &'static str,
    /// Release asset file name.
    pub file_name: &'static str,
    /// Executable path relative to the extraction directory.
    pub executable: &'static str,
    /// Container format of `file_name`.
    pub archive: ArchiveKind,
    /// Whether extraction is known to drop the executable bit on this platform.
    pub restore_exec_bit: bool,
}

impl fmt::Display for PlatformTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.os, self.arch, self.file_name)
    }
}

const UNIX_EXECUTABLE: &str = "Azure.Sdk.Tools.TestProxy";

/// Every platform a standalone proxy is published for.
pub const PLATFORM_TARGETS: &[PlatformTarget] = &[
    PlatformTarget {
        os: "windows",
        arch: "x86_64",
        file_name: "test-proxy-standalone-win-x64.zip",
        executable: "Azure.Sdk.Tools.TestProxy.exe",
        archive: ArchiveKind::Zip,
        restore_exec_bit: false,
    },
    PlatformTarget {
        os: "linux",
        arch: "x86_64",
        file_name: "test-proxy-standalone-linux-x64.tar.gz",
        executable: UNIX_EXECUTABLE,
        archive: ArchiveKind::TarGz,
        restore_exec_bit: false,
    },
    PlatformTarget {
        os: "linux",
        arch: "aarch64",
        file_name: "test-proxy-standalone-linux-arm64.tar.gz",
        executable: UNIX_EXECUTABLE,
        archive: ArchiveKind::TarGz,
        restore_exec_bit: false,
    },
    PlatformTarget {
        os: "macos",
        arch: "x86_64",
        file_name: "test-proxy-standalone-osx-x64.zip",
        executable: UNIX_EXECUTABLE,
        archive: ArchiveKind::Zip,
        restore_exec_bit: true,
    },
    PlatformTarget {
        os: "macos",
        arch: "aarch64",
        file_name: "test-proxy-standalone-osx-arm64.zip",
        executable: UNIX_EXECUTABLE,
        archive: ArchiveKind::Zip,
        restore_exec_bit: true,
    },
];

/// Lookup table over [`PLATFORM_TARGETS`].
#[derive(Debug, Clone, Copy)]
pub struct PlatformCatalog {
    targets: &'static [PlatformTarget],
}

impl Default for PlatformCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformCatalog {
    /// Catalog of all published builds.
    pub const fn new() -> Self {
        Self {
            targets: PLATFORM_TARGETS,
        }
    }

    /// All entries.
    pub fn targets(&self) -> &'static [PlatformTarget] {
        self.targets
    }

    /// Find the build for an (os, arch) pair.
    ///
    /// Matching is case-insensitive and accepts the common aliases `amd64`
    /// and `arm64` so values from other tools can be passed through.
    pub fn lookup(&self, os: &str, arch: &str) -> Option<&'static PlatformTarget> {
        let os = normalize_os(os);
        let arch = normalize_arch(arch);
        self.targets
            .iter()
            .find(|t| t.os == os && t.arch == arch)
    }

    /// Find the build for the running host.
    pub fn host(&self) -> Option<&'static PlatformTarget> {
        self.lookup(std::env::consts::OS, std::env::consts::ARCH)
    }
}

fn normalize_os(os: &str) -> String {
    match os.to_ascii_lowercase().as_str() {
        "darwin" | "osx" => "macos".to_string(),
        other => other.to_string(),
    }
}

fn normalize_arch(arch: &str) -> String {
    match arch.to_ascii_lowercase().as_str() {
        "amd64" | "x64" => "x86_64".to_string(),
        "arm64" => "aarch64".to_string(),
        other => other.to_string(),
    }
}
