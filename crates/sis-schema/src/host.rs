//! Host configurations.

/// Host configuration an installation targets.
///
/// Binary catalogs are published per host configuration under
/// `<base>/<host>/index.xml`, and the host decides which suffix a
/// `dynlib` install action appends.
///
/// # Example
///
/// ```
/// use sis_schema::HostType;
///
/// let host: HostType = "linux-x86_64".parse().unwrap();
/// assert_eq!(host.dynlib_suffix(), ".so");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostType {
    /// 32-bit Linux on x86.
    LinuxX86,
    /// 64-bit Linux on x86.
    LinuxX86_64,
    /// 32-bit Windows.
    Win,
    /// 64-bit Windows.
    Win64,
    /// macOS on Intel.
    DarwinX86_64,
    /// macOS on Apple Silicon.
    DarwinArm64,
}

impl HostType {
    /// Detect the configuration of the running host.
    ///
    /// Returns `None` for hosts with no published binaries.
    pub fn current() -> Option<Self> {
        Self::from_parts(
            std::env::consts::OS,
            std::env::consts::ARCH,
            usize::BITS,
        )
    }

    /// Map an (os, machine, pointer width) triple to a host configuration.
    pub fn from_parts(os: &str, arch: &str, bits: u32) -> Option<Self> {
        match (os, arch, bits) {
            ("linux", "x86" | "x86_64", 32) => Some(Self::LinuxX86),
            ("linux", "x86" | "x86_64", 64) => Some(Self::LinuxX86_64),
            ("windows", _, 32) => Some(Self::Win),
            ("windows", _, 64) => Some(Self::Win64),
            ("macos", "x86_64", 64) => Some(Self::DarwinX86_64),
            ("macos", "aarch64", 64) => Some(Self::DarwinArm64),
            _ => None,
        }
    }

    /// Configuration string used in catalog paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LinuxX86 => "linux-x86",
            Self::LinuxX86_64 => "linux-x86_64",
            Self::Win => "win",
            Self::Win64 => "win64",
            Self::DarwinX86_64 => "darwin-x86_64",
            Self::DarwinArm64 => "darwin-arm64",
        }
    }

    /// Suffix of dynamic libraries on this host.
    pub fn dynlib_suffix(&self) -> &'static str {
        match self {
            Self::LinuxX86 | Self::LinuxX86_64 => ".so",
            Self::Win | Self::Win64 => ".dll",
            Self::DarwinX86_64 | Self::DarwinArm64 => ".dylib",
        }
    }
}

impl std::fmt::Display for HostType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for HostType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linux-x86" => Ok(Self::LinuxX86),
            "linux-x86_64" => Ok(Self::LinuxX86_64),
            "win" => Ok(Self::Win),
            "win64" => Ok(Self::Win64),
            "darwin-x86_64" => Ok(Self::DarwinX86_64),
            "darwin-arm64" => Ok(Self::DarwinArm64),
            _ => Err(format!("Unknown host type: {s}")),
        }
    }
}
