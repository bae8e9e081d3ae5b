//! Domain-specific errors for catalog, build and install operations

use std::path::PathBuf;

use sis_schema::{PackageName, VersionString, XmlError};
use thiserror::Error;

/// Pipeline step reported by [`InstallError::StepFailed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Fetching sources or a binary archive.
    Download,
    /// Running the build backend.
    Build,
    /// Running the install step or the binary install script.
    Install,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Step::Download => "Download",
            Step::Build => "Build",
            Step::Install => "Installation",
        })
    }
}

/// Every failure of the engine.
#[derive(Error, Debug)]
pub enum InstallError {
    /// A catalog document could not be read or parsed.
    #[error("cannot load catalog {url}: {message}")]
    Catalog {
        /// Document location.
        url: String,
        /// What went wrong.
        message: String,
    },

    /// No package has this name.
    #[error("unknown package: {0}")]
    UnknownPackage(PackageName),

    /// A requirement names a package absent from every document.
    #[error("don't know how to get {missing} required by {by}")]
    UnresolvedReference {
        /// Required package.
        missing: PackageName,
        /// Package holding the requirement.
        by: PackageName,
    },

    /// `name:version` names a version the package does not have.
    #[error("unknown version {version} for {package}")]
    UnknownVersion {
        /// Package named.
        package: PackageName,
        /// Version asked for.
        version: VersionString,
    },

    /// The package has neither a binary nor a source version.
    #[error("no installable version for {0}")]
    NoVersion(PackageName),

    /// Packages requiring each other.
    #[error("dependency cycle detected between: {}", .0.join(", "))]
    Cycle(Vec<String>),

    /// Names of the probes that failed.
    #[error("{} dependency(ies) failed: {}: aborting", .0.len(), .0.join(", "))]
    ProbesFailed(Vec<String>),

    /// A download, build or install command failed.
    #[error("{step} failed for {package}: see errors in {}", log.display())]
    StepFailed {
        /// Failing step.
        step: Step,
        /// Package being installed.
        package: PackageName,
        /// Build log holding the details.
        log: PathBuf,
    },

    /// The install script of a binary archive is malformed.
    #[error("error in package {package}: {message}")]
    BadScript {
        /// Package whose archive holds the script.
        package: PackageName,
        /// Parse error.
        message: String,
    },

    /// A downloaded archive does not match its catalog checksum.
    #[error("checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Archive name.
        file: String,
        /// SHA-256 given by the catalog.
        expected: String,
        /// SHA-256 of the downloaded file.
        actual: String,
    },

    /// The archive extension is not supported.
    #[error("don't know how to unpack {0}")]
    UnknownArchive(String),

    /// Extraction failed.
    #[error("cannot unpack {file}: {message}")]
    Unpack {
        /// Archive name.
        file: String,
        /// What went wrong.
        message: String,
    },

    /// The installed-state document could not be written.
    #[error("cannot write install DB {}: {message}", path.display())]
    Persist {
        /// Document path.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// Uninstall of a package that is not installed.
    #[error("package {0} is not installed")]
    NotInstalled(PackageName),

    /// The user declined a confirmation.
    #[error("{0}")]
    Aborted(String),

    /// Invalid option or argument.
    #[error("{0}")]
    Config(String),

    /// No host configuration for the running platform.
    #[error("unsupported host type: {0}")]
    UnsupportedHost(String),

    /// File system or process failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Network failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Malformed XML outside of catalog loading.
    #[error(transparent)]
    Xml(#[from] XmlError),
}

impl InstallError {
    /// Build a catalog error for the given document location.
    pub fn catalog(url: impl std::fmt::Display, msg: impl std::fmt::Display) -> Self {
        Self::Catalog {
            url: url.to_string(),
            message: msg.to_string(),
        }
    }
}

/// Result alias used across the crate.
pub type Result<T, E = InstallError> = std::result::Result<T, E>;
