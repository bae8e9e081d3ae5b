//! Shared types and document format for the SIS installer.
//!
//! Everything here is pure data: names, version strings, host
//! configurations and the XML element tree the catalog documents are
//! read into. Side effects live in `sis-core`.

pub mod host;
pub mod types;
pub mod xml;

// Re-exports
pub use host::*;
pub use types::*;
pub use xml::{Element, XmlError};

/// Root tag of catalog documents (remote index, host index, installed state).
pub const SIS_EXTEND_TAG: &str = "sis-extend";

/// Root tag of the install script shipped inside binary packages.
pub const SIS_INSTALL_TAG: &str = "sis-install";

/// Version tag carried by every source version.
pub const SOURCE_VERSION: &str = "source";

/// Version recorded for installed packages that never declared one.
pub const NULL_VERSION: &str = "0.0";

/// Version of the installer itself, compared against catalog `version` elements.
pub const SIS_VERSION: &str = "1.2";

/// Name of the install script inside an unpacked binary package.
pub const INSTALL_SCRIPT: &str = "install.xml";
