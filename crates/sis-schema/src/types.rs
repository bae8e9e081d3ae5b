//! Package names, version strings and package specifiers.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use crate::SOURCE_VERSION;

/// A package identifier as it appears in the `id` attribute of a catalog
/// `package` element.
///
/// Identifiers are catalog-wide keys and are compared exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageName(String);

impl PackageName {
    /// Create a new package name.
    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }

    /// Return the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PackageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Deref for PackageName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for PackageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl AsRef<std::path::Path> for PackageName {
    fn as_ref(&self) -> &std::path::Path {
        std::path::Path::new(&self.0)
    }
}

impl Borrow<str> for PackageName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for PackageName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for PackageName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl From<&str> for PackageName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PackageName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A version string as written by catalog authors.
///
/// Ordering splits both strings on whitespace and compares the pieces
/// element-wise as strings, so `"1.2"` is younger than `"1.10"`. Catalogs
/// rely on this exact behavior; it is not semantic versioning.
///
/// ```
/// use sis_schema::VersionString;
///
/// assert!(VersionString::from("1.2") > VersionString::from("1.10"));
/// assert!(VersionString::from("2.0 beta") > VersionString::from("2.0"));
/// ```
///
/// Equality and hashing use the same whitespace-split pieces, so `"1.0 "`
/// and `"1.0"` are the same version.
#[derive(Debug, Clone)]
pub struct VersionString(String);

impl VersionString {
    /// Create a new version from the given string (stored as-is).
    pub fn new(v: &str) -> Self {
        Self(v.to_string())
    }

    /// The fixed tag of source versions.
    pub fn source() -> Self {
        Self::new(SOURCE_VERSION)
    }

    /// Return the version string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the `source` tag rather than a release number.
    pub fn is_source(&self) -> bool {
        *self == SOURCE_VERSION
    }

    /// `true` if `self` is strictly younger (later) than `other`.
    pub fn is_younger(&self, other: &Self) -> bool {
        self > other
    }

    fn pieces(&self) -> std::str::SplitWhitespace<'_> {
        self.0.split_whitespace()
    }
}

impl PartialEq for VersionString {
    fn eq(&self, other: &Self) -> bool {
        self.pieces().eq(other.pieces())
    }
}

impl Eq for VersionString {}

impl Hash for VersionString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for piece in self.pieces() {
            piece.hash(state);
        }
    }
}

impl Ord for VersionString {
    fn cmp(&self, other: &Self) -> Ordering {
        self.pieces().cmp(other.pieces())
    }
}

impl PartialOrd for VersionString {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for VersionString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Deref for VersionString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for VersionString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for VersionString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for VersionString {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl PartialEq<str> for VersionString {
    fn eq(&self, other: &str) -> bool {
        self.pieces().eq(other.split_whitespace())
    }
}

impl PartialEq<&str> for VersionString {
    fn eq(&self, other: &&str) -> bool {
        self == *other
    }
}

/// Parsed package argument: `name` or `name:version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    /// Requested package.
    pub name: PackageName,
    /// Requested version, `None` for the latest one.
    pub version: Option<VersionString>,
}

/// Errors raised while parsing a [`PackageSpec`].
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum SpecError {
    /// Nothing before the `:` separator.
    #[error("invalid package specifier '{0}': missing package name")]
    MissingName(String),
    /// Nothing after the `:` separator.
    #[error("invalid package specifier '{0}': missing version after ':'")]
    MissingVersion(String),
}

impl PackageSpec {
    /// Parse a package specifier like `gcc` or `gcc:4.9`.
    ///
    /// # Errors
    ///
    /// Fails when the name or the version around `:` is empty.
    pub fn parse(spec: &str) -> Result<Self, SpecError> {
        match spec.split_once(':') {
            Some((name, _)) if name.is_empty() => Err(SpecError::MissingName(spec.to_string())),
            Some((_, version)) if version.is_empty() => {
                Err(SpecError::MissingVersion(spec.to_string()))
            }
            Some((name, version)) => Ok(Self {
                name: PackageName::new(name),
                version: Some(VersionString::new(version)),
            }),
            None if spec.is_empty() => Err(SpecError::MissingName(spec.to_string())),
            None => Ok(Self {
                name: PackageName::new(spec),
                version: None,
            }),
        }
    }
}

impl std::fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}:{v}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}
