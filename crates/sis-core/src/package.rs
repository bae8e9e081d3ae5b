//! Package and version data model
//!
//! Packages live in the [`Catalog`](crate::catalog::Catalog) arena and are
//! referred to by [`PackageId`]. A [`Version`] records the id of its owning
//! package when it is attached and never changes it afterwards.

use std::cell::OnceCell;

use sis_schema::{PackageName, VersionString};

use crate::action::Action;
use crate::builder::Builder;
use crate::downloader::Downloader;
use crate::probe::ProbeId;

/// Index of a package in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageId(pub(crate) usize);

/// A version of a package: the package id and the position in its version list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VersionId {
    /// Owning package.
    pub package: PackageId,
    /// Position in [`Package::versions`].
    pub index: usize,
}

/// How a version is obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionKind {
    /// A prebuilt archive holding an install script.
    Binary {
        /// Absolute URL or path of the archive.
        file: String,
        /// Declared size in kilobytes.
        size: Option<u64>,
        /// Declared checksum, verified when it is a SHA-256 hex digest.
        checksum: Option<String>,
    },
    /// Sources fetched and built on the host.
    Source {
        /// Fetch protocol; absent for packages only inspected.
        downloader: Option<Downloader>,
        /// Build protocol; absent means nothing is built or recorded.
        builder: Option<Builder>,
        /// Probes that must succeed before building.
        probes: Vec<ProbeId>,
    },
}

/// One installable form of a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    package: PackageId,
    number: VersionString,
    kind: VersionKind,
}

impl Version {
    /// Package this version belongs to.
    pub fn package(&self) -> PackageId {
        self.package
    }

    /// Version string (`source` for source versions).
    pub fn number(&self) -> &VersionString {
        &self.number
    }

    /// How the version is obtained.
    pub fn kind(&self) -> &VersionKind {
        &self.kind
    }

    /// Whether the version is built from sources.
    pub fn is_source(&self) -> bool {
        matches!(self.kind, VersionKind::Source { .. })
    }

    /// Probes to test before installing this version.
    pub fn probes(&self) -> &[ProbeId] {
        match &self.kind {
            VersionKind::Source { probes, .. } => probes,
            VersionKind::Binary { .. } => &[],
        }
    }
}

/// A named unit of the catalog.
#[derive(Debug, Clone)]
pub struct Package {
    id: PackageId,
    /// Catalog-wide identifier.
    pub name: PackageName,
    /// Build-time only: built but never installed into the target root.
    pub tool: bool,
    /// Human-readable description.
    pub desc: Option<String>,
    /// Copyright notice.
    pub copyright: Option<String>,
    /// License name.
    pub license: Option<String>,
    /// License URL (`ref` attribute of the `license` element).
    pub license_url: Option<String>,
    /// Category shown by `--info`.
    pub category: Option<String>,
    /// Project web page.
    pub web: Option<String>,
    /// Maintainer contact.
    pub contact: Option<String>,
    /// Hard requirements, by name, as read from the catalog.
    pub req_names: Vec<PackageName>,
    /// Soft requirements, by name, as read from the catalog.
    pub use_names: Vec<PackageName>,
    pub(crate) reqs: Vec<PackageId>,
    pub(crate) uses: Vec<PackageId>,
    versions: Vec<Version>,
    /// Whether the package is installed in the target root.
    pub installed: bool,
    /// Installed version; always set when `installed` is.
    pub installed_version: Option<VersionString>,
    /// Actions undoing the installation.
    pub uninstall: Vec<Action>,
    pub(crate) rank: OnceCell<u32>,
}

impl Package {
    pub(crate) fn new(id: PackageId, name: PackageName) -> Self {
        Self {
            id,
            name,
            tool: false,
            desc: None,
            copyright: None,
            license: None,
            license_url: None,
            category: None,
            web: None,
            contact: None,
            req_names: Vec::new(),
            use_names: Vec::new(),
            reqs: Vec::new(),
            uses: Vec::new(),
            versions: Vec::new(),
            installed: false,
            installed_version: None,
            uninstall: Vec::new(),
            rank: OnceCell::new(),
        }
    }

    /// Catalog id of the package.
    pub fn id(&self) -> PackageId {
        self.id
    }

    /// Resolved requirements.
    pub fn reqs(&self) -> &[PackageId] {
        &self.reqs
    }

    /// Resolved soft requirements.
    pub fn uses(&self) -> &[PackageId] {
        &self.uses
    }

    /// Known versions, in order of appearance.
    pub fn versions(&self) -> &[Version] {
        &self.versions
    }

    /// Version at `index` in [`Package::versions`].
    pub fn version(&self, index: usize) -> Option<&Version> {
        self.versions.get(index)
    }

    /// Installation rank, once computed by the resolver.
    pub fn rank(&self) -> Option<u32> {
        self.rank.get().copied()
    }

    /// Attach a version, binding it to this package.
    ///
    /// A version with the same number is kept instead of being duplicated.
    pub(crate) fn add_version(&mut self, number: VersionString, kind: VersionKind) -> VersionId {
        if let Some(id) = self.find_version(&number) {
            return id;
        }
        self.versions.push(Version {
            package: self.id,
            number,
            kind,
        });
        self.version_id(self.versions.len() - 1)
    }

    fn version_id(&self, index: usize) -> VersionId {
        VersionId {
            package: self.id,
            index,
        }
    }

    /// Version with the given number.
    pub fn find_version(&self, number: &str) -> Option<VersionId> {
        self.versions
            .iter()
            .position(|v| v.number == *number)
            .map(|i| self.version_id(i))
    }

    /// The source version, if any.
    pub fn source(&self) -> Option<VersionId> {
        self.versions
            .iter()
            .position(Version::is_source)
            .map(|i| self.version_id(i))
    }

    /// Youngest binary version, else the source version.
    pub fn latest(&self) -> Option<VersionId> {
        self.versions
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_source())
            .fold(None::<(usize, &Version)>, |best, (i, v)| match best {
                Some((_, b)) if !v.number.is_younger(&b.number) => best,
                _ => Some((i, v)),
            })
            .map(|(i, _)| self.version_id(i))
            .or_else(|| self.source())
    }

    /// Record a successful installation.
    pub fn mark_installed(&mut self, version: VersionString, uninstall: Vec<Action>) {
        self.installed = true;
        self.installed_version = Some(version);
        self.uninstall = uninstall;
    }

    /// Record a removal.
    pub fn mark_removed(&mut self) {
        self.installed = false;
        self.installed_version = None;
        self.uninstall.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binary(file: &str) -> VersionKind {
        VersionKind::Binary {
            file: file.to_string(),
            size: None,
            checksum: None,
        }
    }

    fn source() -> VersionKind {
        VersionKind::Source {
            downloader: None,
            builder: None,
            probes: Vec::new(),
        }
    }

    #[test]
    fn test_versions_bind_to_package() {
        let mut pack = Package::new(PackageId(3), PackageName::new("gel"));
        let v = pack.add_version(VersionString::new("1.0"), binary("gel-1.0.zip"));
        assert_eq!(v.package, PackageId(3));
        assert_eq!(pack.versions()[v.index].package(), PackageId(3));

        // same number is not duplicated
        let again = pack.add_version(VersionString::new("1.0"), binary("other.zip"));
        assert_eq!(again, v);
        assert_eq!(pack.versions().len(), 1);
    }

    #[test]
    fn test_latest_prefers_youngest_binary() {
        let mut pack = Package::new(PackageId(0), PackageName::new("gel"));
        let src = pack.add_version(VersionString::source(), source());
        assert_eq!(pack.latest(), Some(src));

        pack.add_version(VersionString::new("1.10"), binary("a"));
        let young = pack.add_version(VersionString::new("1.2"), binary("b"));
        pack.add_version(VersionString::new("1.1"), binary("c"));
        assert_eq!(pack.latest(), Some(young));
        assert_eq!(pack.source(), Some(src));
        assert_eq!(pack.find_version("1.1").map(|v| v.index), Some(3));
    }

    #[test]
    fn test_install_state() {
        let mut pack = Package::new(PackageId(0), PackageName::new("gel"));
        pack.mark_installed(VersionString::new("1.0"), vec![Action::remove("bin/gel")]);
        assert!(pack.installed);
        assert_eq!(pack.installed_version.as_deref(), Some("1.0"));
        pack.mark_removed();
        assert!(!pack.installed);
        assert!(pack.uninstall.is_empty());
    }
}
