//! Package catalog.
//!
//! The catalog merges any number of `sis-extend` documents into one arena
//! of packages keyed by id. A document is fully parsed and validated
//! before any of it is merged, so a malformed document never leaves the
//! catalog half-updated.

use std::collections::{HashMap, HashSet};

use sis_schema::{
    Element, HostType, NULL_VERSION, PackageName, PackageSpec, SIS_EXTEND_TAG, SIS_VERSION,
    VersionString,
};
use tracing::debug;

use crate::action::Action;
use crate::builder::Builder;
use crate::downloader::Downloader;
use crate::error::{InstallError, Result};
use crate::fetch;
use crate::package::{Package, PackageId, Version, VersionId, VersionKind};
use crate::probe::{ProbeRegistry, ProbeSpec};

/// Document-level information found while loading a catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentInfo {
    /// Text of the `message` element.
    pub message: Option<String>,
    /// Installer version advertised by the `version` element.
    pub installer_version: Option<VersionString>,
}

impl DocumentInfo {
    /// Whether the document advertises an installer younger than this one.
    pub fn update_available(&self) -> bool {
        self.installer_version
            .as_ref()
            .is_some_and(|v| v.is_younger(&VersionString::new(SIS_VERSION)))
    }
}

/// Every known package, addressed by [`PackageId`].
#[derive(Debug, Default)]
pub struct Catalog {
    packages: Vec<Package>,
    by_name: HashMap<PackageName, PackageId>,
}

impl Catalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of packages.
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Whether no package is known.
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Packages in order of first appearance.
    pub fn iter(&self) -> impl Iterator<Item = &Package> {
        self.packages.iter()
    }

    /// Package with id `id`.
    pub fn get(&self, id: PackageId) -> &Package {
        &self.packages[id.0]
    }

    /// Mutable access to package `id`.
    pub fn get_mut(&mut self, id: PackageId) -> &mut Package {
        &mut self.packages[id.0]
    }

    /// Id of the package named `name`.
    pub fn lookup(&self, name: &str) -> Option<PackageId> {
        self.by_name.get(name).copied()
    }

    /// Package named `name`.
    ///
    /// # Errors
    ///
    /// [`InstallError::UnknownPackage`] when the name is not in the catalog.
    pub fn package(&self, name: &str) -> Result<PackageId> {
        self.lookup(name)
            .ok_or_else(|| InstallError::UnknownPackage(PackageName::new(name)))
    }

    /// Version with id `id`.
    pub fn version(&self, id: VersionId) -> &Version {
        &self.get(id.package).versions()[id.index]
    }

    /// `name (number)` label of a version.
    pub fn describe(&self, id: VersionId) -> String {
        format!(
            "{} ({})",
            self.get(id.package).name,
            self.version(id).number()
        )
    }

    /// Id of the package named `name`, created empty on first reference.
    pub fn ensure(&mut self, name: &PackageName) -> PackageId {
        if let Some(id) = self.lookup(name) {
            return id;
        }
        let id = PackageId(self.packages.len());
        self.packages.push(Package::new(id, name.clone()));
        self.by_name.insert(name.clone(), id);
        debug!("package {name} added");
        id
    }

    /// Version requested by `name` or `name:version`.
    ///
    /// Without a version number the latest version is chosen.
    ///
    /// # Errors
    ///
    /// Fails when the package is unknown, the version number does not
    /// exist, or the package has no version at all.
    pub fn select(&self, spec: &PackageSpec) -> Result<VersionId> {
        let id = self.package(&spec.name)?;
        let pack = self.get(id);
        match &spec.version {
            Some(number) => {
                pack.find_version(number)
                    .ok_or_else(|| InstallError::UnknownVersion {
                        package: pack.name.clone(),
                        version: number.clone(),
                    })
            }
            None => pack
                .latest()
                .ok_or_else(|| InstallError::NoVersion(pack.name.clone())),
        }
    }

    /// Fetch and merge the document at `address`.
    ///
    /// # Errors
    ///
    /// [`InstallError::Catalog`] when the document cannot be read or is
    /// malformed. Nothing is merged in that case.
    pub fn load(
        &mut self,
        address: &str,
        installed: bool,
        host: HostType,
        probes: &mut ProbeRegistry,
    ) -> Result<DocumentInfo> {
        debug!("getting database from {address}");
        let text = fetch::read_text(address).map_err(|e| InstallError::catalog(address, e))?;
        self.merge_str(&text, address, installed, host, probes)
    }

    /// Merge a document held in memory; `base` locates relative files.
    ///
    /// With `installed`, every package mentioned is marked installed and its
    /// uninstall actions are imported.
    ///
    /// # Errors
    ///
    /// [`InstallError::Catalog`] when the document is malformed.
    pub fn merge_str(
        &mut self,
        text: &str,
        base: &str,
        installed: bool,
        host: HostType,
        probes: &mut ProbeRegistry,
    ) -> Result<DocumentInfo> {
        let root = Element::parse_root(text, SIS_EXTEND_TAG)
            .map_err(|e| InstallError::catalog(base, format!("DB format error: {e}")))?;

        let info = DocumentInfo {
            message: root
                .child_text("message")
                .filter(|m| !m.is_empty())
                .map(String::from),
            installer_version: root
                .child_text("version")
                .filter(|v| !v.is_empty())
                .map(VersionString::new),
        };

        let mut declared = HashSet::new();
        let entries = root
            .children_named("package")
            .map(|p| PackageEntry::parse(p, base, installed, host, probes, &mut declared))
            .collect::<std::result::Result<Vec<_>, String>>()
            .map_err(|e| InstallError::catalog(base, format!("DB format error: {e}")))?;

        for entry in entries {
            self.apply(entry, installed, probes);
        }
        Ok(info)
    }

    fn apply(&mut self, entry: PackageEntry, installed: bool, probes: &mut ProbeRegistry) {
        let id = self.ensure(&entry.name);
        let pack = self.get_mut(id);

        if let Some(tool) = entry.tool {
            pack.tool = tool;
        }
        for (field, value) in [
            (&mut pack.desc, entry.desc),
            (&mut pack.copyright, entry.copyright),
            (&mut pack.license, entry.license),
            (&mut pack.license_url, entry.license_url),
            (&mut pack.category, entry.category),
            (&mut pack.web, entry.web),
            (&mut pack.contact, entry.contact),
        ] {
            if value.is_some() {
                *field = value;
            }
        }

        for name in entry.reqs {
            if !pack.req_names.contains(&name) {
                pack.req_names.push(name);
            }
        }
        for name in entry.uses {
            if !pack.use_names.contains(&name) {
                pack.use_names.push(name);
            }
        }

        for bin in entry.binaries {
            pack.add_version(
                bin.number,
                VersionKind::Binary {
                    file: bin.file,
                    size: bin.size,
                    checksum: bin.checksum,
                },
            );
        }

        if let Some(source) = entry.source {
            let mut ids = Vec::new();
            for spec in &source.probes {
                if let Some(probe) = probes.declare(spec) {
                    ids.push(probe);
                }
            }
            let tool_probes = source
                .downloader
                .iter()
                .flat_map(Downloader::probes)
                .chain(source.builder.iter().flat_map(Builder::probes));
            ids.extend(tool_probes.filter_map(|name| probes.get(name)));

            pack.add_version(
                VersionString::source(),
                VersionKind::Source {
                    downloader: source.downloader,
                    builder: source.builder,
                    probes: probes.closure(&ids),
                },
            );
        }

        if installed {
            let version = entry
                .installed_version
                .unwrap_or_else(|| VersionString::new(NULL_VERSION));
            pack.mark_installed(version, entry.uninstall);
        }
    }

    /// Turn every requirement name into a package id.
    ///
    /// # Errors
    ///
    /// [`InstallError::UnresolvedReference`] for the first name absent
    /// from the catalog.
    pub fn resolve_requirements(&mut self) -> Result<()> {
        let mut resolved = Vec::with_capacity(self.packages.len());
        for pack in &self.packages {
            let lookup = |names: &[PackageName]| {
                names
                    .iter()
                    .map(|n| {
                        self.lookup(n).ok_or_else(|| InstallError::UnresolvedReference {
                            missing: n.clone(),
                            by: pack.name.clone(),
                        })
                    })
                    .collect::<Result<Vec<_>>>()
            };
            resolved.push((lookup(&pack.req_names)?, lookup(&pack.use_names)?));
        }
        for (pack, (reqs, uses)) in self.packages.iter_mut().zip(resolved) {
            pack.reqs = reqs;
            pack.uses = uses;
        }
        Ok(())
    }

    /// Every package `id` transitively requires, sorted by name.
    pub fn closed_reqs(&self, id: PackageId) -> Vec<PackageId> {
        let mut seen = HashSet::new();
        let mut todo = vec![id];
        while let Some(p) = todo.pop() {
            for &req in self.get(p).reqs() {
                if req != id && seen.insert(req) {
                    todo.push(req);
                }
            }
        }
        let mut out: Vec<_> = seen.into_iter().collect();
        out.sort_by(|a, b| self.get(*a).name.cmp(&self.get(*b).name));
        out
    }

    /// Installed packages whose requirements include one of `ids`, closed
    /// transitively, excluding `ids` themselves.
    pub fn installed_dependents(&self, ids: &[PackageId]) -> Vec<PackageId> {
        let mut out: Vec<PackageId> = Vec::new();
        let mut todo: Vec<PackageId> = ids.to_vec();
        while let Some(p) = todo.pop() {
            for pack in &self.packages {
                if pack.installed
                    && pack.reqs().contains(&p)
                    && !ids.contains(&pack.id())
                    && !out.contains(&pack.id())
                {
                    out.push(pack.id());
                    todo.push(pack.id());
                }
            }
        }
        out
    }
}

/// A `package` element, validated but not yet merged.
#[derive(Debug)]
struct PackageEntry {
    name: PackageName,
    tool: Option<bool>,
    desc: Option<String>,
    copyright: Option<String>,
    license: Option<String>,
    license_url: Option<String>,
    category: Option<String>,
    web: Option<String>,
    contact: Option<String>,
    installed_version: Option<VersionString>,
    reqs: Vec<PackageName>,
    uses: Vec<PackageName>,
    binaries: Vec<BinaryEntry>,
    source: Option<SourceEntry>,
    uninstall: Vec<Action>,
}

#[derive(Debug)]
struct BinaryEntry {
    number: VersionString,
    file: String,
    size: Option<u64>,
    checksum: Option<String>,
}

#[derive(Debug)]
struct SourceEntry {
    downloader: Option<Downloader>,
    builder: Option<Builder>,
    probes: Vec<ProbeSpec>,
}

fn text_of(elt: &Element, tag: &str) -> Option<String> {
    elt.child_text(tag)
        .filter(|t| !t.is_empty())
        .map(String::from)
}

fn name_refs<'a>(
    elts: impl Iterator<Item = &'a Element>,
    pack: &str,
) -> std::result::Result<Vec<PackageName>, String> {
    elts.map(|e| {
        e.attr("name")
            .filter(|n| !n.is_empty())
            .map(PackageName::new)
            .ok_or_else(|| format!("<{}> without name in package {pack}", e.tag))
    })
    .collect()
}

impl PackageEntry {
    fn parse(
        elt: &Element,
        base: &str,
        installed: bool,
        host: HostType,
        probes: &ProbeRegistry,
        declared: &mut HashSet<String>,
    ) -> std::result::Result<Self, String> {
        let id = elt
            .attr("id")
            .filter(|id| !id.is_empty())
            .ok_or("package without id")?;

        let tool = elt
            .attr("tool")
            .map(|t| matches!(t.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1"));

        let license = elt.child("license");

        let mut reqs = Vec::new();
        if let Some(group) = elt.child("reqs") {
            reqs.extend(name_refs(group.children_named("req"), id)?);
        }
        reqs.extend(name_refs(elt.children_named("req"), id)?);
        let uses = name_refs(elt.children_named("use"), id)?;

        let binaries = elt
            .children_named("version")
            .map(|v| {
                let number = v
                    .attr("number")
                    .ok_or_else(|| format!("version without number in {id}"))?;
                let file = text_of(v, "file")
                    .ok_or_else(|| format!("version {number} of {id} without file"))?;
                let size = text_of(v, "size")
                    .map(|s| {
                        s.parse::<u64>()
                            .map_err(|_| format!("bad size {s} for {id} {number}"))
                    })
                    .transpose()?;
                Ok(BinaryEntry {
                    number: VersionString::new(number),
                    file: fetch::resolve(base, &file),
                    size,
                    checksum: text_of(v, "checksum"),
                })
            })
            .collect::<std::result::Result<Vec<_>, String>>()?;

        let source = match elt.child("build") {
            None => None,
            Some(build) => {
                let downloader = build
                    .child("download")
                    .map(Downloader::from_element)
                    .transpose()?;
                let builder = build.child("make").map(Builder::from_element).transpose()?;
                let mut specs = Vec::new();
                for dep in build.children_named("dep") {
                    let spec = ProbeSpec::from_element(dep)?;
                    if spec.kind.is_none()
                        && !probes.contains(&spec.name)
                        && !declared.contains(&spec.name)
                    {
                        return Err(format!("unknown dependency {} in {id}", spec.name));
                    }
                    declared.insert(spec.name.clone());
                    specs.push(spec);
                }
                Some(SourceEntry {
                    downloader,
                    builder,
                    probes: specs,
                })
            }
        };

        let uninstall = if installed {
            elt.child("uninstall")
                .map(|u| {
                    u.children
                        .iter()
                        .filter_map(|a| Action::from_element(a, host))
                        .collect()
                })
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        Ok(Self {
            name: PackageName::new(id),
            tool,
            desc: text_of(elt, "desc"),
            copyright: text_of(elt, "copyright"),
            license: license.map(|l| l.text.clone()).filter(|t| !t.is_empty()),
            license_url: license.and_then(|l| l.attr("ref")).map(String::from),
            category: text_of(elt, "category"),
            web: text_of(elt, "web"),
            contact: text_of(elt, "contact"),
            installed_version: elt.attr("version").map(VersionString::new),
            reqs,
            uses,
            binaries,
            source,
            uninstall,
        })
    }
}
