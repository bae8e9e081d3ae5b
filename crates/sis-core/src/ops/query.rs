//! Catalog listings for `--list` and `--info`.

use crate::catalog::Catalog;
use crate::package::{PackageId, VersionKind};

/// One line per non-tool package with its installed and available versions.
///
/// Packages neither installed nor installable are skipped.
pub fn list_lines(catalog: &Catalog) -> Vec<String> {
    let width = catalog
        .iter()
        .filter(|p| !p.tool)
        .map(|p| p.name.len())
        .max()
        .unwrap_or(0);

    let mut lines = Vec::new();
    for pack in catalog.iter().filter(|p| !p.tool) {
        let name = format!("{:width$}", pack.name.as_str());
        let latest = pack.latest().map(|v| catalog.version(v).number());

        let line = match (&pack.installed_version, latest) {
            (Some(installed), latest) if pack.installed => {
                let mut line = if installed.is_source() {
                    format!("{name} source")
                } else {
                    format!("{name} V{installed}")
                };
                if let Some(latest) = latest
                    && !latest.is_source()
                    && latest.is_younger(installed)
                {
                    line.push_str(&format!(" (avail. {latest})"));
                }
                line
            }
            (_, Some(latest)) if !pack.installed => format!("{name} not installed (avail. {latest})"),
            _ => continue,
        };
        lines.push(line);
    }
    lines
}

/// Description of one package: versions, metadata and closed requirements.
pub fn info_lines(catalog: &Catalog, id: PackageId) -> Vec<String> {
    let pack = catalog.get(id);
    let mut head = pack.name.to_string();
    if let Some(installed) = &pack.installed_version {
        head.push_str(&format!(" V{installed}"));
    }
    if let Some(category) = &pack.category {
        head.push_str(&format!(" ({category})"));
    }

    let mut lines = vec![head];
    for version in pack.versions() {
        match version.kind() {
            VersionKind::Source { .. } => lines.push("\tsource install".to_string()),
            VersionKind::Binary { size, .. } => {
                let mut line = format!("\tV{} binary install", version.number());
                if let Some(size) = size {
                    #[allow(clippy::cast_precision_loss)]
                    let kb = *size as f64;
                    line.push_str(&format!(" ({kb:.1} KB)"));
                }
                lines.push(line);
            }
        }
    }
    for field in [
        &pack.copyright,
        &pack.license,
        &pack.desc,
        &pack.web,
        &pack.contact,
    ]
    .into_iter()
    .flatten()
    {
        lines.push(format!("\t{field}"));
    }

    let reqs = catalog.closed_reqs(id);
    if !reqs.is_empty() {
        let names: Vec<&str> = reqs.iter().map(|&r| catalog.get(r).name.as_str()).collect();
        lines.push(format!("\trequirements: {}", names.join(", ")));
    }
    lines
}
