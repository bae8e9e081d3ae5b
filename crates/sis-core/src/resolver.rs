//! Dependency closure and installation order.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::catalog::Catalog;
use crate::error::{InstallError, Result};
use crate::package::{PackageId, VersionId};

/// Versions to install, each mapped to the versions it directly requires.
///
/// Required versions of already installed packages appear as dependencies
/// but not as keys.
pub type Closure = BTreeMap<VersionId, BTreeSet<VersionId>>;

/// Installation rank of a package.
///
/// 0 without requirements or uses, else one more than the highest rank
/// among them. The rank is memoized in the package on first computation.
///
/// # Errors
///
/// Returns [`InstallError::Cycle`] when the package takes part in a cycle
/// of requirements or uses.
pub fn rank(catalog: &Catalog, id: PackageId) -> Result<u32> {
    let mut visiting = Vec::new();
    rank_recursive(catalog, id, &mut visiting)
}

fn rank_recursive(catalog: &Catalog, id: PackageId, visiting: &mut Vec<PackageId>) -> Result<u32> {
    let pack = catalog.get(id);
    if let Some(rank) = pack.rank() {
        return Ok(rank);
    }
    if let Some(pos) = visiting.iter().position(|&p| p == id) {
        return Err(InstallError::Cycle(
            visiting[pos..]
                .iter()
                .map(|&p| catalog.get(p).name.to_string())
                .collect(),
        ));
    }

    visiting.push(id);
    let mut rank = 0;
    for &dep in pack.reqs().iter().chain(pack.uses()) {
        rank = rank.max(rank_recursive(catalog, dep, visiting)? + 1);
    }
    visiting.pop();

    Ok(*pack.rank.get_or_init(|| rank))
}

/// Compute the versions to install for the `requested` ones.
///
/// Requirements are followed transitively; a requirement uses the version
/// requested for its package, else the package's latest version. Installed
/// packages are skipped, except the explicitly requested ones when `force`
/// is set.
///
/// # Errors
///
/// Returns [`InstallError::NoVersion`] when a requirement that is not
/// installed has no version at all.
pub fn closure(catalog: &Catalog, requested: &[VersionId], force: bool) -> Result<Closure> {
    let mut chosen: HashMap<PackageId, VersionId> =
        requested.iter().map(|v| (v.package, *v)).collect();
    let mut todo: Vec<VersionId> = requested.to_vec();
    let mut out = Closure::new();

    while let Some(v) = todo.pop() {
        if out.contains_key(&v) {
            continue;
        }
        let pack = catalog.get(v.package);
        if pack.installed && !(force && requested.contains(&v)) {
            continue;
        }

        let mut deps = BTreeSet::new();
        for &req in pack.reqs() {
            let rv = match chosen.get(&req) {
                Some(rv) => *rv,
                None => {
                    let req_pack = catalog.get(req);
                    match req_pack.latest() {
                        Some(rv) => {
                            chosen.insert(req, rv);
                            rv
                        }
                        None if req_pack.installed => continue,
                        None => return Err(InstallError::NoVersion(req_pack.name.clone())),
                    }
                }
            };
            deps.insert(rv);
            if !out.contains_key(&rv) {
                todo.push(rv);
            }
        }
        out.insert(v, deps);
    }
    Ok(out)
}

/// Order the closure so that every version comes after its requirements.
///
/// Among the versions whose requirements are all installed or already
/// ordered, the one with the lowest package rank goes first; ties keep the
/// closure order.
///
/// # Errors
///
/// Returns [`InstallError::Cycle`] with the remaining versions when none of
/// them can be ordered.
pub fn install_order(catalog: &Catalog, closure: &Closure) -> Result<Vec<VersionId>> {
    let ranks = closure
        .keys()
        .map(|v| Ok((*v, rank(catalog, v.package)?)))
        .collect::<Result<HashMap<_, _>>>()?;

    let mut pending: Vec<VersionId> = closure.keys().copied().collect();
    let mut order: Vec<VersionId> = Vec::with_capacity(pending.len());

    while !pending.is_empty() {
        let next = pending
            .iter()
            .enumerate()
            .filter(|(_, v)| {
                closure[*v]
                    .iter()
                    .all(|d| order.contains(d) || catalog.get(d.package).installed)
            })
            .min_by_key(|(_, v)| ranks[*v])
            .map(|(i, _)| i);

        let Some(i) = next else {
            return Err(InstallError::Cycle(
                pending.iter().map(|v| catalog.describe(*v)).collect(),
            ));
        };
        order.push(pending.remove(i));
    }
    Ok(order)
}
