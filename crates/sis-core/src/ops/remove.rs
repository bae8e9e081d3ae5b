//! Package removal.

use crate::error::{InstallError, Result};
use crate::package::PackageId;
use crate::session::Session;
use crate::site;

/// Uninstall the named packages and every installed package requiring them.
///
/// Dependents are listed in a single confirmation; declining aborts the
/// whole removal before anything is touched.
///
/// # Errors
///
/// Fails on an unknown or not installed package, a declined
/// confirmation, or a failed removal.
pub fn uninstall(session: &mut Session, names: &[String]) -> Result<()> {
    let mut packs: Vec<PackageId> = Vec::with_capacity(names.len());
    for name in names {
        let id = session.catalog.package(name)?;
        let pack = session.catalog.get(id);
        if !pack.installed {
            return Err(InstallError::NotInstalled(pack.name.clone()));
        }
        if !packs.contains(&id) {
            packs.push(id);
        }
    }

    let dependents = session.catalog.installed_dependents(&packs);
    if !dependents.is_empty() {
        let list = dependents
            .iter()
            .map(|&d| session.catalog.get(d).name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        if !session
            .ctx
            .ask_yes_no(&format!("The packages {list} will also be uninstalled?"))
        {
            return Err(InstallError::Aborted("Uninstallation aborted.".to_string()));
        }
    }
    packs.extend(dependents);

    let top = session.ctx.top_dir().to_path_buf();
    for id in packs {
        let pack = session.catalog.get(id);
        let name = pack.name.clone();
        let actions = pack.uninstall.clone();

        session.ctx.check(&format!("uninstalling {name}"));
        session
            .ctx
            .in_dir(&top, |ctx| {
                for action in &actions {
                    action.perform(ctx)?;
                }
                Ok(())
            })
            .inspect_err(|_| session.ctx.fail())?;
        if !session.ctx.dry_run() {
            site::record_removal(session.ctx.site_path(), &name)?;
        }
        session.catalog.get_mut(id).mark_removed();
        session.ctx.succeed();
    }
    Ok(())
}
