//! Default mode and `--default`: installation.

use anyhow::{Result, bail};
use sis_core::{Session, ops};

/// Install the named packages and their requirements.
///
/// # Errors
///
/// Fails when no package is given, a name does not resolve, or a package
/// of the closure cannot be installed.
pub fn install(session: &mut Session, packages: &[String]) -> Result<()> {
    if packages.is_empty() {
        bail!("no package to install (use --list to see the available ones)");
    }
    let versions = session.select(packages)?;
    ops::install(session, &versions)?;
    Ok(())
}

/// Install the configured default package set.
///
/// # Errors
///
/// Same failures as [`install`].
pub fn install_default(session: &mut Session) -> Result<()> {
    let versions = session.default_versions()?;
    ops::install(session, &versions)?;
    Ok(())
}
