//! `--uninstall`: package removal.

use anyhow::{Result, bail};
use sis_core::{Session, ops};

/// Uninstall the named packages, along with the installed packages
/// requiring them once confirmed.
///
/// # Errors
///
/// Fails when no package is given, a package is not installed, or the
/// confirmation is declined.
pub fn remove(session: &mut Session, packages: &[String]) -> Result<()> {
    if packages.is_empty() {
        bail!("no package to uninstall");
    }
    ops::uninstall(session, packages)?;
    Ok(())
}
