//! `--source`: source download and Makefile generation.

use anyhow::{Result, bail};
use sis_core::{Session, ops};

/// Download sources of the named packages into the build directory.
///
/// # Errors
///
/// Fails when no package is given, no build directory was configured, or
/// a download fails.
pub fn source(session: &mut Session, packages: &[String], makefile: bool) -> Result<()> {
    if packages.is_empty() {
        bail!("no package given to --source");
    }
    let versions = session.select(packages)?;
    ops::install_sources(session, &versions, makefile)?;
    Ok(())
}
