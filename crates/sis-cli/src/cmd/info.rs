//! `--info`: package descriptions.

use anyhow::{Result, bail};
use sis_core::{Session, ops};

/// Describe each named package.
///
/// # Errors
///
/// Fails when no package is given or a name is unknown.
pub fn info(session: &Session, packages: &[String]) -> Result<()> {
    if packages.is_empty() {
        bail!("no package given to --info");
    }
    for id in session.select(packages)? {
        for line in ops::info_lines(&session.catalog, id.package) {
            session.ctx.say(&line);
        }
    }
    Ok(())
}
