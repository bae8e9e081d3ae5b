//! `--list`: catalog overview.

use anyhow::Result;
use sis_core::{Session, ops};

/// List available and installed packages.
///
/// # Errors
///
/// Never fails; the signature matches the other commands.
pub fn list(session: &Session) -> Result<()> {
    for line in ops::list_lines(&session.catalog) {
        session.ctx.say(&line);
    }
    Ok(())
}
