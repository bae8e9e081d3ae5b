//! Source downloaders.
//!
//! Every downloader fetches the sources of a package into
//! `<build>/<package>`, replacing whatever a previous run left there.

use std::fs;
use std::path::Path;

use sis_schema::{Element, PackageName};

use crate::context::{Context, Redirect};
use crate::error::Result;
use crate::fetch;
use crate::unpack::{self, ArchiveKind};

/// How the sources of a package are fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Downloader {
    /// `git clone`, optionally of a given tag or branch.
    Git {
        /// Repository URL.
        address: String,
        /// Tag or branch to check out.
        tag: Option<String>,
    },
    /// `hg clone`.
    Hg {
        /// Repository URL.
        address: String,
    },
    /// Fetch an archive and unpack it.
    Archive {
        /// Archive URL or path.
        address: String,
    },
}

impl Downloader {
    /// Read a `download` element.
    ///
    /// # Errors
    ///
    /// Describes a missing type or address, or an unknown type.
    pub fn from_element(elt: &Element) -> std::result::Result<Self, String> {
        let kind = elt.attr("type").ok_or("download without type")?;
        let address = elt
            .attr("address")
            .ok_or_else(|| format!("{kind} download without address"))?
            .to_string();
        match kind {
            "git" => Ok(Self::Git {
                address,
                tag: elt.attr("tag").map(String::from),
            }),
            "hg" => Ok(Self::Hg { address }),
            "archive" => Ok(Self::Archive { address }),
            other => Err(format!("unknown download type {other}")),
        }
    }

    /// Names of the probes this downloader needs.
    pub fn probes(&self) -> Vec<&'static str> {
        match self {
            Self::Git { .. } => vec!["git"],
            Self::Hg { .. } => vec!["mercurial"],
            Self::Archive { address } => ArchiveKind::detect(&fetch::file_name(address))
                .map(|kind| kind.probes().to_vec())
                .unwrap_or_default(),
        }
    }

    /// Fetch the sources of `package` into the build directory.
    ///
    /// Returns `false` when the fetch itself failed; details are in the
    /// build log.
    ///
    /// # Errors
    ///
    /// Fails when the build directory cannot be prepared or a command
    /// cannot be spawned.
    pub fn download(&self, package: &PackageName, ctx: &mut Context) -> Result<bool> {
        let build = ctx.build_dir()?;
        let target = build.join(package.as_str());

        match self {
            Self::Git { address, tag } => {
                let branch = tag
                    .as_deref()
                    .map(|t| format!("--branch {t} "))
                    .unwrap_or_default();
                let cmd = format!("git clone {branch}{address} '{}'", target.display());
                clone(ctx, package, &cmd, &target)
            }
            Self::Hg { address } => {
                let cmd = format!("hg clone {address} '{}'", target.display());
                clone(ctx, package, &cmd, &target)
            }
            Self::Archive { address } => {
                ctx.log(&format!("\nDownloading {package}: {address}\n"));
                let archive = match fetch::download(address, &build) {
                    Ok(path) => path,
                    Err(e) => {
                        ctx.log(&format!("cannot download {address}: {e}\n"));
                        return Ok(false);
                    }
                };
                let dir = unpack::unpack(ctx, &archive)?;
                normalize(&dir, &target)?;
                Ok(true)
            }
        }
    }
}

fn clone(ctx: &mut Context, package: &PackageName, cmd: &str, target: &Path) -> Result<bool> {
    if target.exists() && !ctx.dry_run() {
        fs::remove_dir_all(target)?;
    }
    ctx.log(&format!("\nDownloading {package}: {cmd}\n"));
    ctx.execute(cmd, Redirect::Log)
}

/// Move an unpacked directory to the place builders expect it.
fn normalize(unpacked: &Path, target: &Path) -> Result<()> {
    if unpacked == target || !unpacked.is_dir() {
        return Ok(());
    }
    if target.exists() {
        fs::remove_dir_all(target)?;
    }
    fs::rename(unpacked, target)?;
    Ok(())
}
