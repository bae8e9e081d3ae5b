//! Archive unpacking
//!
//! The strategy is chosen from the trailing extension of the archive name.
//! `tar.gz` and `zip` are unpacked in-process, `tar.bz2` and `rar` through
//! the `tar` and `unrar` tools.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::context::{Context, Redirect};
use crate::error::{InstallError, Result};

/// Supported archive formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// `.tar.gz`
    TarGz,
    /// `.tar.bz2`
    TarBz2,
    /// `.zip`
    Zip,
    /// `.rar`
    Rar,
}

const TABLE: [(&str, ArchiveKind); 4] = [
    ("tar.gz", ArchiveKind::TarGz),
    ("tar.bz2", ArchiveKind::TarBz2),
    ("zip", ArchiveKind::Zip),
    ("rar", ArchiveKind::Rar),
];

impl ArchiveKind {
    /// Detect the archive kind from a file name.
    pub fn detect(file_name: &str) -> Option<Self> {
        let lower = file_name.to_ascii_lowercase();
        TABLE
            .iter()
            .find(|(ext, _)| {
                lower
                    .strip_suffix(ext)
                    .is_some_and(|stem| stem.ends_with('.') && stem.len() > 1)
            })
            .map(|(_, kind)| *kind)
    }

    /// Extension without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::TarGz => "tar.gz",
            Self::TarBz2 => "tar.bz2",
            Self::Zip => "zip",
            Self::Rar => "rar",
        }
    }

    /// Names of the command probes the unpacking strategy relies on.
    pub fn probes(self) -> &'static [&'static str] {
        match self {
            Self::TarGz | Self::Zip => &[],
            Self::TarBz2 => &["tar", "bzip2"],
            Self::Rar => &["unrar"],
        }
    }

    /// File name with the archive extension removed.
    pub fn stem(self, file_name: &str) -> String {
        let cut = file_name.len() - self.extension().len() - 1;
        file_name[..cut].to_string()
    }
}

/// Unpack `archive` next to itself.
///
/// Returns the directory the archive is expected to create, that is the
/// archive path without its extension.
///
/// # Errors
///
/// [`InstallError::Unpack`] when extraction fails or an entry escapes the
/// target directory, [`InstallError::UnknownArchive`] for an unsupported
/// extension.
pub fn unpack(ctx: &mut Context, archive: &Path) -> Result<PathBuf> {
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let kind =
        ArchiveKind::detect(&name).ok_or_else(|| InstallError::UnknownArchive(name.clone()))?;
    let dir = archive.parent().unwrap_or(Path::new(".")).to_path_buf();
    ctx.comment(&format!("unpacking {}", archive.display()));

    match kind {
        ArchiveKind::TarGz => {
            let reader = BufReader::new(File::open(archive)?);
            extract_tar(flate2::read::GzDecoder::new(reader), &dir)
                .map_err(|e| unpack_error(&name, e))?;
        }
        ArchiveKind::Zip => extract_zip(archive, &dir).map_err(|e| unpack_error(&name, e))?,
        ArchiveKind::TarBz2 | ArchiveKind::Rar => {
            let cmd = match kind {
                ArchiveKind::Rar => format!("unrar x -o+ '{name}'"),
                _ => format!("tar xjf '{name}'"),
            };
            let ok = ctx.in_dir(&dir, |ctx| ctx.execute(&cmd, Redirect::Null))?;
            if !ok {
                return Err(unpack_error(&name, format!("'{cmd}' failed")));
            }
        }
    }

    Ok(dir.join(kind.stem(&name)))
}

fn unpack_error(file: &str, e: impl std::fmt::Display) -> InstallError {
    InstallError::Unpack {
        file: file.to_string(),
        message: e.to_string(),
    }
}

/// Extract a tar stream, rejecting entries escaping `dest_dir`.
fn extract_tar<R: Read>(reader: R, dest_dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dest_dir)?;
    let mut archive = tar::Archive::new(reader);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let relative: PathBuf = entry.path()?.components().collect();
        let target = dest_dir.join(&relative);

        // Zip Slip
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid path in archive: {}", relative.display()),
            ));
        }

        if entry.header().entry_type().is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        entry.unpack(&target)?;
    }
    Ok(())
}

fn extract_zip(archive_path: &Path, dest_dir: &Path) -> io::Result<()> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file).map_err(io::Error::other)?;
    fs::create_dir_all(dest_dir)?;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i).map_err(io::Error::other)?;
        let Some(relative) = file.enclosed_name() else {
            continue;
        };
        let target = dest_dir.join(relative);

        if file.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut file, &mut out)?;

        #[cfg(unix)]
        if let Some(mode) = file.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&target, fs::Permissions::from_mode(mode))?;
        }
    }
    Ok(())
}
