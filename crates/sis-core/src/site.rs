//! Installed-state document.
//!
//! The document at `<top>/install.xml` lists every installed package with
//! its version and the actions undoing its installation. It is loaded as a
//! regular catalog document flagged "installed" and rewritten after every
//! install or removal. Rewrites go through a `.old` backup that is restored
//! when writing fails.

use std::fs;
use std::path::{Path, PathBuf};

use sis_schema::{Element, NULL_VERSION, SIS_EXTEND_TAG};
use tracing::debug;

use crate::error::{InstallError, Result};
use crate::package::Package;

/// Create an empty installed-state document at `path` when missing.
///
/// # Errors
///
/// Fails when the document cannot be written.
pub fn init(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| persist_error(path, e))?;
    }
    write(path, &Element::new(SIS_EXTEND_TAG))
}

/// Record the installation of `pack`, replacing any previous record.
///
/// # Errors
///
/// Fails when the document cannot be read back or rewritten.
pub fn record_install(path: &Path, pack: &Package) -> Result<()> {
    let version = pack
        .installed_version
        .as_ref()
        .map_or(NULL_VERSION, |v| v.as_str());

    update(path, |root| {
        let elt = match root
            .children
            .iter()
            .position(|p| p.tag == "package" && p.attr("id") == Some(pack.name.as_str()))
        {
            Some(i) => &mut root.children[i],
            None => {
                root.push(Element::new("package").with_attr("id", &pack.name));
                let last = root.children.len() - 1;
                &mut root.children[last]
            }
        };
        elt.set_attr("version", version);

        elt.remove_children("uninstall");
        let mut uninstall = Element::new("uninstall").with_attr("version", version);
        for action in &pack.uninstall {
            uninstall.push(action.to_element());
        }
        elt.push(uninstall);
    })
}

/// Erase the record of package `name`.
///
/// # Errors
///
/// Fails when the document cannot be read back or rewritten.
pub fn record_removal(path: &Path, name: &str) -> Result<()> {
    update(path, |root| {
        root.children
            .retain(|p| !(p.tag == "package" && p.attr("id") == Some(name)));
    })
}

fn update(path: &Path, edit: impl FnOnce(&mut Element)) -> Result<()> {
    debug!("getting database from {}", path.display());
    let mut root = if path.exists() {
        let text = fs::read_to_string(path)?;
        Element::parse_root(&text, SIS_EXTEND_TAG)
            .map_err(|e| InstallError::catalog(path.display(), format!("bad DB: {e}")))?
    } else {
        Element::new(SIS_EXTEND_TAG)
    };
    edit(&mut root);
    write(path, &root)
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".old");
    PathBuf::from(name)
}

fn persist_error(path: &Path, e: impl std::fmt::Display) -> InstallError {
    InstallError::Persist {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

fn write(path: &Path, root: &Element) -> Result<()> {
    let text = root.to_document()?;
    let backup = backup_path(path);
    let had_previous = path.exists();

    debug!("writing installed DB to {}", path.display());
    if had_previous {
        fs::rename(path, &backup).map_err(|e| persist_error(path, e))?;
    }
    match fs::write(path, text) {
        Ok(()) => {
            if had_previous && let Err(e) = fs::remove_file(&backup) {
                debug!("cannot remove {}: {e}", backup.display());
            }
            Ok(())
        }
        Err(e) => {
            if path.exists() {
                let _ = fs::remove_file(path);
            }
            if had_previous {
                fs::rename(&backup, path).map_err(|e| persist_error(path, e))?;
            }
            Err(persist_error(path, e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use crate::catalog::Catalog;
    use crate::probe::ProbeRegistry;
    use sis_schema::{HostType, PackageName, VersionString};
    use tempfile::tempdir;

    fn installed(name: &str, version: &str, uninstall: Vec<Action>) -> Package {
        let mut cat = Catalog::new();
        let id = cat.ensure(&PackageName::new(name));
        let mut pack = cat.get(id).clone();
        pack.mark_installed(VersionString::new(version), uninstall);
        pack
    }

    fn reload(path: &Path) -> Catalog {
        let mut cat = Catalog::new();
        let mut probes = ProbeRegistry::new();
        cat.load(
            &path.display().to_string(),
            true,
            HostType::LinuxX86_64,
            &mut probes,
        )
        .unwrap();
        cat
    }

    #[test]
    fn test_init_creates_empty_document() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("top/install.xml");
        init(&path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(Element::parse_root(&text, SIS_EXTEND_TAG).is_ok());

        // an existing document is left alone
        fs::write(&path, "<sis-extend><package id=\"x\"/></sis-extend>").unwrap();
        init(&path).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("\"x\""));
    }

    #[test]
    fn test_install_then_remove() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("install.xml");
        init(&path).unwrap();

        let gel = installed("gel", "1.0", vec![Action::remove("lib/libgel.so")]);
        record_install(&path, &gel).unwrap();
        record_install(&path, &installed("elm", "2.0", Vec::new())).unwrap();
        assert!(!backup_path(&path).exists());

        let cat = reload(&path);
        let pack = cat.get(cat.package("gel").unwrap());
        assert!(pack.installed);
        assert_eq!(pack.installed_version.as_deref(), Some("1.0"));
        assert_eq!(pack.uninstall, vec![Action::remove("lib/libgel.so")]);

        record_removal(&path, "gel").unwrap();
        let cat = reload(&path);
        assert!(cat.lookup("gel").is_none());
        assert!(cat.lookup("elm").is_some());
    }

    #[test]
    fn test_reinstall_replaces_uninstall() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("install.xml");
        record_install(&path, &installed("gel", "1.0", vec![Action::remove("a")])).unwrap();
        record_install(&path, &installed("gel", "1.1", vec![Action::remove("b")])).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("<uninstall").count(), 1);
        assert_eq!(text.matches("<package").count(), 1);

        let cat = reload(&path);
        let pack = cat.get(cat.package("gel").unwrap());
        assert_eq!(pack.installed_version.as_deref(), Some("1.1"));
        assert_eq!(pack.uninstall, vec![Action::remove("b")]);
    }

    #[test]
    fn test_bad_document_is_left_untouched() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("install.xml");
        fs::write(&path, "<not-sis/>").unwrap();
        let err = record_removal(&path, "gel").unwrap_err();
        assert!(err.to_string().contains("bad DB"), "{err}");
        assert_eq!(fs::read_to_string(&path).unwrap(), "<not-sis/>");
    }
}
