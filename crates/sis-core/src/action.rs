//! Reversible filesystem actions.
//!
//! Binary packages describe their installation as a list of actions; the
//! undo actions of each performed action are recorded in the
//! installed-state document and replayed at uninstall time.
//!
//! Every path an action writes or deletes is relative to the target root
//! and may not leave it: absolute paths and `..` components are rejected
//! when actions are read.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use sis_schema::{Element, HostType};
use tracing::debug;

use crate::context::Context;
use crate::error::Result;

/// A unit of filesystem effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Copy a file or a directory tree into the target root.
    Install {
        /// Source, relative to the working directory.
        file: String,
        /// Destination, relative to the target root.
        to: String,
    },
    /// Delete a file of the target root.
    Remove {
        /// File to delete, relative to the target root.
        path: String,
    },
}

impl Action {
    /// Action copying `file` to `to`.
    pub fn install(file: &str, to: &str) -> Self {
        Self::Install {
            file: file.to_string(),
            to: to.to_string(),
        }
    }

    /// Action deleting `path`.
    pub fn remove(path: &str) -> Self {
        Self::Remove {
            path: path.to_string(),
        }
    }

    /// Element tag of the action.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Install { .. } => "install",
            Self::Remove { .. } => "remove",
        }
    }

    /// Action undoing this one, if any.
    ///
    /// For a directory install, [`Action::perform`] returns the precise
    /// per-file undo list instead.
    pub fn reverse(&self) -> Option<Action> {
        match self {
            Self::Install { to, .. } => Some(Self::remove(to)),
            Self::Remove { .. } => None,
        }
    }

    /// Apply the action and return the actions undoing what it did.
    ///
    /// Installing a directory yields one removal per copied file. Removal
    /// only deletes files, then prunes the parent directories it left
    /// empty.
    ///
    /// # Errors
    ///
    /// Returns an error when an installation cannot copy its source. A
    /// failed removal is reported through the context and does not stop
    /// the caller.
    pub fn perform(&self, ctx: &mut Context) -> Result<Vec<Action>> {
        if ctx.dry_run() {
            ctx.comment(&format!("skipping {self:?}"));
            return Ok(self.reverse().into_iter().collect());
        }
        match self {
            Self::Install { file, to } => {
                let source = ctx.cwd()?.join(file);
                let target = ctx.top_dir().join(to);
                ctx.comment(&format!(
                    "copy {} to {}",
                    source.display(),
                    target.display()
                ));
                let copied = copy(&source, &target)
                    .map_err(|e| io::Error::new(e.kind(), format!("{e} at {file} install")))?;
                Ok(match copied {
                    Some(files) => files
                        .iter()
                        .map(|rel| Self::remove(&Path::new(to).join(rel).to_string_lossy()))
                        .collect(),
                    None => vec![Self::remove(to)],
                })
            }
            Self::Remove { path } => {
                let top = ctx.top_dir().to_path_buf();
                let target = top.join(path);
                ctx.comment(&format!("remove {}", target.display()));
                if !is_confined(path) {
                    ctx.error(&format!("refusing to remove {path}: outside of {}", top.display()));
                } else if target.is_dir() {
                    ctx.warning(&format!("{} is a directory, left in place", target.display()));
                } else if let Err(e) = fs::remove_file(&target) {
                    ctx.error(&format!("cannot remove {}: {e}", target.display()));
                } else {
                    prune_empty_parents(&target, &top);
                }
                Ok(Vec::new())
            }
        }
    }

    /// Read an action element.
    ///
    /// `install` takes `file` or `dynlib` (the host library suffix is then
    /// appended to both paths) and an optional `to`; `remove` takes `path`.
    /// Unknown tags, missing attributes and paths escaping their root
    /// yield `None`.
    pub fn from_element(elt: &Element, host: HostType) -> Option<Self> {
        let action = match elt.tag.as_str() {
            "install" => {
                let (file, suffix) = match (elt.attr("dynlib"), elt.attr("file")) {
                    (Some(lib), _) => (lib, host.dynlib_suffix()),
                    (None, Some(file)) => (file, ""),
                    (None, None) => {
                        debug!("install action without file");
                        return None;
                    }
                };
                let to = elt.attr("to").unwrap_or(file);
                Self::install(&format!("{file}{suffix}"), &format!("{to}{suffix}"))
            }
            "remove" => Self::remove(elt.attr("path")?),
            other => {
                debug!("unknown action {other}");
                return None;
            }
        };
        let confined = match &action {
            Self::Install { file, to } => is_confined(file) && is_confined(to),
            Self::Remove { path } => is_confined(path),
        };
        if confined {
            Some(action)
        } else {
            debug!("action {action:?} escapes its root");
            None
        }
    }

    /// Element recording the action.
    pub fn to_element(&self) -> Element {
        match self {
            Self::Install { file, to } => Element::new("install")
                .with_attr("file", file)
                .with_attr("to", to),
            Self::Remove { path } => Element::new("remove").with_attr("path", path),
        }
    }
}

/// Whether `path` is a non-empty relative path staying below its root.
pub fn is_confined(path: &str) -> bool {
    !path.is_empty()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Copy `source` to `target`.
///
/// When `source` is a directory, returns the copied files relative to
/// `target`.
fn copy(source: &Path, target: &Path) -> io::Result<Option<Vec<PathBuf>>> {
    if !source.is_dir() {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(source, target)?;
        return Ok(None);
    }

    let content = fs_extra::dir::get_dir_content(source)
        .map_err(|e| io::Error::other(format!("cannot list {}: {e}", source.display())))?;
    let mut files = content
        .files
        .iter()
        .map(|f| Path::new(f).strip_prefix(source).map(Path::to_path_buf))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(io::Error::other)?;
    files.sort();

    fs::create_dir_all(target)?;
    for rel in &files {
        let dest = target.join(rel);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(source.join(rel), dest)?;
    }
    Ok(Some(files))
}

/// Remove the directories between `file` and `top` that are now empty.
fn prune_empty_parents(file: &Path, top: &Path) {
    let mut dir = file.parent();
    while let Some(d) = dir {
        if d == top || !d.starts_with(top) || fs::remove_dir(d).is_err() {
            break;
        }
        dir = d.parent();
    }
}
