//! Build backends.
//!
//! A builder works inside `<build>/<package>`, the directory filled by the
//! package downloader. Its install step yields the actions undoing the
//! installation, or `None` when it failed.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use sis_schema::{Element, PackageName};

use crate::action::{Action, is_confined};
use crate::context::{Context, Redirect};
use crate::error::Result;

/// How a fetched source tree is built and installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Builder {
    /// `make` then `make install`, both with `flags`.
    Make {
        /// Extra arguments, `$(NAME)` substituted.
        flags: String,
    },
    /// `cmake . flags`, `make`, then `make install` whose manifest gives
    /// the uninstall actions.
    CMake {
        /// Extra `cmake` arguments, `$(NAME)` substituted.
        flags: String,
    },
    /// A single build command; installation records nothing.
    Command {
        /// Shell command, nothing to run when absent.
        build: Option<String>,
    },
}

impl Builder {
    /// Read a `make` element.
    ///
    /// # Errors
    ///
    /// Describes a missing or unknown type.
    pub fn from_element(elt: &Element) -> std::result::Result<Self, String> {
        let flags = elt.attr("flags").unwrap_or_default().to_string();
        match elt.attr("type") {
            Some("make") => Ok(Self::Make { flags }),
            Some("cmake") => Ok(Self::CMake { flags }),
            Some("command") => Ok(Self::Command {
                build: elt.attr("build").map(String::from),
            }),
            Some(other) => Err(format!("unknown make type {other}")),
            None => Err("make without type".to_string()),
        }
    }

    /// Names of the probes this builder needs.
    pub fn probes(&self) -> Vec<&'static str> {
        match self {
            Self::Make { .. } => vec!["make"],
            Self::CMake { .. } => vec!["cmake"],
            Self::Command { .. } => Vec::new(),
        }
    }

    /// Build the fetched sources. Returns whether the build succeeded.
    ///
    /// # Errors
    ///
    /// Fails when a command cannot be spawned.
    pub fn build(&self, package: &PackageName, ctx: &mut Context) -> Result<bool> {
        let dir = ctx.build_dir()?.join(package.as_str());
        ctx.in_dir(&dir, |ctx| match self {
            Self::Make { flags } => {
                let cmd = format!("make {}", ctx.eval(flags)).trim_end().to_string();
                ctx.log(&format!("\nBuilding {package}: {cmd}\n"));
                ctx.execute(&cmd, Redirect::Log)
            }
            Self::CMake { flags } => {
                let cmd = format!("cmake . {}", ctx.eval(flags)).trim_end().to_string();
                ctx.log(&format!("\nSetting up {package}: {cmd}\n"));
                if !ctx.execute(&cmd, Redirect::Log)? {
                    return Ok(false);
                }
                ctx.log(&format!("\nBuilding {package}: make\n"));
                ctx.execute("make", Redirect::Log)
            }
            Self::Command { build: Some(build) } => {
                let cmd = ctx.eval(build);
                ctx.log(&format!("\nBuilding {package}: {cmd}\n"));
                ctx.execute(&cmd, Redirect::Log)
            }
            Self::Command { build: None } => Ok(true),
        })
    }

    /// Install the built package into the target root.
    ///
    /// Returns the uninstall actions, or `None` when installation failed.
    ///
    /// # Errors
    ///
    /// Fails when a command cannot be spawned.
    pub fn install(&self, package: &PackageName, ctx: &mut Context) -> Result<Option<Vec<Action>>> {
        let dir = ctx.build_dir()?.join(package.as_str());
        ctx.in_dir(&dir, |ctx| match self {
            Self::Make { flags } => {
                let cmd = format!("make install {}", ctx.eval(flags))
                    .trim_end()
                    .to_string();
                ctx.log(&format!("\nInstalling {package}: {cmd}\n"));
                Ok(ctx.execute(&cmd, Redirect::Log)?.then(Vec::new))
            }
            Self::CMake { .. } => {
                ctx.log(&format!("\nInstalling {package}: make install\n"));
                let Some(output) = ctx.result_of("make install")? else {
                    return Ok(None);
                };
                ctx.log(&output);
                let (actions, outside) = parse_cmake_manifest(&output, ctx.top_dir());
                for path in outside {
                    ctx.warning(&format!(
                        "{path} is outside of {}, it will not be uninstalled",
                        ctx.top_dir().display()
                    ));
                }
                Ok(Some(actions))
            }
            Self::Command { .. } => Ok(Some(Vec::new())),
        })
    }

    /// Append the build-script commands of `package` to `out`.
    ///
    /// Tool packages are built but not installed.
    pub fn write_make_rules(&self, package: &PackageName, tool: bool, out: &mut String) {
        let mut cmds = Vec::new();
        match self {
            Self::Make { flags } => {
                cmds.push(join_cmd("make", flags));
                if !tool {
                    cmds.push(join_cmd("make install", flags));
                }
            }
            Self::CMake { flags } => {
                cmds.push(join_cmd("cmake .", flags));
                cmds.push("make".to_string());
                if !tool {
                    cmds.push("make install".to_string());
                }
            }
            Self::Command { build: Some(build) } => cmds.push(build.clone()),
            Self::Command { build: None } => {}
        }
        for cmd in cmds {
            out.push_str(&format!("\tcd {package}; {cmd} >> $(log)\n"));
        }
    }
}

fn join_cmd(cmd: &str, flags: &str) -> String {
    if flags.is_empty() {
        cmd.to_string()
    } else {
        format!("{cmd} {flags}")
    }
}

/// Removal actions for the files listed by a CMake install run.
///
/// Listed paths are absolute or relative to `top_dir`. Paths outside
/// `top_dir` are returned apart and get no action.
pub fn parse_cmake_manifest(output: &str, top_dir: &Path) -> (Vec<Action>, Vec<String>) {
    let mut actions = Vec::new();
    let mut outside = Vec::new();
    for line in output.lines() {
        let Some(listed) = line
            .strip_prefix("-- Installing: ")
            .or_else(|| line.strip_prefix("-- Up-to-date: "))
            .map(str::trim)
        else {
            continue;
        };
        let path = Path::new(listed);
        let rel = if path.is_absolute() {
            path.strip_prefix(top_dir).ok()
        } else {
            Some(path)
        };
        match rel.map(|r| r.to_string_lossy()) {
            Some(rel) if is_confined(&rel) => actions.push(Action::remove(&rel)),
            _ => outside.push(listed.to_string()),
        }
    }
    (actions, outside)
}

/// The last `n` lines of a log.
///
/// # Errors
///
/// Fails when the log cannot be read.
pub fn read_last_lines(path: &Path, n: usize) -> Result<String> {
    let reader = BufReader::new(File::open(path)?);
    let mut tail = VecDeque::with_capacity(n + 1);
    for line in reader.split(b'\n') {
        tail.push_back(String::from_utf8_lossy(&line?).into_owned());
        if tail.len() > n {
            tail.pop_front();
        }
    }
    Ok(Vec::from(tail).join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::reporter::NullReporter;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn context(top: &Path, dry_run: bool) -> Context {
        let config = Config {
            top_dir: top.join("top"),
            build_dir: Some(top.join("build")),
            log_path: Some(top.join("test.log")),
            dry_run,
            ..Config::default()
        };
        Context::new(&config, Arc::new(NullReporter)).unwrap()
    }

    #[test]
    fn test_from_element() {
        let elt = Element::new("make")
            .with_attr("type", "cmake")
            .with_attr("flags", "-DWITH_X=1");
        assert_eq!(
            Builder::from_element(&elt).unwrap(),
            Builder::CMake {
                flags: "-DWITH_X=1".to_string()
            }
        );
        assert!(Builder::from_element(&Element::new("make")).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_parse_cmake_manifest() {
        let output = "\
Install the project...
-- Install configuration: \"\"
-- Installing: /opt/sis/lib/libgel.so
-- Up-to-date: /opt/sis/include/gel/gel.h
-- Installing: share/gel/README
";
        let (acts, outside) = parse_cmake_manifest(output, Path::new("/opt/sis"));
        assert_eq!(
            acts,
            vec![
                Action::remove("lib/libgel.so"),
                Action::remove("include/gel/gel.h"),
                Action::remove("share/gel/README"),
            ]
        );
        assert!(outside.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_cmake_manifest_skips_paths_outside_top() {
        let output = "\
-- Installing: /opt/sis/lib/libgel.so
-- Installing: /usr/include
-- Up-to-date: /opt/sister/lib/libelm.so
-- Installing: ../etc/gel.conf
";
        let (acts, outside) = parse_cmake_manifest(output, Path::new("/opt/sis"));
        assert_eq!(acts, vec![Action::remove("lib/libgel.so")]);
        assert_eq!(
            outside,
            vec!["/usr/include", "/opt/sister/lib/libelm.so", "../etc/gel.conf"]
        );
    }

    #[test]
    fn test_make_rules() {
        let mut out = String::new();
        Builder::Make {
            flags: "PREFIX=$(top_dir)".to_string(),
        }
        .write_make_rules(&PackageName::new("gel"), false, &mut out);
        assert_eq!(
            out,
            "\tcd gel; make PREFIX=$(top_dir) >> $(log)\n\
             \tcd gel; make install PREFIX=$(top_dir) >> $(log)\n"
        );

        let mut out = String::new();
        Builder::CMake {
            flags: String::new(),
        }
        .write_make_rules(&PackageName::new("elm"), true, &mut out);
        assert_eq!(
            out,
            "\tcd elm; cmake . >> $(log)\n\tcd elm; make >> $(log)\n"
        );
    }

    #[test]
    fn test_build_records_in_dry_run() {
        let tmp = tempdir().unwrap();
        let mut ctx = context(tmp.path(), true);
        ctx.set_var("prefix", "/opt");
        let builder = Builder::CMake {
            flags: "-DPREFIX=$(prefix)".to_string(),
        };
        let pack = PackageName::new("gel");
        assert!(builder.build(&pack, &mut ctx).unwrap());
        assert_eq!(builder.install(&pack, &mut ctx).unwrap(), Some(Vec::new()));
        assert_eq!(
            ctx.recorded_commands(),
            ["cmake . -DPREFIX=/opt", "make", "make install"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_command_builder_runs_in_package_dir() {
        let tmp = tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("build/gel")).unwrap();
        let mut ctx = context(tmp.path(), false);
        let pack = PackageName::new("gel");

        let ok = Builder::Command {
            build: Some("touch built".to_string()),
        };
        assert!(ok.build(&pack, &mut ctx).unwrap());
        assert!(tmp.path().join("build/gel/built").exists());
        assert_eq!(ok.install(&pack, &mut ctx).unwrap(), Some(Vec::new()));

        let failing = Builder::Make {
            flags: String::new(),
        };
        // No Makefile in the directory
        assert!(!failing.build(&pack, &mut ctx).unwrap_or(false));
    }

    #[test]
    fn test_read_last_lines() {
        let tmp = tempdir().unwrap();
        let log = tmp.path().join("build.log");
        let content: String = (0..100).map(|i| format!("line {i}\n")).collect();
        std::fs::write(&log, content).unwrap();
        assert_eq!(read_last_lines(&log, 2).unwrap(), "line 98\nline 99");
        assert_eq!(read_last_lines(&log, 0).unwrap(), "");

        std::fs::write(&log, "only\n").unwrap();
        assert_eq!(read_last_lines(&log, 10).unwrap(), "only");
    }
}
