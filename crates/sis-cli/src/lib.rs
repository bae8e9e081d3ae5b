//! sis-install - package installer for SIS catalogs
//!
//! Installs tools and libraries described by a remote XML catalog into a
//! target directory, building from sources or unpacking prebuilt binaries,
//! and removes them again on request.
//!
//! # Directory Layout
//!
//! ```text
//! <top>/
//! ├── install.xml   # Installed packages and their uninstall actions
//! ├── bin/          # Files installed by packages
//! └── lib/
//! ```

#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_panics_doc)]

pub mod cmd;
pub mod ui;

use std::path::PathBuf;

use clap::{ArgGroup, Parser};
use sis_core::Config;

/// Command line of `sis-install`.
#[derive(Debug, Parser)]
#[command(name = "sis-install")]
#[command(author, version, about = "Installer for SIS tool and library catalogs")]
#[command(group(
    ArgGroup::new("mode")
        .args(["list", "info", "uninstall", "source", "default"])
        .multiple(false)
))]
pub struct Cli {
    /// Catalog base URL or directory
    #[arg(short, long, env = "SIS_BASE_URL")]
    pub base: Option<String>,

    /// Display the list of available packages
    #[arg(short, long)]
    pub list: bool,

    /// Display information about the given packages
    #[arg(short, long)]
    pub info: bool,

    /// Top directory of the installation
    #[arg(short, long, env = "SIS_TOP")]
    pub top: Option<PathBuf>,

    /// Directory to perform the build in
    #[arg(short = 'B', long, env = "SIS_BUILD_DIR")]
    pub build_dir: Option<PathBuf>,

    /// Dry execution: only display what would be done
    #[arg(short = 'D', long)]
    pub dry: bool,

    /// Verbose mode
    #[arg(short, long)]
    pub verbose: bool,

    /// Force installation of the given packages
    #[arg(short, long)]
    pub force: bool,

    /// Log file to use
    #[arg(short = 'L', long, env = "SIS_LOG")]
    pub log: Option<PathBuf>,

    /// Uninstall the given packages
    #[arg(short, long)]
    pub uninstall: bool,

    /// Only download sources (no installation); requires --build-dir
    #[arg(short = 'S', long)]
    pub source: bool,

    /// Install the default packages
    #[arg(long)]
    pub default: bool,

    /// With --source, write a Makefile building the packages
    #[arg(long, requires = "source")]
    pub makefile: bool,

    /// Packages to process, as name or name:version
    pub packages: Vec<String>,
}

/// What a run does, derived from the mode flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// `--list`
    List,
    /// `--info`
    Info,
    /// `--uninstall`
    Uninstall,
    /// `--source`
    Source {
        /// Also write a Makefile building the downloaded packages.
        makefile: bool,
    },
    /// `--default` without package arguments
    Default,
    /// Install the packages given as arguments.
    Install,
}

impl Cli {
    /// Selected mode. Plain package arguments mean installation.
    pub fn mode(&self) -> Mode {
        if self.list {
            Mode::List
        } else if self.info {
            Mode::Info
        } else if self.uninstall {
            Mode::Uninstall
        } else if self.source {
            Mode::Source {
                makefile: self.makefile,
            }
        } else if self.default && self.packages.is_empty() {
            Mode::Default
        } else {
            Mode::Install
        }
    }

    /// Engine configuration: environment defaults overridden by flags.
    pub fn config(&self) -> Config {
        let mut config = Config::from_env();
        if let Some(base) = &self.base {
            config.base_url.clone_from(base);
        }
        if let Some(top) = &self.top {
            config.top_dir.clone_from(top);
        }
        if self.build_dir.is_some() {
            config.build_dir.clone_from(&self.build_dir);
        }
        if self.log.is_some() {
            config.log_path.clone_from(&self.log);
        }
        config.dry_run = self.dry;
        config.verbose = self.verbose;
        config.force = self.force;
        config
    }
}
