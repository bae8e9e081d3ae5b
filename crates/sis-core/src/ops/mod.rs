//! Operations driven by the command line.
//!
//! Each operation takes the [`Session`](crate::session::Session) of the run
//! and reports progress through its context.

pub mod install;
pub mod query;
pub mod remove;
pub mod sources;

pub use install::{install, install_version};
pub use query::{info_lines, list_lines};
pub use remove::uninstall;
pub use sources::{install_sources, makefile_text};
