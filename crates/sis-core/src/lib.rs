//! Installer engine for SIS catalogs.
//!
//! The engine loads catalog documents into a [`Catalog`], closes requested
//! versions over their requirements, tests the host for the tools and
//! libraries they need, then fetches, builds and installs them into a
//! target root. Every installation is recorded with the actions undoing
//! it, so packages can be removed later.
//!
//! All side effects go through the [`Context`] of a [`Session`].

pub mod action;
pub mod builder;
pub mod catalog;
pub mod config;
pub mod context;
pub mod downloader;
pub mod error;
pub mod fetch;
pub mod ops;
pub mod package;
pub mod probe;
pub mod reporter;
pub mod resolver;
pub mod session;
pub mod site;
pub mod unpack;

pub use catalog::Catalog;
pub use config::Config;
pub use context::Context;
pub use error::{InstallError, Result, Step};
pub use package::{Package, PackageId, Version, VersionId, VersionKind};
pub use reporter::{NullReporter, RecordingReporter, Reporter};
pub use session::Session;

pub use fetch::USER_AGENT;
