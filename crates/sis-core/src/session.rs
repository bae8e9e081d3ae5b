//! One installer run.
//!
//! A [`Session`] bundles the execution context, the merged catalog and the
//! probe registry. It is created once per process and handed to every
//! operation.

use std::sync::Arc;

use sis_schema::PackageSpec;

use crate::catalog::{Catalog, DocumentInfo};
use crate::config::Config;
use crate::context::Context;
use crate::error::{InstallError, Result};
use crate::package::VersionId;
use crate::probe::ProbeRegistry;
use crate::reporter::Reporter;

/// State shared by the operations of a run.
#[derive(Debug)]
pub struct Session {
    /// Side effects and reporting.
    pub ctx: Context,
    /// Packages merged from every loaded document.
    pub catalog: Catalog,
    /// Built-in and catalog-declared probes.
    pub probes: ProbeRegistry,
    config: Config,
}

impl Session {
    /// Create a session with an empty catalog.
    ///
    /// # Errors
    ///
    /// Fails when the target root cannot be made absolute.
    pub fn new(config: &Config, reporter: Arc<dyn Reporter>) -> Result<Self> {
        Ok(Self {
            ctx: Context::new(config, reporter)?,
            catalog: Catalog::new(),
            probes: ProbeRegistry::new(),
            config: config.clone(),
        })
    }

    /// Create a session and load every catalog document.
    ///
    /// # Errors
    ///
    /// Any error of [`Session::new`] or [`Session::load`].
    pub fn open(config: &Config, reporter: Arc<dyn Reporter>) -> Result<Self> {
        let mut session = Self::new(config, reporter)?;
        session.load()?;
        Ok(session)
    }

    /// Configuration the session was created with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Load the installed-state document, the remote index and the host
    /// index, then resolve requirements.
    ///
    /// A missing host index only gives a warning.
    ///
    /// # Errors
    ///
    /// Fails on an unsupported host, an unreadable installed-state document
    /// or remote index, and a requirement naming an unknown package.
    pub fn load(&mut self) -> Result<()> {
        let host = self.ctx.host()?;
        let mut infos = Vec::new();

        let site = self.ctx.site_path().to_path_buf();
        if site.exists() {
            self.ctx.comment(&format!(
                "loading local configuration from {}.",
                site.display()
            ));
            infos.push(self.catalog.load(
                &site.display().to_string(),
                true,
                host,
                &mut self.probes,
            )?);
        }

        let index = self.config.index_url();
        self.ctx.comment(&format!("loading DB from {index}"));
        infos.push(self.catalog.load(&index, false, host, &mut self.probes)?);

        let host_index = self.config.host_index_url(host);
        self.ctx.comment(&format!("loading DB from {host_index}"));
        match self
            .catalog
            .load(&host_index, false, host, &mut self.probes)
        {
            Ok(info) => infos.push(info),
            Err(e) => self.ctx.warning(&format!("no binary index for {host}: {e}")),
        }

        self.catalog.resolve_requirements()?;

        if infos.iter().any(DocumentInfo::update_available) && !self.ctx.dry_run() {
            self.ctx.warning("a new version of installer is available!");
        }
        for msg in infos.iter().filter_map(|i| i.message.as_deref()) {
            self.ctx.info(msg);
        }
        Ok(())
    }

    /// Versions named by `name` or `name:version` arguments.
    ///
    /// # Errors
    ///
    /// Fails on a malformed argument or one not matching a catalog version.
    pub fn select(&self, args: &[String]) -> Result<Vec<VersionId>> {
        args.iter()
            .map(|arg| {
                let spec = PackageSpec::parse(arg).map_err(|e| InstallError::Config(e.to_string()))?;
                self.catalog.select(&spec)
            })
            .collect()
    }

    /// Versions of the configured default package set.
    ///
    /// # Errors
    ///
    /// [`InstallError::Config`] when no default set is configured, otherwise
    /// as [`Session::select`].
    pub fn default_versions(&self) -> Result<Vec<VersionId>> {
        if self.config.default_packages.is_empty() {
            return Err(InstallError::Config(
                "no default package set configured".to_string(),
            ));
        }
        self.select(&self.config.default_packages)
    }

    /// Release the resources of the run.
    pub fn cleanup(&mut self) {
        self.ctx.cleanup();
    }
}
