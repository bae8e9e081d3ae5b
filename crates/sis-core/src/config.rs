//! Run configuration.
//!
//! `Config` carries every option the command line feeds the engine. Values
//! are seeded from `SIS_*` environment variables and then overridden by
//! explicit flags.

use std::path::PathBuf;

use sis_schema::{HostType, INSTALL_SCRIPT};

/// Catalog location used when neither `--base` nor `SIS_BASE_URL` is set.
pub const DEFAULT_BASE_URL: &str = "https://sis.irit.fr/sis";

/// Name of the log file allocated in the working directory.
pub const DEFAULT_LOG: &str = "build.log";

/// Options of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Catalog base URL; the remote index is `<base>/index.xml`.
    pub base_url: String,
    /// Target root receiving installed files and the installed-state document.
    pub top_dir: PathBuf,
    /// Explicit build directory; a scratch directory is allocated when absent.
    pub build_dir: Option<PathBuf>,
    /// Explicit log file; `build.log` in the working directory when absent.
    pub log_path: Option<PathBuf>,
    /// Print what would be done instead of doing it.
    pub dry_run: bool,
    /// Show verbose detail lines.
    pub verbose: bool,
    /// Reinstall requested packages even when installed.
    pub force: bool,
    /// Batch mode: no status lines and every question answered with no.
    pub phony: bool,
    /// Keep the scratch build directory at exit.
    pub debug: bool,
    /// Packages installed by `--default`.
    pub default_packages: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            top_dir: PathBuf::from("."),
            build_dir: None,
            log_path: None,
            dry_run: false,
            verbose: false,
            force: false,
            phony: false,
            debug: false,
            default_packages: Vec::new(),
        }
    }
}

impl Config {
    /// Configuration seeded from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Configuration seeded from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(base) = lookup("SIS_BASE_URL").filter(|s| !s.is_empty()) {
            config.base_url = base;
        }
        if let Some(top) = lookup("SIS_TOP").filter(|s| !s.is_empty()) {
            config.top_dir = PathBuf::from(top);
        }
        config.build_dir = lookup("SIS_BUILD_DIR")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);
        config.log_path = lookup("SIS_LOG").filter(|s| !s.is_empty()).map(PathBuf::from);
        if let Some(default) = lookup("SIS_DEFAULT") {
            config.default_packages = default
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        config.debug = lookup("SIS_DEBUG").is_some_and(|v| is_truthy(&v));
        config.phony = lookup("SIS_PHONY").is_some_and(|v| is_truthy(&v));
        config
    }

    /// Path of the installed-state document.
    pub fn site_path(&self) -> PathBuf {
        self.top_dir.join(INSTALL_SCRIPT)
    }

    /// URL of the remote index.
    pub fn index_url(&self) -> String {
        format!("{}/index.xml", self.base_url.trim_end_matches('/'))
    }

    /// URL of the host-specific binary index.
    pub fn host_index_url(&self, host: HostType) -> String {
        format!("{}/{host}/index.xml", self.base_url.trim_end_matches('/'))
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("SIS_BASE_URL", "file:///srv/sis/"),
            ("SIS_TOP", "/opt/sis"),
            ("SIS_DEFAULT", "gel, elm,,otawa"),
            ("SIS_DEBUG", "yes"),
            ("SIS_LOG", ""),
        ]
        .into_iter()
        .collect();
        let config = Config::from_lookup(|k| vars.get(k).map(|v| (*v).to_string()));

        assert_eq!(config.base_url, "file:///srv/sis/");
        assert_eq!(config.top_dir, PathBuf::from("/opt/sis"));
        assert_eq!(config.default_packages, vec!["gel", "elm", "otawa"]);
        assert!(config.debug);
        assert!(!config.phony);
        assert_eq!(config.log_path, None);
        assert_eq!(config.build_dir, None);
    }

    #[test]
    fn test_derived_locations() {
        let config = Config {
            base_url: "http://host/sis/".to_string(),
            top_dir: PathBuf::from("/opt/sis"),
            ..Config::default()
        };
        assert_eq!(config.index_url(), "http://host/sis/index.xml");
        assert_eq!(
            config.host_index_url(HostType::LinuxX86_64),
            "http://host/sis/linux-x86_64/index.xml"
        );
        assert_eq!(config.site_path(), PathBuf::from("/opt/sis/install.xml"));
    }
}
