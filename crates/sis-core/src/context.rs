//! Execution context.
//!
//! The `Context` mediates every side effect of a run: child processes, the
//! scratch build directory, the build log, dry-run recording, user
//! confirmation and `$(NAME)` substitution. It is created once per run and
//! passed explicitly to every component.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use regex::{Captures, Regex};
use sis_schema::HostType;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::config::{Config, DEFAULT_LOG};
use crate::error::{InstallError, Result};
use crate::reporter::Reporter;

/// Where the output of a child process goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirect {
    /// Share the terminal.
    Inherit,
    /// Append stdout and stderr to the build log.
    Log,
    /// Discard everything.
    Null,
}

/// Side effects of a run, see the module documentation.
pub struct Context {
    reporter: Arc<dyn Reporter>,
    env: BTreeMap<String, String>,
    var_re: Regex,

    verbose: bool,
    dry_run: bool,
    force: bool,
    phony: bool,
    debug: bool,

    top_dir: PathBuf,
    site_path: PathBuf,
    host: Option<HostType>,
    search_path: Option<OsString>,

    build_dir: Option<PathBuf>,
    scratch: Option<TempDir>,

    log_path: Option<PathBuf>,
    /// Directory receiving an allocated log, the process directory if unset.
    log_dir: Option<PathBuf>,
    log_allocated: bool,
    log_file: Option<File>,

    /// Logical working directories, innermost last.
    dirs: Vec<PathBuf>,
    recorded: Vec<String>,
    errors: usize,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("top_dir", &self.top_dir)
            .field("dry_run", &self.dry_run)
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Context for `config`, reporting through `reporter`.
    ///
    /// # Errors
    ///
    /// Fails when the target root or the build directory cannot be made
    /// absolute.
    pub fn new(config: &Config, reporter: Arc<dyn Reporter>) -> Result<Self> {
        let var_re = Regex::new(r"\$\$|\$\(([A-Za-z0-9_]+)\)")
            .map_err(|e| InstallError::Config(e.to_string()))?;
        let top_dir = std::path::absolute(&config.top_dir)?;
        let site_path = top_dir.join(sis_schema::INSTALL_SCRIPT);
        let build_dir = match &config.build_dir {
            Some(dir) => Some(std::path::absolute(dir)?),
            None => None,
        };

        let mut env = BTreeMap::new();
        env.insert("top_dir".to_string(), top_dir.display().to_string());

        Ok(Self {
            reporter,
            env,
            var_re,
            verbose: config.verbose,
            dry_run: config.dry_run,
            force: config.force,
            phony: config.phony,
            debug: config.debug,
            top_dir,
            site_path,
            host: None,
            search_path: None,
            build_dir,
            scratch: None,
            log_path: config.log_path.clone(),
            log_dir: None,
            log_allocated: false,
            log_file: None,
            dirs: Vec::new(),
            recorded: Vec::new(),
            errors: 0,
        })
    }

    /// Where status lines go.
    pub fn reporter(&self) -> &dyn Reporter {
        self.reporter.as_ref()
    }

    /// Whether verbose detail lines are shown.
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Whether commands are only recorded.
    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Whether installed packages are reinstalled on request.
    pub fn force(&self) -> bool {
        self.force
    }

    /// Batch mode, see [`Config::phony`].
    pub fn phony(&self) -> bool {
        self.phony
    }

    /// Absolute target root.
    pub fn top_dir(&self) -> &Path {
        &self.top_dir
    }

    /// Location of the installed-state document.
    pub fn site_path(&self) -> &Path {
        &self.site_path
    }

    /// Number of errors reported so far.
    pub fn errors(&self) -> usize {
        self.errors
    }

    /// Commands recorded instead of run in dry-run mode.
    pub fn recorded_commands(&self) -> &[String] {
        &self.recorded
    }

    // ---------------------------------------------------------------------
    // Host and environment
    // ---------------------------------------------------------------------

    /// Host configuration, detected on first use unless overridden.
    ///
    /// # Errors
    ///
    /// [`InstallError::UnsupportedHost`] when the running platform has no
    /// host configuration.
    pub fn host(&self) -> Result<HostType> {
        match self.host {
            Some(host) => Ok(host),
            None => HostType::current().ok_or_else(|| {
                InstallError::UnsupportedHost(format!(
                    "{}/{}",
                    std::env::consts::OS,
                    std::env::consts::ARCH
                ))
            }),
        }
    }

    /// Override the detected host.
    pub fn set_host(&mut self, host: HostType) {
        self.host = Some(host);
    }

    /// Replace the executable search path used by probes and child processes.
    pub fn set_search_path(&mut self, path: impl Into<OsString>) {
        self.search_path = Some(path.into());
    }

    /// Executable search path, `PATH` unless replaced.
    pub fn search_path(&self) -> Option<OsString> {
        self.search_path
            .clone()
            .or_else(|| std::env::var_os("PATH"))
    }

    /// Value of substitution variable `name`.
    pub fn var(&self, name: &str) -> Option<&str> {
        self.env.get(name).map(String::as_str)
    }

    /// Define substitution variable `name`.
    pub fn set_var(&mut self, name: &str, value: &str) {
        self.env.insert(name.to_string(), value.to_string());
    }

    /// Every substitution variable, sorted by name.
    pub fn vars(&self) -> impl Iterator<Item = (&str, &str)> {
        self.env.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Substitute `$(NAME)` with the value of `NAME` (empty when unknown)
    /// and `$$` with a single `$`.
    pub fn eval(&self, text: &str) -> String {
        self.var_re
            .replace_all(text, |caps: &Captures<'_>| match caps.get(1) {
                Some(name) => self.var(name.as_str()).unwrap_or_default().to_string(),
                None => "$".to_string(),
            })
            .into_owned()
    }

    // ---------------------------------------------------------------------
    // Directories
    // ---------------------------------------------------------------------

    /// Build directory, created on first use.
    ///
    /// A unique scratch directory is allocated when none was configured.
    ///
    /// # Errors
    ///
    /// Fails when the directory cannot be created.
    pub fn build_dir(&mut self) -> Result<PathBuf> {
        if let Some(dir) = &self.build_dir {
            fs::create_dir_all(dir)?;
            return Ok(dir.clone());
        }
        if self.scratch.is_none() {
            let dir = tempfile::Builder::new().suffix("-sis").tempdir()?;
            debug!("allocated build directory {}", dir.path().display());
            self.scratch = Some(dir);
        }
        match &self.scratch {
            Some(dir) => Ok(dir.path().to_path_buf()),
            None => Err(InstallError::Config("no build directory".to_string())),
        }
    }

    /// Whether a build directory was given explicitly.
    pub fn has_build_dir(&self) -> bool {
        self.build_dir.is_some()
    }

    /// Current logical working directory.
    ///
    /// # Errors
    ///
    /// Fails when no directory was entered and the process directory is
    /// unreadable.
    pub fn cwd(&self) -> Result<PathBuf> {
        match self.dirs.last() {
            Some(dir) => Ok(dir.clone()),
            None => Ok(std::env::current_dir()?),
        }
    }

    /// Run `f` with `path` as working directory. The previous directory is
    /// restored whatever `f` returns.
    ///
    /// # Errors
    ///
    /// Returns the error of `f`. A relative `path` also fails like
    /// [`Context::cwd`].
    pub fn in_dir<T>(
        &mut self,
        path: &Path,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd()?.join(path)
        };
        self.dirs.push(path);
        let result = f(self);
        self.dirs.pop();
        result
    }

    // ---------------------------------------------------------------------
    // Log
    // ---------------------------------------------------------------------

    /// Path of the build log, once opened.
    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    /// Log path to show in error messages, opening the log if needed.
    pub fn log_location(&mut self) -> PathBuf {
        self.open_log();
        self.log_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG))
    }

    fn open_log(&mut self) -> Option<&mut File> {
        if self.log_file.is_none() {
            let path = match &self.log_path {
                Some(path) => path.clone(),
                None => {
                    let dir = self
                        .log_dir
                        .clone()
                        .or_else(|| std::env::current_dir().ok())
                        .unwrap_or_default();
                    self.log_allocated = true;
                    dir.join(DEFAULT_LOG)
                }
            };
            match File::create(&path) {
                Ok(mut file) => {
                    let header = format!(
                        "=== created by sis-install {} ({}) ===\n\n",
                        env!("CARGO_PKG_VERSION"),
                        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
                    );
                    if let Err(e) = file.write_all(header.as_bytes()) {
                        warn!("cannot write to {}: {e}", path.display());
                    }
                    self.log_file = Some(file);
                }
                Err(e) => {
                    self.log_allocated = false;
                    self.warning(&format!(
                        "cannot log to {}: {e}. Falling back to stderr.",
                        path.display()
                    ));
                }
            }
            self.log_path = Some(path);
        }
        self.log_file.as_mut()
    }

    /// Append a message to the build log.
    pub fn log(&mut self, msg: &str) {
        match self.open_log() {
            Some(file) => {
                if let Err(e) = file.write_all(msg.as_bytes()).and_then(|()| file.flush()) {
                    warn!("cannot write to build log: {e}");
                }
            }
            None => eprint!("{msg}"),
        }
    }

    fn log_stdio(&mut self) -> (Stdio, Stdio) {
        let cloned = self
            .open_log()
            .and_then(|f| Some((f.try_clone().ok()?, f.try_clone().ok()?)));
        match cloned {
            Some((out, err)) => (Stdio::from(out), Stdio::from(err)),
            None => (Stdio::inherit(), Stdio::inherit()),
        }
    }

    // ---------------------------------------------------------------------
    // Processes
    // ---------------------------------------------------------------------

    fn shell(&self, cmd: &str) -> Result<Command> {
        #[cfg(windows)]
        let mut command = {
            let mut c = Command::new("cmd");
            c.args(["/C", cmd]);
            c
        };
        #[cfg(not(windows))]
        let mut command = {
            let mut c = Command::new("/bin/sh");
            c.args(["-c", cmd]);
            c
        };
        command.current_dir(self.cwd()?);
        if let Some(path) = &self.search_path {
            command.env("PATH", path);
        }
        Ok(command)
    }

    /// Run `cmd` through the shell in the current logical directory.
    ///
    /// Returns whether the command succeeded. In dry-run mode the command
    /// is only recorded and reported as successful.
    ///
    /// # Errors
    ///
    /// Fails when the process cannot be spawned, e.g. when the working
    /// directory does not exist.
    pub fn execute(&mut self, cmd: &str, redirect: Redirect) -> Result<bool> {
        if self.dry_run {
            self.record(cmd);
            return Ok(true);
        }
        debug!(command = cmd, "executing");
        let mut command = self.shell(cmd)?;
        match redirect {
            Redirect::Inherit => {}
            Redirect::Log => {
                let (out, err) = self.log_stdio();
                command.stdout(out).stderr(err);
            }
            Redirect::Null => {
                command.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }
        let status = command.status()?;
        Ok(status.success())
    }

    /// Run `cmd` and capture its standard output.
    ///
    /// Returns `None` when the command fails; its error output goes to the
    /// build log. In dry-run mode the command is recorded and yields an
    /// empty output.
    ///
    /// # Errors
    ///
    /// Fails when the process cannot be spawned.
    pub fn result_of(&mut self, cmd: &str) -> Result<Option<String>> {
        if self.dry_run {
            self.record(cmd);
            return Ok(Some(String::new()));
        }
        debug!(command = cmd, "capturing");
        let mut command = self.shell(cmd)?;
        let (_, err) = self.log_stdio();
        let output = command.stderr(err).stdin(Stdio::null()).output()?;
        if output.status.success() {
            Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
        } else {
            self.log(&format!("command '{cmd}' failed: {}\n", output.status));
            Ok(None)
        }
    }

    fn record(&mut self, cmd: &str) {
        if !self.phony {
            self.reporter.say(cmd);
        }
        self.recorded.push(cmd.to_string());
    }

    // ---------------------------------------------------------------------
    // Status lines
    // ---------------------------------------------------------------------

    /// Plain output line.
    pub fn say(&self, msg: &str) {
        if !self.phony {
            self.reporter.say(msg);
        }
    }

    /// Informational line.
    pub fn info(&self, msg: &str) {
        info!("{msg}");
        if !self.phony {
            self.reporter.info(msg);
        }
    }

    /// Warning line; does not count as an error.
    pub fn warning(&self, msg: &str) {
        warn!("{msg}");
        if !self.phony {
            self.reporter.warning(msg);
        }
    }

    /// Report an error; the log is kept at cleanup once any error occurred.
    pub fn error(&mut self, msg: &str) {
        self.errors += 1;
        tracing::error!("{msg}");
        if !self.phony {
            self.reporter.error(msg);
        }
    }

    /// Open a status line, closed by [`Context::succeed`] or [`Context::fail`].
    pub fn check(&self, msg: &str) {
        if !self.phony {
            self.reporter.check(msg);
        }
    }

    /// Close the status line as successful.
    pub fn succeed(&self) {
        if !self.phony {
            self.reporter.succeed();
        }
    }

    /// Close the status line as failed.
    pub fn fail(&self) {
        if !self.phony {
            self.reporter.fail();
        }
    }

    /// Verbose detail line.
    pub fn comment(&self, msg: &str) {
        debug!("{msg}");
        if self.verbose && !self.phony {
            self.reporter.comment(msg);
        }
    }

    /// Ask a yes/no question. Batch mode always answers no.
    pub fn ask_yes_no(&self, question: &str) -> bool {
        if self.phony {
            return false;
        }
        self.reporter.confirm(question)
    }

    /// Release run resources: the scratch directory is removed unless in
    /// debug mode, an allocated log is removed when no error occurred.
    pub fn cleanup(&mut self) {
        if let Some(dir) = self.scratch.take() {
            if self.debug {
                let kept = dir.keep();
                info!("keeping build directory {}", kept.display());
            } else if let Err(e) = dir.close() {
                warn!("cannot remove build directory: {e}");
            }
        }
        self.log_file = None;
        if self.log_allocated && self.errors == 0 {
            if let Some(path) = &self.log_path {
                if let Err(e) = fs::remove_file(path) {
                    warn!("cannot remove {}: {e}", path.display());
                }
            }
            self.log_allocated = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::{NullReporter, RecordingReporter};
    use tempfile::tempdir;

    fn context(top: &Path) -> Context {
        let config = Config {
            top_dir: top.to_path_buf(),
            log_path: Some(top.join("test.log")),
            ..Config::default()
        };
        Context::new(&config, Arc::new(NullReporter)).unwrap()
    }

    #[test]
    fn test_eval_substitution() {
        let tmp = tempdir().unwrap();
        let mut ctx = context(tmp.path());
        ctx.set_var("prefix", "/opt/sis");

        assert_eq!(ctx.eval("--prefix=$(prefix)"), "--prefix=/opt/sis");
        assert_eq!(ctx.eval("$(unknown)x"), "x");
        assert_eq!(ctx.eval("cost $$5"), "cost $5");
        assert_eq!(ctx.eval("$$(prefix)"), "$(prefix)");
        assert_eq!(ctx.eval("$(prefix)/$(prefix)"), "/opt/sis//opt/sis");
        assert_eq!(
            ctx.eval("$(top_dir)"),
            std::path::absolute(tmp.path()).unwrap().display().to_string()
        );
    }

    #[test]
    fn test_in_dir_restores_on_error() {
        let tmp = tempdir().unwrap();
        let mut ctx = context(tmp.path());
        let before = ctx.cwd().unwrap();

        let res: Result<()> = ctx.in_dir(tmp.path(), |ctx| {
            assert_eq!(ctx.cwd().unwrap(), tmp.path());
            Err(InstallError::Aborted("boom".to_string()))
        });
        assert!(res.is_err());
        assert_eq!(ctx.cwd().unwrap(), before);
    }

    #[test]
    fn test_dry_run_records_commands() {
        let tmp = tempdir().unwrap();
        let rec = Arc::new(RecordingReporter::new());
        let config = Config {
            top_dir: tmp.path().to_path_buf(),
            dry_run: true,
            ..Config::default()
        };
        let mut ctx = Context::new(&config, rec.clone()).unwrap();

        assert!(ctx.execute("false", Redirect::Log).unwrap());
        assert_eq!(ctx.result_of("echo hello").unwrap(), Some(String::new()));
        assert_eq!(ctx.recorded_commands(), ["false", "echo hello"]);
        assert!(rec.contains("say: false"));
        assert!(ctx.log_path().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_execute_in_dir() {
        let tmp = tempdir().unwrap();
        let mut ctx = context(tmp.path());
        let sub = tmp.path().join("sub");
        fs::create_dir(&sub).unwrap();

        let ok = ctx
            .in_dir(&sub, |ctx| ctx.execute("touch marker", Redirect::Log))
            .unwrap();
        assert!(ok);
        assert!(sub.join("marker").exists());
        assert!(!ctx.execute("exit 3", Redirect::Null).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_result_of() {
        let tmp = tempdir().unwrap();
        let mut ctx = context(tmp.path());
        assert_eq!(
            ctx.result_of("printf hi").unwrap().as_deref().map(str::trim),
            Some("hi")
        );
        assert_eq!(ctx.result_of("exit 1").unwrap(), None);
        let log = fs::read_to_string(tmp.path().join("test.log")).unwrap();
        assert!(log.starts_with("=== created by sis-install"));
        assert!(log.contains("command 'exit 1' failed"));
    }

    #[test]
    fn test_phony_declines_and_counts_errors() {
        let tmp = tempdir().unwrap();
        let rec = Arc::new(RecordingReporter::answering(true));
        let config = Config {
            top_dir: tmp.path().to_path_buf(),
            phony: true,
            ..Config::default()
        };
        let mut ctx = Context::new(&config, rec.clone()).unwrap();
        assert!(!ctx.ask_yes_no("proceed?"));
        ctx.error("bad");
        assert_eq!(ctx.errors(), 1);
        assert!(rec.lines().is_empty());
    }

    #[test]
    fn test_cleanup_removes_scratch() {
        let tmp = tempdir().unwrap();
        let mut ctx = context(tmp.path());
        let build = ctx.build_dir().unwrap();
        assert!(build.is_dir());
        assert_eq!(ctx.build_dir().unwrap(), build);
        ctx.cleanup();
        assert!(!build.exists());
    }

    fn allocated_log_context(dir: &Path) -> Context {
        let config = Config {
            top_dir: dir.join("top"),
            ..Config::default()
        };
        let mut ctx = Context::new(&config, Arc::new(NullReporter)).unwrap();
        ctx.log_dir = Some(dir.to_path_buf());
        ctx
    }

    #[test]
    fn test_allocated_log_removed_after_clean_run() {
        let tmp = tempdir().unwrap();
        let mut ctx = allocated_log_context(tmp.path());
        ctx.log("building\n");
        let log = tmp.path().join(DEFAULT_LOG);
        assert_eq!(ctx.log_path(), Some(log.as_path()));
        assert!(log.is_file());

        ctx.cleanup();
        assert!(!log.exists());
    }

    #[test]
    fn test_allocated_log_kept_after_error() {
        let tmp = tempdir().unwrap();
        let mut ctx = allocated_log_context(tmp.path());
        ctx.log("building\n");
        ctx.error("build failed");

        ctx.cleanup();
        let log = fs::read_to_string(tmp.path().join(DEFAULT_LOG)).unwrap();
        assert!(log.contains("building"));
    }

    #[test]
    fn test_explicit_log_survives_cleanup() {
        let tmp = tempdir().unwrap();
        let mut ctx = context(tmp.path());
        ctx.log("building\n");
        ctx.cleanup();
        assert!(tmp.path().join("test.log").is_file());
    }

    #[test]
    fn test_explicit_build_dir_survives_cleanup() {
        let tmp = tempdir().unwrap();
        let config = Config {
            top_dir: tmp.path().to_path_buf(),
            build_dir: Some(tmp.path().join("build")),
            ..Config::default()
        };
        let mut ctx = Context::new(&config, Arc::new(NullReporter)).unwrap();
        assert!(ctx.has_build_dir());
        let build = ctx.build_dir().unwrap();
        ctx.cleanup();
        assert!(build.is_dir());
    }
}
