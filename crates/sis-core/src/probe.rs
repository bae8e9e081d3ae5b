//! Dependency probes.
//!
//! A probe tests whether an external tool or library is available on the
//! host. Probes live in a registry keyed by name, are tested at most once
//! per run, and may require other probes (a library probe needs the
//! compiler of its language).

use std::collections::HashMap;
use std::path::PathBuf;

use sis_schema::Element;

use crate::context::{Context, Redirect};
use crate::error::Result;

/// Index of a probe in its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProbeId(usize);

/// Language of the program compiled by a library probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    /// Compiled with the `cc` probe.
    C,
    /// Compiled with the `c++` probe.
    Cxx,
}

impl Language {
    fn compiler(self) -> &'static str {
        match self {
            Self::C => "cc",
            Self::Cxx => "c++",
        }
    }

    fn source_name(self) -> &'static str {
        match self {
            Self::C => "probe.c",
            Self::Cxx => "probe.cpp",
        }
    }
}

/// What a probe tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeKind {
    /// Succeeds when any of the commands is found on the search path.
    Command {
        /// Candidate executables, in order of preference.
        commands: Vec<String>,
    },
    /// Succeeds when a minimal program including `header` compiles and links.
    ///
    /// `cflags` and `ldflags` are commands printing the flags to use.
    Library {
        /// Header included by the test program.
        header: Option<String>,
        /// Language of the test program.
        lang: Language,
        /// Command printing the compile flags.
        cflags: Option<String>,
        /// Command printing the link flags.
        ldflags: Option<String>,
    },
}

impl ProbeKind {
    fn command(commands: &str) -> Self {
        Self::Command {
            commands: commands
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(String::from)
                .collect(),
        }
    }
}

/// Outcome of a probe in the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    /// Not tested yet.
    Untested,
    /// Tested and available.
    Succeeded,
    /// Tested and missing.
    Failed,
}

/// A registered probe and its state.
#[derive(Debug, Clone)]
pub struct Probe {
    name: String,
    kind: ProbeKind,
    state: ProbeState,
    found: Option<PathBuf>,
}

impl Probe {
    /// Registry name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// What the probe tests.
    pub fn kind(&self) -> &ProbeKind {
        &self.kind
    }

    /// Outcome so far.
    pub fn state(&self) -> ProbeState {
        self.state
    }

    /// Whether the probe ran in this run.
    pub fn tested(&self) -> bool {
        self.state != ProbeState::Untested
    }

    /// Whether the probe ran and succeeded.
    pub fn succeeded(&self) -> bool {
        self.state == ProbeState::Succeeded
    }

    /// Executable found by a successful command probe.
    pub fn found(&self) -> Option<&PathBuf> {
        self.found.as_ref()
    }

    fn message(&self) -> String {
        match self.kind {
            ProbeKind::Command { .. } => format!("command {}", self.name),
            ProbeKind::Library { .. } => format!("library {}", self.name),
        }
    }

    fn help(&self) -> Option<String> {
        match &self.kind {
            ProbeKind::Command { commands } => Some(format!(
                "{} is satisfied if one of the following programs is available: {}",
                self.name,
                commands.join(", ")
            )),
            ProbeKind::Library { .. } => None,
        }
    }
}

/// A probe reference found in a catalog `dep` element.
///
/// Without a kind it names a probe that must already be registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSpec {
    /// Probe name.
    pub name: String,
    /// Definition given by the element, if any.
    pub kind: Option<ProbeKind>,
}

impl ProbeSpec {
    /// Read a `dep` element.
    ///
    /// # Errors
    ///
    /// Describes a missing name or an unknown kind or language.
    pub fn from_element(elt: &Element) -> std::result::Result<Self, String> {
        let name = elt
            .attr("name")
            .filter(|n| !n.is_empty())
            .ok_or("dep without name")?
            .to_string();
        let kind = match elt.attr("type") {
            None => None,
            Some("command") => {
                let commands = elt.attr("commands").unwrap_or(&name);
                Some(ProbeKind::command(commands))
            }
            Some("library") => {
                let lang = match elt.attr("lang").unwrap_or("c") {
                    "c" => Language::C,
                    "c++" => Language::Cxx,
                    other => return Err(format!("unknown language {other} in dep {name}")),
                };
                Some(ProbeKind::Library {
                    header: elt.attr("header").map(String::from),
                    lang,
                    cflags: elt.attr("cflags").map(String::from),
                    ldflags: elt.attr("ldflags").map(String::from),
                })
            }
            Some(other) => return Err(format!("unknown dep type {other} for {name}")),
        };
        Ok(Self { name, kind })
    }
}

/// Probes every run starts with.
const BUILTINS: [(&str, &str); 11] = [
    ("cmake", "cmake"),
    ("mercurial", "hg"),
    ("git", "git"),
    ("cc", "cc,gcc"),
    ("c++", "c++,g++"),
    ("make", "make"),
    ("tar", "tar"),
    ("unzip", "unzip"),
    ("unrar", "unrar"),
    ("gzip", "gzip"),
    ("bzip2", "bzip2"),
];

/// Probes known to the run, by name.
#[derive(Debug, Clone)]
pub struct ProbeRegistry {
    probes: Vec<Probe>,
    by_name: HashMap<String, ProbeId>,
}

impl Default for ProbeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbeRegistry {
    /// Registry seeded with the built-in command probes.
    pub fn new() -> Self {
        let mut registry = Self {
            probes: Vec::new(),
            by_name: HashMap::new(),
        };
        for (name, commands) in BUILTINS {
            registry.insert(name, ProbeKind::command(commands));
        }
        registry
    }

    fn insert(&mut self, name: &str, kind: ProbeKind) -> ProbeId {
        let id = ProbeId(self.probes.len());
        self.probes.push(Probe {
            name: name.to_string(),
            kind,
            state: ProbeState::Untested,
            found: None,
        });
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Id of the probe named `name`.
    pub fn get(&self, name: &str) -> Option<ProbeId> {
        self.by_name.get(name).copied()
    }

    /// Whether a probe named `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Probe with id `id`.
    pub fn probe(&self, id: ProbeId) -> &Probe {
        &self.probes[id.0]
    }

    /// Return the probe named by `spec`, registering it on first use.
    ///
    /// Returns `None` when the name is unknown and `spec` has no kind.
    pub fn declare(&mut self, spec: &ProbeSpec) -> Option<ProbeId> {
        if let Some(id) = self.get(&spec.name) {
            return Some(id);
        }
        spec.kind.clone().map(|kind| self.insert(&spec.name, kind))
    }

    /// Probes `id` directly requires.
    pub fn requires(&self, id: ProbeId) -> Vec<ProbeId> {
        match &self.probe(id).kind {
            ProbeKind::Library { lang, .. } => self.get(lang.compiler()).into_iter().collect(),
            ProbeKind::Command { .. } => Vec::new(),
        }
    }

    /// `ids` with every transitively required probe, requirements first,
    /// without duplicates.
    pub fn closure(&self, ids: &[ProbeId]) -> Vec<ProbeId> {
        fn visit(reg: &ProbeRegistry, id: ProbeId, out: &mut Vec<ProbeId>) {
            if out.contains(&id) {
                return;
            }
            for req in reg.requires(id) {
                visit(reg, req, out);
            }
            out.push(id);
        }

        let mut out = Vec::new();
        for &id in ids {
            visit(self, id, &mut out);
        }
        out
    }

    /// Test a probe once and return whether it succeeded.
    ///
    /// # Errors
    ///
    /// Fails when a test command cannot be spawned.
    pub fn test(&mut self, id: ProbeId, ctx: &mut Context) -> Result<bool> {
        if self.probe(id).tested() {
            return Ok(self.probe(id).succeeded());
        }
        for req in self.requires(id) {
            self.test(req, ctx)?;
        }

        let probe = self.probe(id).clone();
        ctx.check(&format!("testing {}", probe.message()));
        let (ok, found) = match &probe.kind {
            ProbeKind::Command { commands } => {
                let found = find_command(commands, ctx)?;
                (found.is_some(), found)
            }
            ProbeKind::Library {
                header,
                lang,
                cflags,
                ldflags,
            } => {
                let compiler = self
                    .get(lang.compiler())
                    .and_then(|c| self.probe(c).found.clone());
                let ok = match compiler {
                    Some(compiler) => test_library(
                        ctx,
                        &probe.name,
                        &compiler,
                        header.as_deref(),
                        *lang,
                        cflags.as_deref(),
                        ldflags.as_deref(),
                    )?,
                    None => false,
                };
                (ok, None)
            }
        };

        let entry = &mut self.probes[id.0];
        entry.state = if ok {
            ProbeState::Succeeded
        } else {
            ProbeState::Failed
        };
        entry.found = found;
        if ok {
            ctx.succeed();
        } else {
            ctx.fail();
            if let Some(help) = probe.help() {
                ctx.comment(&help);
            }
        }
        Ok(ok)
    }

    /// Test every probe of `ids` and their requirements.
    ///
    /// Returns the names of the failed probes.
    ///
    /// # Errors
    ///
    /// As [`ProbeRegistry::test`].
    pub fn test_all(&mut self, ids: &[ProbeId], ctx: &mut Context) -> Result<Vec<String>> {
        let mut failed = Vec::new();
        for id in self.closure(ids) {
            if !self.test(id, ctx)? {
                failed.push(self.probe(id).name.clone());
            }
        }
        Ok(failed)
    }
}

fn find_command(commands: &[String], ctx: &Context) -> Result<Option<PathBuf>> {
    let paths = ctx.search_path();
    let cwd = ctx.cwd()?;
    for cmd in commands {
        ctx.comment(&format!("\tlook for executable {cmd}"));
        if let Ok(path) = which::which_in(cmd, paths.as_ref(), &cwd) {
            ctx.comment(&format!("\tfound {}", path.display()));
            return Ok(Some(path));
        }
    }
    Ok(None)
}

fn test_library(
    ctx: &mut Context,
    name: &str,
    compiler: &std::path::Path,
    header: Option<&str>,
    lang: Language,
    cflags: Option<&str>,
    ldflags: Option<&str>,
) -> Result<bool> {
    let mut flags = Vec::new();
    for (label, cmd) in [("cflags", cflags), ("ldflags", ldflags)] {
        let Some(cmd) = cmd else {
            flags.push(String::new());
            continue;
        };
        match ctx.result_of(cmd)? {
            Some(out) => {
                let out = out.trim().to_string();
                ctx.log(&format!("{label} = {out}\n"));
                flags.push(out);
            }
            None => return Ok(false),
        }
    }
    let cflags = &flags[0];
    let ldflags = if flags[1].is_empty() {
        format!("-l{}", name.strip_prefix("lib").unwrap_or(name))
    } else {
        flags[1].clone()
    };

    let dir = tempfile::tempdir()?;
    let source = dir.path().join(lang.source_name());
    let output = dir.path().join("probe.out");
    let mut program = String::new();
    if let Some(header) = header {
        program.push_str(&format!("#include <{header}>\n"));
    }
    program.push_str("int main(void) { return 0; }\n");
    std::fs::write(&source, program)?;

    let cmd = format!(
        "{} {} -o {} {cflags} {ldflags}",
        compiler.display(),
        source.display(),
        output.display()
    );
    ctx.log(&format!("running {cmd}\n"));
    ctx.execute(&cmd, Redirect::Log)
}
