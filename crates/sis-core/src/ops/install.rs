//! Package installation.
//!
//! [`install`] closes the requested versions over their requirements,
//! tests every probe the closure needs, then installs each version in
//! dependency order. The first failing package aborts the run; packages
//! installed before it stay installed and recorded.

use std::fs;
use std::path::Path;

use sis_schema::{Element, PackageName, SIS_INSTALL_TAG, VersionString, INSTALL_SCRIPT};

use crate::action::Action;
use crate::builder::{self, Builder};
use crate::context::Context;
use crate::downloader::Downloader;
use crate::error::{InstallError, Result, Step};
use crate::fetch;
use crate::package::{VersionId, VersionKind};
use crate::resolver;
use crate::session::Session;
use crate::site;
use crate::unpack;

/// Lines of the build log shown when a step fails.
const LOG_TAIL: usize = 10;

/// File at the root of a source tree giving the installed version.
const VERSION_FILE: &str = "VERSION";

/// Install `requested` and everything they require.
///
/// # Errors
///
/// Fails on a dependency cycle, on failed probes, or with the error of
/// the first package that cannot be installed.
pub fn install(session: &mut Session, requested: &[VersionId]) -> Result<()> {
    let closure = resolver::closure(&session.catalog, requested, session.ctx.force())?;
    if closure.is_empty() {
        session.ctx.info("nothing to install");
        return Ok(());
    }
    let order = resolver::install_order(&session.catalog, &closure)?;

    if !session.ctx.dry_run() {
        let mut probes = Vec::new();
        for v in closure.keys() {
            for &p in session.catalog.version(*v).probes() {
                if !probes.contains(&p) {
                    probes.push(p);
                }
            }
        }
        let failed = session.probes.test_all(&probes, &mut session.ctx)?;
        if !failed.is_empty() {
            return Err(InstallError::ProbesFailed(failed));
        }
        site::init(session.ctx.site_path())?;
    }

    for v in order {
        if session.ctx.dry_run() {
            let name = &session.catalog.get(v.package).name;
            session.ctx.say(&format!("# installing {name}"));
        } else {
            install_version(session, v)?;
        }
    }
    Ok(())
}

/// Install one version and record it in the installed-state document.
///
/// # Errors
///
/// [`InstallError::StepFailed`] when a download, build or install step
/// fails, or the error that interrupted it.
pub fn install_version(session: &mut Session, v: VersionId) -> Result<()> {
    let pack = session.catalog.get(v.package);
    let name = pack.name.clone();
    let tool = pack.tool;
    let version = session.catalog.version(v).clone();

    let installed = match version.kind() {
        VersionKind::Binary { file, checksum, .. } => Some((
            version.number().clone(),
            install_binary(&mut session.ctx, &name, file, checksum.as_deref())?,
        )),
        VersionKind::Source {
            downloader,
            builder,
            ..
        } => install_source(
            &mut session.ctx,
            &name,
            tool,
            downloader.as_ref(),
            builder.as_ref(),
        )?,
    };

    if let Some((number, uninstall)) = installed {
        let pack = session.catalog.get_mut(v.package);
        pack.mark_installed(number, uninstall);
        if !session.ctx.dry_run() {
            site::record_install(session.ctx.site_path(), pack)?;
        }
    }
    Ok(())
}

/// Report a failed step, showing the end of the build log.
fn step_failed(ctx: &mut Context, step: Step, package: &PackageName) -> InstallError {
    ctx.fail();
    let log = ctx.log_location();
    if let Ok(tail) = builder::read_last_lines(&log, LOG_TAIL)
        && !tail.is_empty()
    {
        ctx.error(&format!("last lines of {}:\n{tail}", log.display()));
    }
    InstallError::StepFailed {
        step,
        package: package.clone(),
        log,
    }
}

/// Fetch, build and install a source version.
///
/// Returns the installed version number and the uninstall actions, or
/// `None` for tool packages that are only built.
fn install_source(
    ctx: &mut Context,
    name: &PackageName,
    tool: bool,
    downloader: Option<&Downloader>,
    builder: Option<&Builder>,
) -> Result<Option<(VersionString, Vec<Action>)>> {
    if let (Some(downloader), false) = (downloader, ctx.dry_run()) {
        ctx.check(&format!("downloading {name}"));
        if !downloader.download(name, ctx).inspect_err(|_| ctx.fail())? {
            return Err(step_failed(ctx, Step::Download, name));
        }
        ctx.succeed();
    }

    if let Some(builder) = builder {
        ctx.check(&format!("building {name}"));
        if !builder.build(name, ctx).inspect_err(|_| ctx.fail())? {
            return Err(step_failed(ctx, Step::Build, name));
        }
        ctx.succeed();
    }

    if tool {
        return Ok(None);
    }

    ctx.check(&format!("installing {name}"));
    let uninstall = match builder {
        Some(builder) => builder.install(name, ctx).inspect_err(|_| ctx.fail())?,
        None => Some(Vec::new()),
    };
    let Some(uninstall) = uninstall else {
        return Err(step_failed(ctx, Step::Install, name));
    };
    ctx.succeed();

    let number = source_number(&ctx.build_dir()?.join(name.as_str()));
    Ok(Some((number, uninstall)))
}

/// Version recorded for a source install: the first line of `VERSION`
/// when the tree has one.
fn source_number(tree: &Path) -> VersionString {
    fs::read_to_string(tree.join(VERSION_FILE))
        .ok()
        .and_then(|text| text.lines().next().map(str::trim).map(String::from))
        .filter(|line| !line.is_empty())
        .map_or_else(VersionString::source, VersionString::from)
}

/// Download, unpack and run the install script of a binary version.
///
/// Returns the uninstall actions.
fn install_binary(
    ctx: &mut Context,
    name: &PackageName,
    file: &str,
    checksum: Option<&str>,
) -> Result<Vec<Action>> {
    let file_name = fetch::file_name(file);
    let host = ctx.host()?;

    ctx.comment(&format!("source URL: {file}"));
    ctx.check(&format!("loading {file_name}"));
    let build = ctx.build_dir()?;
    let path = fetch::download(file, &build).and_then(|path| {
        if let Some(expected) = checksum
            && !fetch::verify_checksum(&path, expected)?
        {
            ctx.comment(&format!("checksum of {file_name} is unverifiable"));
        }
        Ok(path)
    });
    let path = path.inspect_err(|_| ctx.fail())?;
    ctx.comment(&format!("local file: {}", path.display()));
    ctx.succeed();

    ctx.check(&format!("unpacking {file_name}"));
    let dir = unpack::unpack(ctx, &path).inspect_err(|_| ctx.fail())?;
    ctx.succeed();

    let actions = read_script(&dir, name, host).inspect_err(|_| ctx.fail())?;

    ctx.check(&format!("installing {file_name}"));
    let uninstall = ctx
        .in_dir(&dir, |ctx| {
            let mut uninstall = Vec::new();
            for action in &actions {
                uninstall.extend(action.perform(ctx)?);
            }
            Ok(uninstall)
        })
        .inspect_err(|_| ctx.fail())?;
    ctx.succeed();
    Ok(uninstall)
}

/// Actions of the install script shipped in an unpacked binary package.
fn read_script(dir: &Path, name: &PackageName, host: sis_schema::HostType) -> Result<Vec<Action>> {
    let bad = |message: &str| InstallError::BadScript {
        package: name.clone(),
        message: message.to_string(),
    };
    let text = fs::read_to_string(dir.join(INSTALL_SCRIPT)).map_err(|_| bad("no install script"))?;
    let root = Element::parse_root(&text, SIS_INSTALL_TAG).map_err(|_| bad("bad script"))?;
    root.children
        .iter()
        .map(|elt| Action::from_element(elt, host).ok_or_else(|| bad("bad action")))
        .collect()
}
