//! Source-only batch mode.
//!
//! Fetches the sources of a closure into the build directory and, on
//! request, writes a Makefile building and installing them in dependency
//! order. Nothing is built or recorded here.

use std::collections::HashSet;
use std::fs;

use crate::catalog::Catalog;
use crate::context::Context;
use crate::error::{InstallError, Result, Step};
use crate::package::{PackageId, VersionId, VersionKind};
use crate::resolver;
use crate::session::Session;

/// Fetch the sources of `requested` and their requirements.
///
/// Packages without a source version are reported and left out.
///
/// # Errors
///
/// Fails without an explicit build directory, on a dependency cycle, or
/// on a failed download.
pub fn install_sources(session: &mut Session, requested: &[VersionId], makefile: bool) -> Result<()> {
    if !session.ctx.has_build_dir() {
        return Err(InstallError::Config(
            "to use -S, you have to specify a directory with -B!".to_string(),
        ));
    }

    let closure = resolver::closure(&session.catalog, requested, session.ctx.force())?;
    let order = resolver::install_order(&session.catalog, &closure)?;

    let mut sources = Vec::with_capacity(order.len());
    for v in order {
        let pack = session.catalog.get(v.package);
        match pack.source() {
            Some(src) => sources.push(src),
            None => session
                .ctx
                .warning(&format!("no source available for {}", pack.name)),
        }
    }

    for &src in &sources {
        let name = session.catalog.get(src.package).name.clone();
        let VersionKind::Source {
            downloader: Some(downloader),
            ..
        } = session.catalog.version(src).kind()
        else {
            continue;
        };
        if session.ctx.dry_run() {
            session.ctx.say(&format!("# downloading {name}"));
            continue;
        }
        session.ctx.check(&format!("downloading {name}"));
        if !downloader
            .download(&name, &mut session.ctx)
            .inspect_err(|_| session.ctx.fail())?
        {
            session.ctx.fail();
            return Err(InstallError::StepFailed {
                step: Step::Download,
                package: name,
                log: session.ctx.log_location(),
            });
        }
        session.ctx.succeed();
    }

    if makefile {
        let text = makefile_text(&session.catalog, &session.ctx, &sources);
        let path = session.ctx.build_dir()?.join("Makefile");
        if session.ctx.dry_run() {
            session.ctx.say(&format!("# writing {}", path.display()));
        } else {
            fs::write(&path, text)?;
            session.ctx.info(&format!("build script written to {}", path.display()));
        }
    }
    Ok(())
}

/// Makefile building `sources`, given in dependency order.
///
/// Each package gets a `<name>-install` target depending on the targets of
/// its requirements present in the same script.
pub fn makefile_text(catalog: &Catalog, ctx: &Context, sources: &[VersionId]) -> String {
    let present: HashSet<PackageId> = sources.iter().map(|v| v.package).collect();
    let target = |id: PackageId| format!("{}-install", catalog.get(id).name);

    let mut out = String::new();
    out.push_str(&format!("top_dir={}\n", ctx.top_dir().display()));
    out.push_str("log=$(PWD)/build.log\n");
    for (key, value) in ctx.vars().filter(|(k, _)| *k != "top_dir") {
        out.push_str(&format!("{key}={value}\n"));
    }

    let all: Vec<String> = sources.iter().map(|v| target(v.package)).collect();
    out.push_str(&format!("\nall: top_dir {}\n", all.join(" ")));
    out.push_str(
        "\ntop_dir:\n\
         \ttest -e \"$(top_dir)\" || mkdir \"$(top_dir)\"\n\
         \techo \"Errors recorded in $(log).\"\n",
    );

    for &v in sources {
        let pack = catalog.get(v.package);
        let reqs: Vec<String> = pack
            .reqs()
            .iter()
            .filter(|r| present.contains(*r))
            .map(|&r| target(r))
            .collect();
        out.push_str(&format!("\n{}: {}\n", target(v.package), reqs.join(" ")));
        if let VersionKind::Source {
            builder: Some(builder),
            ..
        } = catalog.version(v).kind()
        {
            builder.write_make_rules(&pack.name, pack.tool, &mut out);
        }
    }
    out
}
