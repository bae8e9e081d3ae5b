//! End-to-end scenarios: catalog documents on disk, installation into a
//! temporary target root, then removal.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sis_core::{Config, InstallError, RecordingReporter, Session, fetch, ops};
use sis_schema::HostType;
use tempfile::{TempDir, tempdir};

struct Fixture {
    tmp: TempDir,
}

impl Fixture {
    fn new(index: &str) -> Self {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("index.xml"), index).unwrap();
        Self { tmp }
    }

    fn base(&self) -> &Path {
        self.tmp.path()
    }

    fn top(&self) -> PathBuf {
        self.base().join("top")
    }

    fn host_index(&self, text: &str) {
        let dir = self.base().join("linux-x86_64");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("index.xml"), text).unwrap();
    }

    fn config(&self) -> Config {
        Config {
            base_url: self.base().display().to_string(),
            top_dir: self.top(),
            build_dir: Some(self.base().join("build")),
            log_path: Some(self.base().join("build.log")),
            ..Config::default()
        }
    }

    fn session(&self, config: &Config, rec: &Arc<RecordingReporter>) -> Session {
        let mut session = Session::new(config, rec.clone()).unwrap();
        session.ctx.set_host(HostType::LinuxX86_64);
        session.load().unwrap();
        session
    }

    fn site(&self) -> String {
        fs::read_to_string(self.top().join("install.xml")).unwrap_or_default()
    }
}

fn install(session: &mut Session, names: &[&str]) -> sis_core::Result<()> {
    let names: Vec<String> = names.iter().map(ToString::to_string).collect();
    let versions = session.select(&names)?;
    ops::install(session, &versions)
}

/// Lines of `kind` recorded by the reporter, prefix removed.
fn recorded(rec: &RecordingReporter, kind: &str) -> Vec<String> {
    rec.lines()
        .into_iter()
        .filter_map(|l| l.strip_prefix(kind).map(String::from))
        .collect()
}

const CHAIN: &str = r#"<sis-extend>
  <package id="a"><req name="b"/><build/></package>
  <package id="b"><req name="c"/><build/></package>
  <package id="c"><build/></package>
</sis-extend>"#;

#[test]
fn test_chain_installs_in_dependency_order() {
    let fx = Fixture::new(CHAIN);
    let rec = Arc::new(RecordingReporter::new());
    let mut session = fx.session(&fx.config(), &rec);

    install(&mut session, &["a"]).unwrap();
    assert_eq!(
        recorded(&rec, "check: "),
        vec!["installing c", "installing b", "installing a"]
    );

    let site = fx.site();
    for name in ["a", "b", "c"] {
        assert!(site.contains(&format!("id=\"{name}\"")), "{site}");
    }
    assert!(session.catalog.iter().all(|p| p.installed));
}

#[test]
fn test_dry_run_plans_without_side_effects() {
    let fx = Fixture::new(CHAIN);
    let rec = Arc::new(RecordingReporter::new());
    let config = Config {
        dry_run: true,
        ..fx.config()
    };
    let mut session = fx.session(&config, &rec);

    install(&mut session, &["a"]).unwrap();
    assert_eq!(
        recorded(&rec, "say: "),
        vec!["# installing c", "# installing b", "# installing a"]
    );
    assert!(!fx.top().join("install.xml").exists());
}

#[test]
fn test_installed_packages_are_skipped() {
    let fx = Fixture::new(CHAIN);
    let rec = Arc::new(RecordingReporter::new());
    let mut session = fx.session(&fx.config(), &rec);
    install(&mut session, &["c"]).unwrap();

    // a new run sees c through the installed-state document
    let rec = Arc::new(RecordingReporter::new());
    let mut session = fx.session(&fx.config(), &rec);
    install(&mut session, &["c"]).unwrap();
    assert!(rec.contains("info: nothing to install"));

    install(&mut session, &["b"]).unwrap();
    assert_eq!(recorded(&rec, "check: "), vec!["installing b"]);

    // forcing reinstalls only what was asked for
    let rec = Arc::new(RecordingReporter::new());
    let config = Config {
        force: true,
        ..fx.config()
    };
    let mut session = fx.session(&config, &rec);
    install(&mut session, &["b"]).unwrap();
    assert_eq!(recorded(&rec, "check: "), vec!["installing b"]);
}

#[test]
fn test_cycle_is_reported() {
    let fx = Fixture::new(
        r#"<sis-extend>
  <package id="a"><req name="b"/><build/></package>
  <package id="b"><req name="a"/><build/></package>
</sis-extend>"#,
    );
    let rec = Arc::new(RecordingReporter::new());
    let mut session = fx.session(&fx.config(), &rec);
    let err = install(&mut session, &["a"]).unwrap_err();
    assert!(matches!(err, InstallError::Cycle(_)), "{err}");
    assert!(!fx.top().join("install.xml").exists());
}

#[test]
fn test_unknown_requirement_is_fatal_at_load() {
    let fx = Fixture::new(
        r#"<sis-extend><package id="a"><req name="ghost"/></package></sis-extend>"#,
    );
    let mut session = Session::new(&fx.config(), Arc::new(RecordingReporter::new())).unwrap();
    session.ctx.set_host(HostType::LinuxX86_64);
    let err = session.load().unwrap_err();
    assert!(matches!(err, InstallError::UnresolvedReference { .. }));
}

fn write_binary(dir: &Path, name: &str, files: &[(&str, &str)]) -> PathBuf {
    let archive = dir.join(format!("{name}.tar.gz"));
    let gz = flate2::write::GzEncoder::new(
        File::create(&archive).unwrap(),
        flate2::Compression::default(),
    );
    let mut builder = tar::Builder::new(gz);
    for (path, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("{name}/{path}"), data.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
    archive
}

fn binary_fixture(checksum: Option<&str>) -> Fixture {
    let fx = Fixture::new(
        r#"<sis-extend>
  <package id="foo"><desc>a library</desc></package>
  <package id="app"><req name="foo"/></package>
</sis-extend>"#,
    );
    let host_dir = fx.base().join("linux-x86_64");
    fs::create_dir_all(&host_dir).unwrap();
    let archive = write_binary(
        &host_dir,
        "foo-1.0",
        &[
            ("install.xml", r#"<sis-install><install dynlib="foo"/></sis-install>"#),
            ("foo.so", "ELF"),
        ],
    );
    write_binary(
        &host_dir,
        "app-2.0",
        &[
            (
                "install.xml",
                r#"<sis-install><install file="app" to="bin/app"/></sis-install>"#,
            ),
            ("app", "#!/bin/sh"),
        ],
    );

    let sum = match checksum {
        Some(sum) => sum.to_string(),
        None => fetch::sha256_file(&archive).unwrap(),
    };
    fx.host_index(&format!(
        r#"<sis-extend>
  <package id="foo">
    <version number="1.0"><file>foo-1.0.tar.gz</file><size>1</size><checksum>{sum}</checksum></version>
  </package>
  <package id="app">
    <version number="2.0"><file>app-2.0.tar.gz</file></version>
  </package>
</sis-extend>"#
    ));
    fx
}

#[test]
fn test_binary_dynlib_install_and_uninstall() {
    let fx = binary_fixture(None);
    let rec = Arc::new(RecordingReporter::answering(true));
    let mut session = fx.session(&fx.config(), &rec);

    install(&mut session, &["app"]).unwrap();
    assert_eq!(fs::read_to_string(fx.top().join("foo.so")).unwrap(), "ELF");
    assert!(fx.top().join("bin/app").is_file());

    let site = fx.site();
    assert!(site.contains(r#"<remove path="foo.so"/>"#), "{site}");
    assert!(site.contains(r#"<remove path="bin/app"/>"#), "{site}");
    assert!(site.contains(r#"version="1.0""#), "{site}");

    // a fresh run removes foo and, after confirmation, app
    let mut session = fx.session(&fx.config(), &rec);
    ops::uninstall(&mut session, &["foo".to_string()]).unwrap();
    assert!(rec.contains("confirm: The packages app will also be uninstalled?"));
    assert!(!fx.top().join("foo.so").exists());
    assert!(!fx.top().join("bin/app").exists());
    assert!(!fx.site().contains("package"));
    assert!(session.catalog.iter().all(|p| !p.installed));
}

#[test]
fn test_checksum_mismatch_fails_install() {
    let fx = binary_fixture(Some(&"0".repeat(64)));
    let rec = Arc::new(RecordingReporter::new());
    let mut session = fx.session(&fx.config(), &rec);

    let err = install(&mut session, &["foo"]).unwrap_err();
    assert!(matches!(err, InstallError::ChecksumMismatch { .. }), "{err}");
    assert!(!fx.top().join("foo.so").exists());
    assert!(!fx.site().contains("foo"));
}

#[test]
fn test_declining_confirmation_keeps_everything() {
    let fx = Fixture::new(CHAIN);
    let mut session = fx.session(&fx.config(), &Arc::new(RecordingReporter::new()));
    install(&mut session, &["b"]).unwrap();

    let rec = Arc::new(RecordingReporter::answering(false));
    let mut session = fx.session(&fx.config(), &rec);
    let err = ops::uninstall(&mut session, &["c".to_string()]).unwrap_err();
    assert!(matches!(err, InstallError::Aborted(_)));
    assert!(rec.contains("confirm: The packages b will also be uninstalled?"));

    let site = fx.site();
    assert!(site.contains("id=\"b\"") && site.contains("id=\"c\""), "{site}");
}

#[test]
fn test_uninstall_requires_installed_package() {
    let fx = Fixture::new(CHAIN);
    let mut session = fx.session(&fx.config(), &Arc::new(RecordingReporter::new()));
    let err = ops::uninstall(&mut session, &["a".to_string()]).unwrap_err();
    assert!(matches!(err, InstallError::NotInstalled(_)));
}

#[test]
fn test_source_batch_skips_binary_only_packages() {
    let fx = Fixture::new(
        r#"<sis-extend>
  <package id="lib"><build><make type="make" flags="PREFIX=$(top_dir)"/></build></package>
  <package id="tool"><req name="lib"/></package>
</sis-extend>"#,
    );
    fx.host_index(
        r#"<sis-extend>
  <package id="tool"><version number="1.0"><file>tool-1.0.zip</file></version></package>
</sis-extend>"#,
    );
    let rec = Arc::new(RecordingReporter::new());
    let mut session = fx.session(&fx.config(), &rec);
    let versions = session.select(&["tool".to_string()]).unwrap();
    ops::install_sources(&mut session, &versions, true).unwrap();

    assert!(rec.contains("warning: no source available for tool"));
    let makefile = fs::read_to_string(fx.base().join("build/Makefile")).unwrap();
    assert!(makefile.contains("all: top_dir lib-install\n"), "{makefile}");
    assert!(makefile.contains("\nlib-install: \n"), "{makefile}");
    assert!(makefile.contains("\tcd lib; make PREFIX=$(top_dir) >> $(log)\n"));
    assert!(!makefile.contains("tool-install"));
}

#[test]
fn test_source_batch_needs_build_dir() {
    let fx = Fixture::new(CHAIN);
    let config = Config {
        build_dir: None,
        ..fx.config()
    };
    let mut session = fx.session(&config, &Arc::new(RecordingReporter::new()));
    let versions = session.select(&["a".to_string()]).unwrap();
    let err = ops::install_sources(&mut session, &versions, false).unwrap_err();
    assert!(err.to_string().contains("-B"));
}

fn shared_dir_fixture() -> Fixture {
    let fx = Fixture::new(
        r#"<sis-extend>
  <package id="a"/>
  <package id="b"/>
</sis-extend>"#,
    );
    let host_dir = fx.base().join("linux-x86_64");
    fs::create_dir_all(&host_dir).unwrap();
    for name in ["a", "b"] {
        let lib = format!("lib/lib{name}.so");
        write_binary(
            &host_dir,
            &format!("{name}-1.0"),
            &[
                ("install.xml", r#"<sis-install><install file="lib"/></sis-install>"#),
                (lib.as_str(), name),
            ],
        );
    }
    fx.host_index(
        r#"<sis-extend>
  <package id="a"><version number="1.0"><file>a-1.0.tar.gz</file></version></package>
  <package id="b"><version number="1.0"><file>b-1.0.tar.gz</file></version></package>
</sis-extend>"#,
    );
    fx
}

#[test]
fn test_uninstall_keeps_files_of_packages_sharing_a_directory() {
    let fx = shared_dir_fixture();
    let rec = Arc::new(RecordingReporter::new());
    let mut session = fx.session(&fx.config(), &rec);
    install(&mut session, &["a", "b"]).unwrap();
    assert!(fx.top().join("lib/liba.so").is_file());
    assert!(fx.top().join("lib/libb.so").is_file());

    let site = fx.site();
    assert!(site.contains(r#"<remove path="lib/liba.so"/>"#), "{site}");
    assert!(!site.contains(r#"<remove path="lib"/>"#), "{site}");

    let mut session = fx.session(&fx.config(), &rec);
    ops::uninstall(&mut session, &["a".to_string()]).unwrap();
    assert!(!fx.top().join("lib/liba.so").exists());
    assert_eq!(fs::read_to_string(fx.top().join("lib/libb.so")).unwrap(), "b");

    // the directory goes with its last file
    let mut session = fx.session(&fx.config(), &rec);
    ops::uninstall(&mut session, &["b".to_string()]).unwrap();
    assert!(!fx.top().join("lib").exists());
    assert!(fx.top().is_dir());
}

#[test]
fn test_uninstall_ignores_recorded_paths_outside_top() {
    let fx = Fixture::new(CHAIN);
    let top = fx.top();
    fs::create_dir_all(top.join("data")).unwrap();
    fs::write(top.join("data/c.txt"), "c").unwrap();
    fs::write(fx.base().join("keep.txt"), "keep").unwrap();
    let outside = fx.base().join("keep.txt");
    fs::write(
        top.join("install.xml"),
        format!(
            r#"<sis-extend>
  <package id="c" version="1.0">
    <uninstall version="1.0">
      <remove path="../keep.txt"/>
      <remove path="{}"/>
      <remove path="data/c.txt"/>
    </uninstall>
  </package>
</sis-extend>"#,
            outside.display()
        ),
    )
    .unwrap();

    let rec = Arc::new(RecordingReporter::new());
    let mut session = fx.session(&fx.config(), &rec);
    ops::uninstall(&mut session, &["c".to_string()]).unwrap();
    assert!(!top.join("data/c.txt").exists());
    assert_eq!(fs::read_to_string(&outside).unwrap(), "keep");
    assert!(!fx.site().contains("id=\"c\""));
}

#[cfg(unix)]
fn write_script(path: &Path, body: &str) {
    use std::os::unix::fs::PermissionsExt;
    fs::write(path, format!("#!/bin/sh\n{body}")).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

#[cfg(unix)]
#[test]
fn test_cmake_install_is_undone_from_its_manifest() {
    let fx = Fixture::new(
        r#"<sis-extend>
  <package id="gel"><build><make type="cmake"/></build></package>
</sis-extend>"#,
    );
    let base = fx.base();
    let top = fx.top();
    let bin = base.join("bin");
    fs::create_dir_all(&bin).unwrap();
    fs::create_dir_all(base.join("outside")).unwrap();
    fs::write(base.join("outside/keep.conf"), "keep").unwrap();
    write_script(&bin.join("cmake"), "exit 0\n");
    write_script(
        &bin.join("make"),
        &format!(
            r#"if [ "$1" = install ]; then
  mkdir -p "{top}/lib"
  echo built > "{top}/lib/libgel.so"
  echo "-- Installing: {top}/lib/libgel.so"
  echo "-- Installing: {base}/outside/keep.conf"
fi
exit 0
"#,
            top = top.display(),
            base = base.display()
        ),
    );
    let tree = base.join("build/gel");
    fs::create_dir_all(&tree).unwrap();
    fs::write(tree.join("VERSION"), "3.1\n").unwrap();

    let rec = Arc::new(RecordingReporter::new());
    let mut session = fx.session(&fx.config(), &rec);
    session
        .ctx
        .set_search_path(format!("{}:/usr/bin:/bin", bin.display()));
    install(&mut session, &["gel"]).unwrap();
    assert!(top.join("lib/libgel.so").is_file());
    assert!(
        rec.lines()
            .iter()
            .any(|l| l.starts_with("warning: ") && l.contains("outside/keep.conf")),
        "{:?}",
        rec.lines()
    );

    let site = fx.site();
    assert!(site.contains(r#"version="3.1""#), "{site}");
    assert!(site.contains(r#"<remove path="lib/libgel.so"/>"#), "{site}");
    assert!(!site.contains("keep.conf"), "{site}");

    let mut session = fx.session(&fx.config(), &rec);
    ops::uninstall(&mut session, &["gel".to_string()]).unwrap();
    assert!(!top.join("lib/libgel.so").exists());
    assert_eq!(
        fs::read_to_string(base.join("outside/keep.conf")).unwrap(),
        "keep"
    );
    assert!(!fx.site().contains("id=\"gel\""));
}
