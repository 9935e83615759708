//! Shared test helpers for CLI integration tests.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use buildstack_lib::{CanonicalName, Config, Kind, Resolver};
use tempfile::TempDir;

pub const TPL_VERSION: &str = "0.98.6";

const DECLARATIONS: &str = "\
set(AMANZI_TPLS_VERSION_MAJOR 0)
set(AMANZI_TPLS_VERSION_MINOR 98)
set(AMANZI_TPLS_VERSION_PATCH 6)
";

/// Isolated test environment.
///
/// Each test gets its own temporary directory holding the sandbox root and
/// acting as `HOME` and working directory, so no user config leaks in.
pub struct TestEnv {
  pub temp: TempDir,
  pub config: Config,
}

impl TestEnv {
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    let base = temp.path().join("sandbox");
    std::fs::create_dir_all(&base).unwrap();
    let base = dunce::canonicalize(&base).unwrap();
    Self {
      config: Config::with_base(base),
      temp,
    }
  }

  /// Framework sources for `version` with a TPL version declaration.
  pub fn with_framework_source(self, version: &str) -> Self {
    let file = self
      .resolver()
      .source_dir(Kind::Framework, version)
      .join(&self.config.version_file.path);
    write(&file, DECLARATIONS);
    self
  }

  pub fn base(&self) -> &Path {
    &self.config.base
  }

  pub fn resolver(&self) -> Resolver {
    Resolver::from_config(&self.config)
  }

  pub fn name(&self, name: &str) -> CanonicalName {
    CanonicalName::parse(name).unwrap()
  }

  /// Create the completion marker of `name`, as a finished build would.
  pub fn mark_complete(&self, name: &str) {
    let name = self.name(name);
    let install_dir = self.resolver().paths(&name).install_dir;
    write(&install_dir.join(self.config.markers.for_kind(name.kind())), "");
  }

  pub fn install_dir(&self, name: &str) -> PathBuf {
    self.resolver().paths(&self.name(name)).install_dir
  }

  /// Get a pre-configured Command for the bstack binary.
  ///
  /// Sets `HOME` and the working directory to the temp dir and
  /// `BUILDSTACK_BASE` to the sandbox root.
  pub fn bstack_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("bstack");
    cmd.current_dir(self.temp.path());
    cmd.env("HOME", self.temp.path());
    cmd.env("BUILDSTACK_BASE", self.base());
    cmd.env_remove("BUILDSTACK_BUILD_BASE");
    cmd.env_remove("BUILDSTACK_ADMIN_GROUP");
    cmd.env_remove("RUST_LOG");
    cmd
  }
}

pub fn write(path: &Path, content: &str) {
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent).unwrap();
  }
  std::fs::write(path, content).unwrap();
}
