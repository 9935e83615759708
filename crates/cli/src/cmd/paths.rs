use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;

use buildstack_lib::consts::{BUILD_SCRIPT_PREFIX, TEST_SCRIPT_PREFIX};
use buildstack_lib::{CanonicalName, Config, Kind, Resolver};

use crate::output::{OutputFormat, print_json, print_stat};

/// TPLs are built from the framework tree that requests them.
const TPL_SOURCE_NOTE: &str = "framework source tree of the requesting version";

#[derive(Debug, Serialize)]
struct PathsReport {
  name: CanonicalName,
  /// `None` for TPLs, which have no tree of their own.
  source_dir: Option<PathBuf>,
  build_dir: PathBuf,
  install_dir: PathBuf,
  module_path: PathBuf,
  lock_path: PathBuf,
  build_script: PathBuf,
  test_script: PathBuf,
  modulefiles_dir: PathBuf,
}

impl PathsReport {
  fn new(resolver: &Resolver, name: CanonicalName) -> Self {
    let paths = resolver.paths(&name);
    Self {
      source_dir: (name.kind() != Kind::Tpls).then(|| paths.source_dir.clone()),
      lock_path: paths.lock_path(),
      build_dir: paths.build_dir,
      install_dir: paths.install_dir,
      module_path: paths.module_path,
      build_script: resolver.script_path(BUILD_SCRIPT_PREFIX, &name),
      test_script: resolver.script_path(TEST_SCRIPT_PREFIX, &name),
      modulefiles_dir: resolver.modulefiles_dir(),
      name,
    }
  }
}

/// Print every location derived from a canonical build name.
pub fn cmd_paths(config: &Config, name: &str, output: OutputFormat) -> Result<i32> {
  let name = CanonicalName::parse(name).with_context(|| format!("Invalid build name '{name}'"))?;
  let report = PathsReport::new(&Resolver::from_config(config), name);

  if output.is_json() {
    print_json(&report)?;
    return Ok(0);
  }

  println!("{}", report.name);
  let source = match &report.source_dir {
    Some(dir) => dir.display().to_string(),
    None => TPL_SOURCE_NOTE.to_string(),
  };
  print_stat("Source", &source);

  let rows = [
    ("Build", &report.build_dir),
    ("Install", &report.install_dir),
    ("Module file", &report.module_path),
    ("Lock", &report.lock_path),
    ("Build script", &report.build_script),
    ("Test script", &report.test_script),
    ("MODULEPATH", &report.modulefiles_dir),
  ];
  for (label, path) in rows {
    print_stat(label, &path.display().to_string());
  }

  Ok(0)
}
