use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn paths_lists_every_location() {
  let env = TestEnv::new();
  let install = env.base().join("framework/install/main/laptop/debug");

  env
    .bstack_cmd()
    .args(["paths", "framework/main/laptop/debug"])
    .assert()
    .success()
    .stdout(predicate::str::contains(install.display().to_string()))
    .stdout(predicate::str::contains(
      env.base().join("scripts/build-framework-main-laptop-debug.sh").display().to_string(),
    ))
    .stdout(predicate::str::contains("MODULEPATH"));
}

#[test]
fn build_root_override_moves_build_trees() {
  let env = TestEnv::new();
  let scratch = env.temp.path().join("scratch");

  env
    .bstack_cmd()
    .env("BUILDSTACK_BUILD_BASE", &scratch)
    .args(["-o", "json", "paths", "extension/main/debug"])
    .assert()
    .success()
    .stdout(predicate::str::contains(
      scratch.join("extension/build/main/debug").display().to_string(),
    ))
    .stdout(predicate::str::contains(
      env.base().join("extension/install/main/debug").display().to_string(),
    ));
}

#[test]
fn paths_rejects_unknown_build_type() {
  let env = TestEnv::new();

  env
    .bstack_cmd()
    .args(["paths", "framework/main/fast"])
    .assert()
    .failure()
    .code(1)
    .stderr(predicate::str::contains("Invalid build name"));
}

#[test]
fn tpl_paths_point_at_framework_sources() {
  let env = TestEnv::new();

  env
    .bstack_cmd()
    .args(["paths", "tpls/0.98.6/debug"])
    .assert()
    .success()
    .stdout(predicate::str::contains("framework source tree of the requesting version"))
    .stdout(predicate::str::contains("tpls/repos").not());

  env
    .bstack_cmd()
    .args(["-o", "json", "paths", "tpls/0.98.6/debug"])
    .assert()
    .success()
    .stdout(predicate::str::contains(r#""source_dir": null"#));
}
