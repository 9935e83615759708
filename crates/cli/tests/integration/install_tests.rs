use predicates::prelude::*;

use super::common::{TPL_VERSION, TestEnv};

fn tpls() -> String {
  format!("tpls/{TPL_VERSION}/debug")
}

#[test]
fn installed_stack_is_skipped() {
  let env = TestEnv::new().with_framework_source("main");
  env.mark_complete(&tpls());
  env.mark_complete("framework/main/debug");

  env
    .bstack_cmd()
    .args(["install-framework", "main", "--skip-clone", "--skip-verification"])
    .assert()
    .success()
    .stdout(predicate::str::contains(format!("{} already installed", tpls())))
    .stdout(predicate::str::contains("Installed framework/main/debug"));

  assert!(!env.resolver().scripts_dir().exists(), "skipped stages write no scripts");
}

#[test]
fn json_outcome_reports_stages() {
  let env = TestEnv::new().with_framework_source("main");
  env.mark_complete(&tpls());

  env
    .bstack_cmd()
    .args(["-o", "json", "install-tpls", "main", "--skip-clone", "--skip-verification"])
    .assert()
    .success()
    .stdout(predicate::str::contains(r#""result": "succeeded""#))
    .stdout(predicate::str::contains(r#""failing_checks": 0"#))
    .stdout(predicate::str::contains(r#""status": "skipped""#));
}

#[test]
fn failed_tpl_stage_exits_255() {
  let env = TestEnv::new().with_framework_source("main");

  env
    .bstack_cmd()
    .args(["install-framework", "main", "--skip-clone"])
    .assert()
    .failure()
    .code(255)
    .stderr(predicate::str::contains("Pipeline stopped: tpls stage failed with exit status"));

  let scripts = env.resolver().scripts_dir();
  assert!(scripts.join(format!("build-tpls-{TPL_VERSION}-debug.sh")).is_file());
  assert!(
    !scripts.join("build-framework-main-debug.sh").exists(),
    "framework must not be attempted after a TPL failure"
  );
}

#[test]
fn failing_verification_exits_with_check_count() {
  let env = TestEnv::new().with_framework_source("main");
  env.mark_complete(&tpls());
  env.mark_complete("framework/main/debug");

  // no build tree exists, so the generated test script cannot cd into it
  env
    .bstack_cmd()
    .args(["install-framework", "main", "--skip-clone"])
    .assert()
    .failure()
    .code(1)
    .stderr(predicate::str::contains("1 failing check(s)"));
}

#[test]
fn passing_verification_exits_zero() {
  let env = TestEnv::new().with_framework_source("main");
  env.mark_complete(&tpls());
  env.mark_complete("framework/main/debug");
  let build_dir = env.resolver().paths(&env.name("framework/main/debug")).build_dir;
  std::fs::create_dir_all(build_dir).unwrap();

  env
    .bstack_cmd()
    .args(["install-framework", "main", "--skip-clone", "--test-command", "true"])
    .assert()
    .success();
}

#[test]
fn skip_clone_requires_sources() {
  let env = TestEnv::new();

  env
    .bstack_cmd()
    .args(["install-tpls", "main", "--skip-clone"])
    .assert()
    .failure()
    .code(1)
    .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn existing_sources_need_an_explicit_choice() {
  let env = TestEnv::new().with_framework_source("main");

  env
    .bstack_cmd()
    .args(["install-framework", "main"])
    .assert()
    .failure()
    .code(1)
    .stderr(predicate::str::contains("already exists"));
}

#[test]
fn extension_sources_checked_before_building() {
  let env = TestEnv::new().with_framework_source("main");

  env
    .bstack_cmd()
    .args(["install-framework-with-extension", "main", "--skip-clone"])
    .assert()
    .failure()
    .code(1)
    .stderr(predicate::str::contains("does not exist"));

  assert!(!env.resolver().scripts_dir().exists(), "nothing is built without all sources");
}

#[test]
fn missing_version_declaration_aborts() {
  let env = TestEnv::new();
  std::fs::create_dir_all(env.resolver().source_dir(buildstack_lib::Kind::Framework, "main")).unwrap();

  env
    .bstack_cmd()
    .args(["install-tpls", "main", "--skip-clone"])
    .assert()
    .failure()
    .code(1)
    .stderr(predicate::str::contains("no version declaration"));
}

#[test]
fn identity_options_shape_the_names() {
  let env = TestEnv::new().with_framework_source("main");
  env.mark_complete(&format!("tpls/{TPL_VERSION}/laptop/gcc11/opt"));
  env.mark_complete("framework/main/laptop/gcc11/debug");
  env.mark_complete("extension/main/laptop/gcc11/debug");
  std::fs::create_dir_all(env.resolver().source_dir(buildstack_lib::Kind::Extension, "main")).unwrap();

  env
    .bstack_cmd()
    .args([
      "install-framework-with-extension",
      "main",
      "--skip-clone",
      "--skip-verification",
      "--machine",
      "laptop",
      "--compiler-id",
      "gcc11",
      "--tpls-build-type",
      "opt",
    ])
    .assert()
    .success()
    .stdout(predicate::str::contains("Installed extension/main/laptop/gcc11/debug"));

  assert!(env.install_dir("extension/main/laptop/gcc11/debug").is_dir());
}
