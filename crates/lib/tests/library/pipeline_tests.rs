use buildstack_lib::build_lock::BuildLock;
use buildstack_lib::consts::BUILD_SCRIPT_PREFIX;
use buildstack_lib::pipeline::{
  Orchestrator, PipelineError, PipelineOutcome, PipelineRequest, PipelineState, StageStatus,
};
use buildstack_lib::render::RenderError;
use buildstack_lib::{BuildType, Kind};

use super::common::{MockEngine, MockVerifier, Sandbox, TPL_VERSION};

fn request(target: Kind) -> PipelineRequest {
  PipelineRequest::new("main", BuildType::Debug, target)
}

#[tokio::test]
async fn tpl_failure_stops_pipeline() {
  let sandbox = Sandbox::new("main");
  let request = request(Kind::Extension);
  let engine = MockEngine::new(&sandbox.plans(&request)).failing(Kind::Tpls, 1);
  let verifier = MockVerifier::new(0);

  let outcome = Orchestrator::new(&sandbox.config, &engine, &verifier)
    .run(&request)
    .await
    .unwrap();

  assert_eq!(outcome.state(), PipelineState::Failed(Kind::Tpls));
  match &outcome {
    PipelineOutcome::Failed { stage, exit_status, .. } => {
      assert_eq!(*stage, Kind::Tpls);
      assert_eq!(*exit_status, 1);
    }
    other => panic!("expected failure, got {other:?}"),
  }

  let (code, name) = outcome.into_parts();
  assert_eq!(code, -1);
  assert_eq!(name.as_str(), format!("tpls/{TPL_VERSION}/debug"));
  assert_eq!(engine.calls(), vec![Kind::Tpls]);
  assert!(verifier.calls().is_empty());
}

#[tokio::test]
async fn fully_built_stack_reports_failing_checks() {
  let sandbox = Sandbox::new("main");
  let request = request(Kind::Extension);
  sandbox.complete_all(&request);
  let engine = MockEngine::new(&sandbox.plans(&request));
  let verifier = MockVerifier::new(2);

  let outcome = Orchestrator::new(&sandbox.config, &engine, &verifier)
    .run(&request)
    .await
    .unwrap();

  assert!(outcome.stages().iter().all(|s| s.status == StageStatus::Skipped));
  let (code, name) = outcome.into_parts();
  assert_eq!(code, 2);
  assert_eq!(name.as_str(), "extension/main/debug");
  assert!(engine.calls().is_empty());
  assert_eq!(verifier.calls(), vec!["extension/main/debug".to_string()]);
}

#[tokio::test]
async fn second_run_executes_nothing() {
  let sandbox = Sandbox::new("main");
  let request = request(Kind::Framework);
  let verifier = MockVerifier::new(0);

  let first = MockEngine::new(&sandbox.plans(&request));
  let outcome = Orchestrator::new(&sandbox.config, &first, &verifier)
    .run(&request)
    .await
    .unwrap();
  assert_eq!(outcome.return_code(), 0);
  assert_eq!(first.calls(), vec![Kind::Tpls, Kind::Framework]);

  let second = MockEngine::new(&sandbox.plans(&request));
  let outcome = Orchestrator::new(&sandbox.config, &second, &verifier)
    .run(&request)
    .await
    .unwrap();
  assert_eq!(outcome.return_code(), 0);
  assert!(second.calls().is_empty());
}

#[tokio::test]
async fn resume_after_failure_skips_completed_stages() {
  let sandbox = Sandbox::new("main");
  let request = request(Kind::Extension);
  let verifier = MockVerifier::new(0);

  let broken = MockEngine::new(&sandbox.plans(&request)).failing(Kind::Framework, 2);
  let outcome = Orchestrator::new(&sandbox.config, &broken, &verifier)
    .run(&request)
    .await
    .unwrap();
  assert_eq!(outcome.return_code(), -2);
  assert_eq!(outcome.name().as_str(), "framework/main/debug");
  assert_eq!(broken.calls(), vec![Kind::Tpls, Kind::Framework]);

  let fixed = MockEngine::new(&sandbox.plans(&request));
  let outcome = Orchestrator::new(&sandbox.config, &fixed, &verifier)
    .run(&request)
    .await
    .unwrap();
  assert_eq!(outcome.return_code(), 0);
  assert_eq!(fixed.calls(), vec![Kind::Framework, Kind::Extension]);
}

#[tokio::test]
async fn extension_only_built_when_requested() {
  let sandbox = Sandbox::new("main");
  let request = request(Kind::Framework);
  let engine = MockEngine::new(&sandbox.plans(&request));
  let verifier = MockVerifier::new(0);

  let outcome = Orchestrator::new(&sandbox.config, &engine, &verifier)
    .run(&request)
    .await
    .unwrap();

  assert_eq!(outcome.name().as_str(), "framework/main/debug");
  assert!(!engine.calls().contains(&Kind::Extension));
  assert_eq!(outcome.stages().len(), 2);
}

#[tokio::test]
async fn extension_never_runs_without_framework_marker() {
  let sandbox = Sandbox::new("main");
  let request = request(Kind::Extension);
  let plans = sandbox.plans(&request);
  let engine = MockEngine::new(&plans).failing(Kind::Framework, 1);
  let verifier = MockVerifier::new(0);

  Orchestrator::new(&sandbox.config, &engine, &verifier)
    .run(&request)
    .await
    .unwrap();

  assert!(!engine.calls().contains(&Kind::Extension));
  let resolver = sandbox.resolver();
  let extension_script = resolver.script_path(BUILD_SCRIPT_PREFIX, &plans[2].name);
  assert!(!extension_script.exists(), "extension script must not be rendered");
}

#[tokio::test]
async fn verifier_error_counts_as_failing_check() {
  let sandbox = Sandbox::new("main");
  let request = request(Kind::Framework);
  let engine = MockEngine::new(&sandbox.plans(&request));
  let verifier = MockVerifier::unavailable();

  let outcome = Orchestrator::new(&sandbox.config, &engine, &verifier)
    .run(&request)
    .await
    .unwrap();

  assert_eq!(outcome.state(), PipelineState::Done);
  assert!(matches!(outcome, PipelineOutcome::Succeeded { failing_checks: 1, .. }));
  assert_eq!(outcome.return_code(), 1);
  assert_eq!(engine.calls(), vec![Kind::Tpls, Kind::Framework]);
}

#[tokio::test]
async fn unresolved_descriptor_key_aborts_before_building() {
  let mut sandbox = Sandbox::new("main");
  let templates = sandbox.config.base.join("templates");
  std::fs::create_dir_all(&templates).unwrap();
  std::fs::write(templates.join("modulefile.template"), "#%Module1.0\nsetenv X $${nope}\n").unwrap();
  sandbox.config.templates_dir = Some(templates);

  let request = request(Kind::Framework);
  let plans = sandbox.plans(&request);
  let engine = MockEngine::new(&plans);
  let verifier = MockVerifier::new(0);

  let err = Orchestrator::new(&sandbox.config, &engine, &verifier)
    .run(&request)
    .await
    .unwrap_err();

  assert!(matches!(err, PipelineError::Render(RenderError::MissingSubstitutionKey(ref key)) if key == "nope"));
  assert!(engine.calls().is_empty());
  let resolver = sandbox.resolver();
  for stage in &plans {
    assert!(!stage.is_complete());
    assert!(!resolver.script_path(BUILD_SCRIPT_PREFIX, &stage.name).exists());
  }
}

#[tokio::test]
async fn successful_exit_without_marker_is_an_error() {
  let sandbox = Sandbox::new("main");
  let request = request(Kind::Extension);
  // no plans: the engine never creates any marker
  let engine = MockEngine::new(&[]);
  let verifier = MockVerifier::new(0);

  let err = Orchestrator::new(&sandbox.config, &engine, &verifier)
    .run(&request)
    .await
    .unwrap_err();

  assert!(matches!(err, PipelineError::MarkerMissing { stage: Kind::Tpls, .. }));
  assert_eq!(engine.calls(), vec![Kind::Tpls]);
}

#[tokio::test]
async fn built_stages_get_chained_descriptors() {
  let sandbox = Sandbox::new("main");
  let request = request(Kind::Extension);
  let plans = sandbox.plans(&request);
  let engine = MockEngine::new(&plans);
  let verifier = MockVerifier::new(0);

  Orchestrator::new(&sandbox.config, &engine, &verifier)
    .run(&request)
    .await
    .unwrap();

  let framework = std::fs::read_to_string(&plans[1].paths.module_path).unwrap();
  assert!(framework.starts_with("#%Module1.0"));
  assert!(framework.contains(&format!("module load tpls/{TPL_VERSION}/debug")));
  assert!(framework.contains("setenv FRAMEWORK_BUILD_TYPE debug"));

  let extension = std::fs::read_to_string(&plans[2].paths.module_path).unwrap();
  assert!(extension.contains("module load framework/main/debug"));
}

#[tokio::test]
async fn skipped_stages_have_no_side_effects() {
  let sandbox = Sandbox::new("main");
  let request = request(Kind::Framework);
  let plans = sandbox.plans(&request);
  sandbox.complete_all(&request);
  let engine = MockEngine::new(&plans);
  let verifier = MockVerifier::new(0);

  Orchestrator::new(&sandbox.config, &engine, &verifier)
    .run(&request)
    .await
    .unwrap();

  let resolver = sandbox.resolver();
  for stage in &plans {
    assert!(!stage.paths.module_path.exists());
    assert!(!resolver.script_path(BUILD_SCRIPT_PREFIX, &stage.name).exists());
    assert!(!stage.paths.lock_path().exists());
  }
}

#[tokio::test]
async fn skip_verification_returns_zero() {
  let sandbox = Sandbox::new("main");
  let mut request = request(Kind::Framework);
  request.skip_verification = true;
  sandbox.complete_all(&request);
  let engine = MockEngine::new(&sandbox.plans(&request));
  let verifier = MockVerifier::new(5);

  let outcome = Orchestrator::new(&sandbox.config, &engine, &verifier)
    .run(&request)
    .await
    .unwrap();

  assert_eq!(outcome.return_code(), 0);
  assert!(verifier.calls().is_empty());
}

#[tokio::test]
async fn missing_sources_abort_before_building() {
  let sandbox = Sandbox::new("main");
  let request = PipelineRequest::new("other-branch", BuildType::Debug, Kind::Framework);
  let engine = MockEngine::new(&[]);
  let verifier = MockVerifier::new(0);

  let err = Orchestrator::new(&sandbox.config, &engine, &verifier)
    .run(&request)
    .await
    .unwrap_err();

  assert!(matches!(err, PipelineError::Version(_)));
  assert!(engine.calls().is_empty());
}

#[tokio::test]
async fn locked_install_dir_fails_fast() {
  let sandbox = Sandbox::new("main");
  let request = request(Kind::Tpls);
  let plans = sandbox.plans(&request);
  let engine = MockEngine::new(&plans);
  let verifier = MockVerifier::new(0);

  let _held = BuildLock::acquire(&plans[0].paths.lock_path(), &plans[0].paths.install_dir, "other").unwrap();
  let err = Orchestrator::new(&sandbox.config, &engine, &verifier)
    .run(&request)
    .await
    .unwrap_err();

  assert!(matches!(err, PipelineError::Lock(_)));
  assert!(engine.calls().is_empty());
}

#[tokio::test]
async fn build_script_embeds_quoted_flags() {
  let sandbox = Sandbox::new("main");
  let mut request = request(Kind::Tpls);
  request.options.extra_options = vec!["--cmake-flag=-DX='a b'".to_string()];
  let plans = sandbox.plans(&request);
  let engine = MockEngine::new(&plans);
  let verifier = MockVerifier::new(0);

  Orchestrator::new(&sandbox.config, &engine, &verifier)
    .run(&request)
    .await
    .unwrap();

  let script = sandbox.resolver().script_path(BUILD_SCRIPT_PREFIX, &plans[0].name);
  let text = std::fs::read_to_string(script).unwrap();
  assert!(text.starts_with("#!/usr/bin/env bash"));
  assert!(text.contains("./bootstrap.sh \\"));
  assert!(text.contains(r#"'--cmake-flag=-DX='\''a b'\'''"#));
  assert!(text.contains("--disable-build_amanzi"));
}
