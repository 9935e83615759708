use std::path::Path;

use buildstack_lib::clean::{CleanOptions, clean};
use buildstack_lib::pipeline::{Orchestrator, PipelineRequest};
use buildstack_lib::remove::RemovalOutcome;
use buildstack_lib::{BuildType, Kind};

use super::common::{MockEngine, MockVerifier, Sandbox};

#[tokio::test]
async fn clean_then_rebuild_restores_stage() {
  let sandbox = Sandbox::new("main");
  let request = PipelineRequest::new("main", BuildType::Opt, Kind::Framework);
  let plans = sandbox.plans(&request);
  let verifier = MockVerifier::new(0);

  let engine = MockEngine::new(&plans);
  Orchestrator::new(&sandbox.config, &engine, &verifier)
    .run(&request)
    .await
    .unwrap();
  assert!(plans[1].is_complete());

  let report = clean(
    &sandbox.config,
    &plans[1].name,
    CleanOptions {
      remove: false,
      force: true,
    },
    &mut |_: &Path| true,
  )
  .into_result()
  .unwrap();
  assert!(report.entries.iter().any(|e| e.outcome == RemovalOutcome::Removed));
  assert!(!plans[1].is_complete());
  assert!(plans[0].is_complete(), "TPLs are not touched by a framework clean");

  let engine = MockEngine::new(&plans);
  let outcome = Orchestrator::new(&sandbox.config, &engine, &verifier)
    .run(&request)
    .await
    .unwrap();
  assert_eq!(outcome.return_code(), 0);
  assert_eq!(engine.calls(), vec![Kind::Framework]);
}

#[tokio::test]
async fn cleaning_tpls_warns_about_framework() {
  let sandbox = Sandbox::new("main");
  let request = PipelineRequest::new("main", BuildType::Debug, Kind::Framework);
  let plans = sandbox.plans(&request);
  let verifier = MockVerifier::new(0);
  let engine = MockEngine::new(&plans);
  Orchestrator::new(&sandbox.config, &engine, &verifier)
    .run(&request)
    .await
    .unwrap();

  let report = clean(
    &sandbox.config,
    &plans[0].name,
    CleanOptions {
      remove: true,
      force: true,
    },
    &mut |_: &Path| true,
  );

  assert_eq!(report.dependents, vec![plans[1].name.to_string()]);
  assert!(plans[1].is_complete(), "dependents are reported, not removed");
  assert!(plans[0].paths.source_dir.exists(), "framework sources survive a TPL clean");
}
