//! Shared fixtures: a sandbox with a framework source tree, and mock engines.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use buildstack_lib::pipeline::{BuildEngine, EngineError, PipelineError, PipelineRequest, StagePlan, Verifier, plan};
use buildstack_lib::{CanonicalName, Config, Kind, Resolver};
use tempfile::TempDir;

pub const TPL_VERSION: &str = "0.98.6";

const DECLARATIONS: &str = r#"
set(AMANZI_TPLS_VERSION_MAJOR 0)
set(AMANZI_TPLS_VERSION_MINOR 98)
set(AMANZI_TPLS_VERSION_PATCH 6)
"#;

/// Isolated sandbox with `framework/repos/<version>` already checked out.
pub struct Sandbox {
  _temp: TempDir,
  pub config: Config,
}

impl Sandbox {
  pub fn new(version: &str) -> Self {
    let temp = TempDir::new().unwrap();
    let base = dunce::canonicalize(temp.path()).unwrap();
    let config = Config::with_base(base);

    let resolver = Resolver::from_config(&config);
    let file = resolver
      .source_dir(Kind::Framework, version)
      .join(&config.version_file.path);
    std::fs::create_dir_all(file.parent().unwrap()).unwrap();
    std::fs::write(file, DECLARATIONS).unwrap();

    Self { _temp: temp, config }
  }

  pub fn resolver(&self) -> Resolver {
    Resolver::from_config(&self.config)
  }

  pub fn plans(&self, request: &PipelineRequest) -> Vec<StagePlan> {
    plan(&self.config, &self.resolver(), request).unwrap()
  }

  /// Mark every planned stage complete.
  pub fn complete_all(&self, request: &PipelineRequest) {
    for stage in self.plans(request) {
      touch(&stage.marker);
    }
  }
}

pub fn touch(path: &Path) {
  std::fs::create_dir_all(path.parent().unwrap()).unwrap();
  std::fs::write(path, "").unwrap();
}

/// Stage kind of a generated build script, from its file name.
fn kind_of(script: &Path) -> Kind {
  let file = script.file_name().unwrap().to_string_lossy();
  let rest = file.strip_prefix("build-").unwrap();
  rest.split('-').next().unwrap().parse().unwrap()
}

/// Build engine that "builds" by creating the stage's completion marker.
pub struct MockEngine {
  markers: HashMap<Kind, PathBuf>,
  exit_codes: HashMap<Kind, i32>,
  calls: Mutex<Vec<Kind>>,
}

impl MockEngine {
  pub fn new(plans: &[StagePlan]) -> Self {
    Self {
      markers: plans.iter().map(|p| (p.kind, p.marker.clone())).collect(),
      exit_codes: HashMap::new(),
      calls: Mutex::new(Vec::new()),
    }
  }

  pub fn failing(mut self, kind: Kind, code: i32) -> Self {
    self.exit_codes.insert(kind, code);
    self
  }

  pub fn calls(&self) -> Vec<Kind> {
    self.calls.lock().unwrap().clone()
  }
}

#[async_trait]
impl BuildEngine for MockEngine {
  async fn execute(&self, script: &Path) -> Result<i32, EngineError> {
    assert!(script.is_file(), "script {} was not written", script.display());
    let kind = kind_of(script);
    self.calls.lock().unwrap().push(kind);

    let code = self.exit_codes.get(&kind).copied().unwrap_or(0);
    if code == 0
      && let Some(marker) = self.markers.get(&kind)
    {
      touch(marker);
    }
    Ok(code)
  }
}

/// Verifier returning a fixed failing-check count.
pub struct MockVerifier {
  failing: u32,
  unavailable: bool,
  calls: Mutex<Vec<String>>,
}

impl MockVerifier {
  pub fn new(failing: u32) -> Self {
    Self {
      failing,
      unavailable: false,
      calls: Mutex::new(Vec::new()),
    }
  }

  /// Verifier whose test script cannot be started.
  pub fn unavailable() -> Self {
    Self {
      unavailable: true,
      ..Self::new(0)
    }
  }

  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }
}

#[async_trait]
impl Verifier for MockVerifier {
  async fn verify(&self, name: &CanonicalName) -> Result<u32, PipelineError> {
    self.calls.lock().unwrap().push(name.to_string());
    if self.unavailable {
      return Err(PipelineError::Engine(EngineError::Spawn {
        path: PathBuf::from("test-script.sh"),
        source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "not executable"),
      }));
    }
    Ok(self.failing)
  }
}
