//! Request, state and outcome types for the build pipeline.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::build_lock::LockError;
use crate::identity::{BuildType, CanonicalName, IdentityError, Kind};
use crate::platform::PermissionError;
use crate::render::RenderError;
use crate::render::TemplateKind;
use crate::render::write::WriteError;
use crate::version::VersionError;

use super::engine::EngineError;

#[derive(Debug, Error)]
pub enum PipelineError {
  #[error(transparent)]
  Identity(#[from] IdentityError),

  #[error(transparent)]
  Version(#[from] VersionError),

  #[error(transparent)]
  Render(#[from] RenderError),

  #[error(transparent)]
  Write(#[from] WriteError),

  #[error(transparent)]
  Lock(#[from] LockError),

  #[error(transparent)]
  Permissions(#[from] PermissionError),

  #[error(transparent)]
  Engine(#[from] EngineError),

  #[error("failed to load template {}: {source}", kind.file_name())]
  Template {
    kind: TemplateKind,
    #[source]
    source: std::io::Error,
  },

  #[error("{stage} stage failed with exit status {exit_status}")]
  StageBuildFailure { stage: Kind, exit_status: i32 },

  #[error("nothing to build for target {0}")]
  EmptyPlan(Kind),

  #[error("{stage} stage exited successfully but its completion marker {} is missing", marker.display())]
  MarkerMissing { stage: Kind, marker: PathBuf },
}

/// MPI compiler wrapper family used by the build entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MpiWrapper {
  #[default]
  Mpi,
  Intel,
  Vendor,
}

impl MpiWrapper {
  /// `(c, c++, fortran)` wrapper executables.
  pub fn compilers(&self) -> (&'static str, &'static str, &'static str) {
    match self {
      MpiWrapper::Mpi => ("mpicc", "mpicxx", "mpifort"),
      MpiWrapper::Intel => ("mpiicc", "mpiicpc", "mpiifort"),
      MpiWrapper::Vendor => ("cc", "CC", "ftn"),
    }
  }
}

/// Knobs forwarded to the build entry points.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOptions {
  /// Defaults to the requested build type.
  pub tpls_build_type: Option<BuildType>,
  /// Defaults to the TPL build type.
  pub trilinos_build_type: Option<BuildType>,
  pub geochemistry: bool,
  pub structured: bool,
  pub build_static: bool,
  pub mpi_wrapper: MpiWrapper,
  /// Modulefiles loaded before the TPL build.
  pub extra_modules: Vec<String>,
  /// Appended verbatim (quoted) to every stage's flags.
  pub extra_options: Vec<String>,
}

/// One invocation of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRequest {
  pub version: String,
  pub machine: Option<String>,
  pub compiler_id: Option<String>,
  pub build_type: BuildType,
  /// Last stage to build. [`Kind::Extension`] is only built when named here.
  pub target: Kind,
  pub skip_verification: bool,
  pub options: BuildOptions,
}

impl PipelineRequest {
  pub fn new(version: impl Into<String>, build_type: BuildType, target: Kind) -> Self {
    Self {
      version: version.into(),
      machine: None,
      compiler_id: None,
      build_type,
      target,
      skip_verification: false,
      options: BuildOptions::default(),
    }
  }

  pub fn tpls_build_type(&self) -> BuildType {
    self.options.tpls_build_type.unwrap_or(self.build_type)
  }

  pub fn trilinos_build_type(&self) -> BuildType {
    self.options.trilinos_build_type.unwrap_or_else(|| self.tpls_build_type())
  }

  /// Build type of the given stage.
  pub fn build_type_for(&self, kind: Kind) -> BuildType {
    match kind {
      Kind::Tpls => self.tpls_build_type(),
      Kind::Framework | Kind::Extension => self.build_type,
    }
  }
}

/// Position of a request in the stage state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "stage", rename_all = "snake_case")]
pub enum PipelineState {
  Pending(Kind),
  Done,
  /// Absorbing: no later stage is attempted.
  Failed(Kind),
}

impl std::fmt::Display for PipelineState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      PipelineState::Pending(kind) => write!(f, "PENDING_{}", kind.env_prefix()),
      PipelineState::Done => f.write_str("DONE"),
      PipelineState::Failed(_) => f.write_str("FAILED"),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
  /// Completion marker already present.
  Skipped,
  Built,
  Failed { exit_status: i32 },
}

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
  pub kind: Kind,
  pub name: CanonicalName,
  pub status: StageStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PipelineOutcome {
  Succeeded {
    name: CanonicalName,
    failing_checks: u32,
    stages: Vec<StageReport>,
  },
  Failed {
    stage: Kind,
    name: CanonicalName,
    exit_status: i32,
    stages: Vec<StageReport>,
  },
}

impl PipelineOutcome {
  /// `0` success, `> 0` failing verification checks, `< 0` failed build stage.
  ///
  /// A failed stage maps to the negated exit status, so a stage exiting with
  /// `1` yields `-1`.
  pub fn return_code(&self) -> i32 {
    match self {
      PipelineOutcome::Succeeded { failing_checks, .. } => i32::try_from(*failing_checks).unwrap_or(i32::MAX),
      PipelineOutcome::Failed { exit_status, .. } => -exit_status.saturating_abs().max(1),
    }
  }

  /// Canonical name of the terminal stage, or of the stage that failed.
  pub fn name(&self) -> &CanonicalName {
    match self {
      PipelineOutcome::Succeeded { name, .. } | PipelineOutcome::Failed { name, .. } => name,
    }
  }

  pub fn into_parts(self) -> (i32, CanonicalName) {
    let code = self.return_code();
    match self {
      PipelineOutcome::Succeeded { name, .. } | PipelineOutcome::Failed { name, .. } => (code, name),
    }
  }

  pub fn stages(&self) -> &[StageReport] {
    match self {
      PipelineOutcome::Succeeded { stages, .. } | PipelineOutcome::Failed { stages, .. } => stages,
    }
  }

  /// The failure as a [`PipelineError::StageBuildFailure`], if the build broke.
  pub fn failure(&self) -> Option<PipelineError> {
    match self {
      PipelineOutcome::Failed { stage, exit_status, .. } => Some(PipelineError::StageBuildFailure {
        stage: *stage,
        exit_status: *exit_status,
      }),
      PipelineOutcome::Succeeded { .. } => None,
    }
  }

  pub fn state(&self) -> PipelineState {
    match self {
      PipelineOutcome::Succeeded { .. } => PipelineState::Done,
      PipelineOutcome::Failed { stage, .. } => PipelineState::Failed(*stage),
    }
  }
}
