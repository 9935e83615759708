//! Dependency-ordered build pipeline.
//!
//! A request walks `PENDING_TPLS -> PENDING_FRAMEWORK -> PENDING_EXTENSION -> DONE`
//! (the extension only when requested). For each stage:
//!
//! 1. a present completion marker skips the stage with no side effects
//! 2. otherwise the install directory is locked, the build script written and
//!    executed, and on exit status `0` the module descriptor is written
//! 3. a nonzero exit moves the request to `FAILED` and no later stage runs
//!
//! Build scripts and descriptors of every stage are rendered before the first
//! stage starts. After the last stage the verifier runs unless the caller
//! skipped it; a verifier error counts as a failing check.

pub mod engine;
pub mod stage;
pub mod types;

use tracing::{debug, info, warn};

use crate::build_lock::BuildLock;
use crate::config::Config;
use crate::consts::BUILD_SCRIPT_PREFIX;
use crate::identity::Resolver;
use crate::platform::PermissionPolicy;
use crate::render::{self, FileMode, TemplateKind, Templates, write_rendered};

pub use engine::{BuildEngine, EngineError, ScriptEngine, ScriptVerifier, Verifier};
pub use stage::{StageContext, StagePlan, is_complete, plan};
pub use types::{
  BuildOptions, MpiWrapper, PipelineError, PipelineOutcome, PipelineRequest, PipelineState, StageReport, StageStatus,
};

/// Build script and module descriptor text of one stage.
struct Rendered {
  script: String,
  descriptor: String,
}

/// Runs build requests against one configuration.
pub struct Orchestrator<'a> {
  config: &'a Config,
  resolver: Resolver,
  templates: Templates,
  policy: PermissionPolicy,
  engine: &'a dyn BuildEngine,
  verifier: &'a dyn Verifier,
  command: String,
}

impl<'a> Orchestrator<'a> {
  pub fn new(config: &'a Config, engine: &'a dyn BuildEngine, verifier: &'a dyn Verifier) -> Self {
    Self {
      config,
      resolver: Resolver::from_config(config),
      templates: Templates::new(config.templates_dir.as_deref()),
      policy: PermissionPolicy::from_config(config),
      engine,
      verifier,
      command: "bstack".to_string(),
    }
  }

  /// Command recorded in build lock metadata.
  pub fn with_command(mut self, command: impl Into<String>) -> Self {
    self.command = command.into();
    self
  }

  pub fn resolver(&self) -> &Resolver {
    &self.resolver
  }

  /// Plan and run every stage of `request`.
  ///
  /// Precondition failures (identity, version lookup, templates) are returned
  /// as errors before any stage runs. A failing stage is an
  /// [`PipelineOutcome::Failed`], not an error.
  pub async fn run(&self, request: &PipelineRequest) -> Result<PipelineOutcome, PipelineError> {
    let plans = stage::plan(self.config, &self.resolver, request)?;
    let build_template = self.template(TemplateKind::BuildScript)?;
    let module_template = self.template(TemplateKind::Modulefile)?;

    let ctx = StageContext {
      config: self.config,
      resolver: &self.resolver,
      request,
      plans: &plans,
    };

    let rendered = plans
      .iter()
      .map(|plan| -> Result<Rendered, PipelineError> {
        Ok(Rendered {
          script: render::render(&build_template, &ctx.script_substitutions(plan))?,
          descriptor: render::render(&module_template, &ctx.modulefile_substitutions(plan))?,
        })
      })
      .collect::<Result<Vec<_>, _>>()?;

    let mut stages = Vec::with_capacity(plans.len());
    for (plan, rendered) in plans.iter().zip(&rendered) {
      let state = PipelineState::Pending(plan.kind);
      info!(%state, name = %plan.name, "entering stage");

      let status = self.run_stage(&ctx, plan, rendered).await?;
      stages.push(StageReport {
        kind: plan.kind,
        name: plan.name.clone(),
        status,
      });

      if let StageStatus::Failed { exit_status } = status {
        warn!(state = %PipelineState::Failed(plan.kind), name = %plan.name, exit_status, "stage failed");
        return Ok(PipelineOutcome::Failed {
          stage: plan.kind,
          name: plan.name.clone(),
          exit_status,
          stages,
        });
      }
    }

    let Some(last) = plans.last() else {
      return Err(PipelineError::EmptyPlan(request.target));
    };

    let failing_checks = if request.skip_verification {
      debug!(name = %last.name, "verification skipped");
      0
    } else {
      match self.verifier.verify(&last.name).await {
        Ok(failing) => failing,
        Err(err) => {
          warn!(name = %last.name, error = %err, "verification could not run");
          1
        }
      }
    };

    info!(state = %PipelineState::Done, name = %last.name, failing_checks, "pipeline complete");
    Ok(PipelineOutcome::Succeeded {
      name: last.name.clone(),
      failing_checks,
      stages,
    })
  }

  async fn run_stage(
    &self,
    ctx: &StageContext<'_>,
    plan: &StagePlan,
    rendered: &Rendered,
  ) -> Result<StageStatus, PipelineError> {
    if plan.is_complete() {
      info!(name = %plan.name, marker = %plan.marker.display(), "stage already complete, skipping");
      return Ok(StageStatus::Skipped);
    }

    if let Some(dependency) = ctx.plans.iter().find(|p| Some(&p.name) == plan.dependency.as_ref())
      && !dependency.is_complete()
    {
      return Err(PipelineError::MarkerMissing {
        stage: dependency.kind,
        marker: dependency.marker.clone(),
      });
    }

    let lock = BuildLock::acquire(&plan.paths.lock_path(), &plan.paths.install_dir, &self.command)?;
    if plan.is_complete() {
      info!(name = %plan.name, "stage completed by another process, skipping");
      return Ok(StageStatus::Skipped);
    }

    let script = self.resolver.script_path(BUILD_SCRIPT_PREFIX, &plan.name);
    write_rendered(&script, &rendered.script, FileMode::Executable, &self.policy)?;

    info!(name = %plan.name, script = %script.display(), "building stage");
    let exit_status = self.engine.execute(&script).await?;
    if exit_status != 0 {
      return Ok(StageStatus::Failed { exit_status });
    }

    if !plan.is_complete() {
      return Err(PipelineError::MarkerMissing {
        stage: plan.kind,
        marker: plan.marker.clone(),
      });
    }

    write_rendered(&plan.paths.module_path, &rendered.descriptor, FileMode::Static, &self.policy)?;
    self.policy.apply_tree(&plan.paths.install_dir)?;

    info!(name = %plan.name, module = %plan.paths.module_path.display(), "stage built");
    drop(lock);
    Ok(StageStatus::Built)
  }

  fn template(&self, kind: TemplateKind) -> Result<String, PipelineError> {
    self
      .templates
      .get(kind)
      .map_err(|source| PipelineError::Template { kind, source })
  }
}
