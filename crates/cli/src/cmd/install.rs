//! Implementation of the `bstack install-*` commands.
//!
//! Each command prepares the source trees it needs, then runs the stage
//! pipeline up to its target stage:
//! - `install-tpls`: TPLs only
//! - `install-framework`: TPLs, framework
//! - `install-framework-with-extension`: TPLs, framework, extension

use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use tracing::debug;

use buildstack_lib::pipeline::{
  BuildOptions, MpiWrapper, Orchestrator, PipelineOutcome, PipelineRequest, ScriptEngine, ScriptVerifier, StageStatus,
};
use buildstack_lib::platform::PermissionPolicy;
use buildstack_lib::remove::GuardedRemover;
use buildstack_lib::render::Templates;
use buildstack_lib::repo::{GitCli, SourceMode, SourceRequest, prepare_source};
use buildstack_lib::{BuildType, Config, Kind, Resolver};

use crate::output::{
  OutputFormat, format_duration, print_error, print_info, print_json, print_stat, print_success, print_warning,
};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum WrapperArg {
  /// mpicc, mpicxx, mpifort
  #[default]
  Mpi,
  /// mpiicc, mpiicpc, mpiifort
  Intel,
  /// cc, CC, ftn
  Vendor,
}

impl From<WrapperArg> for MpiWrapper {
  fn from(arg: WrapperArg) -> Self {
    match arg {
      WrapperArg::Mpi => MpiWrapper::Mpi,
      WrapperArg::Intel => MpiWrapper::Intel,
      WrapperArg::Vendor => MpiWrapper::Vendor,
    }
  }
}

#[derive(Debug, Args)]
pub struct InstallArgs {
  /// Framework branch or tag (default: the configured default branch)
  pub version: Option<String>,

  /// debug, opt or relwithdebinfo
  #[arg(short, long, default_value = "debug")]
  pub build_type: BuildType,

  /// TPL build type (default: --build-type)
  #[arg(long)]
  pub tpls_build_type: Option<BuildType>,

  /// Trilinos build type (default: the TPL build type)
  #[arg(long)]
  pub trilinos_build_type: Option<BuildType>,

  /// Machine name recorded in the build identity
  #[arg(long)]
  pub machine: Option<String>,

  /// Compiler identifier recorded in the build identity
  #[arg(long)]
  pub compiler_id: Option<String>,

  /// Build geochemistry engines (PETSc, Alquimia, PFLOTRAN, CrunchTope)
  #[arg(long)]
  pub geochemistry: bool,

  /// Enable the structured-mesh framework
  #[arg(long)]
  pub structured: bool,

  /// Build static libraries instead of shared ones
  #[arg(long = "static")]
  pub build_static: bool,

  /// MPI compiler wrapper family
  #[arg(long, value_enum, default_value_t)]
  pub mpi_wrapper: WrapperArg,

  /// Module file to load before building the TPLs (repeatable)
  #[arg(long = "module", value_name = "MODULE")]
  pub modules: Vec<String>,

  /// Extra option passed to every build entry point (repeatable)
  #[arg(long = "build-option", value_name = "OPTION", allow_hyphen_values = true)]
  pub build_options: Vec<String>,

  /// Do not run the post-build checks
  #[arg(long)]
  pub skip_verification: bool,

  /// Command the verification script runs inside the build tree
  #[arg(long)]
  pub test_command: Option<String>,

  /// Use the existing source trees instead of cloning
  #[arg(long, conflicts_with = "clobber")]
  pub skip_clone: bool,

  /// Delete existing source trees and clone them again
  #[arg(long)]
  pub clobber: bool,

  /// Create and check out this framework branch after cloning
  #[arg(long)]
  pub new_branch: Option<String>,
}

/// Options only the extension install takes.
#[derive(Debug, Clone, Default, Args)]
pub struct ExtensionArgs {
  /// Extension branch to clone (default: the framework version)
  #[arg(long)]
  pub extension_branch: Option<String>,

  /// Create and check out this extension branch after cloning
  #[arg(long)]
  pub new_extension_branch: Option<String>,
}

impl InstallArgs {
  fn source_mode(&self) -> SourceMode {
    if self.skip_clone {
      SourceMode::SkipClone
    } else if self.clobber {
      SourceMode::Clobber
    } else {
      SourceMode::Clone
    }
  }

  fn request(&self, version: &str, target: Kind) -> PipelineRequest {
    let mut request = PipelineRequest::new(version, self.build_type, target);
    request.machine = self.machine.clone();
    request.compiler_id = self.compiler_id.clone();
    request.skip_verification = self.skip_verification;
    request.options = BuildOptions {
      tpls_build_type: self.tpls_build_type,
      trilinos_build_type: self.trilinos_build_type,
      geochemistry: self.geochemistry,
      structured: self.structured,
      build_static: self.build_static,
      mpi_wrapper: self.mpi_wrapper.into(),
      extra_modules: self.modules.clone(),
      extra_options: self.build_options.clone(),
    };
    request
  }
}

/// Execute an install command; returns the pipeline's return code.
pub fn cmd_install(
  config: &Config,
  target: Kind,
  args: &InstallArgs,
  extension: Option<&ExtensionArgs>,
  output: OutputFormat,
) -> Result<i32> {
  let start = Instant::now();
  let version = args
    .version
    .clone()
    .unwrap_or_else(|| config.repos.default_branch.clone());
  let request = args.request(&version, target);
  debug!(?request, base = %config.base.display(), "install requested");

  let resolver = Resolver::from_config(config);
  let policy = PermissionPolicy::from_config(config);

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let outcome = rt.block_on(async {
    let sources = source_requests(config, &resolver, args, &version, target, extension);
    debug!(count = sources.len(), "preparing sources");
    prepare_sources(&resolver, &policy, &sources).await?;

    let mut verifier = ScriptVerifier::new(
      resolver.clone(),
      Templates::new(config.templates_dir.as_deref()),
      policy.clone(),
      ScriptEngine,
    );
    if let Some(command) = &args.test_command {
      verifier = verifier.with_test_command(command);
    }

    Orchestrator::new(config, &ScriptEngine, &verifier)
      .with_command(command_line())
      .run(&request)
      .await
      .context("Build pipeline aborted")
  })?;

  if output.is_json() {
    print_json(&outcome)?;
  } else {
    print_outcome(&outcome);
    print_stat("Duration", &format_duration(start.elapsed()));
  }

  Ok(outcome.return_code())
}

/// Source trees `target` needs: always the framework, plus the extension.
fn source_requests(
  config: &Config,
  resolver: &Resolver,
  args: &InstallArgs,
  version: &str,
  target: Kind,
  extension: Option<&ExtensionArgs>,
) -> Vec<SourceRequest> {
  let mut sources = vec![SourceRequest {
    dest: resolver.source_dir(Kind::Framework, version),
    url: config.repos.framework_url.clone(),
    branch: version.to_string(),
    new_branch: args.new_branch.clone(),
    mode: args.source_mode(),
  }];

  if target == Kind::Extension {
    let extension = extension.cloned().unwrap_or_default();
    sources.push(SourceRequest {
      dest: resolver.source_dir(Kind::Extension, version),
      url: config.repos.extension_url.clone(),
      branch: extension.extension_branch.unwrap_or_else(|| version.to_string()),
      new_branch: extension.new_extension_branch,
      mode: args.source_mode(),
    });
  }

  sources
}

async fn prepare_sources(resolver: &Resolver, policy: &PermissionPolicy, sources: &[SourceRequest]) -> Result<()> {
  let git = GitCli::default();
  let remover = GuardedRemover::from_resolver(resolver);

  for source in sources {
    prepare_source(&git, &remover, policy, source)
      .await
      .with_context(|| format!("Failed to prepare sources at {}", source.dest.display()))?;
  }
  Ok(())
}

fn command_line() -> String {
  std::env::args().collect::<Vec<_>>().join(" ")
}

fn print_outcome(outcome: &PipelineOutcome) {
  println!();
  for stage in outcome.stages() {
    match stage.status {
      StageStatus::Skipped => print_info(&format!("{} already installed, skipped", stage.name)),
      StageStatus::Built => print_success(&format!("{} built", stage.name)),
      StageStatus::Failed { exit_status } => {
        print_error(&format!("{} failed with exit status {exit_status}", stage.name))
      }
    }
  }

  match outcome {
    PipelineOutcome::Succeeded {
      name,
      failing_checks: 0,
      ..
    } => print_success(&format!("Installed {name}")),
    PipelineOutcome::Succeeded { name, failing_checks, .. } => {
      print_warning(&format!("Installed {name} with {failing_checks} failing check(s)"))
    }
    PipelineOutcome::Failed { name, .. } => {
      if let Some(failure) = outcome.failure() {
        print_error(&format!("Pipeline stopped: {failure} ({name})"));
      }
    }
  }
  print_stat("Load with", &format!("module load {}", outcome.name()));
}
