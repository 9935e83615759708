//! Per-stage planning: identities, paths, markers, flags and substitutions.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::identity::{BuildIdentity, CanonicalName, Kind, PathSet, Resolver};
use crate::render::{shell_quote, tcl_quote, toggle};
use crate::version::tpl_version_for;

use super::types::{PipelineError, PipelineRequest};

/// Whether the completion marker `marker` (relative to the install dir) exists.
pub fn is_complete(paths: &PathSet, marker: &Path) -> bool {
  paths.install_dir.join(marker).is_file()
}

/// Everything needed to run one stage, derived up front.
#[derive(Debug, Clone)]
pub struct StagePlan {
  pub kind: Kind,
  pub identity: BuildIdentity,
  pub name: CanonicalName,
  pub paths: PathSet,
  /// Absolute path of the completion marker.
  pub marker: PathBuf,
  /// Stage whose descriptor this one loads.
  pub dependency: Option<CanonicalName>,
}

impl StagePlan {
  pub fn is_complete(&self) -> bool {
    self.marker.is_file()
  }
}

/// Plan every stage up to `request.target`, in build order.
///
/// Reads the TPL version out of the framework source tree, which must
/// already exist.
pub fn plan(config: &Config, resolver: &Resolver, request: &PipelineRequest) -> Result<Vec<StagePlan>, PipelineError> {
  let framework = BuildIdentity::new(
    Kind::Framework,
    &request.version,
    request.machine.as_deref(),
    request.compiler_id.as_deref(),
    request.build_type,
  )?;
  let tpl_version = tpl_version_for(resolver, &config.version_file, Kind::Framework, &request.version)?;
  let framework_source = resolver.source_dir(Kind::Framework, &request.version);

  let mut plans: Vec<StagePlan> = Vec::new();
  for kind in request.target.chain() {
    let identity = match kind {
      Kind::Tpls => framework.sibling(Kind::Tpls, &tpl_version, request.tpls_build_type())?,
      Kind::Framework => framework.clone(),
      Kind::Extension => framework.sibling(Kind::Extension, &request.version, request.build_type)?,
    };
    let name = identity.canonical_name();

    let mut paths = resolver.paths(&name);
    if kind == Kind::Tpls {
      paths = paths.with_source(framework_source.clone());
    }

    plans.push(StagePlan {
      kind,
      marker: paths.install_dir.join(config.markers.for_kind(kind)),
      dependency: plans.last().map(|p| p.name.clone()),
      identity,
      name,
      paths,
    });
  }

  Ok(plans)
}

/// Inputs shared by every stage's flag and substitution builders.
pub struct StageContext<'a> {
  pub config: &'a Config,
  pub resolver: &'a Resolver,
  pub request: &'a PipelineRequest,
  pub plans: &'a [StagePlan],
}

impl StageContext<'_> {
  fn plan_of(&self, kind: Kind) -> Option<&StagePlan> {
    self.plans.iter().find(|p| p.kind == kind)
  }

  /// Argument list for the stage's build entry point.
  pub fn flags(&self, stage: &StagePlan) -> Vec<String> {
    let request = self.request;
    let options = &request.options;
    let geochemistry = toggle(options.geochemistry);
    let path = |p: &Path| p.to_string_lossy().into_owned();

    let mut flags = vec![
      format!("--{}", request.build_type_for(stage.kind)),
      format!("--{}_trilinos", request.trilinos_build_type()),
      format!("--{}_tpls", request.tpls_build_type()),
      format!("--parallel={}", self.config.jobs),
      format!("--{}-shared", toggle(!options.build_static)),
    ];

    if let Some(tpls) = self.plan_of(Kind::Tpls) {
      flags.push(format!("--tpl-build-dir={}", path(&tpls.paths.build_dir)));
      flags.push(format!("--tpl-install-prefix={}", path(&tpls.paths.install_dir)));
      flags.push(format!(
        "--tpl-download-dir={}",
        path(&self.resolver.downloads_dir(Kind::Tpls))
      ));
      if stage.kind != Kind::Tpls {
        flags.push(format!("--tpl-config-file={}", path(&tpls.marker)));
      }
    }

    match stage.kind {
      Kind::Tpls => {
        flags.push("--disable-build_amanzi".to_string());
        flags.push(format!("--{}-structured", toggle(options.structured)));
      }
      Kind::Framework => {
        flags.push(format!("--amanzi-build-dir={}", path(&stage.paths.build_dir)));
        flags.push(format!("--amanzi-install-prefix={}", path(&stage.paths.install_dir)));
        flags.push(format!("--{}-structured", toggle(options.structured)));
      }
      Kind::Extension => {
        if let Some(framework) = self.plan_of(Kind::Framework) {
          flags.push(format!("--framework-dir={}", path(&framework.paths.install_dir)));
        }
        flags.push(format!("--build-dir={}", path(&stage.paths.build_dir)));
        flags.push(format!("--install-prefix={}", path(&stage.paths.install_dir)));
        flags.push("--disable-structured".to_string());
      }
    }

    for package in ["geochemistry", "petsc", "alquimia", "pflotran", "crunchtope"] {
      flags.push(format!("--{geochemistry}-{package}"));
    }

    match stage.kind {
      Kind::Extension => {
        flags.push("--disable-amanzi_physics".to_string());
        flags.push("--enable-ats_physics".to_string());
        flags.push("--ats_dev".to_string());
      }
      _ => {
        flags.push("--enable-amanzi_physics".to_string());
        flags.push("--disable-ats_physics".to_string());
      }
    }
    flags.extend(["--enable-hypre", "--enable-silo", "--enable-clm"].map(str::to_string));
    flags.extend(options.extra_options.iter().cloned());

    flags
  }

  /// Shell lines run before the entry point: `module use` plus loads.
  pub fn module_setup(&self, stage: &StagePlan) -> String {
    let mut lines = vec![format!(
      "module use {}",
      shell_quote(&self.resolver.modulefiles_dir().to_string_lossy())
    )];

    match &stage.dependency {
      Some(dependency) => lines.push(format!("module load {}", shell_quote(dependency.as_str()))),
      None => {
        for module in &self.request.options.extra_modules {
          lines.push(format!("module load {}", shell_quote(module)));
        }
      }
    }

    lines.join("\n")
  }

  /// Substitutions for the build script template. Every value is shell-safe.
  pub fn script_substitutions(&self, stage: &StagePlan) -> BTreeMap<String, String> {
    let q = |p: &Path| shell_quote(&p.to_string_lossy());
    let (cc, cxx, fc) = self.request.options.mpi_wrapper.compilers();

    let flags = self
      .flags(stage)
      .iter()
      .map(|f| shell_quote(f))
      .collect::<Vec<_>>()
      .join(" \\\n    ");

    [
      ("name", shell_quote(stage.name.as_str())),
      ("kind", shell_quote(stage.kind.as_str())),
      ("module_setup", self.module_setup(stage)),
      ("source_dir", q(&stage.paths.source_dir)),
      ("build_dir", q(&stage.paths.build_dir)),
      ("install_dir", q(&stage.paths.install_dir)),
      ("entry_point", shell_quote(self.config.entry_points.for_kind(stage.kind))),
      ("flags", flags),
      ("mpi_cc", shell_quote(cc)),
      ("mpi_cxx", shell_quote(cxx)),
      ("mpi_fc", shell_quote(fc)),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
  }

  /// Substitutions for the module descriptor template. Every value is Tcl-safe.
  pub fn modulefile_substitutions(&self, stage: &StagePlan) -> BTreeMap<String, String> {
    let q = |p: &Path| tcl_quote(&p.to_string_lossy());

    let dependency_load = match &stage.dependency {
      Some(dependency) => format!("module load {}", tcl_quote(dependency.as_str())),
      None => self
        .request
        .options
        .extra_modules
        .iter()
        .map(|m| format!("module load {}", tcl_quote(m)))
        .collect::<Vec<_>>()
        .join("\n"),
    };

    [
      ("name", tcl_quote(stage.name.as_str())),
      ("kind", tcl_quote(stage.kind.as_str())),
      ("build_type", tcl_quote(stage.identity.build_type.as_str())),
      ("dependency_load", dependency_load),
      ("prefix", stage.kind.env_prefix().to_string()),
      ("source_dir", q(&stage.paths.source_dir)),
      ("build_dir", q(&stage.paths.build_dir)),
      ("install_dir", q(&stage.paths.install_dir)),
      ("bin_dir", q(&stage.paths.install_dir.join("bin"))),
      ("lib_dir", q(&stage.paths.install_dir.join("lib"))),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
  }
}
