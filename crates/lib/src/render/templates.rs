//! Built-in templates, overridable from a directory of `<name>.template` files.

use std::path::{Path, PathBuf};

use tracing::debug;

/// Build script for one stage. Every value is shell-quoted before substitution.
pub const BUILD_SCRIPT_TEMPLATE: &str = r#"#!/usr/bin/env bash
# Generated by buildstack for $${name}.
# Re-running this script by hand resumes the build of this stage.

$${module_setup}
cd $${source_dir} || exit 1

echo "Building $${kind}: $${name}"
echo "-----------------------------------------------------"
echo "source dir  =" $${source_dir}
echo "build dir   =" $${build_dir}
echo "install dir =" $${install_dir}
echo "-----------------------------------------------------"

mpi_cc=$(command -v $${mpi_cc}) || { echo "compiler wrapper not found: $${mpi_cc}" >&2; exit 1; }
mpi_cxx=$(command -v $${mpi_cxx}) || { echo "compiler wrapper not found: $${mpi_cxx}" >&2; exit 1; }
mpi_fc=$(command -v $${mpi_fc}) || { echo "compiler wrapper not found: $${mpi_fc}" >&2; exit 1; }

$${entry_point} \
    $${flags} \
    --with-c-compiler="$mpi_cc" \
    --with-cxx-compiler="$mpi_cxx" \
    --with-fort-compiler="$mpi_fc" \
    ${MPI_DIR:+--with-mpi="$MPI_DIR"}

exit $?
"#;

/// Environment-modules descriptor. Values are Tcl-quoted before substitution.
pub const MODULEFILE_TEMPLATE: &str = r#"#%Module1.0
##
## $${name}
## Generated by buildstack, overwritten on rebuild.
##
proc ModulesHelp { } {
  puts stderr "$${kind} build $${name} ($${build_type})"
}
module-whatis "$${name}"

$${dependency_load}
setenv $${prefix}_SRC_DIR $${source_dir}
setenv $${prefix}_BUILD_DIR $${build_dir}
setenv $${prefix}_DIR $${install_dir}
setenv $${prefix}_BUILD_TYPE $${build_type}

prepend-path PATH $${bin_dir}
prepend-path LD_LIBRARY_PATH $${lib_dir}
prepend-path CMAKE_PREFIX_PATH $${install_dir}
"#;

/// Post-build verification script.
pub const TEST_SCRIPT_TEMPLATE: &str = r#"#!/usr/bin/env bash
# Generated by buildstack: checks for $${name}.

module use $${modulefiles_dir}
module load $${name}
cd $${build_dir} || exit 1

$${test_command}
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
  BuildScript,
  Modulefile,
  TestScript,
}

impl TemplateKind {
  pub fn file_name(&self) -> &'static str {
    match self {
      TemplateKind::BuildScript => "build-script.template",
      TemplateKind::Modulefile => "modulefile.template",
      TemplateKind::TestScript => "test-script.template",
    }
  }

  fn builtin(&self) -> &'static str {
    match self {
      TemplateKind::BuildScript => BUILD_SCRIPT_TEMPLATE,
      TemplateKind::Modulefile => MODULEFILE_TEMPLATE,
      TemplateKind::TestScript => TEST_SCRIPT_TEMPLATE,
    }
  }
}

/// Template lookup: override directory first, then built-ins.
#[derive(Debug, Clone, Default)]
pub struct Templates {
  override_dir: Option<PathBuf>,
}

impl Templates {
  pub fn new(override_dir: Option<&Path>) -> Self {
    Self {
      override_dir: override_dir.map(Path::to_path_buf),
    }
  }

  pub fn get(&self, kind: TemplateKind) -> std::io::Result<String> {
    if let Some(dir) = &self.override_dir {
      let path = dir.join(kind.file_name());
      if path.is_file() {
        debug!(path = %path.display(), "using template override");
        return std::fs::read_to_string(path);
      }
    }
    Ok(kind.builtin().to_string())
  }
}
