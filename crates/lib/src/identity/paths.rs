//! Filesystem locations derived from canonical names.
//!
//! # Layout
//!
//! ```text
//! BASE/
//! ├── <kind>/repos/<version>/                 # source trees, shared per version
//! ├── <kind>/install/<version>/.../<type>/    # install prefixes
//! ├── modulefiles/<kind>/<version>/.../<type> # module descriptors
//! └── scripts/<prefix>-<name>.sh              # generated scripts
//! BUILD_BASE/
//! └── <kind>/build/<version>/.../<type>/      # build trees
//! ```

use std::path::{Path, PathBuf};

use serde::Serialize;

use super::{CanonicalName, Kind, sanitize};
use crate::config::Config;

/// Which location of a build to derive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
  Source,
  Build,
  Install,
  Module,
}

impl Role {
  fn segment(&self) -> &'static str {
    match self {
      Role::Source => "repos",
      Role::Build => "build",
      Role::Install => "install",
      Role::Module => "modulefiles",
    }
  }
}

/// All locations of one build. Derived on demand, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathSet {
  pub source_dir: PathBuf,
  pub build_dir: PathBuf,
  pub install_dir: PathBuf,
  pub module_path: PathBuf,
}

impl PathSet {
  /// Replace the source tree (the TPL superbuild lives inside the framework sources).
  pub fn with_source(mut self, source_dir: PathBuf) -> Self {
    self.source_dir = source_dir;
    self
  }

  /// Advisory lock guarding the install directory: `<install_dir>.lock`.
  pub fn lock_path(&self) -> PathBuf {
    let mut file_name = self.install_dir.file_name().unwrap_or_default().to_os_string();
    file_name.push(".lock");
    self.install_dir.with_file_name(file_name)
  }
}

/// Maps canonical names onto the two configured roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolver {
  base: PathBuf,
  build_base: PathBuf,
}

impl Resolver {
  pub fn new(base: impl Into<PathBuf>, build_base: impl Into<PathBuf>) -> Self {
    Self {
      base: base.into(),
      build_base: build_base.into(),
    }
  }

  pub fn from_config(config: &Config) -> Self {
    Self::new(&config.base, &config.build_base)
  }

  pub fn base(&self) -> &Path {
    &self.base
  }

  pub fn build_base(&self) -> &Path {
    &self.build_base
  }

  /// Both sandbox roots; every derived path lies strictly below one of them.
  pub fn roots(&self) -> [&Path; 2] {
    [&self.base, &self.build_base]
  }

  pub fn path_for(&self, name: &CanonicalName, role: Role) -> PathBuf {
    let mut components = name.components();
    let kind = components.next().unwrap_or_default();

    match role {
      Role::Source => self.base.join(kind).join(role.segment()).join(name.version()),
      Role::Build => components.fold(self.build_base.join(kind).join(role.segment()), |p, c| p.join(c)),
      Role::Install => components.fold(self.base.join(kind).join(role.segment()), |p, c| p.join(c)),
      Role::Module => name
        .components()
        .fold(self.base.join(role.segment()), |p, c| p.join(c)),
    }
  }

  pub fn paths(&self, name: &CanonicalName) -> PathSet {
    PathSet {
      source_dir: self.path_for(name, Role::Source),
      build_dir: self.path_for(name, Role::Build),
      install_dir: self.path_for(name, Role::Install),
      module_path: self.path_for(name, Role::Module),
    }
  }

  /// Source tree for `(kind, version)` without a full identity.
  pub fn source_dir(&self, kind: Kind, version: &str) -> PathBuf {
    self
      .base
      .join(kind.as_str())
      .join(Role::Source.segment())
      .join(sanitize(version))
  }

  /// Directory to add to `MODULEPATH`.
  pub fn modulefiles_dir(&self) -> PathBuf {
    self.base.join(Role::Module.segment())
  }

  pub fn scripts_dir(&self) -> PathBuf {
    self.base.join("scripts")
  }

  /// `BASE/scripts/<prefix>-<name>.sh` with the name flattened.
  pub fn script_path(&self, prefix: &str, name: &CanonicalName) -> PathBuf {
    self.scripts_dir().join(sanitize(&format!("{prefix}-{name}.sh")))
  }

  /// Shared download cache for TPL tarballs.
  pub fn downloads_dir(&self, kind: Kind) -> PathBuf {
    self.base.join(kind.as_str()).join("Downloads")
  }
}
