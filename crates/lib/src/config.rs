//! Configuration for buildstack.
//!
//! Values are merged from, in increasing precedence:
//! - built-in defaults
//! - a TOML file (`--config`, else `~/.config/buildstack/config.toml`, else `./buildstack.toml`)
//! - environment variables (`BUILDSTACK_BASE`, `BUILDSTACK_BUILD_BASE`, `BUILDSTACK_ADMIN_GROUP`)
//!
//! The result is passed explicitly into every entry point.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::{APP_NAME, CONFIG_FILENAME, ENV_ADMIN_GROUP, ENV_BASE, ENV_BUILD_BASE};
use crate::identity::Kind;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config file {}: {source}", path.display())]
  Read { path: PathBuf, source: std::io::Error },

  #[error("failed to parse config file {}: {source}", path.display())]
  Parse { path: PathBuf, source: toml::de::Error },

  #[error("HOME is not set and BUILDSTACK_BASE was not provided")]
  MissingHome,

  #[error("failed to resolve {}: {source}", path.display())]
  Absolute { path: PathBuf, source: std::io::Error },
}

/// Resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Config {
  /// Sandbox root for sources, installs, descriptors and scripts.
  pub base: PathBuf,
  /// Root for build trees.
  pub build_base: PathBuf,
  /// Group name selecting the shared permission profile.
  pub admin_group: Option<String>,
  pub jobs: usize,
  pub repos: RepoConfig,
  pub version_file: VersionFileConfig,
  pub markers: MarkerConfig,
  pub entry_points: EntryPointConfig,
  pub templates_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
  pub framework_url: String,
  pub extension_url: String,
  pub default_branch: String,
}

impl Default for RepoConfig {
  fn default() -> Self {
    Self {
      framework_url: "https://github.com/amanzi/amanzi.git".to_string(),
      extension_url: "https://github.com/amanzi/ats.git".to_string(),
      default_branch: "master".to_string(),
    }
  }
}

/// Where the TPL version is declared inside the framework sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionFileConfig {
  pub path: PathBuf,
  pub prefix: String,
}

impl Default for VersionFileConfig {
  fn default() -> Self {
    Self {
      path: PathBuf::from("config/SuperBuild/TPLVersions.cmake"),
      prefix: "AMANZI_TPLS_VERSION".to_string(),
    }
  }
}

/// Completion markers, relative to each stage's install directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
  pub tpls: PathBuf,
  pub framework: PathBuf,
  pub extension: PathBuf,
}

impl Default for MarkerConfig {
  fn default() -> Self {
    Self {
      tpls: PathBuf::from("share/cmake/amanzi-tpl-config.cmake"),
      framework: PathBuf::from("lib/cmake/Amanzi/AmanziConfig.cmake"),
      extension: PathBuf::from("bin/ats"),
    }
  }
}

impl MarkerConfig {
  pub fn for_kind(&self, kind: Kind) -> &Path {
    match kind {
      Kind::Tpls => &self.tpls,
      Kind::Framework => &self.framework,
      Kind::Extension => &self.extension,
    }
  }
}

/// Build entry program per stage, relative to its source directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryPointConfig {
  pub tpls: String,
  pub framework: String,
  pub extension: String,
}

impl Default for EntryPointConfig {
  fn default() -> Self {
    Self {
      tpls: "./bootstrap.sh".to_string(),
      framework: "./bootstrap.sh".to_string(),
      extension: "./bootstrap.sh".to_string(),
    }
  }
}

impl EntryPointConfig {
  pub fn for_kind(&self, kind: Kind) -> &str {
    match kind {
      Kind::Tpls => &self.tpls,
      Kind::Framework => &self.framework,
      Kind::Extension => &self.extension,
    }
  }
}

/// On-disk shape: every field optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
  base: Option<PathBuf>,
  build_base: Option<PathBuf>,
  admin_group: Option<String>,
  jobs: Option<usize>,
  repos: Option<RepoConfig>,
  version_file: Option<VersionFileConfig>,
  markers: Option<MarkerConfig>,
  entry_points: Option<EntryPointConfig>,
  templates_dir: Option<PathBuf>,
}

fn default_jobs() -> usize {
  8
}

impl Config {
  /// Configuration rooted at `base`, everything else defaulted.
  pub fn with_base(base: impl Into<PathBuf>) -> Self {
    let base = base.into();
    Self {
      build_base: base.clone(),
      base,
      admin_group: None,
      jobs: default_jobs(),
      repos: RepoConfig::default(),
      version_file: VersionFileConfig::default(),
      markers: MarkerConfig::default(),
      entry_points: EntryPointConfig::default(),
      templates_dir: None,
    }
  }

  /// Load from defaults, the config file and the environment.
  pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
    let file = match explicit {
      Some(path) => Some(read_file(path)?),
      None => match default_config_paths().into_iter().find(|p| p.is_file()) {
        Some(path) => Some(read_file(&path)?),
        None => None,
      },
    };

    let env = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
    Self::merge(file.unwrap_or_default(), env(ENV_BASE), env(ENV_BUILD_BASE), env(ENV_ADMIN_GROUP))
  }

  fn merge(
    file: ConfigFile,
    env_base: Option<String>,
    env_build_base: Option<String>,
    env_group: Option<String>,
  ) -> Result<Self, ConfigError> {
    let base = match env_base.map(PathBuf::from).or(file.base) {
      Some(base) => base,
      None => home_dir().ok_or(ConfigError::MissingHome)?.join(APP_NAME),
    };
    let base = absolute(&base)?;

    let build_base = match env_build_base.map(PathBuf::from).or(file.build_base) {
      Some(build_base) => absolute(&build_base)?,
      None => base.clone(),
    };

    let admin_group = env_group.or(file.admin_group).filter(|g| !g.is_empty());

    debug!(base = %base.display(), build_base = %build_base.display(), ?admin_group, "configuration resolved");

    Ok(Self {
      base,
      build_base,
      admin_group,
      jobs: file.jobs.filter(|j| *j > 0).unwrap_or_else(default_jobs),
      repos: file.repos.unwrap_or_default(),
      version_file: file.version_file.unwrap_or_default(),
      markers: file.markers.unwrap_or_default(),
      entry_points: file.entry_points.unwrap_or_default(),
      templates_dir: file.templates_dir,
    })
  }
}

fn read_file(path: &Path) -> Result<ConfigFile, ConfigError> {
  let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
    path: path.to_path_buf(),
    source,
  })?;
  debug!(path = %path.display(), "loaded config file");
  toml::from_str(&content).map_err(|source| ConfigError::Parse {
    path: path.to_path_buf(),
    source,
  })
}

fn home_dir() -> Option<PathBuf> {
  std::env::var_os("HOME").filter(|h| !h.is_empty()).map(PathBuf::from)
}

fn default_config_paths() -> Vec<PathBuf> {
  let mut paths = Vec::new();
  if let Some(home) = home_dir() {
    paths.push(home.join(".config").join(APP_NAME).join("config.toml"));
  }
  paths.push(PathBuf::from(CONFIG_FILENAME));
  paths
}

fn absolute(path: &Path) -> Result<PathBuf, ConfigError> {
  std::path::absolute(path).map_err(|source| ConfigError::Absolute {
    path: path.to_path_buf(),
    source,
  })
}
