//! Group/permission policy for everything written under the sandbox.
//!
//! Two profiles, selected by whether an admin group is configured:
//!
//! - **Shared with group**: 0775 (dirs/executables), 0664 (files), group ownership set
//! - **Owner-only**: 0755 (dirs/executables), 0644 (files)

use std::path::Path;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::Config;

#[derive(Debug, thiserror::Error)]
pub enum PermissionError {
  #[error("failed to set permissions on {path}: {source}")]
  SetPermissions {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to read metadata for {path}: {source}")]
  Metadata {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to traverse directory {path}: {source}")]
  WalkDir {
    path: String,
    #[source]
    source: walkdir::Error,
  },

  #[error("unknown group '{0}'")]
  UnknownGroup(String),

  #[error("failed to change group of {path}: {message}")]
  Chown { path: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PermissionPolicy {
  group: Option<String>,
}

impl PermissionPolicy {
  pub fn new(group: Option<&str>) -> Self {
    Self {
      group: group.filter(|g| !g.is_empty()).map(str::to_string),
    }
  }

  pub fn from_config(config: &Config) -> Self {
    Self::new(config.admin_group.as_deref())
  }

  pub fn is_shared(&self) -> bool {
    self.group.is_some()
  }

  /// `(executable, non_executable)` modes for this profile.
  pub fn modes(&self) -> (u32, u32) {
    if self.is_shared() { (0o775, 0o664) } else { (0o755, 0o644) }
  }

  /// Apply the policy to one file or directory.
  pub fn apply(&self, path: &Path) -> Result<(), PermissionError> {
    apply_entry(path, self.modes(), self.group.as_deref())
  }

  /// Apply the policy to a whole tree, best-effort.
  ///
  /// Editor lock files (`.#*`) are skipped; per-entry failures are logged.
  pub fn apply_tree(&self, root: &Path) -> Result<(), PermissionError> {
    if !root.exists() {
      return Ok(());
    }

    debug!(path = %root.display(), shared = self.is_shared(), "applying permission policy");

    let walker = WalkDir::new(root)
      .into_iter()
      .filter_entry(|e| !e.file_name().to_string_lossy().starts_with(".#"));

    for entry in walker {
      let entry = entry.map_err(|e| PermissionError::WalkDir {
        path: root.display().to_string(),
        source: e,
      })?;

      if entry.path_is_symlink() {
        continue;
      }

      if let Err(e) = self.apply(entry.path()) {
        warn!(path = %entry.path().display(), error = %e, "failed to apply permissions, continuing");
      }
    }

    Ok(())
  }
}

/// Make a freshly written script owner read/write/executable (0700).
pub fn make_owner_executable(path: &Path) -> Result<(), PermissionError> {
  set_mode(path, 0o700)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<(), PermissionError> {
  use std::os::unix::fs::PermissionsExt;

  std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(|e| {
    PermissionError::SetPermissions {
      path: path.display().to_string(),
      source: e,
    }
  })
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<(), PermissionError> {
  Ok(())
}

#[cfg(unix)]
fn apply_entry(path: &Path, (exec, non_exec): (u32, u32), group: Option<&str>) -> Result<(), PermissionError> {
  use std::os::unix::fs::PermissionsExt;

  let metadata = std::fs::metadata(path).map_err(|e| PermissionError::Metadata {
    path: path.display().to_string(),
    source: e,
  })?;

  let current_mode = metadata.permissions().mode();
  let new_mode = if metadata.is_dir() || (current_mode & 0o100 != 0) {
    exec
  } else {
    non_exec
  };

  set_mode(path, new_mode)?;

  if let Some(group) = group {
    set_group(path, group)?;
  }

  Ok(())
}

#[cfg(not(unix))]
fn apply_entry(_path: &Path, _modes: (u32, u32), _group: Option<&str>) -> Result<(), PermissionError> {
  Ok(())
}

#[cfg(unix)]
fn set_group(path: &Path, group: &str) -> Result<(), PermissionError> {
  use nix::unistd::{Group, chown};

  let gid = Group::from_name(group)
    .map_err(|e| PermissionError::Chown {
      path: path.display().to_string(),
      message: e.to_string(),
    })?
    .ok_or_else(|| PermissionError::UnknownGroup(group.to_string()))?
    .gid;

  chown(path, None, Some(gid)).map_err(|e| PermissionError::Chown {
    path: path.display().to_string(),
    message: e.to_string(),
  })
}
