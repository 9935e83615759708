//! Writing rendered text to disk under the permission policy.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::platform::permissions::{PermissionError, PermissionPolicy, make_owner_executable};

#[derive(Debug, Error)]
pub enum WriteError {
  #[error("failed to create directory {}: {source}", path.display())]
  CreateDir { path: PathBuf, source: std::io::Error },

  #[error("failed to write file {}: {source}", path.display())]
  WriteFile { path: PathBuf, source: std::io::Error },

  #[error(transparent)]
  Permissions(#[from] PermissionError),
}

/// How a rendered file is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
  /// A script executed as a process.
  Executable,
  /// A static descriptor read by another tool.
  Static,
}

/// Write `text` to `path`, creating parent directories and applying `policy`.
///
/// Existing files are overwritten.
pub fn write_rendered(path: &Path, text: &str, mode: FileMode, policy: &PermissionPolicy) -> Result<(), WriteError> {
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).map_err(|source| WriteError::CreateDir {
      path: parent.to_path_buf(),
      source,
    })?;
  }

  fs::write(path, text).map_err(|source| WriteError::WriteFile {
    path: path.to_path_buf(),
    source,
  })?;

  if mode == FileMode::Executable {
    make_owner_executable(path)?;
  }
  policy.apply(path)?;

  debug!(path = %path.display(), ?mode, "wrote rendered file");
  Ok(())
}
