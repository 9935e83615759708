//! TPL version discovery.
//!
//! The framework source tree declares the TPL bundle it needs in a CMake file:
//!
//! ```text
//! set(AMANZI_TPLS_VERSION_MAJOR 0)
//! set(AMANZI_TPLS_VERSION_MINOR 98)
//! set(AMANZI_TPLS_VERSION_PATCH 6)
//! ```
//!
//! The file is read on every call; source trees change between runs.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::config::VersionFileConfig;
use crate::identity::{Kind, Resolver};

#[derive(Debug, Error)]
pub enum VersionError {
  #[error("no version declaration at {}: {source}", path.display())]
  MissingVersionDeclaration { path: PathBuf, source: std::io::Error },

  #[error("malformed version file {}: missing {marker}", path.display())]
  MalformedVersionFile { path: PathBuf, marker: String },
}

/// Look up the TPL version required by `(kind, version)`'s source tree.
pub fn tpl_version_for(
  resolver: &Resolver,
  declarations: &VersionFileConfig,
  kind: Kind,
  version: &str,
) -> Result<String, VersionError> {
  let source_dir = resolver.source_dir(kind, version);
  read_tpl_version(&source_dir.join(&declarations.path), &declarations.prefix)
}

/// Parse `major.minor.patch` out of the declarations file at `path`.
pub fn read_tpl_version(path: &Path, prefix: &str) -> Result<String, VersionError> {
  let content = fs::read_to_string(path).map_err(|source| VersionError::MissingVersionDeclaration {
    path: path.to_path_buf(),
    source,
  })?;

  let part = |name: &str| {
    let marker = format!("set({prefix}_{name}");
    find_declared(&content, &marker).ok_or_else(|| VersionError::MalformedVersionFile {
      path: path.to_path_buf(),
      marker,
    })
  };

  let version = format!("{}.{}.{}", part("MAJOR")?, part("MINOR")?, part("PATCH")?);
  debug!(path = %path.display(), %version, "found TPL version");
  Ok(version)
}

/// Token between `marker` and the first `)` on the first line starting with it.
fn find_declared<'a>(content: &'a str, marker: &str) -> Option<&'a str> {
  content
    .lines()
    .map(str::trim)
    .find_map(|line| line.strip_prefix(marker))
    .map(|rest| rest.split(')').next().unwrap_or_default().trim())
}
