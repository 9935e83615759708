//! Guarded removal of paths inside the sandbox.
//!
//! Refusal rules, checked in order:
//!
//! 1. the path does not exist
//! 2. the resolved path is not below `BASE` or `BUILD_BASE`
//! 3. the resolved path is exactly one of the roots
//! 4. the path as given contains a `..` segment
//!
//! Containment is always evaluated on the resolved absolute path, never on
//! the path as typed. A refusal is never escalated to a forced deletion.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::identity::Resolver;

/// Why the remover declined to touch a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefusalReason {
  NotFound,
  OutsideSandbox,
  SandboxRoot,
  ParentTraversal,
}

impl RefusalReason {
  /// Non-existence is routine during cleanup; every other reason is a safety refusal.
  pub fn is_safety(&self) -> bool {
    !matches!(self, RefusalReason::NotFound)
  }
}

impl std::fmt::Display for RefusalReason {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let text = match self {
      RefusalReason::NotFound => "path does not exist",
      RefusalReason::OutsideSandbox => "path is outside the sandbox roots",
      RefusalReason::SandboxRoot => "refusing to remove a sandbox root",
      RefusalReason::ParentTraversal => "path contains '..'",
    };
    f.write_str(text)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum RemovalOutcome {
  Removed,
  Skipped,
  Refused(RefusalReason),
}

/// Deletes files and trees, but only strictly inside the configured roots.
#[derive(Debug, Clone)]
pub struct GuardedRemover {
  roots: Vec<PathBuf>,
}

impl GuardedRemover {
  pub fn new<'a>(roots: impl IntoIterator<Item = &'a Path>) -> Self {
    let mut resolved: Vec<PathBuf> = roots.into_iter().map(resolve_root).collect();
    resolved.dedup();
    Self { roots: resolved }
  }

  pub fn from_resolver(resolver: &Resolver) -> Self {
    Self::new(resolver.roots())
  }

  /// Apply the refusal rules; on success return the resolved path to delete.
  pub fn check(&self, path: &Path) -> Result<PathBuf, RefusalReason> {
    let Some(resolved) = resolve_existing(path) else {
      return Err(RefusalReason::NotFound);
    };

    if !self.roots.iter().any(|root| resolved.starts_with(root)) {
      return Err(RefusalReason::OutsideSandbox);
    }

    if self.roots.iter().any(|root| resolved == *root) {
      return Err(RefusalReason::SandboxRoot);
    }

    if path.components().any(|c| c == Component::ParentDir) {
      return Err(RefusalReason::ParentTraversal);
    }

    Ok(resolved)
  }

  /// Remove `path` (file or directory tree).
  ///
  /// Without `force`, `confirm` is asked first and a negative answer yields
  /// [`RemovalOutcome::Skipped`]. Directory removal is best-effort: entries
  /// that cannot be deleted are logged and the outcome is still `Removed`.
  pub fn remove(&self, path: &Path, force: bool, confirm: &mut impl FnMut(&Path) -> bool) -> RemovalOutcome {
    let resolved = match self.check(path) {
      Ok(resolved) => resolved,
      Err(RefusalReason::NotFound) => {
        info!(path = %path.display(), "not removing nonexistent path");
        return RemovalOutcome::Refused(RefusalReason::NotFound);
      }
      Err(reason) => {
        warn!(path = %path.display(), roots = ?self.roots, %reason, "refusing to remove");
        return RemovalOutcome::Refused(reason);
      }
    };

    if !force && !confirm(&resolved) {
      debug!(path = %resolved.display(), "removal declined");
      return RemovalOutcome::Skipped;
    }

    info!(path = %resolved.display(), "removing");
    let is_dir = fs::symlink_metadata(&resolved).map(|m| m.is_dir()).unwrap_or(false);
    if is_dir {
      remove_tree_best_effort(&resolved);
    } else if let Err(e) = fs::remove_file(&resolved) {
      warn!(path = %resolved.display(), error = %e, "failed to remove file");
    }

    RemovalOutcome::Removed
  }
}

/// Total size of regular files below `path`.
pub fn dir_size(path: &Path) -> u64 {
  WalkDir::new(path)
    .into_iter()
    .filter_map(|e| e.ok())
    .filter(|e| e.file_type().is_file())
    .filter_map(|e| e.metadata().ok())
    .map(|m| m.len())
    .sum()
}

fn remove_tree_best_effort(path: &Path) {
  if fs::remove_dir_all(path).is_ok() {
    return;
  }

  let mut failures = 0usize;
  for entry in WalkDir::new(path).contents_first(true).into_iter().filter_map(|e| e.ok()) {
    let result = if entry.file_type().is_dir() {
      fs::remove_dir(entry.path())
    } else {
      fs::remove_file(entry.path())
    };
    if let Err(e) = result {
      failures += 1;
      debug!(path = %entry.path().display(), error = %e, "failed to remove entry");
    }
  }

  if failures > 0 {
    warn!(path = %path.display(), failures, "directory only partially removed");
  }
}

fn resolve_root(root: &Path) -> PathBuf {
  dunce::canonicalize(root)
    .or_else(|_| std::path::absolute(root))
    .unwrap_or_else(|_| root.to_path_buf())
}

/// Resolve an existing path. A symlink resolves to its own location (its
/// parent is canonicalized) so the link is removed, not its target.
fn resolve_existing(path: &Path) -> Option<PathBuf> {
  let metadata = fs::symlink_metadata(path).ok()?;

  if metadata.file_type().is_symlink() {
    let absolute = std::path::absolute(path).ok()?;
    let parent = dunce::canonicalize(absolute.parent()?).ok()?;
    return Some(parent.join(absolute.file_name()?));
  }

  dunce::canonicalize(path).ok()
}
