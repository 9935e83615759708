//! Tearing down one build identity.
//!
//! Build and install directories are always removed; with `remove` the
//! module descriptor, generated scripts and source tree go too. Every path
//! passes through the [`GuardedRemover`]. Builds that load the cleaned one
//! are reported as dependents but left alone.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::consts::{BUILD_SCRIPT_PREFIX, TEST_SCRIPT_PREFIX};
use crate::identity::{CanonicalName, Kind, Resolver};
use crate::remove::{GuardedRemover, RefusalReason, RemovalOutcome, dir_size};

#[derive(Debug, Error)]
pub enum CleanError {
  #[error("refused to remove {}: {reason}", path.display())]
  PathSafetyRefusal { path: PathBuf, reason: RefusalReason },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CleanOptions {
  /// Also remove the descriptor, scripts and source tree.
  pub remove: bool,
  /// Skip confirmation.
  pub force: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanEntry {
  pub path: PathBuf,
  pub outcome: RemovalOutcome,
  pub bytes: u64,
}

#[derive(Debug, Serialize)]
pub struct CleanReport {
  pub name: CanonicalName,
  pub entries: Vec<CleanEntry>,
  /// Canonical names whose descriptors load the cleaned build.
  pub dependents: Vec<String>,
}

impl CleanReport {
  pub fn removed(&self) -> usize {
    self
      .entries
      .iter()
      .filter(|e| e.outcome == RemovalOutcome::Removed)
      .count()
  }

  pub fn bytes_freed(&self) -> u64 {
    self
      .entries
      .iter()
      .filter(|e| e.outcome == RemovalOutcome::Removed)
      .map(|e| e.bytes)
      .sum()
  }

  /// The first safety refusal, if any. Missing paths are not refusals here.
  pub fn first_refusal(&self) -> Option<(&Path, RefusalReason)> {
    self.entries.iter().find_map(|e| match e.outcome {
      RemovalOutcome::Refused(reason) if reason.is_safety() => Some((e.path.as_path(), reason)),
      _ => None,
    })
  }

  pub fn into_result(self) -> Result<Self, CleanError> {
    if let Some((path, reason)) = self.first_refusal() {
      return Err(CleanError::PathSafetyRefusal {
        path: path.to_path_buf(),
        reason,
      });
    }
    Ok(self)
  }
}

/// Paths belonging to `name`, in removal order.
pub fn clean_targets(resolver: &Resolver, name: &CanonicalName, remove: bool) -> Vec<PathBuf> {
  let paths = resolver.paths(name);
  let mut targets = vec![paths.build_dir.clone(), paths.install_dir.clone(), paths.lock_path()];

  if remove {
    targets.push(paths.module_path.clone());
    targets.push(resolver.script_path(BUILD_SCRIPT_PREFIX, name));
    targets.push(resolver.script_path(TEST_SCRIPT_PREFIX, name));
    // TPL sources live inside the framework tree and are not owned by this identity.
    if name.kind() != Kind::Tpls {
      targets.push(paths.source_dir);
    }
  }

  targets
}

pub fn clean(
  config: &Config,
  name: &CanonicalName,
  options: CleanOptions,
  confirm: &mut impl FnMut(&Path) -> bool,
) -> CleanReport {
  let resolver = Resolver::from_config(config);
  let remover = GuardedRemover::from_resolver(&resolver);

  let dependents = find_dependents(&resolver.modulefiles_dir(), name);
  for dependent in &dependents {
    warn!(%name, %dependent, "build is loaded by another descriptor, which will stop working");
  }

  let mut entries = Vec::new();
  for path in clean_targets(&resolver, name, options.remove) {
    let bytes = size_of(&path);
    let outcome = remover.remove(&path, options.force, confirm);
    entries.push(CleanEntry { path, outcome, bytes });
  }

  let report = CleanReport {
    name: name.clone(),
    entries,
    dependents,
  };

  info!(%name, removed = report.removed(), bytes_freed = report.bytes_freed(), "clean complete");
  report
}

/// Descriptors under `modulefiles_dir` containing `module load <name>`.
pub fn find_dependents(modulefiles_dir: &Path, name: &CanonicalName) -> Vec<String> {
  let needle = format!("module load {name}");

  let mut dependents: Vec<String> = WalkDir::new(modulefiles_dir)
    .into_iter()
    .filter_map(|e| e.ok())
    .filter(|e| e.file_type().is_file())
    .filter(|e| {
      fs::read_to_string(e.path())
        .map(|content| content.lines().any(|l| l.trim() == needle))
        .unwrap_or(false)
    })
    .filter_map(|e| {
      let relative = e.path().strip_prefix(modulefiles_dir).ok()?;
      let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
      Some(parts.join("/"))
    })
    .collect();

  dependents.sort();
  dependents
}

fn size_of(path: &Path) -> u64 {
  match fs::symlink_metadata(path) {
    Ok(m) if m.is_dir() => dir_size(path),
    Ok(m) => m.len(),
    Err(_) => 0,
  }
}
