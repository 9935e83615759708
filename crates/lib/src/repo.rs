//! Source tree preparation.
//!
//! The pipeline only needs "a source tree now exists at X". How it gets there
//! is behind the [`Repository`] trait; [`GitCli`] drives the `git` binary.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use crate::platform::permissions::{PermissionError, PermissionPolicy};
use crate::remove::{GuardedRemover, RefusalReason, RemovalOutcome};

#[derive(Debug, Error)]
pub enum RepoError {
  #[error("cannot clone into {} as it already exists (use skip-clone or clobber)", .0.display())]
  ExistingDirectoryConflict(PathBuf),

  #[error("source tree {} does not exist", .0.display())]
  MissingSource(PathBuf),

  #[error("refused to clobber {}: {reason}", path.display())]
  ClobberRefused { path: PathBuf, reason: RefusalReason },

  #[error("failed to run git: {0}")]
  Spawn(#[from] std::io::Error),

  #[error("git {args} failed with exit code {code:?}: {stderr}")]
  Git {
    args: String,
    code: Option<i32>,
    stderr: String,
  },

  #[error(transparent)]
  Permissions(#[from] PermissionError),
}

/// What to do about the destination directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceMode {
  /// Fresh clone; the destination must not exist.
  #[default]
  Clone,
  /// Use the existing tree as-is.
  SkipClone,
  /// Remove the destination, then clone.
  Clobber,
}

/// Version-control operations the pipeline depends on.
#[async_trait]
pub trait Repository: Send + Sync {
  async fn clone_repository(&self, url: &str, dest: &Path, branch: &str) -> Result<(), RepoError>;

  async fn checkout_new_branch(&self, repo: &Path, name: &str) -> Result<(), RepoError>;

  async fn update_submodules(&self, repo: &Path) -> Result<(), RepoError>;
}

#[derive(Debug, Clone)]
pub struct SourceRequest {
  pub dest: PathBuf,
  pub url: String,
  pub branch: String,
  pub new_branch: Option<String>,
  pub mode: SourceMode,
}

/// Make sure `request.dest` holds a source tree, cloning if asked to.
pub async fn prepare_source(
  repository: &dyn Repository,
  remover: &GuardedRemover,
  policy: &PermissionPolicy,
  request: &SourceRequest,
) -> Result<PathBuf, RepoError> {
  let dest = &request.dest;
  info!(dest = %dest.display(), mode = ?request.mode, "preparing source tree");

  match request.mode {
    SourceMode::SkipClone => {
      if !dest.is_dir() {
        return Err(RepoError::MissingSource(dest.clone()));
      }
    }
    SourceMode::Clone => {
      if dest.exists() {
        return Err(RepoError::ExistingDirectoryConflict(dest.clone()));
      }
      clone_fresh(repository, request).await?;
    }
    SourceMode::Clobber => {
      match remover.remove(dest, true, &mut |_: &Path| true) {
        RemovalOutcome::Refused(reason) if reason.is_safety() => {
          return Err(RepoError::ClobberRefused {
            path: dest.clone(),
            reason,
          });
        }
        _ => {}
      }
      clone_fresh(repository, request).await?;
    }
  }

  if let Some(new_branch) = &request.new_branch {
    info!(branch = %new_branch, "creating branch");
    repository.checkout_new_branch(dest, new_branch).await?;
  }

  policy.apply_tree(dest)?;
  Ok(dest.clone())
}

async fn clone_fresh(repository: &dyn Repository, request: &SourceRequest) -> Result<(), RepoError> {
  info!(url = %request.url, dest = %request.dest.display(), branch = %request.branch, "cloning");
  repository
    .clone_repository(&request.url, &request.dest, &request.branch)
    .await?;
  repository.update_submodules(&request.dest).await
}

/// [`Repository`] backed by the `git` executable on `PATH`.
#[derive(Debug, Clone)]
pub struct GitCli {
  program: PathBuf,
}

impl Default for GitCli {
  fn default() -> Self {
    Self {
      program: PathBuf::from("git"),
    }
  }
}

impl GitCli {
  pub fn with_program(program: impl Into<PathBuf>) -> Self {
    Self {
      program: program.into(),
    }
  }

  async fn run(&self, cwd: Option<&Path>, args: &[&str]) -> Result<(), RepoError> {
    let mut command = Command::new(&self.program);
    if let Some(cwd) = cwd {
      command.arg("-C").arg(cwd);
    }
    command.args(args);

    debug!(program = %self.program.display(), ?args, "running git");
    let output = command.output().await?;

    if !output.status.success() {
      return Err(RepoError::Git {
        args: args.join(" "),
        code: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      });
    }
    Ok(())
  }
}

#[async_trait]
impl Repository for GitCli {
  async fn clone_repository(&self, url: &str, dest: &Path, branch: &str) -> Result<(), RepoError> {
    let dest = dest.to_string_lossy();
    self.run(None, &["clone", "--branch", branch, url, &dest]).await
  }

  async fn checkout_new_branch(&self, repo: &Path, name: &str) -> Result<(), RepoError> {
    self.run(Some(repo), &["checkout", "-b", name]).await
  }

  async fn update_submodules(&self, repo: &Path) -> Result<(), RepoError> {
    self.run(Some(repo), &["submodule", "update", "--init", "--recursive"]).await
  }
}
