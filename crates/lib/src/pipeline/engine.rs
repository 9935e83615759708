//! External process boundary: build scripts and verification.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::consts::{BUILD_LOG_TARGET, TEST_SCRIPT_PREFIX};
use crate::identity::{CanonicalName, Resolver};
use crate::platform::PermissionPolicy;
use crate::render::{self, FileMode, TemplateKind, Templates, shell_quote, write_rendered};

use super::types::PipelineError;

#[derive(Debug, Error)]
pub enum EngineError {
  #[error("failed to start {}: {source}", path.display())]
  Spawn { path: PathBuf, source: std::io::Error },

  #[error("failed waiting for {}: {source}", path.display())]
  Wait { path: PathBuf, source: std::io::Error },
}

/// Runs a generated stage script and reports its exit status.
#[async_trait]
pub trait BuildEngine: Send + Sync {
  async fn execute(&self, script: &Path) -> Result<i32, EngineError>;
}

/// Post-build checks; returns the number of failing checks.
#[async_trait]
pub trait Verifier: Send + Sync {
  async fn verify(&self, name: &CanonicalName) -> Result<u32, PipelineError>;
}

/// Executes scripts directly, relaying their output line by line.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptEngine;

#[async_trait]
impl BuildEngine for ScriptEngine {
  async fn execute(&self, script: &Path) -> Result<i32, EngineError> {
    info!(script = %script.display(), "running script");

    let mut child = Command::new(script)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .spawn()
      .map_err(|source| EngineError::Spawn {
        path: script.to_path_buf(),
        source,
      })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let relay_stdout = async {
      if let Some(stdout) = stdout {
        relay(stdout, |line| info!(target: BUILD_LOG_TARGET, "{line}")).await;
      }
    };
    let relay_stderr = async {
      if let Some(stderr) = stderr {
        relay(stderr, |line| warn!(target: BUILD_LOG_TARGET, "{line}")).await;
      }
    };
    tokio::join!(relay_stdout, relay_stderr);

    let status = child.wait().await.map_err(|source| EngineError::Wait {
      path: script.to_path_buf(),
      source,
    })?;

    let code = exit_code(&status);
    debug!(script = %script.display(), code, "script finished");
    Ok(code)
  }
}

/// Forward every line of `reader` to `emit` until EOF.
///
/// Lines are read as bytes; output that is not UTF-8 is logged lossily and
/// the pipe stays drained until the child closes it.
async fn relay<R: AsyncRead + Unpin>(reader: R, emit: impl Fn(&str)) {
  let mut reader = BufReader::new(reader);
  let mut buf = Vec::new();
  loop {
    buf.clear();
    match reader.read_until(b'\n', &mut buf).await {
      Ok(0) => break,
      Ok(_) => {
        let line = String::from_utf8_lossy(&buf);
        emit(line.trim_end_matches(['\n', '\r']));
      }
      Err(err) => {
        debug!(error = %err, "output relay stopped");
        break;
      }
    }
  }
}

#[cfg(unix)]
fn exit_code(status: &std::process::ExitStatus) -> i32 {
  use std::os::unix::process::ExitStatusExt;
  status
    .code()
    .or_else(|| status.signal().map(|sig| 128 + sig))
    .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code(status: &std::process::ExitStatus) -> i32 {
  status.code().unwrap_or(-1)
}

/// Default check command run inside the build tree.
pub const DEFAULT_TEST_COMMAND: &str = "ctest --output-on-failure";

/// Renders a test script for a build and runs it through a [`BuildEngine`].
///
/// Any nonzero exit counts as one failing check.
pub struct ScriptVerifier<E> {
  resolver: Resolver,
  templates: Templates,
  policy: PermissionPolicy,
  engine: E,
  test_command: String,
}

impl<E: BuildEngine> ScriptVerifier<E> {
  pub fn new(resolver: Resolver, templates: Templates, policy: PermissionPolicy, engine: E) -> Self {
    Self {
      resolver,
      templates,
      policy,
      engine,
      test_command: DEFAULT_TEST_COMMAND.to_string(),
    }
  }

  pub fn with_test_command(mut self, command: impl Into<String>) -> Self {
    self.test_command = command.into();
    self
  }

  /// Write the test script for `name` and return its path.
  pub fn write_script(&self, name: &CanonicalName) -> Result<PathBuf, PipelineError> {
    let template = self
      .templates
      .get(TemplateKind::TestScript)
      .map_err(|source| PipelineError::Template {
        kind: TemplateKind::TestScript,
        source,
      })?;

    let paths = self.resolver.paths(name);
    let subs = [
      ("name", shell_quote(name.as_str())),
      ("modulefiles_dir", shell_quote(&self.resolver.modulefiles_dir().to_string_lossy())),
      ("build_dir", shell_quote(&paths.build_dir.to_string_lossy())),
      ("test_command", self.test_command.clone()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect::<std::collections::BTreeMap<_, _>>();

    let text = render::render(&template, &subs)?;
    let script = self.resolver.script_path(TEST_SCRIPT_PREFIX, name);
    write_rendered(&script, &text, FileMode::Executable, &self.policy)?;
    Ok(script)
  }
}

#[async_trait]
impl<E: BuildEngine> Verifier for ScriptVerifier<E> {
  async fn verify(&self, name: &CanonicalName) -> Result<u32, PipelineError> {
    let script = self.write_script(name)?;
    info!(%name, "running verification");

    let code = self.engine.execute(&script).await?;
    if code == 0 {
      Ok(0)
    } else {
      warn!(%name, code, "verification reported failures");
      Ok(1)
    }
  }
}
