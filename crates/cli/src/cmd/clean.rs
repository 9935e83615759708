//! Implementation of the `bstack clean` command.

use std::path::Path;

use anyhow::{Context, Result};
use owo_colors::{OwoColorize, Stream};
use tracing::debug;

use buildstack_lib::clean::{CleanOptions, CleanReport, clean};
use buildstack_lib::remove::{RefusalReason, RemovalOutcome};
use buildstack_lib::{CanonicalName, Config};

use crate::output::{OutputFormat, format_bytes, print_error, print_json, print_stat, print_success, print_warning, symbols};
use crate::prompts::confirm_removal;

/// Remove one build's trees through the guarded remover.
///
/// Without `force` every existing path is confirmed interactively. A path
/// refused by a safety rule makes the command fail after the report is shown.
pub fn cmd_clean(config: &Config, name: &str, remove: bool, force: bool, output: OutputFormat) -> Result<i32> {
  let name = CanonicalName::parse(name).with_context(|| format!("Invalid build name '{name}'"))?;
  debug!(%name, remove, force, "clean requested");

  let mut prompt_error = None;
  let report = clean(config, &name, CleanOptions { remove, force }, &mut |path: &Path| {
    match confirm_removal(path) {
      Ok(answer) => answer,
      Err(err) => {
        prompt_error.get_or_insert(err);
        false
      }
    }
  });
  if let Some(err) = prompt_error {
    return Err(err);
  }

  if output.is_json() {
    print_json(&report)?;
  } else {
    print_report(&report);
  }

  report.into_result().context("Clean refused")?;
  Ok(0)
}

fn print_report(report: &CleanReport) {
  println!();
  for entry in &report.entries {
    let path = entry.path.display();
    match entry.outcome {
      RemovalOutcome::Removed => println!(
        "  {} {} ({})",
        symbols::REMOVE.if_supports_color(Stream::Stdout, |s| s.red()),
        path,
        format_bytes(entry.bytes)
      ),
      RemovalOutcome::Skipped => println!("  {} {} (kept)", symbols::INFO, path),
      RemovalOutcome::Refused(RefusalReason::NotFound) => {}
      RemovalOutcome::Refused(reason) => print_error(&format!("refused to remove {path}: {reason}")),
    }
  }

  for dependent in &report.dependents {
    print_warning(&format!(
      "{dependent} loads {} and will not work until it is rebuilt",
      report.name
    ));
  }

  if report.first_refusal().is_none() {
    print_success(&format!("Cleaned {}", report.name));
  }
  print_stat("Paths removed", &report.removed().to_string());
  print_stat("Space freed", &format_bytes(report.bytes_freed()));
}
