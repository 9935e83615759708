use std::io::{self, IsTerminal, Write};
use std::path::Path;

use anyhow::{Result, bail};

/// Ask before deleting `path`. Refuses to guess when nobody can answer.
pub fn confirm_removal(path: &Path) -> Result<bool> {
  if !io::stdin().is_terminal() || !io::stderr().is_terminal() {
    bail!(
      "Cannot confirm removal of {} in non-interactive mode. Use --force to proceed.",
      path.display()
    );
  }

  write!(io::stderr(), "Remove {}? [y/N] ", path.display())?;
  io::stderr().flush()?;

  let mut input = String::new();
  io::stdin().read_line(&mut input)?;

  Ok(matches!(input.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
