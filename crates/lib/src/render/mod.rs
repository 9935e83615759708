//! Template rendering for build scripts and module descriptors.
//!
//! # Placeholder Format
//!
//! - `$${key}` - replaced by the value of `key` in the substitution map
//!
//! Single `$` characters pass through unchanged, so shell variables like
//! `$HOME` and `${PATH}` need no escaping in script templates.
//!
//! # Escaping
//!
//! Use `$$$` before `{` to produce a literal `$${` sequence.
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeMap;
//! use buildstack_lib::render::render;
//!
//! let mut subs = BTreeMap::new();
//! subs.insert("name".to_string(), "framework/main/debug".to_string());
//! let text = render("module load $${name} # $HOME", &subs).unwrap();
//! assert_eq!(text, "module load framework/main/debug # $HOME");
//! ```

pub mod templates;
pub mod write;

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

pub use templates::{TemplateKind, Templates};
pub use write::{FileMode, write_rendered};

/// A segment of parsed template text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  /// Literal text (no placeholders)
  Literal(String),

  /// A key to be substituted
  Key(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
  #[error("unclosed placeholder at position {0}")]
  Unclosed(usize),

  #[error("malformed placeholder key: '{0}'")]
  Malformed(String),

  #[error("template references '{0}' but no substitution was provided")]
  MissingSubstitutionKey(String),
}

/// Source of substitution values.
pub trait Substitutions {
  fn lookup(&self, key: &str) -> Option<&str>;
}

impl Substitutions for BTreeMap<String, String> {
  fn lookup(&self, key: &str) -> Option<&str> {
    self.get(key).map(String::as_str)
  }
}

impl Substitutions for HashMap<String, String> {
  fn lookup(&self, key: &str) -> Option<&str> {
    self.get(key).map(String::as_str)
  }
}

/// Parse a template into literal and key segments.
pub fn parse(input: &str) -> Result<Vec<Segment>, RenderError> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut chars = input.char_indices().peekable();

  while let Some((pos, ch)) = chars.next() {
    if ch != '$' {
      literal.push(ch);
      continue;
    }

    match chars.peek() {
      Some((_, '$')) => {
        chars.next();

        match chars.peek() {
          Some((_, '$')) => {
            chars.next();
            if let Some((_, '{')) = chars.peek() {
              // $$${ -> literal $${
              literal.push_str("$${");
              chars.next();
            } else {
              literal.push_str("$$$");
            }
          }
          Some((_, '{')) => {
            chars.next();

            if !literal.is_empty() {
              segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }

            let mut key = String::new();
            let mut found_close = false;
            for (_, c) in chars.by_ref() {
              if c == '}' {
                found_close = true;
                break;
              }
              key.push(c);
            }

            if !found_close {
              return Err(RenderError::Unclosed(pos));
            }
            if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
              return Err(RenderError::Malformed(key));
            }
            segments.push(Segment::Key(key));
          }
          _ => literal.push_str("$$"),
        }
      }
      _ => literal.push('$'),
    }
  }

  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }

  Ok(segments)
}

/// Every key a template references, in order of first appearance.
pub fn keys(template: &str) -> Result<Vec<String>, RenderError> {
  let mut seen = Vec::new();
  for segment in parse(template)? {
    if let Segment::Key(key) = segment
      && !seen.contains(&key)
    {
      seen.push(key);
    }
  }
  Ok(seen)
}

/// Fill `template` from `substitutions`.
///
/// Fails with [`RenderError::MissingSubstitutionKey`] for the first referenced
/// key that has no value; nothing is partially rendered.
pub fn render(template: &str, substitutions: &impl Substitutions) -> Result<String, RenderError> {
  let segments = parse(template)?;
  let mut result = String::with_capacity(template.len());

  for segment in &segments {
    match segment {
      Segment::Literal(s) => result.push_str(s),
      Segment::Key(key) => {
        let value = substitutions
          .lookup(key)
          .ok_or_else(|| RenderError::MissingSubstitutionKey(key.clone()))?;
        result.push_str(value);
      }
    }
  }

  Ok(result)
}

/// Quote a value for a POSIX shell. Safe words are left bare.
pub fn shell_quote(value: &str) -> String {
  let safe = !value.is_empty()
    && value
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || "-_./:=+,@%".contains(c));
  if safe {
    value.to_string()
  } else {
    format!("'{}'", value.replace('\'', r"'\''"))
  }
}

/// Quote a value for a Tcl modulefile. Values with whitespace or Tcl
/// metacharacters are brace-wrapped.
pub fn tcl_quote(value: &str) -> String {
  let plain = !value.is_empty() && !value.chars().any(|c| c.is_whitespace() || "{}[]$\"\\;".contains(c));
  if plain {
    value.to_string()
  } else {
    format!("{{{}}}", value.replace('{', r"\{").replace('}', r"\}"))
  }
}

/// `"enable"` / `"disable"` token for a boolean toggle.
pub fn toggle(enabled: bool) -> &'static str {
  if enabled { "enable" } else { "disable" }
}
