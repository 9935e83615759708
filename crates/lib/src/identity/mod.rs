//! Build identities and canonical names.
//!
//! A build is identified by `(kind, version, machine?, compiler_id?, build_type)`.
//! The canonical name joins the sanitized components with `/` in that fixed
//! order, e.g. `framework/main/laptop/gcc11/debug`. Two identities with equal
//! canonical names are the same build.
//!
//! Everything in this module is pure: no filesystem access, no globals.

pub mod paths;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

pub use paths::{PathSet, Resolver, Role};

/// Errors raised while building or parsing an identity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
  #[error("invalid build type '{0}' (expected one of: debug, opt, relwithdebinfo)")]
  InvalidBuildType(String),

  #[error("unknown build kind '{0}' (expected one of: tpls, framework, extension)")]
  UnknownKind(String),

  #[error("{0} must not be empty")]
  EmptyComponent(&'static str),

  #[error("{field} '{value}' is a reserved path component")]
  ReservedComponent { field: &'static str, value: String },

  #[error("malformed canonical name '{0}'")]
  MalformedName(String),
}

/// What is being built. Also the stage order: `Tpls < Framework < Extension`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
  Tpls,
  Framework,
  Extension,
}

impl Kind {
  pub const ALL: [Kind; 3] = [Kind::Tpls, Kind::Framework, Kind::Extension];

  pub fn as_str(&self) -> &'static str {
    match self {
      Kind::Tpls => "tpls",
      Kind::Framework => "framework",
      Kind::Extension => "extension",
    }
  }

  /// The stage that must be complete before this one may start.
  pub fn dependency(self) -> Option<Kind> {
    match self {
      Kind::Tpls => None,
      Kind::Framework => Some(Kind::Tpls),
      Kind::Extension => Some(Kind::Framework),
    }
  }

  /// Every stage up to and including `self`, in build order.
  pub fn chain(self) -> impl Iterator<Item = Kind> {
    Self::ALL.into_iter().filter(move |k| *k <= self)
  }

  /// Prefix for environment variables in module descriptors.
  pub fn env_prefix(&self) -> &'static str {
    match self {
      Kind::Tpls => "TPLS",
      Kind::Framework => "FRAMEWORK",
      Kind::Extension => "EXTENSION",
    }
  }
}

impl fmt::Display for Kind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Kind {
  type Err = IdentityError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "tpls" => Ok(Kind::Tpls),
      "framework" => Ok(Kind::Framework),
      "extension" => Ok(Kind::Extension),
      other => Err(IdentityError::UnknownKind(other.to_string())),
    }
  }
}

/// Optimization level of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildType {
  Debug,
  Opt,
  RelWithDebInfo,
}

impl BuildType {
  pub fn as_str(&self) -> &'static str {
    match self {
      BuildType::Debug => "debug",
      BuildType::Opt => "opt",
      BuildType::RelWithDebInfo => "relwithdebinfo",
    }
  }
}

impl fmt::Display for BuildType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for BuildType {
  type Err = IdentityError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "debug" => Ok(BuildType::Debug),
      "opt" => Ok(BuildType::Opt),
      "relwithdebinfo" => Ok(BuildType::RelWithDebInfo),
      other => Err(IdentityError::InvalidBuildType(other.to_string())),
    }
  }
}

/// Make a single name component safe to join with `/`.
///
/// Idempotent, and the result never contains a `/`.
pub fn sanitize(component: &str) -> String {
  component.replace('/', "-").replace(' ', "_")
}

fn checked_component(field: &'static str, value: &str) -> Result<String, IdentityError> {
  if value.is_empty() {
    return Err(IdentityError::EmptyComponent(field));
  }
  let clean = sanitize(value);
  if clean == "." || clean == ".." {
    return Err(IdentityError::ReservedComponent {
      field,
      value: value.to_string(),
    });
  }
  Ok(clean)
}

/// Immutable description of one build.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildIdentity {
  pub kind: Kind,
  pub version: String,
  pub machine: Option<String>,
  pub compiler_id: Option<String>,
  pub build_type: BuildType,
}

impl BuildIdentity {
  pub fn new(
    kind: Kind,
    version: &str,
    machine: Option<&str>,
    compiler_id: Option<&str>,
    build_type: BuildType,
  ) -> Result<Self, IdentityError> {
    checked_component("version", version)?;
    if let Some(machine) = machine {
      checked_component("machine", machine)?;
    }
    if let Some(compiler_id) = compiler_id {
      checked_component("compiler id", compiler_id)?;
    }

    Ok(Self {
      kind,
      version: version.to_string(),
      machine: machine.map(str::to_string),
      compiler_id: compiler_id.map(str::to_string),
      build_type,
    })
  }

  /// Same machine and compiler, different kind/version/build type.
  pub fn sibling(&self, kind: Kind, version: &str, build_type: BuildType) -> Result<Self, IdentityError> {
    Self::new(
      kind,
      version,
      self.machine.as_deref(),
      self.compiler_id.as_deref(),
      build_type,
    )
  }

  pub fn canonical_name(&self) -> CanonicalName {
    let mut components = vec![self.kind.as_str().to_string(), sanitize(&self.version)];
    if let Some(machine) = &self.machine {
      components.push(sanitize(machine));
    }
    if let Some(compiler_id) = &self.compiler_id {
      components.push(sanitize(compiler_id));
    }
    components.push(self.build_type.as_str().to_string());

    CanonicalName {
      name: components.join("/"),
      kind: self.kind,
      build_type: self.build_type,
    }
  }
}

/// Resolve raw identifiers into a canonical name.
///
/// Fails with [`IdentityError::InvalidBuildType`] unless `build_type` is one of
/// `debug`, `opt` or `relwithdebinfo`.
pub fn resolve(
  kind: &str,
  version: &str,
  machine: Option<&str>,
  compiler_id: Option<&str>,
  build_type: &str,
) -> Result<CanonicalName, IdentityError> {
  let kind = kind.parse::<Kind>()?;
  let build_type = build_type.parse::<BuildType>()?;
  Ok(BuildIdentity::new(kind, version, machine, compiler_id, build_type)?.canonical_name())
}

/// `/`-joined, sanitized identity, e.g. `tpls/0.98.6/debug`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalName {
  name: String,
  kind: Kind,
  build_type: BuildType,
}

impl CanonicalName {
  /// Parse a name typed by a user (as printed by `bstack paths`).
  pub fn parse(input: &str) -> Result<Self, IdentityError> {
    let malformed = || IdentityError::MalformedName(input.to_string());

    let components: Vec<&str> = input.split('/').collect();
    if !(3..=5).contains(&components.len()) {
      return Err(malformed());
    }
    if components
      .iter()
      .any(|c| c.is_empty() || *c == "." || *c == ".." || c.contains(' '))
    {
      return Err(malformed());
    }

    let kind = components[0].parse::<Kind>()?;
    let build_type = components[components.len() - 1].parse::<BuildType>()?;

    Ok(Self {
      name: input.to_string(),
      kind,
      build_type,
    })
  }

  pub fn as_str(&self) -> &str {
    &self.name
  }

  pub fn kind(&self) -> Kind {
    self.kind
  }

  pub fn build_type(&self) -> BuildType {
    self.build_type
  }

  /// The sanitized version component.
  pub fn version(&self) -> &str {
    self.components().nth(1).unwrap_or_default()
  }

  pub fn components(&self) -> std::str::Split<'_, char> {
    self.name.split('/')
  }
}

impl fmt::Display for CanonicalName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.name)
  }
}

impl Serialize for CanonicalName {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&self.name)
  }
}
