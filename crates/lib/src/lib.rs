//! buildstack-lib: build identities and pipeline orchestration for a layered
//! scientific-software stack (TPLs, framework, extension).
//!
//! - [`identity`]: canonical names and the paths derived from them
//! - [`version`]: TPL version lookup inside a framework source tree
//! - [`render`]: template rendering and writing under the permission policy
//! - [`pipeline`]: dependency-ordered, idempotent stage execution
//! - [`remove`] / [`clean`]: sandbox-guarded teardown

pub mod build_lock;
pub mod clean;
pub mod config;
pub mod consts;
pub mod identity;
pub mod pipeline;
pub mod platform;
pub mod remove;
pub mod render;
pub mod repo;
pub mod version;

pub use config::Config;
pub use identity::{BuildIdentity, BuildType, CanonicalName, Kind, PathSet, Resolver, resolve};
