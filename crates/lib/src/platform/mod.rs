//! Platform-specific filesystem helpers.

pub mod permissions;

pub use permissions::{PermissionError, PermissionPolicy};
