//! Domain types for pyfleet.
//!
//! This module contains the pure value types:
//! - Location: where an environment lives, local or remote
//! - SourceVersion / PackageRef: what to build
//! - HostCommand: what to execute

pub mod command;
pub mod location;
pub mod version;

// Re-export commonly used types
pub use command::HostCommand;
pub use location::{Location, TargetKind, LOCALHOST};
pub use version::{PackageRef, SourceVersion};
