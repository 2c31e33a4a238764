//! pyfleet - Deployment orchestrator for Python environments and ikaaro instances
//!
//! Manages two kinds of entities across local and remote hosts:
//! Python environments (`pyenv`) and the ikaaro instances served from them.
//! Each entity exposes named actions that resolve, for its target, into an
//! ordered sequence of host commands.
//!
//! # Modules
//!
//! - `adapters`: Host gateways (local, SSH) and the liveness prober
//! - `config`: Configuration registry and discovery
//! - `core`: Entities, action tables, composite pipelines, fleet fan-out
//! - `domain`: Locations, versions, structured commands
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # List what a Python environment offers
//! pyfleet pyenv staging
//!
//! # Build, upload, install and restart every instance
//! pyfleet pyenv staging deploy
//!
//! # Check the instances answer
//! pyfleet pyenv staging test
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

// Re-export main types at crate root for convenience
pub use config::{ConfigSection, Registry, RunOptions};
pub use core::{EntityKind, Instance, Orchestrator, PyEnv, RunContext};
pub use domain::{HostCommand, Location, TargetKind};
pub use error::{FleetError, Result};
