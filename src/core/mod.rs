//! Core orchestration logic.
//!
//! This module contains:
//! - Actions: per-kind action tables and the `Entity` trait
//! - Pipeline: composite actions
//! - PyEnv / Instance: the managed entities
//! - Fleet: fan-out over the instances of an environment
//! - Orchestrator: dispatch by kind, name and action

pub mod actions;
pub mod context;
pub mod fleet;
pub mod instance;
pub mod orchestrator;
pub mod pipeline;
pub mod pyenv;
pub mod source;

// Re-export commonly used types
pub use actions::{ActionEntry, ActionTable, Entity};
pub use context::RunContext;
pub use fleet::{ProbeReport, ProbeStatus};
pub use instance::{Instance, InstanceOp};
pub use orchestrator::{ActionInfo, ActionStatus, EntityKind, Orchestrator};
pub use pipeline::run_pipeline;
pub use pyenv::{PyEnv, PyEnvOp};
pub use source::Source;
