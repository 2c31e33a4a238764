//! Error taxonomy for action resolution and execution.
//!
//! Only two variants are recoverable: a missing dependency manifest during
//! install, and an unreachable instance during a fleet liveness test. Every
//! other error aborts the current action invocation.

use thiserror::Error;

/// Errors raised while resolving entities or running host commands
#[derive(Debug, Error)]
pub enum FleetError {
    /// Location string is neither `localhost:<path>` nor `<user>@<server>:<path>`
    #[error("malformed location '{raw}': expected 'localhost:<path>' or '<user>@<server>:<path>'")]
    MalformedLocation { raw: String },

    /// A referenced configuration section does not exist
    #[error("the {kind} \"{name}\" is not found")]
    SectionNotFound { kind: String, name: String },

    /// A required option is absent from a configuration section
    #[error("the {kind} \"{name}\" has no '{key}' option")]
    MissingOption {
        kind: String,
        name: String,
        key: String,
    },

    /// A remote host was requested while running offline
    #[error("this action is not available in offline mode")]
    Offline,

    /// A host command exited with a non-zero status
    #[error("command '{command}' failed with exit code {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// The dependency manifest of a package is absent
    #[error("no requirements.txt found in {path}")]
    MissingManifest { path: String },

    /// An instance did not answer its control endpoint
    #[error("{uri} is unreachable: {reason}")]
    ProbeUnreachable { uri: String, reason: String },

    /// The entity kind has no action with this name
    #[error("{kind} has no action named '{name}'")]
    UnknownAction { kind: String, name: String },

    /// Invalid configuration content
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Local I/O failure (spawning processes, copying files)
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FleetError {
    /// Whether the failure is expected and may be logged instead of propagated
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::MissingManifest { .. } | Self::ProbeUnreachable { .. }
        )
    }

    pub(crate) fn section_not_found(kind: &str, name: &str) -> Self {
        Self::SectionNotFound {
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }
}

pub type Result<T, E = FleetError> = std::result::Result<T, E>;
