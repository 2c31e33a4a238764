//! Location strings: where a Python environment lives.
//!
//! Two shapes are accepted:
//! - `localhost:<path>` for the machine pyfleet runs on
//! - `<user>@<server>:<path>` for a remote host, `server` naming a `server` section
//!
//! Relative paths are anchored to the home directory of the target user.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::FleetError;

/// Server name reserved for the local machine
pub const LOCALHOST: &str = "localhost";

/// Whether a location targets this machine or a remote one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Local,
    Remote,
}

/// A resolved location
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    /// Remote user (always `None` for localhost)
    pub user: Option<String>,

    /// Server name, `localhost` for the local machine
    pub server: String,

    /// Absolute path, or `~/`-prefixed home-relative path
    pub path: String,
}

impl Location {
    /// Parse a raw location string
    pub fn resolve(raw: &str) -> Result<Self, FleetError> {
        let malformed = || FleetError::MalformedLocation {
            raw: raw.to_string(),
        };

        let (user, server, path) = match raw.strip_prefix("localhost:") {
            Some(path) => (None, LOCALHOST.to_string(), path),
            None => {
                let (user, rest) = raw.split_once('@').ok_or_else(malformed)?;
                let (server, path) = rest.split_once(':').ok_or_else(malformed)?;
                // The local machine never carries a user
                let user = (server != LOCALHOST).then(|| user.to_string());
                (user, server.to_string(), path)
            }
        };

        if path.is_empty() {
            return Err(malformed());
        }

        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("~/{}", path)
        };

        Ok(Self { user, server, path })
    }

    pub fn is_local(&self) -> bool {
        self.server == LOCALHOST
    }

    pub fn target_kind(&self) -> TargetKind {
        if self.is_local() {
            TargetKind::Local
        } else {
            TargetKind::Remote
        }
    }
}

impl FromStr for Location {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::resolve(s)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.user {
            Some(user) => write!(f, "{}@{}:{}", user, self.server, self.path),
            None => write!(f, "{}:{}", self.server, self.path),
        }
    }
}
