//! Host gateways and other external systems.
//!
//! A [`Host`] runs commands and receives files, either on this machine
//! ([`LocalHost`]) or over SSH ([`SshHost`]). A [`Connector`] builds hosts;
//! tests swap it for a recording implementation. A [`Prober`] checks that an
//! instance answers on its control endpoint.

pub mod local;
pub mod probe;
pub mod ssh;

use std::path::Path;

use async_trait::async_trait;

use crate::domain::HostCommand;
use crate::error::Result;

// Re-export the concrete adapters
pub use local::LocalHost;
pub use probe::{HttpProber, Prober};
pub use ssh::SshHost;

/// Uniform command execution on a local or remote machine
#[async_trait]
pub trait Host: Send + Sync {
    /// Human-readable host name (for logs)
    fn name(&self) -> &str;

    /// Run a command and return its standard output.
    ///
    /// `cwd` overrides the directory set with [`Host::chdir`]. A non-zero exit
    /// status fails with `FleetError::CommandFailed`. `quiet` only controls
    /// whether output is echoed to the operator.
    async fn run(&self, command: &HostCommand, cwd: Option<&str>, quiet: bool) -> Result<String>;

    /// Copy a local file into a directory on the host
    async fn put(&self, local_path: &Path, remote_dir: &str) -> Result<()>;

    /// Set the working directory used by later `run` calls
    fn chdir(&mut self, path: &str) -> &mut dyn Host;
}

/// Builds host handles
pub trait Connector: Send + Sync {
    /// A handle on this machine
    fn local(&self) -> Box<dyn Host>;

    /// A handle on a remote machine reached at `address`
    fn remote(&self, address: &str, user: Option<&str>, shell: bool) -> Result<Box<dyn Host>>;
}

/// Connector spawning real processes (`ssh`/`scp` for remote hosts)
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConnector;

impl Connector for SystemConnector {
    fn local(&self) -> Box<dyn Host> {
        Box::new(LocalHost::new())
    }

    fn remote(&self, address: &str, user: Option<&str>, shell: bool) -> Result<Box<dyn Host>> {
        Ok(Box::new(SshHost::new(address, user, shell)?))
    }
}

/// Echo command output to the operator
pub(crate) fn echo_output(host: &str, output: &str, quiet: bool) {
    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        if quiet {
            tracing::debug!(host, "{}", line);
        } else {
            tracing::info!(host, "{}", line);
        }
    }
}
