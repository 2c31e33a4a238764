//! Execution context of one action invocation.

use std::path::PathBuf;
use std::sync::OnceLock;

use tracing::debug;

use crate::adapters::{Connector, Host, Prober};
use crate::config::{Registry, RunOptions};
use crate::domain::Location;
use crate::error::{FleetError, Result};

/// Everything an action needs besides its entity
pub struct RunContext<'a> {
    /// Configuration sections (read-only)
    pub registry: &'a Registry,

    /// Runtime switches for this invocation
    pub options: RunOptions,

    /// Builds local and remote hosts
    pub connector: &'a dyn Connector,

    /// Checks instance liveness
    pub prober: &'a dyn Prober,

    /// Where source distributions are written by `build`
    pub cache_dir: PathBuf,
}

impl<'a> RunContext<'a> {
    pub fn new(
        registry: &'a Registry,
        connector: &'a dyn Connector,
        prober: &'a dyn Prober,
        cache_dir: PathBuf,
    ) -> Self {
        Self {
            registry,
            options: RunOptions::default(),
            connector,
            prober,
            cache_dir,
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Build the host gateway for a location.
    ///
    /// `localhost` gives a local host. Anything else needs a `server` section
    /// with a `host` option and is refused in offline mode.
    pub fn host_for(&self, location: &Location, shell: bool) -> Result<Box<dyn Host>> {
        if location.is_local() {
            return Ok(self.connector.local());
        }

        if self.options.offline {
            return Err(FleetError::Offline);
        }

        let server = self.registry.require_section("server", &location.server)?;
        let address = server.require("host")?;
        debug!(server = %location.server, address, user = ?location.user, shell, "Connecting");
        self.connector
            .remote(address, location.user.as_deref(), shell)
    }
}

/// Return the cached value, computing and storing it on first access
pub(crate) fn memoize<T>(cell: &OnceLock<T>, init: impl FnOnce() -> Result<T>) -> Result<&T> {
    if let Some(value) = cell.get() {
        return Ok(value);
    }
    let value = init()?;
    Ok(cell.get_or_init(|| value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigSection;
    use crate::testing::{RecordingConnector, ScriptedProber};

    fn registry() -> Registry {
        Registry::new().with_section(ConfigSection::new("server", "web1").with("host", "10.0.0.5"))
    }

    #[test]
    fn test_localhost_uses_local_host() {
        let registry = registry();
        let connector = RecordingConnector::new();
        let prober = ScriptedProber::default();
        let ctx = RunContext::new(&registry, &connector, &prober, PathBuf::from("/tmp/cache"));

        let location = Location::resolve("localhost:/srv/p").unwrap();
        let host = ctx.host_for(&location, false).unwrap();
        assert_eq!(host.name(), "localhost");
    }

    #[test]
    fn test_remote_resolves_server_address() {
        let registry = registry();
        let connector = RecordingConnector::new();
        let prober = ScriptedProber::default();
        let ctx = RunContext::new(&registry, &connector, &prober, PathBuf::from("/tmp/cache"));

        let location = Location::resolve("deploy@web1:envs/p").unwrap();
        let host = ctx.host_for(&location, true).unwrap();
        assert_eq!(host.name(), "deploy@10.0.0.5");
        assert_eq!(connector.connections(), vec!["deploy@10.0.0.5 shell=true".to_string()]);
    }

    #[test]
    fn test_offline_refuses_remote_before_connecting() {
        let registry = registry();
        let connector = RecordingConnector::new();
        let prober = ScriptedProber::default();
        let ctx = RunContext::new(&registry, &connector, &prober, PathBuf::from("/tmp/cache"))
            .with_options(RunOptions { offline: true });

        let location = Location::resolve("deploy@web1:envs/p").unwrap();
        assert!(matches!(ctx.host_for(&location, false), Err(FleetError::Offline)));
        assert!(connector.connections().is_empty());

        // Local targets stay available offline
        let location = Location::resolve("localhost:/srv/p").unwrap();
        assert!(ctx.host_for(&location, false).is_ok());
    }

    #[test]
    fn test_unknown_server() {
        let registry = registry();
        let connector = RecordingConnector::new();
        let prober = ScriptedProber::default();
        let ctx = RunContext::new(&registry, &connector, &prober, PathBuf::from("/tmp/cache"));

        let location = Location::resolve("deploy@db9:envs/p").unwrap();
        assert!(matches!(
            ctx.host_for(&location, false),
            Err(FleetError::SectionNotFound { ref kind, .. }) if kind == "server"
        ));
    }

    #[test]
    fn test_memoize_computes_once() {
        let cell = OnceLock::new();
        let mut calls = 0;
        let first = *memoize(&cell, || {
            calls += 1;
            Ok(7)
        })
        .unwrap();
        let second = *memoize(&cell, || {
            calls += 1;
            Ok(8)
        })
        .unwrap();
        assert_eq!((first, second, calls), (7, 7, 1));

        let failing: OnceLock<u32> = OnceLock::new();
        assert!(memoize(&failing, || Err(FleetError::Offline)).is_err());
        assert!(failing.get().is_none());
    }
}
