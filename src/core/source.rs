//! Python source packages (`pysrc` sections).
//!
//! A source is a local checkout with a `setup.py`. Building checks out the
//! requested git ref and writes an sdist tarball into the build cache.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, instrument};

use crate::adapters::Host;
use crate::config::{ConfigSection, Registry};
use crate::domain::{HostCommand, SourceVersion};
use crate::error::{FleetError, Result};

const DEFAULT_PYTHON: &str = "python3";

/// A buildable Python source checkout
#[derive(Debug, Clone)]
pub struct Source {
    section: Arc<ConfigSection>,
}

impl Source {
    pub fn new(section: Arc<ConfigSection>) -> Self {
        Self { section }
    }

    /// Look up the `pysrc` section with this name
    pub fn from_registry(registry: &Registry, name: &str) -> Result<Self> {
        Ok(Self::new(registry.require_section("pysrc", name)?))
    }

    pub fn name(&self) -> &str {
        &self.section.name
    }

    /// Local checkout directory
    pub fn path(&self) -> Result<&str> {
        self.section.require("path")
    }

    pub fn python(&self) -> &str {
        self.section.get("python").unwrap_or(DEFAULT_PYTHON)
    }

    /// Version to build when a package does not pin one
    pub fn default_version(&self) -> Result<Option<SourceVersion>> {
        self.section
            .get("version")
            .map(SourceVersion::parse)
            .transpose()
    }

    /// Distribution name, e.g. `itools-0.75.1`
    pub async fn pkgname(&self, host: &dyn Host) -> Result<String> {
        let cmd = HostCommand::new(self.python()).args(["setup.py", "--fullname"]);
        let output = host.run(&cmd, Some(self.path()?), true).await?;

        output
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .last()
            .map(str::to_string)
            .ok_or_else(|| {
                FleetError::Config(format!("source '{}' reported no package name", self.name()))
            })
    }

    /// Where the tarball of `pkgname` lands in the build cache
    pub fn tarball(cache_dir: &Path, pkgname: &str) -> PathBuf {
        cache_dir.join(format!("{}.tar.gz", pkgname))
    }

    /// Check out `version` (or the configured default) and build an sdist.
    ///
    /// Returns the path of the tarball.
    #[instrument(skip(self, host, cache_dir), fields(source = %self.name()))]
    pub async fn dist(
        &self,
        host: &dyn Host,
        version: Option<&SourceVersion>,
        cache_dir: &Path,
    ) -> Result<PathBuf> {
        let path = self.path()?;
        let default = self.default_version()?;

        if let Some(version) = version.or(default.as_ref()) {
            info!(%version, "Checking out");
            host.run(
                &HostCommand::new("git").args(["checkout", "--quiet", version.reference.as_str()]),
                Some(path),
                true,
            )
            .await?;

            if version.use_branch {
                host.run(
                    &HostCommand::new("git").args([
                        "pull",
                        "--quiet",
                        "--ff-only",
                        "origin",
                        version.reference.as_str(),
                    ]),
                    Some(path),
                    true,
                )
                .await?;
            }
        }

        let dist_dir = cache_dir.to_string_lossy();
        host.run(
            &HostCommand::new(self.python()).args([
                "setup.py",
                "--quiet",
                "sdist",
                "--formats=gztar",
                "--dist-dir",
                &*dist_dir,
            ]),
            Some(path),
            false,
        )
        .await?;

        let pkgname = self.pkgname(host).await?;
        let tarball = Self::tarball(cache_dir, &pkgname);
        info!(tarball = %tarball.display(), "Source distribution ready");
        Ok(tarball)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::Connector;
    use crate::testing::RecordingConnector;

    fn source(version: Option<&str>) -> Source {
        let mut section = ConfigSection::new("pysrc", "itools").with("path", "/src/itools");
        if let Some(version) = version {
            section = section.with("version", version);
        }
        Source::new(Arc::new(section))
    }

    #[tokio::test]
    async fn test_dist_with_branch_pulls() {
        let connector = RecordingConnector::new().respond("--fullname", "warning\nitools-0.75.1\n");
        let host = connector.local();
        let version = SourceVersion::parse("branch:main").unwrap();

        let tarball = source(None)
            .dist(host.as_ref(), Some(&version), Path::new("/cache"))
            .await
            .unwrap();

        assert_eq!(tarball, PathBuf::from("/cache/itools-0.75.1.tar.gz"));
        assert_eq!(
            connector.lines(),
            vec![
                "git checkout --quiet main",
                "git pull --quiet --ff-only origin main",
                "python3 setup.py --quiet sdist --formats=gztar --dist-dir /cache",
                "python3 setup.py --fullname",
            ]
        );
        assert!(connector
            .journal()
            .iter()
            .all(|e| e.cwd.as_deref() == Some("/src/itools")));
    }

    #[tokio::test]
    async fn test_dist_with_tag_falls_back_to_default_version() {
        let connector = RecordingConnector::new().respond("--fullname", "itools-0.75.1");
        let host = connector.local();

        source(Some("tag:0.75.1"))
            .dist(host.as_ref(), None, Path::new("/cache"))
            .await
            .unwrap();

        let lines = connector.lines();
        assert_eq!(lines[0], "git checkout --quiet 0.75.1");
        assert!(!lines.iter().any(|l| l.starts_with("git pull")));
    }

    #[tokio::test]
    async fn test_missing_pkgname_is_an_error() {
        let connector = RecordingConnector::new();
        let host = connector.local();
        assert!(source(None).pkgname(host.as_ref()).await.is_err());
    }

    #[test]
    fn test_missing_source_section() {
        let registry = Registry::new();
        let err = Source::from_registry(&registry, "itools").unwrap_err();
        assert_eq!(err.to_string(), "the pysrc \"itools\" is not found");
    }
}
