//! Python environments (`pyenv` sections).
//!
//! A pyenv is a virtualenv at a location, plus the list of source packages
//! installed into it. Its fleet actions fan out to every ikaaro instance
//! bound to it.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use super::actions::{ActionEntry, ActionTable, Entity};
use super::context::{memoize, RunContext};
use super::fleet::{self, ProbeStatus};
use super::pipeline::run_pipeline;
use super::source::Source;
use crate::adapters::Host;
use crate::config::{ConfigSection, Registry};
use crate::domain::{HostCommand, Location, PackageRef, TargetKind};
use crate::error::{FleetError, Result};

/// Remote directory tarballs are uploaded to and unpacked in
pub const REMOTE_STAGING_DIR: &str = "/tmp";

/// Dependency manifest looked for in each package
pub const MANIFEST: &str = "requirements.txt";

pub const DEPLOY: &[&str] = &["build", "upload", "stop", "install", "restart"];
pub const DEPLOY_REINDEX: &[&str] = &["build", "upload", "stop", "install", "reindex"];

/// Operations behind pyenv actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PyEnvOp {
    Build,
    Upload,
    Install,
    InstallLocal,
    /// Apply an instance action to every bound instance
    Fleet(&'static str),
    /// Probe every bound instance
    Test,
    Pipeline(&'static [&'static str]),
}

const PYENV_ENTRIES: &[ActionEntry<PyEnvOp>] = &[
    ActionEntry::everywhere(
        "build",
        "Build the source code this Python environment requires",
        PyEnvOp::Build,
    ),
    ActionEntry::remote_only(
        "upload",
        "Upload the source code to the remote server",
        PyEnvOp::Upload,
    ),
    ActionEntry::split(
        "install",
        "Install the source code into the Python environment",
        PyEnvOp::InstallLocal,
        PyEnvOp::Install,
    ),
    ActionEntry::everywhere(
        "deploy",
        "Build, upload and install, then restart the instances",
        PyEnvOp::Pipeline(DEPLOY),
    ),
    ActionEntry::everywhere(
        "deploy_reindex",
        "Build, upload and install, then reindex the instances",
        PyEnvOp::Pipeline(DEPLOY_REINDEX),
    ),
    ActionEntry::everywhere(
        "start",
        "Start the ikaaro instances",
        PyEnvOp::Fleet("start"),
    ),
    ActionEntry::everywhere(
        "stop",
        "Stop the ikaaro instances",
        PyEnvOp::Fleet("stop"),
    ),
    ActionEntry::everywhere(
        "restart",
        "Restart the ikaaro instances that use this environment",
        PyEnvOp::Fleet("restart"),
    ),
    ActionEntry::everywhere(
        "reindex",
        "Reindex the ikaaro instances that use this environment",
        PyEnvOp::Fleet("reindex"),
    ),
    ActionEntry::everywhere(
        "update",
        "Launch update methods on the ikaaro instances that use this environment",
        PyEnvOp::Fleet("update"),
    ),
    ActionEntry::everywhere(
        "test",
        "Test if ikaaro instances of this Python environment are alive",
        PyEnvOp::Test,
    ),
    ActionEntry::everywhere(
        "vhosts",
        "List vhosts of all ikaaro instances of this Python environment",
        PyEnvOp::Fleet("vhosts"),
    ),
];

const PYENV_ACTIONS: ActionTable<PyEnvOp> = ActionTable::new("pyenv", PYENV_ENTRIES);

/// A configured Python environment
#[derive(Debug)]
pub struct PyEnv {
    section: Arc<ConfigSection>,
    location: OnceLock<Location>,
    bin_python: OnceLock<String>,
    bin_pip: OnceLock<String>,
    log_dir: OnceLock<String>,
}

impl PyEnv {
    pub fn new(section: Arc<ConfigSection>) -> Self {
        Self {
            section,
            location: OnceLock::new(),
            bin_python: OnceLock::new(),
            bin_pip: OnceLock::new(),
            log_dir: OnceLock::new(),
        }
    }

    /// Look up the `pyenv` section with this name
    pub fn from_registry(registry: &Registry, name: &str) -> Result<Self> {
        Ok(Self::new(registry.require_section("pyenv", name)?))
    }

    pub fn section(&self) -> &ConfigSection {
        &self.section
    }

    /// Resolved `location` option (computed once)
    pub fn location(&self) -> Result<&Location> {
        memoize(&self.location, || {
            Location::resolve(self.section.require("location")?)
        })
    }

    /// Python interpreter of the environment
    pub fn bin_python(&self) -> Result<&str> {
        memoize(&self.bin_python, || Ok(env_binary(self.location()?, "python"))).map(String::as_str)
    }

    pub fn bin_pip(&self) -> Result<&str> {
        memoize(&self.bin_pip, || Ok(env_binary(self.location()?, "pip"))).map(String::as_str)
    }

    /// Log directory: `log` option, else `<path>/log`
    pub fn log_dir(&self) -> Result<&str> {
        memoize(&self.log_dir, || match self.section.get("log") {
            Some(dir) => Ok(dir.to_string()),
            None => Ok(format!("{}/log", self.location()?.path)),
        })
        .map(String::as_str)
    }

    /// Installation prefix passed to pip and setup.py
    pub fn prefix(&self) -> Option<&str> {
        self.section.get("prefix")
    }

    /// Run remote commands through a login shell
    pub fn shell(&self) -> bool {
        self.section.flag("shell")
    }

    /// Source packages from the `packages` option
    pub fn packages(&self) -> Result<Vec<PackageRef>> {
        PackageRef::parse_list(self.section.require("packages")?)
    }

    /// Host gateway for this environment's location
    pub fn host(&self, ctx: &RunContext<'_>) -> Result<Box<dyn Host>> {
        ctx.host_for(self.location()?, self.shell())
    }

    fn pip_install_command(&self) -> Result<HostCommand> {
        Ok(HostCommand::new(self.bin_pip()?)
            .args(["install", "-r", MANIFEST, "--upgrade"])
            .opt_arg(self.prefix().map(|p| format!("--prefix={}", p)))
            .arg(format!("--log={}/pip.log", self.log_dir()?)))
    }

    fn setup_install_command(&self) -> Result<HostCommand> {
        Ok(HostCommand::new(self.bin_python()?)
            .args(["setup.py", "--quiet", "install", "--force"])
            .opt_arg(self.prefix().map(|p| format!("--prefix={}", p))))
    }

    /// Make a source distribution for every required package
    #[instrument(skip(self, ctx), fields(pyenv = %self.name()))]
    pub async fn build(&self, ctx: &RunContext<'_>) -> Result<()> {
        info!("BUILD");
        tokio::fs::create_dir_all(&ctx.cache_dir).await?;

        let local = ctx.connector.local();
        for package in self.packages()? {
            let source = Source::from_registry(ctx.registry, &package.name)?;
            source
                .dist(local.as_ref(), package.version.as_ref(), &ctx.cache_dir)
                .await?;
        }
        Ok(())
    }

    /// Upload every required package to the remote host
    #[instrument(skip(self, ctx), fields(pyenv = %self.name()))]
    pub async fn upload(&self, ctx: &RunContext<'_>) -> Result<()> {
        let host = self.host(ctx)?;
        info!(host = host.name(), "UPLOAD");

        let local = ctx.connector.local();
        for package in self.packages()? {
            let source = Source::from_registry(ctx.registry, &package.name)?;
            let pkgname = source.pkgname(local.as_ref()).await?;
            let tarball = Source::tarball(&ctx.cache_dir, &pkgname);
            host.put(&tarball, REMOTE_STAGING_DIR).await?;
        }
        Ok(())
    }

    /// Install every uploaded package into the remote environment
    #[instrument(skip(self, ctx), fields(pyenv = %self.name()))]
    pub async fn install(&self, ctx: &RunContext<'_>) -> Result<()> {
        let host = self.host(ctx)?;
        info!(host = host.name(), "INSTALL");

        let local = ctx.connector.local();
        for package in self.packages()? {
            let source = Source::from_registry(ctx.registry, &package.name)?;
            let pkgname = source.pkgname(local.as_ref()).await?;
            let tarball = format!("{}.tar.gz", pkgname);
            let pkg_path = format!("{}/{}", REMOTE_STAGING_DIR, pkgname);

            host.run(
                &HostCommand::new("tar").args(["xzf", tarball.as_str()]),
                Some(REMOTE_STAGING_DIR),
                false,
            )
            .await?;

            self.install_package(host.as_ref(), &package.name, &pkg_path)
                .await?;

            host.run(
                &HostCommand::new("rm").args(["-rf", pkg_path.as_str()]),
                Some(REMOTE_STAGING_DIR),
                false,
            )
            .await?;
        }
        Ok(())
    }

    /// Install every package straight from its local checkout
    #[instrument(skip(self, ctx), fields(pyenv = %self.name()))]
    pub async fn install_local(&self, ctx: &RunContext<'_>) -> Result<()> {
        info!("INSTALL (LOCAL)");

        let local = ctx.connector.local();
        for package in self.packages()? {
            let source = Source::from_registry(ctx.registry, &package.name)?;
            self.install_package(local.as_ref(), &package.name, source.path()?)
                .await?;
        }
        Ok(())
    }

    /// Install dependencies (when a manifest exists), then the package itself
    async fn install_package(&self, host: &dyn Host, name: &str, dir: &str) -> Result<()> {
        info!(package = name, "Installing dependencies");
        match self.install_dependencies(host, dir).await {
            Err(e @ FleetError::MissingManifest { .. }) => {
                info!(package = name, reason = %e, "No dependencies to install");
            }
            other => other?,
        }

        info!(package = name, "Installing package");
        host.run(&self.setup_install_command()?, Some(dir), false)
            .await?;
        Ok(())
    }

    async fn install_dependencies(&self, host: &dyn Host, dir: &str) -> Result<()> {
        let check = HostCommand::new("test").args(["-f", MANIFEST]);
        match host.run(&check, Some(dir), true).await {
            Err(FleetError::CommandFailed { exit_code: 1, .. }) => {
                return Err(FleetError::MissingManifest {
                    path: dir.to_string(),
                });
            }
            other => {
                other?;
            }
        }

        host.run(&self.pip_install_command()?, Some(dir), false)
            .await?;
        Ok(())
    }

    /// Apply an instance action to every instance bound to this environment
    #[instrument(skip(self, ctx), fields(pyenv = %self.name()))]
    pub async fn fleet(&self, ctx: &RunContext<'_>, action: &str) -> Result<()> {
        info!(action, "Applying to every instance");
        let count = fleet::apply(ctx, self.name(), action).await?;
        if count == 0 {
            info!(action, "No instance uses this environment");
        }
        Ok(())
    }

    /// Probe every bound instance and log one line per instance
    #[instrument(skip(self, ctx), fields(pyenv = %self.name()))]
    pub async fn test(&self, ctx: &RunContext<'_>) -> Result<()> {
        for report in fleet::test_fleet(ctx, self.name()).await? {
            match report.status {
                ProbeStatus::Ok => info!(instance = %report.instance, "[OK] {}", report.uri),
                ProbeStatus::Error => warn!(
                    instance = %report.instance,
                    error = report.error.as_deref().unwrap_or(""),
                    "[ERROR] {}",
                    report.uri
                ),
            }
        }
        Ok(())
    }
}

/// `<path>/bin/<name>`
fn env_binary(location: &Location, name: &str) -> String {
    format!("{}/bin/{}", location.path, name)
}

#[async_trait]
impl Entity for PyEnv {
    type Op = PyEnvOp;
    const ACTIONS: &'static ActionTable<PyEnvOp> = &PYENV_ACTIONS;

    fn name(&self) -> &str {
        &self.section.name
    }

    fn target_kind(&self) -> Result<TargetKind> {
        Ok(self.location()?.target_kind())
    }

    fn composite_steps(op: PyEnvOp) -> Option<&'static [&'static str]> {
        match op {
            PyEnvOp::Pipeline(steps) => Some(steps),
            _ => None,
        }
    }

    async fn invoke(&self, ctx: &RunContext<'_>, op: PyEnvOp) -> Result<()> {
        match op {
            PyEnvOp::Build => self.build(ctx).await,
            PyEnvOp::Upload => self.upload(ctx).await,
            PyEnvOp::Install => self.install(ctx).await,
            PyEnvOp::InstallLocal => self.install_local(ctx).await,
            PyEnvOp::Fleet(action) => self.fleet(ctx, action).await,
            PyEnvOp::Test => self.test(ctx).await,
            PyEnvOp::Pipeline(steps) => {
                info!(pyenv = %self.name(), ?steps, "Running pipeline");
                run_pipeline(self, ctx, steps).await
            }
        }
    }
}
