//! ikaaro instances (`ikaaro` sections).
//!
//! An instance is a database directory served by the `icms-*` scripts of the
//! Python environment it is bound to. Commands run on the environment's host,
//! from the environment's directory.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use super::actions::{ActionEntry, ActionTable, Entity};
use super::context::{memoize, RunContext};
use super::pipeline::run_pipeline;
use super::pyenv::PyEnv;
use crate::adapters::Host;
use crate::config::{ConfigSection, Registry};
use crate::domain::{HostCommand, TargetKind};
use crate::error::{FleetError, Result};

/// Version of the helper protocol spoken by [`VHOSTS_HELPER`]
pub const HELPER_PROTOCOL_VERSION: u32 = 1;

/// Lists the vhosts of an instance catalog.
///
/// argv: `<protocol version> <instance path>`; prints one vhost per line.
pub const VHOSTS_HELPER: &str = r#"import sys
if sys.argv[1] != '1':
    sys.stderr.write('unsupported helper protocol %s\n' % sys.argv[1])
    sys.exit(2)
from itools.database import Catalog, get_register_fields
catalog = Catalog('./%s/catalog' % sys.argv[2], get_register_fields(), read_only=True)
for vhost in sorted(catalog.get_unique_values('vhosts')):
    print(vhost)
"#;

pub const RESTART: &[&str] = &["stop", "start"];
pub const REINDEX: &[&str] = &["stop", "update_catalog", "start"];
pub const UPDATE: &[&str] = &["stop", "update_methods", "start"];

/// Operations behind instance actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceOp {
    Start,
    Stop,
    UpdateCatalog,
    UpdateMethods,
    Vhosts,
    Pipeline(&'static [&'static str]),
}

const INSTANCE_ENTRIES: &[ActionEntry<InstanceOp>] = &[
    ActionEntry::everywhere("start", "Start an ikaaro instance", InstanceOp::Start),
    ActionEntry::everywhere("stop", "Stop an ikaaro instance", InstanceOp::Stop),
    ActionEntry::everywhere(
        "restart",
        "(Re)Start an ikaaro instance",
        InstanceOp::Pipeline(RESTART),
    ),
    ActionEntry::everywhere(
        "reindex",
        "Stop, update the catalog and start an ikaaro instance",
        InstanceOp::Pipeline(REINDEX),
    ),
    ActionEntry::everywhere(
        "update",
        "Stop, launch update methods and start an ikaaro instance",
        InstanceOp::Pipeline(UPDATE),
    ),
    ActionEntry::everywhere(
        "update_catalog",
        "Rebuild the catalog of a stopped ikaaro instance",
        InstanceOp::UpdateCatalog,
    ),
    ActionEntry::everywhere(
        "update_methods",
        "Launch update methods of a stopped ikaaro instance",
        InstanceOp::UpdateMethods,
    ),
    ActionEntry::everywhere("vhosts", "List vhosts of an ikaaro instance", InstanceOp::Vhosts),
];

const INSTANCE_ACTIONS: ActionTable<InstanceOp> = ActionTable::new("ikaaro", INSTANCE_ENTRIES);

/// A configured ikaaro instance
#[derive(Debug)]
pub struct Instance {
    section: Arc<ConfigSection>,
    pyenv: PyEnv,
    bin_icms: OnceLock<String>,
}

impl Instance {
    /// Bind a section to its environment; fails if the `pyenv` reference is dangling
    pub fn new(registry: &Registry, section: Arc<ConfigSection>) -> Result<Self> {
        let pyenv = PyEnv::from_registry(registry, section.require("pyenv")?)?;
        Ok(Self {
            section,
            pyenv,
            bin_icms: OnceLock::new(),
        })
    }

    /// Look up the `ikaaro` section with this name
    pub fn from_registry(registry: &Registry, name: &str) -> Result<Self> {
        Self::new(registry, registry.require_section("ikaaro", name)?)
    }

    pub fn pyenv(&self) -> &PyEnv {
        &self.pyenv
    }

    /// Instance directory, relative to the environment directory
    pub fn path(&self) -> Result<&str> {
        self.section.require("path")
    }

    /// Base URI the instance is served at
    pub fn uri(&self) -> Result<&str> {
        self.section.require("uri")
    }

    pub fn readonly(&self) -> bool {
        self.section.flag("readonly")
    }

    /// Directory of the `icms-*` scripts: `<prefix or env path>/bin`
    pub fn bin_icms(&self) -> Result<&str> {
        memoize(&self.bin_icms, || {
            let base = match self.pyenv.prefix() {
                Some(prefix) => prefix.to_string(),
                None => self.pyenv.location()?.path.clone(),
            };
            Ok(format!("{}/bin", base))
        })
        .map(String::as_str)
    }

    /// Host of the environment, moved into the environment directory
    pub fn host(&self, ctx: &RunContext<'_>) -> Result<Box<dyn Host>> {
        let mut host = self.pyenv.host(ctx)?;
        host.chdir(&self.pyenv.location()?.path);
        Ok(host)
    }

    fn script(&self, name: &str) -> Result<HostCommand> {
        Ok(HostCommand::new(format!("{}/{}", self.bin_icms()?, name)))
    }

    /// Stop, then force-stop.
    ///
    /// A failing normal stop means the instance was already down, unless the
    /// command never ran. The forced stop must succeed.
    #[instrument(skip(self, ctx), fields(instance = %self.name()))]
    pub async fn stop(&self, ctx: &RunContext<'_>) -> Result<()> {
        info!("STOP");
        let path = self.path()?;
        let host = self.host(ctx)?;

        let stop = self.script("icms-stop.py")?.arg(path);
        tolerate_not_running(host.run(&stop, None, false).await)?;

        let force = self.script("icms-stop.py")?.args(["--force", path]);
        host.run(&force, None, false).await?;
        Ok(())
    }

    /// Start the instance, read-only when the `readonly` option is set
    #[instrument(skip(self, ctx), fields(instance = %self.name()))]
    pub async fn start(&self, ctx: &RunContext<'_>) -> Result<()> {
        let readonly = self.readonly();
        info!(readonly, "START");
        let cmd = self
            .script("icms-start.py")?
            .args(["-d", self.path()?])
            .opt_arg(readonly.then(|| "-r".to_string()));

        self.host(ctx)?.run(&cmd, None, false).await?;
        Ok(())
    }

    #[instrument(skip(self, ctx), fields(instance = %self.name()))]
    pub async fn update_catalog(&self, ctx: &RunContext<'_>) -> Result<()> {
        info!("UPDATE CATALOG");
        let cmd = self
            .script("icms-update-catalog.py")?
            .args(["-y", self.path()?, "--quiet"]);

        self.host(ctx)?.run(&cmd, None, false).await?;
        Ok(())
    }

    #[instrument(skip(self, ctx), fields(instance = %self.name()))]
    pub async fn update_methods(&self, ctx: &RunContext<'_>) -> Result<()> {
        info!("UPDATE");
        let cmd = self.script("icms-update.py")?.arg(self.path()?);

        self.host(ctx)?.run(&cmd, None, false).await?;
        Ok(())
    }

    /// Virtual hosts registered in the instance catalog, sorted
    #[instrument(skip(self, ctx), fields(instance = %self.name()))]
    pub async fn vhosts(&self, ctx: &RunContext<'_>) -> Result<Vec<String>> {
        let cmd = HostCommand::new(self.pyenv.bin_python()?).args([
            "-c".to_string(),
            VHOSTS_HELPER.to_string(),
            HELPER_PROTOCOL_VERSION.to_string(),
            self.path()?.to_string(),
        ]);

        let output = self.host(ctx)?.run(&cmd, None, true).await?;
        let mut vhosts: Vec<String> = output
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        vhosts.sort();
        Ok(vhosts)
    }
}

/// Exit statuses of a command that never ran: missing or non-executable
/// script, ssh transport failure
const NOT_RUN_EXIT_CODES: &[i32] = &[126, 127, 255];

/// Accept a failed normal stop as "already down"
fn tolerate_not_running(result: Result<String>) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(FleetError::CommandFailed {
            exit_code, stderr, ..
        }) if !NOT_RUN_EXIT_CODES.contains(&exit_code) => {
            debug!(exit_code, %stderr, "Instance was not running");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[async_trait]
impl Entity for Instance {
    type Op = InstanceOp;
    const ACTIONS: &'static ActionTable<InstanceOp> = &INSTANCE_ACTIONS;

    fn name(&self) -> &str {
        &self.section.name
    }

    fn target_kind(&self) -> Result<TargetKind> {
        self.pyenv.target_kind()
    }

    fn composite_steps(op: InstanceOp) -> Option<&'static [&'static str]> {
        match op {
            InstanceOp::Pipeline(steps) => Some(steps),
            _ => None,
        }
    }

    async fn invoke(&self, ctx: &RunContext<'_>, op: InstanceOp) -> Result<()> {
        match op {
            InstanceOp::Start => self.start(ctx).await,
            InstanceOp::Stop => self.stop(ctx).await,
            InstanceOp::UpdateCatalog => self.update_catalog(ctx).await,
            InstanceOp::UpdateMethods => self.update_methods(ctx).await,
            InstanceOp::Vhosts => {
                let vhosts = self.vhosts(ctx).await?;
                if vhosts.is_empty() {
                    warn!(instance = %self.name(), "No vhost registered");
                }
                for vhost in vhosts {
                    info!(instance = %self.name(), "{}", vhost);
                }
                Ok(())
            }
            InstanceOp::Pipeline(steps) => run_pipeline(self, ctx, steps).await,
        }
    }
}
