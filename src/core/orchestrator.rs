//! Top-level dispatch.
//!
//! Resolves `(kind, name, action)` to a configured entity and one of its
//! actions for the entity's current target, then runs it.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use tracing::{info, instrument, warn};

use super::actions::Entity;
use super::context::RunContext;
use super::instance::Instance;
use super::pyenv::PyEnv;
use crate::error::{FleetError, Result};

/// Entity kinds reachable from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    PyEnv,
    Ikaaro,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::PyEnv => "pyenv",
            EntityKind::Ikaaro => "ikaaro",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pyenv" => Ok(EntityKind::PyEnv),
            "ikaaro" => Ok(EntityKind::Ikaaro),
            other => Err(FleetError::Config(format!("unknown entity kind '{}'", other))),
        }
    }
}

/// Outcome of a dispatched action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    Completed,
    /// The action exists but is suppressed on this target
    Unavailable,
}

/// An action offered by an entity, for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionInfo {
    pub name: &'static str,
    pub title: &'static str,
}

/// Run a named action on one entity
pub async fn run_action<E: Entity>(
    ctx: &RunContext<'_>,
    entity: &E,
    name: &str,
) -> Result<ActionStatus> {
    let table = E::ACTIONS;
    if !table.knows(name) {
        return Err(FleetError::UnknownAction {
            kind: table.kind.to_string(),
            name: name.to_string(),
        });
    }

    let Some(op) = entity.get_action(name)? else {
        warn!(
            kind = table.kind,
            entity = entity.name(),
            action = name,
            "Action not available for this target"
        );
        return Ok(ActionStatus::Unavailable);
    };

    entity.invoke(ctx, op).await?;
    Ok(ActionStatus::Completed)
}

/// Actions an entity offers on its current target, in table order
pub fn list_actions<E: Entity>(entity: &E) -> Result<Vec<ActionInfo>> {
    Ok(entity
        .get_actions()?
        .into_iter()
        .map(|name| ActionInfo {
            name,
            title: E::ACTIONS.title(name).unwrap_or_default(),
        })
        .collect())
}

/// Dispatches CLI requests against one run context
pub struct Orchestrator<'a> {
    ctx: RunContext<'a>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(ctx: RunContext<'a>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &RunContext<'a> {
        &self.ctx
    }

    /// Run `action` on the entity `kind`/`name`
    #[instrument(skip(self))]
    pub async fn run(&self, kind: EntityKind, name: &str, action: &str) -> Result<ActionStatus> {
        info!("Dispatching");
        let status = match kind {
            EntityKind::PyEnv => {
                let pyenv = PyEnv::from_registry(self.ctx.registry, name)?;
                run_action(&self.ctx, &pyenv, action).await?
            }
            EntityKind::Ikaaro => {
                let instance = Instance::from_registry(self.ctx.registry, name)?;
                run_action(&self.ctx, &instance, action).await?
            }
        };

        if status == ActionStatus::Completed {
            info!("Done");
        }
        Ok(status)
    }

    /// Actions available on the entity `kind`/`name`
    pub fn actions(&self, kind: EntityKind, name: &str) -> Result<Vec<ActionInfo>> {
        match kind {
            EntityKind::PyEnv => list_actions(&PyEnv::from_registry(self.ctx.registry, name)?),
            EntityKind::Ikaaro => {
                list_actions(&Instance::from_registry(self.ctx.registry, name)?)
            }
        }
    }
}
