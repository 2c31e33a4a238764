//! Fan-out of actions to the instances bound to a Python environment.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::actions::Entity;
use super::context::RunContext;
use super::instance::Instance;
use crate::config::Registry;
use crate::error::Result;

/// Instances whose `pyenv` option names this environment, in registry order
pub fn instances_of<'r>(
    registry: &'r Registry,
    pyenv_name: &'r str,
) -> impl Iterator<Item = Result<Instance>> + 'r {
    registry
        .get_sections_by_type("ikaaro")
        .filter(move |section| section.get("pyenv") == Some(pyenv_name))
        .map(move |section| Instance::new(registry, Arc::clone(section)))
}

/// Run one instance action on every bound instance, stopping at the first failure.
///
/// Returns how many instances were visited.
#[instrument(skip(ctx))]
pub async fn apply(ctx: &RunContext<'_>, pyenv_name: &str, action: &str) -> Result<usize> {
    let mut count = 0;
    for instance in instances_of(ctx.registry, pyenv_name) {
        let instance = instance?;
        count += 1;

        let Some(op) = instance.get_action(action)? else {
            warn!(instance = instance.name(), action, "Action not available, skipping");
            continue;
        };

        debug!(instance = instance.name(), action, "Applying");
        instance.invoke(ctx, op).await?;
    }
    Ok(count)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProbeStatus {
    Ok,
    Error,
}

/// Liveness of one instance
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub instance: String,
    pub uri: String,
    pub status: ProbeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl ProbeReport {
    fn ok(instance: &str, uri: &str) -> Self {
        Self {
            instance: instance.to_string(),
            uri: uri.to_string(),
            status: ProbeStatus::Ok,
            error: None,
            checked_at: Utc::now(),
        }
    }

    fn error(instance: &str, uri: &str, error: String) -> Self {
        Self {
            instance: instance.to_string(),
            uri: uri.to_string(),
            status: ProbeStatus::Error,
            error: Some(error),
            checked_at: Utc::now(),
        }
    }
}

/// Probe every bound instance. A failing instance is reported, never fatal.
#[instrument(skip(ctx))]
pub async fn test_fleet(ctx: &RunContext<'_>, pyenv_name: &str) -> Result<Vec<ProbeReport>> {
    let mut reports = Vec::new();

    for instance in instances_of(ctx.registry, pyenv_name) {
        let instance = instance?;
        let name = instance.name();

        let report = match instance.uri() {
            Err(e) => ProbeReport::error(name, "", e.to_string()),
            Ok(uri) => match ctx.prober.probe(uri).await {
                Ok(()) => ProbeReport::ok(name, uri),
                Err(e) => ProbeReport::error(name, uri, e.to_string()),
            },
        };
        reports.push(report);
    }

    let failed = reports
        .iter()
        .filter(|r| r.status == ProbeStatus::Error)
        .count();
    info!(total = reports.len(), failed, "Fleet probed");
    Ok(reports)
}
