//! Action registry.
//!
//! Each entity kind declares a static table mapping action names to
//! operations. An entry carries one operation per target kind, so a local
//! target can get a different implementation (`install`) or none at all
//! (`upload`) without any dynamic dispatch.

use std::fmt;

use async_trait::async_trait;

use super::context::RunContext;
use crate::domain::TargetKind;
use crate::error::Result;

/// One named action and its implementation per target kind
#[derive(Debug)]
pub struct ActionEntry<Op: 'static> {
    pub name: &'static str,
    pub title: &'static str,
    pub local: Option<Op>,
    pub remote: Option<Op>,
}

impl<Op: Copy> ActionEntry<Op> {
    /// Same implementation on every target
    pub const fn everywhere(name: &'static str, title: &'static str, op: Op) -> Self {
        Self {
            name,
            title,
            local: Some(op),
            remote: Some(op),
        }
    }

    /// Not available on local targets
    pub const fn remote_only(name: &'static str, title: &'static str, op: Op) -> Self {
        Self {
            name,
            title,
            local: None,
            remote: Some(op),
        }
    }

    /// Different implementations for local and remote targets
    pub const fn split(name: &'static str, title: &'static str, local: Op, remote: Op) -> Self {
        Self {
            name,
            title,
            local: Some(local),
            remote: Some(remote),
        }
    }

    pub fn for_target(&self, target: TargetKind) -> Option<Op> {
        match target {
            TargetKind::Local => self.local,
            TargetKind::Remote => self.remote,
        }
    }
}

/// All actions of one entity kind, in presentation order
#[derive(Debug)]
pub struct ActionTable<Op: 'static> {
    pub kind: &'static str,
    pub entries: &'static [ActionEntry<Op>],
}

impl<Op: Copy> ActionTable<Op> {
    pub const fn new(kind: &'static str, entries: &'static [ActionEntry<Op>]) -> Self {
        Self { kind, entries }
    }

    fn entry(&self, name: &str) -> Option<&ActionEntry<Op>> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Whether any target offers this action
    pub fn knows(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }

    pub fn title(&self, name: &str) -> Option<&'static str> {
        self.entry(name).map(|e| e.title)
    }

    /// Names of the actions available on a target
    pub fn available(&self, target: TargetKind) -> Vec<&'static str> {
        self.entries
            .iter()
            .filter(|e| e.for_target(target).is_some())
            .map(|e| e.name)
            .collect()
    }

    /// Resolve a name to its implementation on a target
    pub fn resolve(&self, name: &str, target: TargetKind) -> Option<Op> {
        self.entry(name).and_then(|e| e.for_target(target))
    }
}

/// A configured object exposing named actions
#[async_trait]
pub trait Entity: Send + Sync {
    type Op: Copy + Send + Sync + fmt::Debug + 'static;

    /// Action table of this entity kind
    const ACTIONS: &'static ActionTable<Self::Op>;

    fn name(&self) -> &str;

    /// Local or remote, from the entity's resolved location
    fn target_kind(&self) -> Result<TargetKind>;

    /// Steps of a composite operation, `None` for primitives
    fn composite_steps(op: Self::Op) -> Option<&'static [&'static str]>;

    /// Execute one resolved operation
    async fn invoke(&self, ctx: &RunContext<'_>, op: Self::Op) -> Result<()>;

    /// Action names available for the current target
    fn get_actions(&self) -> Result<Vec<&'static str>> {
        Ok(Self::ACTIONS.available(self.target_kind()?))
    }

    /// Resolve an action; `None` when it is not available for this target
    fn get_action(&self, name: &str) -> Result<Option<Self::Op>> {
        Ok(Self::ACTIONS.resolve(name, self.target_kind()?))
    }
}
