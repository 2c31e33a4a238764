//! Composite actions.
//!
//! A composite is an ordered list of action names resolved against the
//! entity's action table. Names unavailable on the current target are
//! skipped; the first failing step aborts the rest.

use tracing::{debug, error, info};

use super::actions::Entity;
use super::context::RunContext;
use crate::error::Result;

/// Run the steps of a composite action in order
pub async fn run_pipeline<E: Entity>(
    entity: &E,
    ctx: &RunContext<'_>,
    steps: &[&str],
) -> Result<()> {
    for (index, step) in steps.iter().enumerate() {
        let Some(op) = entity.get_action(step)? else {
            info!(
                kind = E::ACTIONS.kind,
                entity = entity.name(),
                step,
                "Step not available on this target, skipping"
            );
            continue;
        };

        debug!(kind = E::ACTIONS.kind, entity = entity.name(), step, index, "Running step");
        if let Err(e) = entity.invoke(ctx, op).await {
            error!(
                kind = E::ACTIONS.kind,
                entity = entity.name(),
                step,
                error = %e,
                recoverable = e.is_recoverable(),
                "Step failed, aborting remaining steps"
            );
            return Err(e);
        }
    }

    Ok(())
}

/// Check that every composite step names an action of the same table
pub fn validate_composites<E: Entity>() -> anyhow::Result<()> {
    let table = E::ACTIONS;
    for entry in table.entries {
        for op in [entry.local, entry.remote].into_iter().flatten() {
            let Some(steps) = E::composite_steps(op) else {
                continue;
            };

            if steps.is_empty() {
                anyhow::bail!("{} action '{}' has no steps", table.kind, entry.name);
            }

            for step in steps {
                if !table.knows(step) {
                    anyhow::bail!(
                        "{} action '{}' references non-existent action '{}'",
                        table.kind,
                        entry.name,
                        step
                    );
                }
                if *step == entry.name {
                    anyhow::bail!("{} action '{}' references itself", table.kind, entry.name);
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::config::Registry;
    use crate::core::actions::{ActionEntry, ActionTable};
    use crate::domain::TargetKind;
    use crate::error::FleetError;
    use crate::testing::{RecordingConnector, ScriptedProber};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Op {
        Step(&'static str),
        Fail,
        Chain(&'static [&'static str]),
    }

    const ENTRIES: &[ActionEntry<Op>] = &[
        ActionEntry::everywhere("a", "A", Op::Step("a")),
        ActionEntry::remote_only("b", "B", Op::Step("b")),
        ActionEntry::everywhere("c", "C", Op::Step("c")),
        ActionEntry::everywhere("boom", "Fails", Op::Fail),
        ActionEntry::everywhere("abc", "Chain", Op::Chain(&["a", "b", "c"])),
        ActionEntry::everywhere("nested", "Nested", Op::Chain(&["abc", "c"])),
        ActionEntry::everywhere("broken", "Broken", Op::Chain(&["a", "boom", "c"])),
    ];

    const TABLE: ActionTable<Op> = ActionTable::new("probe", ENTRIES);

    struct Probe {
        target: TargetKind,
        ran: Mutex<Vec<&'static str>>,
    }

    impl Probe {
        fn new(target: TargetKind) -> Self {
            Self {
                target,
                ran: Mutex::new(Vec::new()),
            }
        }

        fn ran(&self) -> Vec<&'static str> {
            self.ran.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Entity for Probe {
        type Op = Op;
        const ACTIONS: &'static ActionTable<Op> = &TABLE;

        fn name(&self) -> &str {
            "probe"
        }

        fn target_kind(&self) -> Result<TargetKind> {
            Ok(self.target)
        }

        fn composite_steps(op: Op) -> Option<&'static [&'static str]> {
            match op {
                Op::Chain(steps) => Some(steps),
                _ => None,
            }
        }

        async fn invoke(&self, ctx: &RunContext<'_>, op: Op) -> Result<()> {
            match op {
                Op::Step(name) => {
                    self.ran.lock().unwrap().push(name);
                    Ok(())
                }
                Op::Fail => Err(FleetError::CommandFailed {
                    command: "boom".to_string(),
                    exit_code: 1,
                    stderr: String::new(),
                }),
                Op::Chain(steps) => run_pipeline(self, ctx, steps).await,
            }
        }
    }

    async fn run(probe: &Probe, name: &str) -> Result<()> {
        let registry = Registry::new();
        let connector = RecordingConnector::new();
        let prober = ScriptedProber::default();
        let ctx = RunContext::new(&registry, &connector, &prober, PathBuf::from("/tmp"));
        let op = probe.get_action(name)?.unwrap();
        probe.invoke(&ctx, op).await
    }

    #[tokio::test]
    async fn test_steps_run_in_declared_order() {
        let probe = Probe::new(TargetKind::Remote);
        run(&probe, "abc").await.unwrap();
        assert_eq!(probe.ran(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_unavailable_step_is_skipped() {
        let probe = Probe::new(TargetKind::Local);
        run(&probe, "abc").await.unwrap();
        assert_eq!(probe.ran(), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_nested_composites() {
        let probe = Probe::new(TargetKind::Remote);
        run(&probe, "nested").await.unwrap();
        assert_eq!(probe.ran(), vec!["a", "b", "c", "c"]);
    }

    #[tokio::test]
    async fn test_failure_aborts_remaining_steps() {
        let probe = Probe::new(TargetKind::Remote);
        let err = run(&probe, "broken").await.unwrap_err();
        assert!(matches!(err, FleetError::CommandFailed { .. }));
        assert_eq!(probe.ran(), vec!["a"]);
    }

    #[test]
    fn test_validate_composites() {
        assert!(validate_composites::<Probe>().is_ok());
    }
}
