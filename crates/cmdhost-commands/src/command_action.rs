use std::{collections::BTreeMap, fmt, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::Sandbox;

/// Entry-point file every leaf directory must contain.
pub const ENTRY_POINT_FILE: &str = "action.json";

/// Behavior bound to a command leaf.
///
/// The returned `Result` is the command's completion callback: `Err` for a
/// failed command, `Ok(Value::Null)` when there is nothing to print.
#[async_trait]
pub trait CommandAction: Send + Sync {
    async fn execute(&self, sandbox: &Sandbox) -> Result<Value>;
}

/// Action built from a synchronous closure.
pub struct FnAction<F>(pub F);

#[async_trait]
impl<F> CommandAction for FnAction<F>
where
    F: Fn(&Sandbox) -> Result<Value> + Send + Sync,
{
    async fn execute(&self, sandbox: &Sandbox) -> Result<Value> {
        (self.0)(sandbox)
    }
}

/// Stand-in for leaves whose entry point exports nothing usable.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoActionDefined;

#[async_trait]
impl CommandAction for NoActionDefined {
    async fn execute(&self, sandbox: &Sandbox) -> Result<Value> {
        tracing::debug!(location = %sandbox.dirname().display(), "command has no action");
        sandbox.console().error("The command defined no action");
        Ok(Value::Null)
    }
}

/// Parsed contents of [`ENTRY_POINT_FILE`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EntryPoint {
    #[serde(default)]
    pub export: Option<String>,
}

/// Load-time table from export ids to action implementations.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: BTreeMap<String, Arc<dyn CommandAction>>,
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.ids())
            .finish()
    }
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<A>(&mut self, id: impl Into<String>, action: A) -> &mut Self
    where
        A: CommandAction + 'static,
    {
        self.actions.insert(id.into(), Arc::new(action));
        self
    }

    pub fn register_fn<F>(&mut self, id: impl Into<String>, action: F) -> &mut Self
    where
        F: Fn(&Sandbox) -> Result<Value> + Send + Sync + 'static,
    {
        self.register(id, FnAction(action))
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn CommandAction>> {
        self.actions.get(id).cloned()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.actions.keys().map(String::as_str).collect()
    }

    /// Unregistered or missing exports resolve to [`NoActionDefined`].
    pub fn resolve(&self, export: Option<&str>) -> Arc<dyn CommandAction> {
        let Some(id) = export else {
            return Arc::new(NoActionDefined);
        };
        match self.get(id) {
            Some(action) => action,
            None => {
                tracing::warn!(export = id, "entry point exports an unregistered action");
                Arc::new(NoActionDefined)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use serde_json::json;

    use super::*;
    use crate::{sandbox::tests::test_sandbox_builder, HandlerConfig};

    #[tokio::test]
    async fn unit_registry_resolves_registered_export() {
        let mut registry = ActionRegistry::new();
        registry.register_fn("demo.ok", |_sandbox| Ok(json!("ok")));
        let sandbox = test_sandbox_builder()
            .build(Path::new("/demo.cmd/action.json"), &HandlerConfig::default());

        let action = registry.resolve(Some("demo.ok"));
        assert_eq!(action.execute(&sandbox).await.expect("execute"), json!("ok"));
        assert_eq!(registry.ids(), vec!["demo.ok"]);
    }

    #[tokio::test]
    async fn regression_missing_or_unknown_export_resolves_to_noop_stub() {
        let registry = ActionRegistry::new();
        let sandbox = test_sandbox_builder()
            .build(Path::new("/demo.cmd/action.json"), &HandlerConfig::default());

        for export in [None, Some("demo.missing")] {
            let action = registry.resolve(export);
            assert_eq!(action.execute(&sandbox).await.expect("stub"), Value::Null);
        }
    }

    #[test]
    fn unit_entry_point_ignores_unknown_keys() {
        let entry: EntryPoint =
            serde_json::from_str(r#"{"export": "core.list", "comment": "x"}"#).expect("parse");
        assert_eq!(entry.export.as_deref(), Some("core.list"));
        let empty: EntryPoint = serde_json::from_str("{}").expect("parse");
        assert_eq!(empty, EntryPoint::default());
    }
}
