use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Result;
use cmdhost_args::ArgumentParser;
use serde_json::Value;

use crate::{CommandAction, HandlerConfig, Sandbox};

/// A loaded command leaf: its declaration, sandbox, and bound action.
pub struct CommandHandler {
    name: String,
    location: PathBuf,
    export: Option<String>,
    config: HandlerConfig,
    sandbox: Sandbox,
    action: Arc<dyn CommandAction>,
}

impl fmt::Debug for CommandHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandHandler")
            .field("name", &self.name)
            .field("location", &self.location)
            .field("export", &self.export)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CommandHandler {
    pub fn new(
        name: impl Into<String>,
        location: impl Into<PathBuf>,
        export: Option<String>,
        config: HandlerConfig,
        sandbox: Sandbox,
        action: Arc<dyn CommandAction>,
    ) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            export,
            config,
            sandbox,
            action,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn export(&self) -> Option<&str> {
        self.export.as_deref()
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Registers this leaf's schema, re-parses, drops the routed tokens from
    /// the positional list, then runs the action.
    pub async fn invoke(&self, parser: &mut ArgumentParser, routed: &[usize]) -> Result<Value> {
        parser.add_schema(self.config.arguments.iter().cloned())?;
        let mut parsed = parser.parse()?;
        parsed.strip_consumed(routed);
        tracing::debug!(
            command = self.name.as_str(),
            positional = ?parsed.positional,
            "invoking command handler"
        );
        self.sandbox.facade().publish_arguments(parsed);
        self.action.execute(&self.sandbox).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::path::Path;

    use cmdhost_args::{ArgValue, ArgumentSchemaEntry, TYPE_NUMBER};
    use serde_json::json;

    use super::*;
    use crate::{sandbox::tests::test_sandbox_builder, FnAction, NoActionDefined};

    pub(crate) fn test_handler(name: &str) -> Arc<CommandHandler> {
        let location = Path::new("/commands").join(format!("{name}.cmd"));
        let config = HandlerConfig::default();
        let sandbox = test_sandbox_builder().build(&location.join("action.json"), &config);
        Arc::new(CommandHandler::new(
            name,
            location,
            None,
            config,
            sandbox,
            Arc::new(NoActionDefined),
        ))
    }

    #[tokio::test]
    async fn integration_invoke_registers_schema_and_publishes_snapshot() {
        let config = HandlerConfig {
            inject_modules: Vec::new(),
            arguments: vec![ArgumentSchemaEntry::new(TYPE_NUMBER)
                .full("port")
                .short("p")
                .with_default(json!(8080))],
        };
        let sandbox =
            test_sandbox_builder().build(Path::new("/serve.cmd/action.json"), &config);
        let action = FnAction(|sandbox: &Sandbox| {
            let args = sandbox.facade().args();
            Ok(json!({
                "port": args.number("port"),
                "positional": args.positional,
            }))
        });
        let handler = CommandHandler::new(
            "serve",
            "/serve.cmd",
            Some("test.serve".to_string()),
            config,
            sandbox,
            Arc::new(action),
        );

        let mut parser = ArgumentParser::new(vec![
            "serve".to_string(),
            "-p".to_string(),
            "9000".to_string(),
            "extra".to_string(),
        ]);
        let initial = parser.parse().expect("initial parse");
        assert_eq!(initial.positional, vec!["serve", "9000", "extra"]);
        let routed = vec![initial.positional_origin(0).expect("origin")];

        let output = handler.invoke(&mut parser, &routed).await.expect("invoke");
        assert_eq!(output, json!({"port": 9000.0, "positional": ["extra"]}));
        assert_eq!(
            handler.sandbox().facade().args().get("port"),
            Some(&ArgValue::Number(9000.0))
        );
    }
}
