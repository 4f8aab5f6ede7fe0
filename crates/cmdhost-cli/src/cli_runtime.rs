use std::{
    io::{self, Write},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{Context, Result};
use cmdhost_args::ArgumentParser;
use cmdhost_commands::{
    route_command, ActionRegistry, BaseCapabilities, CommandLoader, CommandTree, ExitHandle,
    Facade, InjectionTable, LineReader, LoaderOptions, PackageInfo, ProcessHandle,
    SandboxBuilder,
};
use serde_json::Value;

use crate::{initialize_providers, register_core_actions, Provider, RuntimeConfig, ServerProvider};

/// Metadata of this binary, exposed to commands through the facade.
pub fn package_info() -> PackageInfo {
    PackageInfo {
        name: "cmdhost".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        description: env!("CARGO_PKG_DESCRIPTION").to_string(),
    }
}

/// One CLI invocation: parse, provide, load, route, invoke.
pub struct CliRuntime {
    config: RuntimeConfig,
    package: PackageInfo,
    actions: ActionRegistry,
    providers: Vec<Arc<dyn Provider>>,
}

impl CliRuntime {
    /// Runtime with the core actions and the server provider registered.
    pub fn new(config: RuntimeConfig) -> Self {
        let mut actions = ActionRegistry::new();
        register_core_actions(&mut actions);
        Self {
            config,
            package: package_info(),
            actions,
            providers: vec![Arc::new(ServerProvider)],
        }
    }

    pub fn actions_mut(&mut self) -> &mut ActionRegistry {
        &mut self.actions
    }

    pub fn with_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Runs `args` (without the program name) and returns the exit code.
    pub async fn run(self, args: Vec<String>) -> i32 {
        let line_reader = Arc::new(LineReader::new());
        let exit = ExitHandle::default();
        let original_dir = std::env::current_dir().ok();

        let outcome = self.execute(args, &line_reader, &exit).await;
        cleanup(&line_reader, original_dir);

        match outcome {
            Ok(output) => {
                if let Some(rendered) = render_output(&output) {
                    let mut stdout = io::stdout().lock();
                    if let Err(error) = writeln!(stdout, "{rendered}") {
                        tracing::debug!(error = %error, "failed to write command output");
                    }
                }
                exit.requested().unwrap_or(0)
            }
            Err(error) => {
                eprintln!("error: {error:#}");
                1
            }
        }
    }

    async fn execute(
        &self,
        args: Vec<String>,
        line_reader: &Arc<LineReader>,
        exit: &ExitHandle,
    ) -> Result<Value> {
        let mut parser = ArgumentParser::new(args.clone());
        let initial = parser.parse().context("failed to parse command line")?;

        let mut modules = InjectionTable::with_builtin_modules();
        initialize_providers(&self.providers, &self.config, &mut modules).await?;

        let facade = Facade::new(
            self.package.clone(),
            self.config.working_dir.clone(),
            Arc::clone(line_reader),
            initial.clone(),
            exit.clone(),
        );
        let base = BaseCapabilities::new(ProcessHandle::new(args));
        let loader = CommandLoader::new(
            self.actions.clone(),
            SandboxBuilder::new(base, Arc::new(facade), modules),
        )
        .with_options(LoaderOptions {
            read_timeout: self.config.load_timeout,
        });

        let mut tree = CommandTree::new();
        let core = &self.config.commands_dir;
        loader
            .load_commands(core, &mut tree)
            .await
            .with_context(|| format!("failed to load core commands from '{}'", core.display()))?;

        let project = &self.config.project_commands_dir;
        if tokio::fs::metadata(project)
            .await
            .map(|metadata| metadata.is_dir())
            .unwrap_or(false)
        {
            loader
                .load_commands(project, &mut tree)
                .await
                .with_context(|| {
                    format!("failed to load project commands from '{}'", project.display())
                })?;
        }

        let resolved = route_command(&tree, &initial)?;
        tracing::debug!(command = %resolved.path.join(" "), "resolved command");
        resolved
            .handler
            .invoke(&mut parser, &resolved.consumed)
            .await
            .with_context(|| format!("command '{}' failed", resolved.path.join(" ")))
    }
}

fn cleanup(line_reader: &LineReader, original_dir: Option<PathBuf>) {
    line_reader.close();
    if let Some(original_dir) = original_dir {
        if let Err(error) = std::env::set_current_dir(&original_dir) {
            tracing::warn!(
                error = %error,
                dir = %original_dir.display(),
                "failed to restore working directory"
            );
        }
    }
}

/// Strings print raw, `null` prints nothing, anything else as pretty JSON.
pub fn render_output(output: &Value) -> Option<String> {
    match output {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path};

    use serde_json::json;

    use super::*;

    fn write_leaf(root: &Path, relative: &str, export: &str) {
        let dir = root.join(relative);
        fs::create_dir_all(&dir).expect("mkdir");
        fs::write(dir.join("action.json"), json!({ "export": export }).to_string())
            .expect("write entry point");
    }

    fn test_config(root: &Path) -> RuntimeConfig {
        RuntimeConfig {
            home_dir: root.join("home"),
            commands_dir: root.join("core"),
            project_commands_dir: root.join("project"),
            working_dir: root.to_path_buf(),
            user_home: None,
            load_timeout: None,
        }
    }

    fn args(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|token| token.to_string()).collect()
    }

    #[test]
    fn unit_render_output_formats_by_value_kind() {
        assert_eq!(render_output(&Value::Null), None);
        assert_eq!(render_output(&json!("ok")), Some("ok".to_string()));
        assert_eq!(
            render_output(&json!({"a": 1})),
            Some("{\n  \"a\": 1\n}".to_string())
        );
    }

    #[tokio::test]
    async fn integration_routes_and_runs_core_leaf() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        write_leaf(&tempdir.path().join("core"), "list.cmd", "test.ok");
        let mut runtime = CliRuntime::new(test_config(tempdir.path()));
        runtime.actions_mut().register_fn("test.ok", |_sandbox| Ok(json!("ok")));

        assert_eq!(runtime.run(args(&["list"])).await, 0);
    }

    #[tokio::test]
    async fn functional_handler_requested_exit_code_overrides_success() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        write_leaf(&tempdir.path().join("core"), "fail.cmd", "test.exit");
        let mut runtime = CliRuntime::new(test_config(tempdir.path()));
        runtime.actions_mut().register_fn("test.exit", |sandbox| {
            sandbox.facade().exit().request(7);
            Ok(Value::Null)
        });

        assert_eq!(runtime.run(args(&["fail"])).await, 7);
    }

    #[tokio::test]
    async fn regression_unknown_command_and_action_error_exit_with_one() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        write_leaf(&tempdir.path().join("core"), "boom.cmd", "test.boom");
        let mut runtime = CliRuntime::new(test_config(tempdir.path()));
        runtime
            .actions_mut()
            .register_fn("test.boom", |_sandbox| Err(anyhow::anyhow!("boom")));
        assert_eq!(runtime.run(args(&["boom"])).await, 1);

        let runtime = CliRuntime::new(test_config(tempdir.path()));
        assert_eq!(runtime.run(args(&["missing"])).await, 1);
    }

    #[tokio::test]
    async fn functional_project_commands_extend_core_namespace() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        write_leaf(&tempdir.path().join("core"), "list.cmd", "test.ok");
        write_leaf(&tempdir.path().join("project"), "deploy.cmd", "test.ok");
        let mut runtime = CliRuntime::new(test_config(tempdir.path()));
        runtime.actions_mut().register_fn("test.ok", |_sandbox| Ok(json!("ok")));

        assert_eq!(runtime.run(args(&["deploy"])).await, 0);
    }

    #[tokio::test]
    async fn regression_project_leaf_cannot_shadow_core_leaf() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        write_leaf(&tempdir.path().join("core"), "list.cmd", "test.ok");
        write_leaf(&tempdir.path().join("project"), "list.cmd", "test.ok");
        let mut runtime = CliRuntime::new(test_config(tempdir.path()));
        runtime.actions_mut().register_fn("test.ok", |_sandbox| Ok(json!("ok")));

        assert_eq!(runtime.run(args(&["list"])).await, 1);
    }
}
