use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use cmdhost_commands::{ActionRegistry, CommandAction, FsModule, Sandbox, MODULE_FS};
use serde_json::{json, Value};

use crate::{ServerInstallation, SERVER_MODULE};

pub const VERSION_ACTION: &str = "core.version";
pub const PATH_ACTION: &str = "core.path";
pub const LIST_ACTION: &str = "core.list";
pub const ENV_ACTION: &str = "core.env";

/// Registers the actions bound by the bundled core commands.
pub fn register_core_actions(registry: &mut ActionRegistry) {
    registry
        .register_fn(VERSION_ACTION, version)
        .register(PATH_ACTION, PathAction)
        .register(LIST_ACTION, ListAction)
        .register_fn(ENV_ACTION, environment);
}

fn version(sandbox: &Sandbox) -> Result<Value> {
    let package = sandbox.facade().package();
    Ok(Value::String(format!("{} {}", package.name, package.version)))
}

/// Shows the managed server path, or records a new one.
struct PathAction;

#[async_trait]
impl CommandAction for PathAction {
    async fn execute(&self, sandbox: &Sandbox) -> Result<Value> {
        let server = sandbox.api().require::<ServerInstallation>(SERVER_MODULE)?;
        let args = sandbox.facade().args();

        let Some(requested) = args.positional.first() else {
            let path = server.require_path()?;
            return Ok(Value::String(path.display().to_string()));
        };

        let fs = sandbox.api().require::<FsModule>(MODULE_FS)?;
        let mut target = sandbox.facade().working_dir().join(requested);
        if let Ok(canonical) = fs.canonicalize(&target).await {
            target = canonical;
        }
        if let Some(parent) = server.link_file().parent() {
            fs.create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create '{}'", parent.display()))?;
        }
        fs.write(server.link_file(), target.display().to_string())
            .await
            .with_context(|| {
                format!(
                    "failed to write location marker '{}'",
                    server.link_file().display()
                )
            })?;
        tracing::debug!(path = %target.display(), "updated server location");
        Ok(Value::String(format!("server path set to {}", target.display())))
    }
}

/// Lists application directories of the managed server.
struct ListAction;

#[async_trait]
impl CommandAction for ListAction {
    async fn execute(&self, sandbox: &Sandbox) -> Result<Value> {
        let server = sandbox.api().require::<ServerInstallation>(SERVER_MODULE)?;
        let fs = sandbox.api().require::<FsModule>(MODULE_FS)?;
        let applications: PathBuf = server.applications_dir()?;

        if !fs.exists(&applications).await.unwrap_or(false) {
            return Ok(Value::String("no applications installed".to_string()));
        }
        let names = fs
            .list_directories(&applications)
            .await
            .with_context(|| format!("failed to list '{}'", applications.display()))?;
        if names.is_empty() {
            return Ok(Value::String("no applications installed".to_string()));
        }
        Ok(Value::String(names.join("\n")))
    }
}

fn environment(sandbox: &Sandbox) -> Result<Value> {
    let facade = sandbox.facade();
    let args = facade.args();
    let mut snapshot = args.to_json();
    let report = json!({
        "windows": facade.is_windows(),
        "workingDir": facade.working_dir().display().to_string(),
        "positional": snapshot["positional"].take(),
        "arguments": snapshot["named"].take(),
    });
    if args.flag("json") {
        return Ok(report);
    }
    Ok(Value::String(format!(
        "windows: {}\nworking directory: {}\narguments: {}",
        facade.is_windows(),
        facade.working_dir().display(),
        report["arguments"]
    )))
}

#[cfg(test)]
mod tests {
    use std::{path::Path, sync::Arc};

    use cmdhost_args::{ArgumentParser, ParsedArguments};
    use cmdhost_commands::{
        BaseCapabilities, ExitHandle, Facade, HandlerConfig, InjectionTable, LineReader,
        PackageInfo, ProcessHandle, SandboxBuilder,
    };

    use super::*;

    fn sandbox_builder(working_dir: &Path, server: ServerInstallation) -> SandboxBuilder {
        sandbox_builder_with_args(working_dir, server, ParsedArguments::default())
    }

    fn sandbox_builder_with_args(
        working_dir: &Path,
        server: ServerInstallation,
        args: ParsedArguments,
    ) -> SandboxBuilder {
        let facade = Facade::new(
            PackageInfo {
                name: "cmdhost".to_string(),
                version: "1.2.3".to_string(),
                description: String::new(),
            },
            working_dir.to_path_buf(),
            Arc::new(LineReader::new()),
            args,
            ExitHandle::default(),
        );
        let mut modules = InjectionTable::with_builtin_modules();
        modules.register(SERVER_MODULE, server);
        SandboxBuilder::new(
            BaseCapabilities::new(ProcessHandle::new(Vec::new())),
            Arc::new(facade),
            modules,
        )
    }

    fn server_config() -> HandlerConfig {
        HandlerConfig {
            inject_modules: vec![MODULE_FS.to_string(), SERVER_MODULE.to_string()],
            arguments: Vec::new(),
        }
    }

    fn registry() -> ActionRegistry {
        let mut registry = ActionRegistry::new();
        register_core_actions(&mut registry);
        registry
    }

    #[tokio::test]
    async fn unit_version_reports_package_metadata() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let builder = sandbox_builder(
            tempdir.path(),
            ServerInstallation::new(None, tempdir.path().join("server.link")),
        );
        let sandbox = builder.build(
            &tempdir.path().join("version.cmd/action.json"),
            &HandlerConfig::default(),
        );
        let output = registry()
            .resolve(Some(VERSION_ACTION))
            .execute(&sandbox)
            .await
            .expect("version");
        assert_eq!(output, json!("cmdhost 1.2.3"));
    }

    #[tokio::test]
    async fn functional_list_reports_application_directories() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let server_dir = tempdir.path().join("server");
        for app in ["billing", "admin"] {
            std::fs::create_dir_all(server_dir.join("applications").join(app)).expect("mkdir");
        }
        std::fs::write(server_dir.join("applications/readme.txt"), "x").expect("write");
        let builder = sandbox_builder(
            tempdir.path(),
            ServerInstallation::new(Some(server_dir), tempdir.path().join("server.link")),
        );
        let sandbox = builder.build(
            &tempdir.path().join("list.cmd/action.json"),
            &server_config(),
        );

        let output = registry()
            .resolve(Some(LIST_ACTION))
            .execute(&sandbox)
            .await
            .expect("list");
        assert_eq!(output, json!("admin\nbilling"));
    }

    #[tokio::test]
    async fn regression_list_without_server_module_fails_cleanly() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let builder = sandbox_builder(
            tempdir.path(),
            ServerInstallation::new(None, tempdir.path().join("server.link")),
        );
        let sandbox = builder.build(
            &tempdir.path().join("list.cmd/action.json"),
            &HandlerConfig::default(),
        );
        let error = registry()
            .resolve(Some(LIST_ACTION))
            .execute(&sandbox)
            .await
            .expect_err("server not injected");
        assert!(error.to_string().contains("'server'"));
    }

    #[tokio::test]
    async fn regression_path_without_installation_reports_not_installed() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let builder = sandbox_builder(
            tempdir.path(),
            ServerInstallation::new(None, tempdir.path().join("server.link")),
        );
        let sandbox = builder.build(
            &tempdir.path().join("path.cmd/action.json"),
            &server_config(),
        );
        let error = registry()
            .resolve(Some(PATH_ACTION))
            .execute(&sandbox)
            .await
            .expect_err("not installed");
        assert!(error.to_string().contains("not installed"));
    }

    #[tokio::test]
    async fn unit_env_reports_working_dir() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let builder = sandbox_builder(
            tempdir.path(),
            ServerInstallation::new(None, tempdir.path().join("server.link")),
        );
        let sandbox = builder.build(
            &tempdir.path().join("env.cmd/action.json"),
            &HandlerConfig::default(),
        );
        let output = registry()
            .resolve(Some(ENV_ACTION))
            .execute(&sandbox)
            .await
            .expect("env");
        let text = output.as_str().expect("text output");
        assert!(text.contains(&format!("working directory: {}", tempdir.path().display())));
    }

    #[tokio::test]
    async fn functional_path_records_canonical_target_through_fs_module() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(tempdir.path().join("srv")).expect("mkdir");
        let link_file = tempdir.path().join("install/server.link");
        let args = ArgumentParser::new(vec!["srv/../srv".to_string()])
            .parse()
            .expect("parse");
        let builder = sandbox_builder_with_args(
            tempdir.path(),
            ServerInstallation::new(None, link_file.clone()),
            args,
        );

        let sandbox = builder.build(&tempdir.path().join("path.cmd/action.json"), &server_config());
        let output = registry()
            .resolve(Some(PATH_ACTION))
            .execute(&sandbox)
            .await
            .expect("path set");
        let canonical = std::fs::canonicalize(tempdir.path().join("srv")).expect("canonical");
        assert_eq!(
            std::fs::read_to_string(&link_file).expect("marker"),
            canonical.display().to_string()
        );
        assert_eq!(
            output,
            json!(format!("server path set to {}", canonical.display()))
        );

        let server_only = HandlerConfig {
            inject_modules: vec![SERVER_MODULE.to_string()],
            arguments: Vec::new(),
        };
        let sandbox = builder.build(&tempdir.path().join("path.cmd/action.json"), &server_only);
        let error = registry()
            .resolve(Some(PATH_ACTION))
            .execute(&sandbox)
            .await
            .expect_err("fs not injected");
        assert!(error.to_string().contains("'fs'"));
    }
}
