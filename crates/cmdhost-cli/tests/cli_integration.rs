use std::{fs, path::Path};

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::{tempdir, TempDir};

struct Sandbox {
    install: TempDir,
    user_home: TempDir,
    project: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        Self {
            install: tempdir().expect("install dir"),
            user_home: tempdir().expect("user home"),
            project: tempdir().expect("project dir"),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("cmdhost"));
        cmd.current_dir(self.project.path())
            .env("CMDHOST_HOME", self.install.path())
            .env("HOME", self.user_home.path())
            .env_remove("CMDHOST_COMMANDS_DIR")
            .env_remove("CMDHOST_PROJECT_COMMANDS_DIR")
            .env_remove("CMDHOST_LOAD_TIMEOUT_MS")
            .env_remove("RUST_LOG");
        cmd
    }

    fn link_server(&self, server: &Path) {
        fs::write(
            self.install.path().join("server.link"),
            server.display().to_string(),
        )
        .expect("write location marker");
    }
}

fn write_leaf(root: &Path, relative: &str, export: &str) {
    let dir = root.join(relative);
    fs::create_dir_all(&dir).expect("create leaf");
    fs::write(
        dir.join("action.json"),
        format!(r#"{{ "export": "{export}" }}"#),
    )
    .expect("write entry point");
}

#[test]
fn integration_version_prints_package_version() {
    let sandbox = Sandbox::new();
    sandbox
        .command()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(concat!(
            "cmdhost ",
            env!("CARGO_PKG_VERSION")
        )));
}

#[test]
fn integration_missing_command_exits_with_one() {
    let sandbox = Sandbox::new();
    sandbox
        .command()
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no command given"));

    sandbox
        .command()
        .arg("nope")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("command not found: nope"));
}

#[test]
fn functional_typo_gets_suggestion() {
    let sandbox = Sandbox::new();
    sandbox
        .command()
        .arg("versoin")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("did you mean version?"));
}

#[test]
fn integration_path_records_and_reports_server_location() {
    let sandbox = Sandbox::new();
    let server = tempdir().expect("server dir");

    sandbox
        .command()
        .arg("path")
        .arg(server.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("server path set to"));
    let marker = fs::read_to_string(sandbox.install.path().join("server.link"))
        .expect("marker written");
    let recorded = Path::new(marker.trim());
    assert_eq!(
        fs::canonicalize(recorded).expect("recorded path"),
        fs::canonicalize(server.path()).expect("server path")
    );

    sandbox
        .command()
        .arg("path")
        .assert()
        .success()
        .stdout(predicate::str::contains(marker.trim()));
}

#[test]
fn integration_list_reports_installed_applications() {
    let sandbox = Sandbox::new();
    let server = tempdir().expect("server dir");
    for app in ["shop", "blog"] {
        fs::create_dir_all(server.path().join("applications").join(app)).expect("mkdir");
    }
    sandbox.link_server(server.path());

    sandbox
        .command()
        .arg("list")
        .assert()
        .success()
        .stdout("blog\nshop\n");
}

#[test]
fn regression_list_without_installation_fails_and_warns_once() {
    let sandbox = Sandbox::new();
    sandbox
        .command()
        .arg("list")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("server is not installed"))
        .stderr(predicate::str::contains("server installation not found"));
    assert!(sandbox
        .user_home
        .path()
        .join(".cmdhost-not-installed-warning")
        .exists());

    sandbox
        .command()
        .arg("version")
        .assert()
        .success()
        .stderr(predicate::str::contains("server installation not found").not());
}

#[test]
fn functional_env_json_flag_reports_named_arguments() {
    let sandbox = Sandbox::new();
    let output = sandbox
        .command()
        .args(["env", "-j", "--verbose"])
        .output()
        .expect("run env");
    assert!(output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout).expect("json report");
    assert_eq!(report["arguments"]["json"], Value::Bool(true));
    assert_eq!(report["arguments"]["verbose"], Value::Bool(true));
    assert_eq!(report["positional"], Value::Array(Vec::new()));
}

#[cfg(unix)]
#[test]
fn regression_non_utf8_argument_is_decoded_lossily() {
    use std::{ffi::OsStr, os::unix::ffi::OsStrExt};

    let sandbox = Sandbox::new();
    let output = sandbox
        .command()
        .args([OsStr::new("env"), OsStr::new("-j"), OsStr::from_bytes(b"a\xff")])
        .output()
        .expect("run env");
    assert_eq!(output.status.code(), Some(0));
    let report: Value = serde_json::from_slice(&output.stdout).expect("json report");
    assert_eq!(report["positional"][0], Value::String("a\u{FFFD}".to_string()));
}

#[test]
fn integration_project_commands_join_core_namespace() {
    let sandbox = Sandbox::new();
    write_leaf(
        &sandbox.project.path().join(".cmdhost/commands"),
        "release/notes.cmd",
        "core.version",
    );

    sandbox
        .command()
        .args(["release", "notes"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("cmdhost "));
}

#[test]
fn regression_project_command_shadowing_core_fails_load() {
    let sandbox = Sandbox::new();
    write_leaf(
        &sandbox.project.path().join(".cmdhost/commands"),
        "version.cmd",
        "core.version",
    );

    sandbox
        .command()
        .arg("version")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("failed to load project commands"));
}

#[test]
fn regression_leaf_without_registered_action_completes_quietly() {
    let sandbox = Sandbox::new();
    let core = tempdir().expect("core commands");
    write_leaf(core.path(), "noop.cmd", "custom.unregistered");

    sandbox
        .command()
        .env("CMDHOST_COMMANDS_DIR", core.path())
        .arg("noop")
        .assert()
        .success()
        .stdout("")
        .stderr(predicate::str::contains("The command defined no action"));
}
