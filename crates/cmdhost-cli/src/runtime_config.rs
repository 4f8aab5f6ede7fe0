use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context, Result};

pub const HOME_ENV: &str = "CMDHOST_HOME";
pub const COMMANDS_DIR_ENV: &str = "CMDHOST_COMMANDS_DIR";
pub const PROJECT_COMMANDS_DIR_ENV: &str = "CMDHOST_PROJECT_COMMANDS_DIR";
pub const LOAD_TIMEOUT_ENV: &str = "CMDHOST_LOAD_TIMEOUT_MS";

const PROJECT_COMMANDS_RELATIVE: &str = ".cmdhost/commands";
const BUNDLED_COMMANDS_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/commands");

/// Paths and limits for one CLI invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Installation directory holding the location marker.
    pub home_dir: PathBuf,
    pub commands_dir: PathBuf,
    pub project_commands_dir: PathBuf,
    pub working_dir: PathBuf,
    /// User home, where the once-only warning marker lives.
    pub user_home: Option<PathBuf>,
    pub load_timeout: Option<Duration>,
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self> {
        let working_dir = env::current_dir().context("failed to resolve working directory")?;
        let exe_dir = env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));
        Self::from_lookup(
            working_dir,
            exe_dir,
            cmdhost_commands::home_dir(),
            |name| env::var(name).ok(),
        )
    }

    pub fn from_lookup<F>(
        working_dir: PathBuf,
        exe_dir: Option<PathBuf>,
        user_home: Option<PathBuf>,
        lookup: F,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let home_dir = match lookup(HOME_ENV) {
            Some(home) => PathBuf::from(home),
            None => exe_dir.unwrap_or_else(|| working_dir.clone()),
        };
        let commands_dir = match lookup(COMMANDS_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => default_commands_dir(&home_dir),
        };
        let project_commands_dir = match lookup(PROJECT_COMMANDS_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => working_dir.join(PROJECT_COMMANDS_RELATIVE),
        };
        let load_timeout = match lookup(LOAD_TIMEOUT_ENV) {
            Some(raw) => parse_load_timeout(&raw)?,
            None => None,
        };

        Ok(Self {
            home_dir,
            commands_dir,
            project_commands_dir,
            working_dir,
            user_home,
            load_timeout,
        })
    }
}

fn default_commands_dir(home_dir: &Path) -> PathBuf {
    let installed = home_dir.join("commands");
    if installed.is_dir() {
        installed
    } else {
        PathBuf::from(BUNDLED_COMMANDS_DIR)
    }
}

fn parse_load_timeout(raw: &str) -> Result<Option<Duration>> {
    let Ok(millis) = raw.trim().parse::<u64>() else {
        bail!("{LOAD_TIMEOUT_ENV} must be a whole number of milliseconds, got '{raw}'");
    };
    Ok((millis > 0).then(|| Duration::from_millis(millis)))
}
