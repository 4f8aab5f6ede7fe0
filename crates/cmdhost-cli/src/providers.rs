use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use cmdhost_commands::{InjectionTable, Module};
use tokio::task::JoinSet;

use crate::RuntimeConfig;

pub const SERVER_MODULE: &str = "server";
/// Plain-text file beside the installation naming the managed server path.
pub const LOCATION_MARKER_FILE: &str = "server.link";
/// Created in the user home once the not-installed warning has been shown.
pub const NOT_INSTALLED_WARNING_MARKER: &str = ".cmdhost-not-installed-warning";

/// A module contributed to the injection table at startup.
pub struct ProvidedModule {
    pub name: String,
    pub module: Module,
}

impl ProvidedModule {
    pub fn new<T>(name: impl Into<String>, module: T) -> Self
    where
        T: std::any::Any + Send + Sync,
    {
        Self {
            name: name.into(),
            module: Arc::new(module),
        }
    }
}

/// Startup hook that prepares injectable modules before commands load.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    async fn initialize(&self, config: &RuntimeConfig) -> Result<Vec<ProvidedModule>>;
}

/// Runs every provider concurrently and adds their modules to `table`.
///
/// Registration follows provider order, so a later provider overrides an
/// earlier one on a name clash regardless of completion order.
pub async fn initialize_providers(
    providers: &[Arc<dyn Provider>],
    config: &RuntimeConfig,
    table: &mut InjectionTable,
) -> Result<()> {
    let mut tasks = JoinSet::new();
    for (index, provider) in providers.iter().enumerate() {
        let provider = Arc::clone(provider);
        let config = config.clone();
        tasks.spawn(async move {
            let modules = provider
                .initialize(&config)
                .await
                .with_context(|| format!("provider '{}' failed to initialize", provider.name()));
            (index, modules)
        });
    }

    let mut results = Vec::with_capacity(providers.len());
    while let Some(joined) = tasks.join_next().await {
        let (index, modules) = joined.context("provider task failed")?;
        match modules {
            Ok(modules) => results.push((index, modules)),
            Err(error) => {
                tasks.abort_all();
                return Err(error);
            }
        }
    }

    results.sort_by_key(|(index, _)| *index);
    for (_, modules) in results {
        for provided in modules {
            tracing::debug!(module = provided.name.as_str(), "registering provided module");
            table.register_shared(provided.name, provided.module);
        }
    }
    Ok(())
}

/// Location of the managed server as recorded by the location marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInstallation {
    path: Option<PathBuf>,
    link_file: PathBuf,
}

impl ServerInstallation {
    pub fn new(path: Option<PathBuf>, link_file: impl Into<PathBuf>) -> Self {
        Self {
            path,
            link_file: link_file.into(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn link_file(&self) -> &Path {
        &self.link_file
    }

    pub fn is_installed(&self) -> bool {
        self.path.is_some()
    }

    pub fn require_path(&self) -> Result<&Path> {
        self.path().ok_or_else(|| {
            anyhow!("server is not installed; run `cmdhost path <server directory>` first")
        })
    }

    pub fn applications_dir(&self) -> Result<PathBuf> {
        Ok(self.require_path()?.join("applications"))
    }
}

/// Reads the location marker and provides the `server` module.
#[derive(Debug, Clone, Default)]
pub struct ServerProvider;

#[async_trait]
impl Provider for ServerProvider {
    fn name(&self) -> &str {
        SERVER_MODULE
    }

    async fn initialize(&self, config: &RuntimeConfig) -> Result<Vec<ProvidedModule>> {
        let link_file = config.home_dir.join(LOCATION_MARKER_FILE);
        let path = read_location_marker(&link_file).await?;
        if path.is_none() {
            warn_not_installed_once(config.user_home.as_deref(), &link_file).await;
        }
        Ok(vec![ProvidedModule::new(
            SERVER_MODULE,
            ServerInstallation::new(path, link_file),
        )])
    }
}

async fn read_location_marker(link_file: &Path) -> Result<Option<PathBuf>> {
    match tokio::fs::read_to_string(link_file).await {
        Ok(raw) => {
            let trimmed = raw.trim();
            Ok((!trimmed.is_empty()).then(|| PathBuf::from(trimmed)))
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error)
            .with_context(|| format!("failed to read location marker '{}'", link_file.display())),
    }
}

async fn warn_not_installed_once(user_home: Option<&Path>, link_file: &Path) {
    let Some(user_home) = user_home else {
        tracing::debug!("no user home, skipping not-installed warning");
        return;
    };
    let marker = user_home.join(NOT_INSTALLED_WARNING_MARKER);
    if tokio::fs::try_exists(&marker).await.unwrap_or(false) {
        return;
    }
    tracing::warn!(
        marker = %link_file.display(),
        "server installation not found; commands that manage the server will fail until `cmdhost path <dir>` is run"
    );
    if let Err(error) = tokio::fs::write(&marker, b"").await {
        tracing::debug!(error = %error, marker = %marker.display(), "failed to record warning marker");
    }
}
