use std::{
    future::Future,
    io,
    path::{Path, PathBuf},
    pin::Pin,
    sync::Arc,
    time::Duration,
};

use tokio::task::JoinSet;
use tracing::instrument;

use crate::{
    load_handler_config, ActionRegistry, CommandError, CommandHandler, CommandNode, CommandTree,
    EntryPoint, SandboxBuilder, ENTRY_POINT_FILE,
};

/// Directory-name suffix marking a command leaf.
pub const LEAF_MARKER_SUFFIX: &str = ".cmd";

type LoadFuture = Pin<Box<dyn Future<Output = Result<CommandTree, CommandError>> + Send>>;

#[derive(Debug, Clone, Default)]
pub struct LoaderOptions {
    /// Deadline for listing a single directory; `None` waits indefinitely.
    pub read_timeout: Option<Duration>,
}

struct LoadedEntry {
    entry_name: String,
    command: String,
    node: CommandNode,
}

/// Walks command directories into [`CommandTree`]s.
#[derive(Debug, Clone)]
pub struct CommandLoader {
    actions: Arc<ActionRegistry>,
    sandboxes: Arc<SandboxBuilder>,
    options: LoaderOptions,
}

impl CommandLoader {
    pub fn new(actions: ActionRegistry, sandboxes: SandboxBuilder) -> Self {
        Self {
            actions: Arc::new(actions),
            sandboxes: Arc::new(sandboxes),
            options: LoaderOptions::default(),
        }
    }

    pub fn with_options(mut self, options: LoaderOptions) -> Self {
        self.options = options;
        self
    }

    /// Loads `root` and mounts the result onto `mount_point`.
    ///
    /// The mount point is only modified when the whole walk succeeds and
    /// merges without conflicts.
    #[instrument(skip(self, root, mount_point), fields(root = %root.display()))]
    pub async fn load_commands(
        &self,
        root: &Path,
        mount_point: &mut CommandTree,
    ) -> Result<(), CommandError> {
        let tree = self.load_tree(root.to_path_buf()).await?;
        tracing::debug!(commands = tree.leaf_paths().len(), "loaded command tree");
        mount_point.merge(tree)
    }

    pub fn load_tree(&self, root: PathBuf) -> LoadFuture {
        let loader = self.clone();
        Box::pin(async move { loader.load_directory(root).await })
    }

    async fn load_directory(self, root: PathBuf) -> Result<CommandTree, CommandError> {
        let names = self.read_entry_names(&root).await?;

        let mut tasks = JoinSet::new();
        for entry_name in names {
            let loader = self.clone();
            let location = root.join(&entry_name);
            tasks.spawn(async move { loader.load_entry(entry_name, location).await });
        }

        let mut loaded = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let entry = match joined {
                Ok(result) => result,
                Err(error) => Err(CommandError::LoadTask(error)),
            };
            match entry {
                Ok(Some(entry)) => loaded.push(entry),
                Ok(None) => {}
                Err(error) => {
                    tasks.abort_all();
                    return Err(error);
                }
            }
        }

        loaded.sort_by(|left, right| left.entry_name.cmp(&right.entry_name));
        let mut tree = CommandTree::new();
        for entry in loaded {
            tree.mount(&[entry.command.as_str()], entry.node)?;
        }
        Ok(tree)
    }

    async fn load_entry(
        self,
        entry_name: String,
        location: PathBuf,
    ) -> Result<Option<LoadedEntry>, CommandError> {
        let metadata = tokio::fs::symlink_metadata(&location)
            .await
            .map_err(|source| io_error(&location, source))?;
        if !metadata.is_dir() {
            tracing::trace!(entry = %location.display(), "skipping non-directory entry");
            return Ok(None);
        }

        if let Some(command) = entry_name.strip_suffix(LEAF_MARKER_SUFFIX) {
            if command.is_empty() {
                tracing::warn!(entry = %location.display(), "skipping leaf directory without a command name");
                return Ok(None);
            }
            let handler = self.load_command_handler(command, &location).await?;
            return Ok(Some(LoadedEntry {
                command: command.to_string(),
                entry_name,
                node: CommandNode::Leaf(Arc::new(handler)),
            }));
        }

        let subtree = self.load_tree(location).await?;
        Ok(Some(LoadedEntry {
            command: entry_name.clone(),
            entry_name,
            node: CommandNode::Branch(subtree),
        }))
    }

    /// Builds the handler for one `*.cmd` directory.
    pub async fn load_command_handler(
        &self,
        command: &str,
        location: &Path,
    ) -> Result<CommandHandler, CommandError> {
        let config = load_handler_config(location).await;
        let entry_point_path = location.join(ENTRY_POINT_FILE);
        let sandbox = self.sandboxes.build(&entry_point_path, &config);
        let entry_point = read_entry_point(&entry_point_path).await?;
        let action = self.actions.resolve(entry_point.export.as_deref());
        tracing::debug!(
            command,
            export = entry_point.export.as_deref().unwrap_or("<none>"),
            modules = ?sandbox.api().names(),
            "loaded command handler"
        );
        Ok(CommandHandler::new(
            command,
            location,
            entry_point.export,
            config,
            sandbox,
            action,
        ))
    }

    async fn read_entry_names(&self, root: &Path) -> Result<Vec<String>, CommandError> {
        let read = list_entry_names(root);
        match self.options.read_timeout {
            Some(timeout) => tokio::time::timeout(timeout, read).await.map_err(|_| {
                CommandError::ReadTimeout {
                    path: root.to_path_buf(),
                    timeout_ms: timeout.as_millis(),
                }
            })?,
            None => read.await,
        }
    }
}

async fn list_entry_names(root: &Path) -> Result<Vec<String>, CommandError> {
    let mut entries = tokio::fs::read_dir(root)
        .await
        .map_err(|source| io_error(root, source))?;
    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|source| io_error(root, source))?
    {
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(raw) => tracing::warn!(entry = ?raw, "skipping non utf-8 command entry"),
        }
    }
    Ok(names)
}

async fn read_entry_point(path: &Path) -> Result<EntryPoint, CommandError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(source) if source.kind() == io::ErrorKind::NotFound => {
            return Err(CommandError::MissingEntryPoint {
                path: path.to_path_buf(),
            })
        }
        Err(source) => return Err(io_error(path, source)),
    };
    if raw.trim().is_empty() {
        return Ok(EntryPoint::default());
    }
    serde_json::from_str(&raw).map_err(|source| CommandError::InvalidEntryPoint {
        path: path.to_path_buf(),
        source,
    })
}

fn io_error(path: &Path, source: io::Error) -> CommandError {
    CommandError::Io {
        path: path.to_path_buf(),
        source,
    }
}
