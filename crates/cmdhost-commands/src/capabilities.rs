use std::{
    any::Any,
    collections::BTreeMap,
    fmt, io,
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
};

use serde::Serialize;

pub const MODULE_FS: &str = "fs";
pub const MODULE_PATH: &str = "path";
pub const MODULE_OS: &str = "os";
pub const MODULE_CHILD_PROCESS: &str = "child_process";

/// Type-erased injectable module.
pub type Module = Arc<dyn Any + Send + Sync>;

/// Load-time table of modules a command may request by name.
#[derive(Clone, Default)]
pub struct InjectionTable {
    modules: BTreeMap<String, Module>,
}

impl fmt::Debug for InjectionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectionTable")
            .field("modules", &self.names())
            .finish()
    }
}

impl InjectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin_modules() -> Self {
        let mut table = Self::new();
        table.register(MODULE_FS, FsModule);
        table.register(MODULE_PATH, PathModule);
        table.register(MODULE_OS, OsModule);
        table.register(MODULE_CHILD_PROCESS, ChildProcessModule);
        table
    }

    pub fn register<T>(&mut self, name: impl Into<String>, module: T)
    where
        T: Any + Send + Sync,
    {
        self.register_shared(name, Arc::new(module));
    }

    pub fn register_shared(&mut self, name: impl Into<String>, module: Module) {
        self.modules.insert(name.into(), module);
    }

    pub fn get(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.modules.keys().map(String::as_str).collect()
    }
}

/// Asynchronous filesystem access.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsModule;

impl FsModule {
    pub async fn read_to_string(&self, path: &Path) -> io::Result<String> {
        tokio::fs::read_to_string(path).await
    }

    pub async fn write(&self, path: &Path, contents: impl AsRef<[u8]>) -> io::Result<()> {
        tokio::fs::write(path, contents).await
    }

    pub async fn exists(&self, path: &Path) -> io::Result<bool> {
        tokio::fs::try_exists(path).await
    }

    pub async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    pub async fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        tokio::fs::canonicalize(path).await
    }

    /// Names of the directories directly under `path`, sorted.
    pub async fn list_directories(&self, path: &Path) -> io::Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(path).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PathModule;

impl PathModule {
    pub fn join(&self, base: &Path, segment: impl AsRef<Path>) -> PathBuf {
        base.join(segment)
    }

    pub fn basename(&self, path: &Path) -> Option<String> {
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }

    pub fn dirname(&self, path: &Path) -> Option<PathBuf> {
        path.parent().map(Path::to_path_buf)
    }

    pub fn extension(&self, path: &Path) -> Option<String> {
        path.extension()
            .map(|extension| extension.to_string_lossy().into_owned())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OsModule;

impl OsModule {
    pub fn platform(&self) -> &'static str {
        std::env::consts::OS
    }

    pub fn arch(&self) -> &'static str {
        std::env::consts::ARCH
    }

    pub fn home_dir(&self) -> Option<PathBuf> {
        home_dir()
    }

    pub fn temp_dir(&self) -> PathBuf {
        std::env::temp_dir()
    }

    /// `HOSTNAME` / `COMPUTERNAME`, falling back to `/etc/hostname`.
    pub async fn hostname(&self) -> Option<String> {
        let from_env = std::env::var("HOSTNAME")
            .or_else(|_| std::env::var("COMPUTERNAME"))
            .ok()
            .filter(|name| !name.trim().is_empty());
        if from_env.is_some() {
            return from_env;
        }
        tokio::fs::read_to_string("/etc/hostname")
            .await
            .ok()
            .map(|raw| raw.trim().to_string())
            .filter(|name| !name.is_empty())
    }
}

/// `HOME`, falling back to `USERPROFILE`.
pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessOutput {
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Subprocess execution with captured output.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChildProcessModule;

impl ChildProcessModule {
    pub async fn exec(
        &self,
        program: &str,
        args: &[&str],
        cwd: Option<&Path>,
    ) -> io::Result<ProcessOutput> {
        let mut command = tokio::process::Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }
        tracing::debug!(program, ?args, "spawning child process");
        let output = command.output().await?;
        Ok(ProcessOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
