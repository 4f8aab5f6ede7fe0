use std::{
    any::Any,
    collections::BTreeMap,
    fmt,
    future::Future,
    io,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError, RwLock,
    },
    time::Duration,
};

use cmdhost_args::ParsedArguments;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::{CommandError, HandlerConfig, InjectionTable, Module};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}

/// Timer primitives backed by the tokio clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timers;

impl Timers {
    pub async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    pub fn interval(&self, period: Duration) -> tokio::time::Interval {
        tokio::time::interval(period)
    }

    pub async fn timeout<F>(
        &self,
        duration: Duration,
        future: F,
    ) -> Result<F::Output, tokio::time::error::Elapsed>
    where
        F: Future,
    {
        tokio::time::timeout(duration, future).await
    }
}

#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pid: u32,
    argv: Arc<[String]>,
}

impl ProcessHandle {
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            pid: std::process::id(),
            argv: argv.into(),
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Raw tokens without the program name.
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn env_var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    pub fn current_dir(&self) -> io::Result<PathBuf> {
        std::env::current_dir()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Console;

impl Console {
    pub fn log(&self, message: impl fmt::Display) {
        println!("{message}");
    }

    pub fn warn(&self, message: impl fmt::Display) {
        eprintln!("warning: {message}");
    }

    pub fn error(&self, message: impl fmt::Display) {
        eprintln!("{message}");
    }
}

/// Capabilities every sandbox receives regardless of its declaration.
#[derive(Debug, Clone)]
pub struct BaseCapabilities {
    pub timers: Timers,
    pub process: ProcessHandle,
    pub console: Console,
}

impl BaseCapabilities {
    pub fn new(process: ProcessHandle) -> Self {
        Self {
            timers: Timers,
            process,
            console: Console,
        }
    }
}

type PromptInput = Box<dyn AsyncBufRead + Send + Unpin>;
type PromptOutput = Box<dyn AsyncWrite + Send + Unpin>;

struct PromptStreams {
    input: PromptInput,
    output: PromptOutput,
}

impl PromptStreams {
    fn stdio() -> Self {
        Self {
            input: Box::new(BufReader::new(tokio::io::stdin())),
            output: Box::new(tokio::io::stdout()),
        }
    }
}

/// Prompts and reads answers one line at a time. Shared by all commands.
///
/// [`LineReader::new`] attaches to stdin and stdout on the first question.
pub struct LineReader {
    closed: AtomicBool,
    streams: tokio::sync::Mutex<Option<PromptStreams>>,
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LineReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineReader")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl LineReader {
    pub fn new() -> Self {
        Self {
            closed: AtomicBool::new(false),
            streams: tokio::sync::Mutex::new(None),
        }
    }

    pub fn from_streams<R, W>(input: R, output: W) -> Self
    where
        R: AsyncBufRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            closed: AtomicBool::new(false),
            streams: tokio::sync::Mutex::new(Some(PromptStreams {
                input: Box::new(input),
                output: Box::new(output),
            })),
        }
    }

    /// Returns `None` once the reader is closed or its input is exhausted.
    pub async fn question(&self, prompt: &str) -> io::Result<Option<String>> {
        if self.is_closed() {
            return Ok(None);
        }
        let mut streams = self.streams.lock().await;
        let streams = streams.get_or_insert_with(PromptStreams::stdio);
        streams.output.write_all(prompt.as_bytes()).await?;
        streams.output.flush().await?;

        let mut line = String::new();
        if streams.input.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Ok(mut streams) = self.streams.try_lock() {
            streams.take();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Lets a command request the process exit status; the runtime applies it
/// after cleanup.
#[derive(Debug, Clone, Default)]
pub struct ExitHandle {
    requested: Arc<Mutex<Option<i32>>>,
}

impl ExitHandle {
    pub fn request(&self, code: i32) {
        *self
            .requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(code);
    }

    pub fn requested(&self) -> Option<i32> {
        *self
            .requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Read-only view of CLI state shared by every sandbox.
#[derive(Debug)]
pub struct Facade {
    package: PackageInfo,
    is_windows: bool,
    working_dir: PathBuf,
    line_reader: Arc<LineReader>,
    args: RwLock<ParsedArguments>,
    exit: ExitHandle,
}

impl Facade {
    pub fn new(
        package: PackageInfo,
        working_dir: PathBuf,
        line_reader: Arc<LineReader>,
        args: ParsedArguments,
        exit: ExitHandle,
    ) -> Self {
        Self {
            package,
            is_windows: cfg!(windows),
            working_dir,
            line_reader,
            args: RwLock::new(args),
            exit,
        }
    }

    pub fn package(&self) -> &PackageInfo {
        &self.package
    }

    pub fn is_windows(&self) -> bool {
        self.is_windows
    }

    /// Directory the CLI was started from.
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn line_reader(&self) -> &Arc<LineReader> {
        &self.line_reader
    }

    /// Snapshot of the most recent parse.
    pub fn args(&self) -> ParsedArguments {
        self.args
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn exit(&self) -> &ExitHandle {
        &self.exit
    }

    pub(crate) fn publish_arguments(&self, parsed: ParsedArguments) {
        *self.args.write().unwrap_or_else(PoisonError::into_inner) = parsed;
    }
}

/// Modules injected into one sandbox.
#[derive(Clone, Default)]
pub struct Api {
    modules: BTreeMap<String, Module>,
}

impl fmt::Debug for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Api").field("modules", &self.names()).finish()
    }
}

impl Api {
    pub fn get<T: Any>(&self, name: &str) -> Option<&T> {
        self.modules.get(name)?.as_ref().downcast_ref::<T>()
    }

    /// Like [`Api::get`] but reports a missing injection as an error.
    pub fn require<T: Any>(&self, name: &str) -> Result<&T, CommandError> {
        self.get(name)
            .ok_or_else(|| CommandError::ModuleNotInjected(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.modules.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// Execution context owned by a single command handler.
#[derive(Debug, Clone)]
pub struct Sandbox {
    base: BaseCapabilities,
    facade: Arc<Facade>,
    api: Api,
    dirname: PathBuf,
    filename: String,
    config: HandlerConfig,
}

impl Sandbox {
    pub fn timers(&self) -> &Timers {
        &self.base.timers
    }

    pub fn process(&self) -> &ProcessHandle {
        &self.base.process
    }

    pub fn console(&self) -> &Console {
        &self.base.console
    }

    pub fn facade(&self) -> &Facade {
        &self.facade
    }

    pub fn api(&self) -> &Api {
        &self.api
    }

    /// Directory containing the command's entry point.
    pub fn dirname(&self) -> &Path {
        &self.dirname
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }
}

#[derive(Debug, Clone)]
pub struct SandboxBuilder {
    base: BaseCapabilities,
    facade: Arc<Facade>,
    modules: Arc<InjectionTable>,
}

impl SandboxBuilder {
    pub fn new(base: BaseCapabilities, facade: Arc<Facade>, modules: InjectionTable) -> Self {
        Self {
            base,
            facade,
            modules: Arc::new(modules),
        }
    }

    pub fn facade(&self) -> &Arc<Facade> {
        &self.facade
    }

    pub fn modules(&self) -> &InjectionTable {
        &self.modules
    }

    /// Only modules listed in `config.inject_modules` become visible.
    pub fn build(&self, entry_point: &Path, config: &HandlerConfig) -> Sandbox {
        let mut modules = BTreeMap::new();
        for name in &config.inject_modules {
            match self.modules.get(name) {
                Some(module) => {
                    modules.insert(name.clone(), Arc::clone(module));
                }
                None => tracing::warn!(
                    module = name.as_str(),
                    entry_point = %entry_point.display(),
                    "requested module is not available for injection"
                ),
            }
        }

        Sandbox {
            base: self.base.clone(),
            facade: Arc::clone(&self.facade),
            api: Api { modules },
            dirname: entry_point
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
            filename: entry_point
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            config: config.clone(),
        }
    }
}
