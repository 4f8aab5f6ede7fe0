//! Command discovery, namespace, sandboxing, and routing for cmdhost.
//!
//! Walks command directories into a write-once command tree, binds each leaf
//! to a statically registered action inside a least-privilege sandbox, and
//! resolves parsed positional input to a single handler.

use std::{io, path::PathBuf};

use cmdhost_args::ArgsError;
use thiserror::Error;

pub mod capabilities;
pub mod command_action;
pub mod command_handler;
pub mod command_loader;
pub mod command_router;
pub mod command_tree;
pub mod handler_config;
pub mod sandbox;

pub use capabilities::*;
pub use command_action::*;
pub use command_handler::CommandHandler;
pub use command_loader::{CommandLoader, LoaderOptions, LEAF_MARKER_SUFFIX};
pub use command_router::{route_command, ResolvedCommand};
pub use command_tree::{CommandNode, CommandTree, NodeKind};
pub use handler_config::{
    load_handler_config, parse_handler_config, DeclarationError, HandlerConfig,
};
pub use sandbox::*;

/// Errors raised while loading, routing, or preparing commands.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("cannot mount a {incoming} at '{path}': a {existing} is already mounted there")]
    StructuralConflict {
        path: String,
        existing: NodeKind,
        incoming: NodeKind,
    },
    #[error("command entry point '{}' not found", path.display())]
    MissingEntryPoint { path: PathBuf },
    #[error("command entry point '{}' is invalid", path.display())]
    InvalidEntryPoint {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to read '{}'", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("reading '{}' exceeded {timeout_ms}ms", path.display())]
    ReadTimeout { path: PathBuf, timeout_ms: u128 },
    #[error("command load task failed")]
    LoadTask(#[from] tokio::task::JoinError),
    #[error("{}", command_router::not_found_message(.command.as_deref(), .suggestion.as_deref()))]
    CommandNotFound {
        command: Option<String>,
        suggestion: Option<String>,
    },
    #[error("module '{0}' is not injected into this command")]
    ModuleNotInjected(String),
    #[error(transparent)]
    Arguments(#[from] ArgsError),
}
