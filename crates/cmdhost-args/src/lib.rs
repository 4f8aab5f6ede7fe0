//! Typed command-line argument primitives for cmdhost.
//!
//! Provides the type coercion registry, the incremental argument schema
//! store, and the schema-driven token parser used by command dispatch.

use std::{io, path::PathBuf};

use thiserror::Error;

pub mod parser;
pub mod schema;
pub mod type_registry;

pub use parser::{env_tokens, lossy_tokens, ArgumentParser, ParsedArguments};
pub use schema::{ArgumentSchemaEntry, SchemaKey, SchemaStore};
pub use type_registry::{
    ArgValue, Coercer, FileStream, TypeRegistry, TYPE_BOOLEAN, TYPE_FILE_DATA, TYPE_FILE_STREAM,
    TYPE_NUMBER, TYPE_STRING,
};

/// Errors raised while registering schema entries or coercing raw tokens.
#[derive(Debug, Error)]
pub enum ArgsError {
    #[error("unknown argument type '{0}'")]
    UnknownType(String),
    #[error("argument '{name}' of type '{value_type}' requires a value")]
    MissingValue { name: String, value_type: String },
    #[error("argument schema entry must declare a full name or a short name")]
    UnnamedEntry,
    #[error("failed to open file stream '{}'", path.display())]
    FileOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read file data '{}'", path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot coerce '{raw}' to '{value_type}': {reason}")]
    Coercion {
        value_type: String,
        raw: String,
        reason: String,
    },
}
