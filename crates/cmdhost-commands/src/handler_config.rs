use std::{
    collections::HashSet,
    io,
    path::{Path, PathBuf},
};

use cmdhost_args::ArgumentSchemaEntry;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub const HANDLER_DECLARATION_FILE: &str = "command.json";

/// Per-leaf declaration: injected modules and extra argument schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerConfig {
    #[serde(default)]
    pub inject_modules: Vec<String>,
    #[serde(default)]
    pub arguments: Vec<ArgumentSchemaEntry>,
}

/// Declaration problems. Logged and replaced by defaults, never returned
/// from the loader.
#[derive(Debug, Error)]
pub enum DeclarationError {
    #[error("failed to read declaration '{}'", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse declaration '{}'", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("declaration '{}' is not a JSON object", path.display())]
    NotAnObject { path: PathBuf },
}

/// Reads `command.json` in `location`, falling back to defaults when it is
/// absent or malformed.
pub async fn load_handler_config(location: &Path) -> HandlerConfig {
    let path = location.join(HANDLER_DECLARATION_FILE);
    match read_handler_config(&path).await {
        Ok(config) => config,
        Err(DeclarationError::Read { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(location = %location.display(), "no handler declaration, using defaults");
            HandlerConfig::default()
        }
        Err(error) => {
            tracing::warn!(error = %error, "ignoring handler declaration, using defaults");
            HandlerConfig::default()
        }
    }
}

async fn read_handler_config(path: &Path) -> Result<HandlerConfig, DeclarationError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| DeclarationError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    parse_handler_config(&raw, path)
}

/// Parses declaration text key by key.
///
/// A key with the wrong shape falls back to its default without discarding
/// the other keys. Only text that is not a JSON object fails as a whole.
pub fn parse_handler_config(raw: &str, path: &Path) -> Result<HandlerConfig, DeclarationError> {
    let value = serde_json::from_str::<Value>(raw).map_err(|source| DeclarationError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    let Value::Object(mut fields) = value else {
        return Err(DeclarationError::NotAnObject {
            path: path.to_path_buf(),
        });
    };
    let config = HandlerConfig {
        inject_modules: take_field(&mut fields, "injectModules", path),
        arguments: take_arguments(&mut fields, path),
    };
    Ok(normalize_handler_config(config, path))
}

fn take_field<T>(fields: &mut Map<String, Value>, key: &str, path: &Path) -> T
where
    T: Default + serde::de::DeserializeOwned,
{
    match fields.remove(key) {
        None | Some(Value::Null) => T::default(),
        Some(value) => serde_json::from_value(value).unwrap_or_else(|error| {
            tracing::warn!(
                declaration = %path.display(),
                key,
                error = %error,
                "ignoring malformed declaration field"
            );
            T::default()
        }),
    }
}

fn take_arguments(fields: &mut Map<String, Value>, path: &Path) -> Vec<ArgumentSchemaEntry> {
    let entries: Vec<Value> = take_field(fields, "arguments", path);
    entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value(entry) {
            Ok(entry) => Some(entry),
            Err(error) => {
                tracing::warn!(
                    declaration = %path.display(),
                    error = %error,
                    "dropping malformed argument entry"
                );
                None
            }
        })
        .collect()
}

fn normalize_handler_config(mut config: HandlerConfig, path: &Path) -> HandlerConfig {
    let mut seen = HashSet::new();
    config
        .inject_modules
        .retain(|name| !name.trim().is_empty() && seen.insert(name.clone()));
    config.arguments.retain(|entry| {
        if entry.is_named() {
            return true;
        }
        tracing::warn!(
            declaration = %path.display(),
            "dropping argument entry without fullName or shortName"
        );
        false
    });
    config
}
