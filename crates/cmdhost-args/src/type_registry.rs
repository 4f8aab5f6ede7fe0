use std::{
    collections::HashMap,
    fmt,
    fs::File,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde_json::Value;

use crate::ArgsError;

pub const TYPE_STRING: &str = "string";
pub const TYPE_NUMBER: &str = "number";
pub const TYPE_BOOLEAN: &str = "boolean";
pub const TYPE_FILE_STREAM: &str = "fileStream";
pub const TYPE_FILE_DATA: &str = "fileData";

/// Pure conversion from a raw token into a typed value.
pub type Coercer = Arc<dyn Fn(&str) -> Result<ArgValue, ArgsError> + Send + Sync>;

/// Readable handle opened by the `fileStream` coercer.
#[derive(Debug, Clone)]
pub struct FileStream {
    path: PathBuf,
    file: Arc<File>,
}

impl FileStream {
    pub fn open(path: &Path) -> Result<Self, ArgsError> {
        let file = File::open(path).map_err(|source| ArgsError::FileOpen {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Arc::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Shared handle; `&File` implements `Read`.
    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn try_clone_file(&self) -> std::io::Result<File> {
        self.file.try_clone()
    }
}

/// Typed value produced by coercion or by a declared default.
#[derive(Debug, Clone)]
pub enum ArgValue {
    String(String),
    Number(f64),
    Boolean(bool),
    FileStream(FileStream),
    FileData(Vec<u8>),
    Json(Value),
}

impl PartialEq for ArgValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::String(left), Self::String(right)) => left == right,
            (Self::Number(left), Self::Number(right)) => left == right,
            (Self::Boolean(left), Self::Boolean(right)) => left == right,
            (Self::FileStream(left), Self::FileStream(right)) => left.path == right.path,
            (Self::FileData(left), Self::FileData(right)) => left == right,
            (Self::Json(left), Self::Json(right)) => left == right,
            _ => false,
        }
    }
}

impl ArgValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::FileData(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_file_stream(&self) -> Option<&FileStream> {
        match self {
            Self::FileStream(stream) => Some(stream),
            _ => None,
        }
    }

    /// JSON rendering used for diagnostics and handler snapshots.
    pub fn to_json(&self) -> Value {
        match self {
            Self::String(value) => Value::String(value.clone()),
            Self::Number(value) => serde_json::Number::from_f64(*value)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Boolean(value) => Value::Bool(*value),
            Self::FileStream(stream) => Value::String(stream.path.display().to_string()),
            Self::FileData(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
            Self::Json(value) => value.clone(),
        }
    }
}

/// Maps type tags to coercion functions.
#[derive(Clone)]
pub struct TypeRegistry {
    coercers: HashMap<String, Coercer>,
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("tags", &self.tags())
            .finish()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::with_builtin_types()
    }
}

impl TypeRegistry {
    pub fn empty() -> Self {
        Self {
            coercers: HashMap::new(),
        }
    }

    pub fn with_builtin_types() -> Self {
        let mut registry = Self::empty();
        registry.register(TYPE_STRING, |raw| Ok(ArgValue::String(raw.to_string())));
        registry.register(TYPE_NUMBER, |raw| Ok(ArgValue::Number(parse_number(raw))));
        registry.register(TYPE_BOOLEAN, |raw| Ok(ArgValue::Boolean(parse_boolean(raw))));
        registry.register(TYPE_FILE_STREAM, |raw| {
            FileStream::open(Path::new(raw)).map(ArgValue::FileStream)
        });
        // Blocking read; only used while arguments are parsed at startup.
        registry.register(TYPE_FILE_DATA, |raw| {
            std::fs::read(raw)
                .map(ArgValue::FileData)
                .map_err(|source| ArgsError::FileRead {
                    path: PathBuf::from(raw),
                    source,
                })
        });
        registry
    }

    /// Binds `tag` to `coercer`, replacing any previous binding.
    pub fn register<F>(&mut self, tag: impl Into<String>, coercer: F)
    where
        F: Fn(&str) -> Result<ArgValue, ArgsError> + Send + Sync + 'static,
    {
        self.coercers.insert(tag.into(), Arc::new(coercer));
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.coercers.contains_key(tag)
    }

    pub fn tags(&self) -> Vec<&str> {
        let mut tags = self.coercers.keys().map(String::as_str).collect::<Vec<_>>();
        tags.sort_unstable();
        tags
    }

    pub fn coerce(&self, tag: &str, raw: &str) -> Result<ArgValue, ArgsError> {
        let coercer = self
            .coercers
            .get(tag)
            .ok_or_else(|| ArgsError::UnknownType(tag.to_string()))?;
        coercer(raw)
    }
}

/// Numeric conversion without validation: unparsable input becomes NaN.
fn parse_number(raw: &str) -> f64 {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

fn parse_boolean(raw: &str) -> bool {
    if raw.eq_ignore_ascii_case("true") {
        true
    } else if raw.eq_ignore_ascii_case("false") {
        false
    } else {
        !raw.is_empty()
    }
}
