use std::{
    collections::{BTreeMap, HashMap, HashSet},
    ffi::OsString,
};

use serde_json::{Map, Value};

use crate::{
    ArgValue, ArgsError, ArgumentSchemaEntry, SchemaKey, SchemaStore, TypeRegistry, TYPE_BOOLEAN,
};

/// Result of one scan of the raw token vector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedArguments {
    pub positional: Vec<String>,
    pub named: BTreeMap<String, ArgValue>,
    positional_origins: Vec<usize>,
}

impl ParsedArguments {
    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.named.get(name)
    }

    /// True only for a resolved `Boolean(true)`.
    pub fn flag(&self, name: &str) -> bool {
        matches!(self.named.get(name), Some(ArgValue::Boolean(true)))
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        self.named.get(name).and_then(ArgValue::as_str)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.named.get(name).and_then(ArgValue::as_f64)
    }

    /// Raw-vector index of the positional entry at `position`.
    pub fn positional_origin(&self, position: usize) -> Option<usize> {
        self.positional_origins.get(position).copied()
    }

    /// Drops positional entries that originate from the given raw indices.
    pub fn strip_consumed(&mut self, consumed: &[usize]) {
        let consumed = consumed.iter().copied().collect::<HashSet<_>>();
        let mut positional = Vec::with_capacity(self.positional.len());
        let mut origins = Vec::with_capacity(self.positional_origins.len());
        for (token, origin) in self.positional.drain(..).zip(self.positional_origins.drain(..)) {
            if !consumed.contains(&origin) {
                positional.push(token);
                origins.push(origin);
            }
        }
        self.positional = positional;
        self.positional_origins = origins;
    }

    pub fn to_json(&self) -> Value {
        let named = self
            .named
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect::<Map<_, _>>();
        serde_json::json!({
            "positional": self.positional,
            "named": named,
        })
    }

    fn push_positional(&mut self, token: &str, origin: usize) {
        self.positional.push(token.to_string());
        self.positional_origins.push(origin);
    }
}

/// Process arguments without the program token.
///
/// Tokens that are not valid UTF-8 are converted lossily instead of
/// aborting the process.
pub fn env_tokens() -> Vec<String> {
    lossy_tokens(std::env::args_os().skip(1))
}

pub fn lossy_tokens(raw: impl IntoIterator<Item = OsString>) -> Vec<String> {
    raw.into_iter()
        .map(|token| match token.into_string() {
            Ok(token) => token,
            Err(raw) => {
                tracing::debug!(token = ?raw, "argument is not valid utf-8, converting lossily");
                raw.to_string_lossy().into_owned()
            }
        })
        .collect()
}

/// Schema-driven parser over a stored raw token vector.
#[derive(Debug, Clone)]
pub struct ArgumentParser {
    raw: Vec<String>,
    schema: SchemaStore,
    types: TypeRegistry,
}

impl ArgumentParser {
    /// `raw` excludes the program token.
    pub fn new(raw: Vec<String>) -> Self {
        Self::with_types(raw, TypeRegistry::default())
    }

    pub fn with_types(raw: Vec<String>, types: TypeRegistry) -> Self {
        Self {
            raw,
            schema: SchemaStore::new(),
            types,
        }
    }

    pub fn raw_tokens(&self) -> &[String] {
        &self.raw
    }

    pub fn schema(&self) -> &SchemaStore {
        &self.schema
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn types_mut(&mut self) -> &mut TypeRegistry {
        &mut self.types
    }

    pub fn add_schema(
        &mut self,
        entries: impl IntoIterator<Item = ArgumentSchemaEntry>,
    ) -> Result<(), ArgsError> {
        self.schema.add_schema(entries)
    }

    /// Full scan of the raw vector against the current schema.
    ///
    /// Every call starts from empty state, so re-parsing after more schema
    /// has been registered never duplicates positional entries.
    pub fn parse(&self) -> Result<ParsedArguments, ArgsError> {
        let full_index = self.schema.build_index(SchemaKey::FullName);
        let short_index = self.schema.build_index(SchemaKey::ShortName);
        let mut parsed = ParsedArguments::default();
        let mut options_ended = false;
        let mut position = 0;

        while position < self.raw.len() {
            let token = self.raw[position].as_str();
            if options_ended || token == "-" || !token.starts_with('-') {
                parsed.push_positional(token, position);
                position += 1;
                continue;
            }
            if token == "--" {
                options_ended = true;
                position += 1;
                continue;
            }
            let (reference, index) = match token.strip_prefix("--") {
                Some(reference) => (reference, &full_index),
                None => (&token[1..], &short_index),
            };
            let next = self.raw.get(position + 1).map(String::as_str);
            position += self.process_named(reference, next, index, &mut parsed)?;
        }

        self.apply_defaults(&mut parsed)?;
        Ok(parsed)
    }

    /// Returns how many tokens were consumed.
    fn process_named(
        &self,
        reference: &str,
        next: Option<&str>,
        index: &HashMap<&str, &ArgumentSchemaEntry>,
        parsed: &mut ParsedArguments,
    ) -> Result<usize, ArgsError> {
        let (name, inline) = match reference.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (reference, None),
        };

        let Some(entry) = index.get(name) else {
            tracing::debug!(argument = name, "unknown named argument treated as flag");
            parsed.named.insert(name.to_string(), ArgValue::Boolean(true));
            return Ok(1);
        };
        let canonical = entry.canonical_name().unwrap_or(name).to_string();

        if entry.is_boolean() {
            let value = match inline {
                Some(raw) => self.types.coerce(TYPE_BOOLEAN, raw)?,
                None => ArgValue::Boolean(true),
            };
            parsed.named.insert(canonical, value);
            return Ok(1);
        }

        let (raw, consumed) = match (inline, next) {
            (Some(raw), _) => (raw, 1),
            (None, Some(raw)) => (raw, 2),
            (None, None) => {
                return Err(ArgsError::MissingValue {
                    name: canonical,
                    value_type: entry.value_type.clone(),
                })
            }
        };
        let value = self.types.coerce(&entry.value_type, raw)?;
        parsed.named.insert(canonical, value);
        Ok(consumed)
    }

    fn apply_defaults(&self, parsed: &mut ParsedArguments) -> Result<(), ArgsError> {
        let mut seen = HashSet::new();
        for entry in self.schema.entries() {
            let Some(name) = entry.canonical_name() else {
                continue;
            };
            if !seen.insert(name) || parsed.named.contains_key(name) {
                continue;
            }
            if let Some(value) = self.resolve_default(entry)? {
                parsed.named.insert(name.to_string(), value);
            }
        }
        Ok(())
    }

    fn resolve_default(&self, entry: &ArgumentSchemaEntry) -> Result<Option<ArgValue>, ArgsError> {
        let value = match &entry.default {
            None | Some(Value::Null) => {
                return Ok(entry.is_boolean().then_some(ArgValue::Boolean(false)))
            }
            Some(Value::String(raw)) => self.types.coerce(&entry.value_type, raw)?,
            Some(Value::Bool(value)) => ArgValue::Boolean(*value),
            Some(Value::Number(number)) => ArgValue::Number(number.as_f64().unwrap_or(f64::NAN)),
            Some(other) => ArgValue::Json(other.clone()),
        };
        Ok(Some(value))
    }
}
