use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ArgsError, TYPE_BOOLEAN, TYPE_STRING};

fn default_value_type() -> String {
    TYPE_STRING.to_string()
}

/// One named-argument declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArgumentSchemaEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
    #[serde(rename = "type", default = "default_value_type")]
    pub value_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ArgumentSchemaEntry {
    pub fn new(value_type: impl Into<String>) -> Self {
        Self {
            full_name: None,
            short_name: None,
            value_type: value_type.into(),
            default: None,
        }
    }

    pub fn boolean() -> Self {
        Self::new(TYPE_BOOLEAN)
    }

    pub fn full(mut self, name: impl Into<String>) -> Self {
        self.full_name = Some(name.into());
        self
    }

    pub fn short(mut self, name: impl Into<String>) -> Self {
        self.short_name = Some(name.into());
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Full name if declared, else short name.
    pub fn canonical_name(&self) -> Option<&str> {
        non_empty(self.full_name.as_deref()).or_else(|| non_empty(self.short_name.as_deref()))
    }

    pub fn name_for(&self, key: SchemaKey) -> Option<&str> {
        match key {
            SchemaKey::FullName => non_empty(self.full_name.as_deref()),
            SchemaKey::ShortName => non_empty(self.short_name.as_deref()),
        }
    }

    pub fn is_named(&self) -> bool {
        self.canonical_name().is_some()
    }

    pub fn is_boolean(&self) -> bool {
        self.value_type == TYPE_BOOLEAN
    }
}

fn non_empty(name: Option<&str>) -> Option<&str> {
    name.filter(|value| !value.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKey {
    FullName,
    ShortName,
}

/// Ordered, append-only list of argument declarations.
#[derive(Debug, Clone, Default)]
pub struct SchemaStore {
    entries: Vec<ArgumentSchemaEntry>,
}

impl SchemaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `entries`. Nothing is appended if any entry is unnamed.
    pub fn add_schema(
        &mut self,
        entries: impl IntoIterator<Item = ArgumentSchemaEntry>,
    ) -> Result<(), ArgsError> {
        let entries = entries.into_iter().collect::<Vec<_>>();
        if entries.iter().any(|entry| !entry.is_named()) {
            return Err(ArgsError::UnnamedEntry);
        }
        self.entries.extend(entries);
        Ok(())
    }

    pub fn entries(&self) -> &[ArgumentSchemaEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lookup by full or short name; earlier registrations win.
    pub fn build_index(&self, key: SchemaKey) -> HashMap<&str, &ArgumentSchemaEntry> {
        let mut index = HashMap::new();
        for entry in &self.entries {
            if let Some(name) = entry.name_for(key) {
                index.entry(name).or_insert(entry);
            }
        }
        index
    }
}
