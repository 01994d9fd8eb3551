//! Static schema table, validated once at startup.

use std::collections::HashMap;

use siphon_types::{Schema, SchemaError};

const BUILTIN_SCHEMAS: &str = include_str!("../schemas/builtin.yaml");

/// Source field and label of the key-only fallback schema.
pub const FALLBACK_KEY_SOURCE: &str = "phone";
pub const FALLBACK_KEY_LABEL: &str = "号码";

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("failed to parse schema table: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Task type to output schema lookup. Read-only once built.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: Vec<Schema>,
    by_task: HashMap<String, usize>,
    fallback: Schema,
}

impl SchemaRegistry {
    /// Registry over the bundled schema table.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundled table fails to parse or validate.
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::with_overrides(Vec::new())
    }

    /// Bundled table plus `extra` schemas. An extra schema whose name
    /// matches a bundled one replaces it.
    ///
    /// # Errors
    ///
    /// Returns an error if any schema is invalid or two schemas claim the
    /// same task type.
    pub fn with_overrides(extra: Vec<Schema>) -> Result<Self, RegistryError> {
        let mut schemas: Vec<Schema> = serde_yaml::from_str(BUILTIN_SCHEMAS)?;
        for schema in extra {
            match schemas.iter_mut().find(|s| s.name == schema.name) {
                Some(existing) => *existing = schema,
                None => schemas.push(schema),
            }
        }
        Ok(Self::from_schemas(schemas)?)
    }

    /// Registry over exactly `schemas`.
    ///
    /// # Errors
    ///
    /// Returns an error if any schema is invalid or two schemas claim the
    /// same task type.
    pub fn from_schemas(schemas: Vec<Schema>) -> Result<Self, SchemaError> {
        let mut by_task = HashMap::new();
        for (i, schema) in schemas.iter().enumerate() {
            schema.validate()?;
            for task_type in schema.task_types() {
                if by_task.insert(task_type.to_string(), i).is_some() {
                    return Err(SchemaError::DuplicateName(task_type.to_string()));
                }
            }
        }
        Ok(Self {
            schemas,
            by_task,
            fallback: Schema::key_only("fallback", FALLBACK_KEY_SOURCE, FALLBACK_KEY_LABEL),
        })
    }

    /// Schema for `task_type`, or the key-only fallback.
    #[must_use]
    pub fn lookup(&self, task_type: &str) -> &Schema {
        self.get(task_type).unwrap_or(&self.fallback)
    }

    /// Schema for `task_type` if one is registered.
    #[must_use]
    pub fn get(&self, task_type: &str) -> Option<&Schema> {
        self.by_task.get(task_type).map(|&i| &self.schemas[i])
    }

    pub fn schemas(&self) -> impl Iterator<Item = &Schema> {
        self.schemas.iter()
    }

    #[must_use]
    pub fn fallback(&self) -> &Schema {
        &self.fallback
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
