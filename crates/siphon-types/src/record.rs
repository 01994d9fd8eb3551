//! Records read from the store.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// One entity occurrence as read from the store.
///
/// `key` is the dedup/join key (e.g. a phone number). Storage does not
/// guarantee it is unique. Records are immutable once built: the builder
/// methods consume `self`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inserted_at: Option<NaiveDateTime>,
    #[serde(default)]
    fields: BTreeMap<String, Value>,
}

impl Record {
    #[must_use]
    pub fn new(key: impl Into<String>, inserted_at: Option<NaiveDateTime>) -> Self {
        Self {
            key: key.into(),
            inserted_at,
            fields: BTreeMap::new(),
        }
    }

    /// Attach a named field value.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether the key can address the record. Blank keys cannot be
    /// deduplicated or joined.
    #[must_use]
    pub fn has_key(&self) -> bool {
        !self.key.trim().is_empty()
    }

    #[must_use]
    pub fn inserted_at(&self) -> Option<NaiveDateTime> {
        self.inserted_at
    }

    /// Look up a field by its source name. `Null` values are returned as-is.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// A primary record paired with the secondary record sharing its key.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRecord {
    primary: Record,
    secondary: Record,
}

impl JoinedRecord {
    /// Pair two records. Returns `None` when their keys differ.
    #[must_use]
    pub fn pair(primary: Record, secondary: Record) -> Option<Self> {
        (primary.key == secondary.key).then_some(Self { primary, secondary })
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.primary.key
    }

    #[must_use]
    pub fn primary(&self) -> &Record {
        &self.primary
    }

    #[must_use]
    pub fn secondary(&self) -> &Record {
        &self.secondary
    }
}
