//! Filters pushed down to the store.
//!
//! A [`Filter`] is a conjunction of [`Predicate`]s plus a required
//! [`Discriminator`]. The export pipeline never evaluates filters itself;
//! [`Filter::matches`] exists for sources that hold rows in memory.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::record::Record;

/// Required partition selector: which task's rows, in which country.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Discriminator {
    pub task_type: String,
    pub country_code: String,
}

impl Discriminator {
    /// Build a discriminator. The country code is normalized to upper case.
    #[must_use]
    pub fn new(task_type: impl Into<String>, country_code: impl AsRef<str>) -> Self {
        Self {
            task_type: task_type.into(),
            country_code: country_code.as_ref().trim().to_uppercase(),
        }
    }
}

impl fmt::Display for Discriminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.task_type, self.country_code)
    }
}

/// One pushed-down condition on a named field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    /// Inclusive numeric range; either bound may be absent.
    Range {
        field: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<i64>,
    },
    /// Field value is one of the listed values.
    OneOf { field: String, values: Vec<String> },
    /// Field value is none of the listed values. NULL never matches.
    NoneOf { field: String, values: Vec<String> },
    /// `empty: true` keeps rows whose field is NULL or the empty string;
    /// `empty: false` keeps the rest.
    Empty { field: String, empty: bool },
}

impl Predicate {
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::Range { field, .. }
            | Self::OneOf { field, .. }
            | Self::NoneOf { field, .. }
            | Self::Empty { field, .. } => field,
        }
    }

    /// Evaluate against an in-memory record with SQL comparison semantics.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        let value = record.field(self.field()).filter(|v| !v.is_null());
        match self {
            Self::Range { min, max, .. } => match value.and_then(|v| v.as_i64()) {
                Some(n) => min.map_or(true, |m| n >= m) && max.map_or(true, |m| n <= m),
                None => false,
            },
            Self::OneOf { values, .. } => value
                .and_then(|v| v.render())
                .is_some_and(|text| values.iter().any(|candidate| *candidate == text)),
            Self::NoneOf { values, .. } => value
                .and_then(|v| v.render())
                .is_some_and(|text| values.iter().all(|candidate| *candidate != text)),
            Self::Empty { empty, .. } => {
                let is_empty = value
                    .and_then(|v| v.render())
                    .map_or(true, |text| text.is_empty());
                is_empty == *empty
            }
        }
    }
}

/// Conjunction of predicates scoped to one discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub discriminator: Discriminator,
    #[serde(default)]
    pub predicates: Vec<Predicate>,
}

impl Filter {
    #[must_use]
    pub fn new(discriminator: Discriminator) -> Self {
        Self {
            discriminator,
            predicates: Vec::new(),
        }
    }

    /// Add a predicate to the conjunction.
    #[must_use]
    pub fn with(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    #[must_use]
    pub fn task_type(&self) -> &str {
        &self.discriminator.task_type
    }

    #[must_use]
    pub fn country_code(&self) -> &str {
        &self.discriminator.country_code
    }

    /// Whether every predicate holds for `record`.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        self.predicates.iter().all(|p| p.matches(record))
    }
}
