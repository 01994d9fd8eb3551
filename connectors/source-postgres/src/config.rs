//! Source PostgreSQL connector configuration.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use siphon_types::SourceError;

use crate::identifier::validate_pg_identifier;

/// Connection and routing config from the service YAML `source` section.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: String,
    pub database: String,
    /// Maximum open connections.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    #[serde(default)]
    pub routing: TableRouting,
}

fn default_port() -> u16 {
    5432
}

fn default_pool_size() -> usize {
    4
}

/// Maps a task type and country code to a physical table and names the
/// columns every table shares.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TableRouting {
    /// Prefix for task types not listed in `tables`.
    pub default_prefix: String,
    /// Task type to table prefix.
    pub tables: HashMap<String, String>,
    pub key_column: String,
    pub inserted_at_column: String,
    pub discriminator_column: String,
    pub encodings: Vec<ValueEncoding>,
}

impl Default for TableRouting {
    fn default() -> Self {
        let tables = [
            ("gender", "ts_ws_task_record"),
            ("whatsappExist", "ts_ws_task_record"),
            ("wsValid", "ts_ws_task_record"),
            ("sieveLive", "ts_tg_task_record"),
            ("sieveAvatar", "ts_tg_task_record"),
            ("tgEffective", "ts_tg_task_record"),
        ]
        .into_iter()
        .map(|(task, prefix)| (task.to_string(), prefix.to_string()))
        .collect();
        Self {
            default_prefix: "ts_other_task_record".to_string(),
            tables,
            key_column: "phone".to_string(),
            inserted_at_column: "create_time".to_string(),
            discriminator_column: "task_type".to_string(),
            encodings: Vec::new(),
        }
    }
}

/// How some task types store a categorical field. Filter values are
/// translated through `values` before they reach SQL.
#[derive(Debug, Clone, Deserialize)]
pub struct ValueEncoding {
    pub task_types: Vec<String>,
    pub field: String,
    pub values: BTreeMap<String, String>,
}

impl TableRouting {
    /// `{prefix}_{COUNTRY}` for the task type.
    ///
    /// # Errors
    ///
    /// Returns a query error if the resulting name is not a valid
    /// identifier.
    pub fn table_name(&self, task_type: &str, country_code: &str) -> Result<String, SourceError> {
        let prefix = self
            .tables
            .get(task_type)
            .unwrap_or(&self.default_prefix);
        let table = format!("{prefix}_{}", country_code.trim().to_uppercase());
        validate_pg_identifier(&table)
            .map_err(|e| SourceError::query(format!("invalid table for {task_type}: {e}")))?;
        Ok(table)
    }

    /// Stored form of a filter value for `task_type.field`.
    #[must_use]
    pub fn encode<'v>(&'v self, task_type: &str, field: &str, value: &'v str) -> &'v str {
        self.encodings
            .iter()
            .filter(|e| e.field == field && e.task_types.iter().any(|t| t == task_type))
            .find_map(|e| e.values.get(value))
            .map_or(value, String::as_str)
    }
}

impl Config {
    /// # Errors
    ///
    /// Returns a config error describing every invalid setting.
    pub fn validate(&self) -> Result<(), SourceError> {
        let mut errors = Vec::new();
        if self.host.trim().is_empty() {
            errors.push("host must not be empty".to_string());
        }
        if self.pool_size == 0 {
            errors.push("pool_size must be at least 1".to_string());
        }
        let routing = &self.routing;
        let identifiers = [
            ("routing.default_prefix", &routing.default_prefix),
            ("routing.key_column", &routing.key_column),
            ("routing.inserted_at_column", &routing.inserted_at_column),
            ("routing.discriminator_column", &routing.discriminator_column),
        ];
        for (what, name) in identifiers {
            if let Err(e) = validate_pg_identifier(name) {
                errors.push(format!("{what}: {e}"));
            }
        }
        for (task, prefix) in &routing.tables {
            if let Err(e) = validate_pg_identifier(prefix) {
                errors.push(format!("routing.tables.{task}: {e}"));
            }
        }
        for encoding in &routing.encodings {
            if encoding.task_types.is_empty() {
                errors.push(format!(
                    "routing.encodings for field '{}' names no task types",
                    encoding.field
                ));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SourceError::config(errors.join("; ")))
        }
    }
}
