//! Service configuration types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use siphon_types::Schema;

use crate::store::LocalStore;

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_version")]
    pub version: String,
    pub source: SourceConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub export: ExportSettings,
    /// Extra or replacement schemas, same format as the bundled table.
    #[serde(default)]
    pub schemas: Vec<Schema>,
}

fn default_version() -> String {
    "1.0".to_string()
}

/// Which [`PagedSource`](crate::source::PagedSource) to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// PostgreSQL-wire database.
    Postgres,
    /// JSON-lines fixture served from memory.
    Fixture,
}

/// Source selection plus connector-specific settings.
///
/// The settings are passed through untouched so each connector can
/// deserialize its own config shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub kind: SourceKind,
    #[serde(flatten)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl SourceConfig {
    /// Connector settings as a JSON object.
    #[must_use]
    pub fn settings_value(&self) -> serde_json::Value {
        serde_json::Value::Object(self.settings.clone())
    }

    /// Fixture path for `kind: fixture`.
    #[must_use]
    pub fn fixture_path(&self) -> Option<PathBuf> {
        self.settings
            .get("path")
            .and_then(serde_json::Value::as_str)
            .map(PathBuf::from)
    }
}

/// Local artifact store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub base_path: PathBuf,
    pub server_domain: String,
    pub access_prefix: String,
    pub retention_days: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("./files"),
            server_domain: "http://localhost:8080".to_string(),
            access_prefix: "/files".to_string(),
            retention_days: 7,
        }
    }
}

impl StoreConfig {
    #[must_use]
    pub fn to_store(&self) -> LocalStore {
        LocalStore::new(&self.base_path, &self.server_domain, &self.access_prefix)
    }
}

/// Paging, budget, join, and writer tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub batch_size: usize,
    pub max_batches: u32,
    /// Budget used when a request has no limit (or limit 0).
    pub default_limit: u64,
    /// Upper clamp on requested limits.
    pub max_limit: u64,
    pub join_chunk_size: usize,
    /// Largest explicit limit joined with the prefetch strategy.
    pub prefetch_threshold: u64,
    pub flush_rows: u64,
    /// Run a COUNT before writing when no skip is requested.
    pub preflight_count: bool,
    pub secondary_prefix: String,
    pub scratch_dir: PathBuf,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            batch_size: 10_000,
            max_batches: 100,
            default_limit: 10_000,
            max_limit: 1_000_000,
            join_chunk_size: 5_000,
            prefetch_threshold: 10_000,
            flush_rows: 10_000,
            preflight_count: true,
            secondary_prefix: "副-".to_string(),
            scratch_dir: std::env::temp_dir(),
        }
    }
}

impl ExportSettings {
    /// Row budget for a requested limit.
    #[must_use]
    pub fn budget(&self, limit: Option<u64>) -> u64 {
        match limit {
            None | Some(0) => self.default_limit.min(self.max_limit),
            Some(n) => n.min(self.max_limit),
        }
    }
}
