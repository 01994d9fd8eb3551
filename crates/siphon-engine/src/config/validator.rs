//! Semantic validation for parsed service configuration values.

use anyhow::{bail, Result};

use crate::config::types::{ExportSettings, ServiceConfig, SourceKind, StoreConfig};
use crate::registry::SchemaRegistry;

// Larger pages exceed what the store serves comfortably in one response.
const MAX_BATCH_SIZE: usize = 100_000;

fn validate_export(export: &ExportSettings, errors: &mut Vec<String>) {
    if export.batch_size == 0 || export.batch_size > MAX_BATCH_SIZE {
        errors.push(format!(
            "export.batch_size must be between 1 and {MAX_BATCH_SIZE}, got {}",
            export.batch_size
        ));
    }
    if export.max_batches == 0 {
        errors.push("export.max_batches must be at least 1".to_string());
    }
    if export.default_limit == 0 {
        errors.push("export.default_limit must be at least 1".to_string());
    }
    if export.max_limit < export.default_limit {
        errors.push(format!(
            "export.max_limit ({}) must not be below export.default_limit ({})",
            export.max_limit, export.default_limit
        ));
    }
    if export.join_chunk_size == 0 {
        errors.push("export.join_chunk_size must be at least 1".to_string());
    }
    if export.flush_rows == 0 {
        errors.push("export.flush_rows must be at least 1".to_string());
    }
    if export.scratch_dir.as_os_str().is_empty() {
        errors.push("export.scratch_dir must not be empty".to_string());
    }
}

fn validate_store(store: &StoreConfig, errors: &mut Vec<String>) {
    if store.base_path.as_os_str().is_empty() {
        errors.push("store.base_path must not be empty".to_string());
    }
    let domain = store.server_domain.trim();
    if !(domain.starts_with("http://") || domain.starts_with("https://")) {
        errors.push(format!(
            "store.server_domain '{}' must start with http:// or https://",
            store.server_domain
        ));
    }
    if store.retention_days == 0 {
        errors.push("store.retention_days must be at least 1".to_string());
    }
}

/// Validate a parsed service configuration.
/// Returns `Ok(())` if valid, Err with all validation errors if not.
///
/// Connector-specific source settings are checked by the connector itself
/// when it is built.
///
/// # Errors
///
/// Returns an error listing all validation failures found in the config.
pub fn validate_config(config: &ServiceConfig) -> Result<()> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(format!(
            "Unsupported config version '{}', expected '1.0'",
            config.version
        ));
    }

    if config.source.kind == SourceKind::Fixture && config.source.fixture_path().is_none() {
        errors.push("source.kind 'fixture' requires a 'path'".to_string());
    }

    validate_export(&config.export, &mut errors);
    validate_store(&config.store, &mut errors);

    if let Err(e) = SchemaRegistry::with_overrides(config.schemas.clone()) {
        errors.push(format!("schemas: {e}"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        bail!("Config validation failed:\n  - {}", errors.join("\n  - "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parser::parse_config_str;

    fn valid_yaml() -> &'static str {
        r#"
version: "1.0"
source:
  kind: postgres
  host: localhost
store:
  base_path: /tmp/siphon
  server_domain: http://localhost:8080
"#
    }

    #[test]
    fn test_valid_config_passes() {
        let config = parse_config_str(valid_yaml()).unwrap();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_wrong_version_fails() {
        let mut config = parse_config_str(valid_yaml()).unwrap();
        config.version = "2.0".to_string();
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("Unsupported config version"));
    }

    #[test]
    fn test_fixture_without_path_fails() {
        let config = parse_config_str("source:\n  kind: fixture\n").unwrap();
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("requires a 'path'"));
    }

    #[test]
    fn test_all_export_errors_reported() {
        let yaml = r#"
source:
  kind: postgres
export:
  batch_size: 0
  max_batches: 0
  default_limit: 500
  max_limit: 100
  join_chunk_size: 0
  flush_rows: 0
"#;
        let config = parse_config_str(yaml).unwrap();
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("batch_size"));
        assert!(err.contains("max_batches"));
        assert!(err.contains("max_limit"));
        assert!(err.contains("join_chunk_size"));
        assert!(err.contains("flush_rows"));
    }

    #[test]
    fn test_bad_store_fails() {
        let yaml = r#"
source:
  kind: postgres
store:
  server_domain: ftp://files
  retention_days: 0
"#;
        let config = parse_config_str(yaml).unwrap();
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("server_domain"));
        assert!(err.contains("retention_days"));
    }

    #[test]
    fn test_invalid_schema_override_fails() {
        let yaml = r#"
source:
  kind: postgres
schemas:
  - name: broken
    columns:
      - { source: a, label: A }
      - { source: b, label: A }
"#;
        let config = parse_config_str(yaml).unwrap();
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("schemas:"));
        assert!(err.contains("'A'"));
    }
}
