pub mod count;
pub mod export;
pub mod schemas;
pub mod sweep;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use siphon_engine::{
    parse_config, validate_config, Exporter, MemorySource, PagedSource, SchemaRegistry,
    ServiceConfig, SourceKind,
};
use siphon_types::ExportRequest;
use source_postgres::PostgresSource;

/// Parse and validate the service config.
pub(crate) fn load_config(path: &Path) -> Result<ServiceConfig> {
    let config = parse_config(path)
        .with_context(|| format!("Failed to parse config: {}", path.display()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Read an export request from a JSON file.
pub(crate) fn read_request(path: &Path) -> Result<ExportRequest> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read request: {}", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse request: {}", path.display()))
}

pub(crate) fn load_registry(config: &ServiceConfig) -> Result<SchemaRegistry> {
    SchemaRegistry::with_overrides(config.schemas.clone()).context("Failed to build schema registry")
}

/// Build the configured source. Database sources are pinged before use.
pub(crate) async fn build_source(config: &ServiceConfig) -> Result<Arc<dyn PagedSource>> {
    match config.source.kind {
        SourceKind::Fixture => {
            let path = config
                .source
                .fixture_path()
                .context("fixture source requires 'path'")?;
            let source = MemorySource::from_jsonl(&path)
                .with_context(|| format!("Failed to load fixture: {}", path.display()))?;
            Ok(Arc::new(source))
        }
        SourceKind::Postgres => {
            let source = PostgresSource::from_settings(config.source.settings_value())?;
            source.ping().await.context("Source connectivity check failed")?;
            Ok(Arc::new(source))
        }
    }
}

/// Wire source, store, and registry into an exporter.
pub(crate) async fn build_exporter(config: &ServiceConfig) -> Result<Exporter> {
    let source = build_source(config).await?;
    let registry = load_registry(config)?;
    Ok(Exporter::new(
        source,
        Arc::new(config.store.to_store()),
        Arc::new(registry),
        config.export.clone(),
    ))
}
