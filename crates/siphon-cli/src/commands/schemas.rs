use std::path::Path;

use anyhow::{Context, Result};
use siphon_engine::SchemaRegistry;

use super::{load_config, load_registry};

/// Execute the `schemas` command: list every output schema, optionally
/// with a config's overrides applied.
pub fn execute(config_path: Option<&Path>) -> Result<()> {
    let registry = match config_path {
        Some(path) => load_registry(&load_config(path)?)?,
        None => SchemaRegistry::builtin().context("Failed to load bundled schemas")?,
    };

    println!("Output schemas ({}):", registry.len());
    for schema in registry.schemas() {
        let tasks: Vec<&str> = schema.task_types().collect();
        println!("  {:16} tasks: {}", schema.name, tasks.join(", "));
        let labels: Vec<&str> = schema.labels().collect();
        println!("  {:16} columns: {}", "", labels.join(" | "));
    }
    let fallback = registry.fallback();
    println!(
        "  (other task types use '{}': {})",
        fallback.name,
        fallback.labels().collect::<Vec<_>>().join(" | ")
    );
    Ok(())
}
