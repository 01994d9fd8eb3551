use std::path::Path;

use anyhow::Result;

use super::{build_exporter, load_config, read_request};

/// Execute the `count` command: rows matching the request's primary
/// dataset, without writing anything.
pub async fn execute(config_path: &Path, request_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let request = read_request(request_path)?;
    let exporter = build_exporter(&config).await?;

    let count = exporter.count(&request).await?;
    println!(
        "{} {}: {count} matching rows",
        request.dataset_a.task_type,
        request.country_code()
    );
    println!("@@COUNT_JSON@@{}", serde_json::json!({ "count": count }));
    Ok(())
}
