use std::path::Path;

use anyhow::Result;
use siphon_engine::ExportOutcome;
use siphon_types::ExportError;

use super::{build_exporter, load_config, read_request};

/// Execute the `export` command: load config and request, run one export,
/// and print the artifact URL with its report.
pub async fn execute(config_path: &Path, request_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let request = read_request(request_path)?;
    let exporter = build_exporter(&config).await?;

    match exporter.run_export(&request).await {
        Ok(outcome) => {
            print_outcome(&outcome);
            Ok(())
        }
        Err(ExportError::EmptyResult) => {
            println!("No rows matched the request; no artifact was created.");
            println!(
                "@@EXPORT_JSON@@{}",
                serde_json::json!({ "url": null, "rows_written": 0 })
            );
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn print_outcome(outcome: &ExportOutcome) {
    let report = &outcome.report;
    println!(
        "Export '{}_{}' completed successfully.",
        report.task_type, report.country_code
    );
    println!("  URL:             {}", outcome.url);
    println!("  File:            {}/{}", outcome.folder, outcome.file_name);
    println!("  Format:          {}", report.format);
    if let Some(matched) = report.matched {
        println!("  Matched:         {matched}");
    }
    println!("  Rows written:    {}", report.rows_written);
    println!("  Rows scanned:    {}", report.rows_scanned);
    println!("  Unique keys:     {}", report.unique_keys);
    if report.dropped_empty_keys > 0 {
        println!("  Empty keys:      {}", report.dropped_empty_keys);
    }
    println!("  Pages fetched:   {}", report.pages_fetched);
    if let Some(stop) = report.stop_reason {
        println!("  Stopped on:      {stop}");
    }
    if let Some(strategy) = report.join_strategy {
        println!(
            "  Join:            {strategy} ({} key lookups)",
            report.key_lookups
        );
    }
    println!("  Size:            {}", format_bytes(report.bytes));
    println!("  Duration:        {:.2}s", report.duration_secs);
    println!("    Scan:          {:.3}s", report.scan_secs);
    println!("    Finalize:      {:.3}s", report.finalize_secs);
    println!("    Upload:        {:.3}s", report.upload_secs);

    // Machine-readable line for scripts
    match serde_json::to_string(outcome) {
        Ok(json) => println!("@@EXPORT_JSON@@{json}"),
        Err(e) => tracing::warn!(error = %e, "Failed to serialize export outcome"),
    }
}

fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_073_741_824 {
        format!("{:.2} GB", bytes as f64 / 1_073_741_824.0)
    } else if bytes >= 1_048_576 {
        format!("{:.2} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.2} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}
