use std::path::Path;

use anyhow::{bail, Result};

use super::load_config;

/// Execute the `sweep` command: delete stored artifacts older than the
/// retention period.
pub fn execute(config_path: &Path, days: Option<u32>) -> Result<()> {
    let config = load_config(config_path)?;
    let days = days.unwrap_or(config.store.retention_days);
    if days == 0 {
        bail!("--days must be at least 1");
    }

    let store = config.store.to_store();
    let report = store.sweep_expired(days);

    println!(
        "Swept {} (older than {days} day(s)).",
        store.base_path().display()
    );
    println!("  Scanned:         {}", report.scanned);
    println!("  Deleted:         {}", report.deleted);
    println!("  Failed:          {}", report.failed);
    println!("  Freed:           {} B", report.bytes_freed);
    Ok(())
}
