//! Export outcome and per-run counters.

use serde::Serialize;
use siphon_types::OutputFormat;

use crate::join::JoinStrategy;
use crate::paginator::StopReason;

/// Counters and timings for one export run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportReport {
    pub task_type: String,
    pub country_code: String,
    pub format: OutputFormat,
    /// Rows matched by the pre-flight count, when one ran.
    pub matched: Option<u64>,
    pub rows_written: u64,
    pub pages_fetched: u32,
    /// Raw rows read from the primary scan, duplicates included.
    pub rows_scanned: u64,
    pub unique_keys: u64,
    pub dropped_empty_keys: u64,
    pub key_lookups: u64,
    pub stop_reason: Option<StopReason>,
    pub join_strategy: Option<JoinStrategy>,
    pub bytes: u64,
    pub scan_secs: f64,
    pub finalize_secs: f64,
    pub upload_secs: f64,
    pub duration_secs: f64,
}

impl ExportReport {
    pub(crate) fn new(task_type: &str, country_code: &str, format: OutputFormat) -> Self {
        Self {
            task_type: task_type.to_string(),
            country_code: country_code.to_string(),
            format,
            matched: None,
            rows_written: 0,
            pages_fetched: 0,
            rows_scanned: 0,
            unique_keys: 0,
            dropped_empty_keys: 0,
            key_lookups: 0,
            stop_reason: None,
            join_strategy: None,
            bytes: 0,
            scan_secs: 0.0,
            finalize_secs: 0.0,
            upload_secs: 0.0,
            duration_secs: 0.0,
        }
    }
}

/// A stored artifact and how it was produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportOutcome {
    pub url: String,
    pub file_name: String,
    pub folder: String,
    pub report: ExportReport,
}
