//! Streaming artifact writers.
//!
//! A writer is opened on a scratch path, fed a header and rows, and
//! consumed by [`ArtifactWriter::close`]. Memory stays bounded in both
//! formats: line output goes through a fixed buffer and spreadsheet rows are
//! streamed to disk as they are written.

mod lines;
mod xlsx;

use std::path::{Path, PathBuf};

use serde::Serialize;
use siphon_types::{OutputFormat, Value, WriterError};

pub use lines::LinesWriter;
pub use xlsx::{sanitize_sheet_name, XlsxWriter, XLSX_MAX_ROWS};

/// A finished local file, ready for the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub path: PathBuf,
    /// Data rows written, header excluded.
    pub rows: u64,
    pub bytes: u64,
    pub format: OutputFormat,
}

/// Row-at-a-time artifact writer.
pub trait ArtifactWriter: Send {
    /// Write the header row.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O or spreadsheet failure.
    fn write_header(&mut self, labels: &[String]) -> Result<(), WriterError>;

    /// Write one data row.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O or spreadsheet failure.
    fn write_row(&mut self, cells: &[Value]) -> Result<(), WriterError>;

    /// Data rows written so far.
    fn rows(&self) -> u64;

    /// Flush and finalize the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush or workbook assembly fails.
    fn close(self: Box<Self>) -> Result<Artifact, WriterError>;
}

/// Writer tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkOptions {
    /// Explicit flush interval for line output.
    pub flush_rows: u64,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self { flush_rows: 10_000 }
    }
}

/// Open a writer for `format` at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be created or the sheet name is
/// rejected.
pub fn open(
    format: OutputFormat,
    path: &Path,
    sheet_name: &str,
    options: SinkOptions,
) -> Result<Box<dyn ArtifactWriter>, WriterError> {
    match format {
        OutputFormat::Flat => Ok(Box::new(LinesWriter::create(path, options.flush_rows)?)),
        OutputFormat::Tabular => Ok(Box::new(XlsxWriter::create(path, sheet_name)?)),
    }
}

/// Cell text for line output and string cells; `Null` is empty.
pub(crate) fn cell_text(value: &Value) -> String {
    value.render().unwrap_or_default()
}
