use std::path::{Path, PathBuf};

use rust_xlsxwriter::{Format, FormatAlign, Workbook, Worksheet, XlsxError};
use siphon_types::{OutputFormat, Value, WriterError};

use super::{cell_text, Artifact, ArtifactWriter};

/// Rows per worksheet, header included.
pub const XLSX_MAX_ROWS: u32 = 1_048_576;

const SHEET_NAME_MAX: usize = 31;

// Integers beyond this lose precision as spreadsheet numbers.
const EXACT_F64_INT: u64 = 1 << 53;

/// Replace characters worksheets reject and cap the length.
#[must_use]
pub fn sanitize_sheet_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_matches('\'');
    let capped: String = cleaned.chars().take(SHEET_NAME_MAX).collect();
    if capped.trim().is_empty() {
        "Sheet1".to_string()
    } else {
        capped
    }
}

fn continuation_name(base: &str, sheet_no: u32) -> String {
    let suffix = format!("_{sheet_no}");
    let room = SHEET_NAME_MAX.saturating_sub(suffix.chars().count());
    let head: String = base.chars().take(room).collect();
    format!("{head}{suffix}")
}

fn xlsx_err(e: XlsxError) -> WriterError {
    WriterError::Spreadsheet(e.to_string())
}

fn sheet(workbook: &mut Workbook, index: usize) -> Result<&mut Worksheet, WriterError> {
    workbook.worksheet_from_index(index).map_err(xlsx_err)
}

/// Constant-memory xlsx writer.
///
/// Each row is flushed to the worksheet's temp file once the next row
/// starts, so rows must arrive in order and are never revisited. A sheet
/// that fills up continues on `name_2`, `name_3`, ... with the header
/// repeated.
pub struct XlsxWriter {
    workbook: Workbook,
    path: PathBuf,
    base_name: String,
    header: Vec<String>,
    header_format: Format,
    sheet_index: usize,
    sheet_no: u32,
    next_row: u32,
    row_limit: u32,
    rows: u64,
}

impl XlsxWriter {
    /// # Errors
    ///
    /// Returns an error if the worksheet rejects the name.
    pub fn create(path: &Path, sheet_name: &str) -> Result<Self, WriterError> {
        let base_name = sanitize_sheet_name(sheet_name);
        let mut workbook = Workbook::new();
        workbook
            .add_worksheet_with_constant_memory()
            .set_name(&base_name)
            .map_err(xlsx_err)?;
        Ok(Self {
            workbook,
            path: path.to_path_buf(),
            base_name,
            header: Vec::new(),
            header_format: Format::new().set_bold().set_align(FormatAlign::Center),
            sheet_index: 0,
            sheet_no: 1,
            next_row: 0,
            row_limit: XLSX_MAX_ROWS,
            rows: 0,
        })
    }

    #[cfg(test)]
    fn with_row_limit(mut self, row_limit: u32) -> Self {
        self.row_limit = row_limit.max(2);
        self
    }

    /// Worksheets created so far.
    #[must_use]
    pub fn sheet_count(&self) -> u32 {
        self.sheet_no
    }

    fn emit_header(&mut self) -> Result<(), WriterError> {
        let ws = sheet(&mut self.workbook, self.sheet_index)?;
        for (col, label) in self.header.iter().enumerate() {
            let col = column(col)?;
            ws.write_string_with_format(self.next_row, col, label, &self.header_format)
                .map_err(xlsx_err)?;
        }
        self.next_row += 1;
        Ok(())
    }

    fn roll_over(&mut self) -> Result<(), WriterError> {
        self.sheet_no += 1;
        let name = continuation_name(&self.base_name, self.sheet_no);
        self.workbook
            .add_worksheet_with_constant_memory()
            .set_name(&name)
            .map_err(xlsx_err)?;
        self.sheet_index += 1;
        self.next_row = 0;
        tracing::info!(sheet = %name, rows = self.rows, "Worksheet full, continuing on a new sheet");
        if !self.header.is_empty() {
            self.emit_header()?;
        }
        Ok(())
    }
}

fn column(index: usize) -> Result<u16, WriterError> {
    u16::try_from(index)
        .map_err(|_| WriterError::Spreadsheet(format!("column {index} is out of range")))
}

impl ArtifactWriter for XlsxWriter {
    fn write_header(&mut self, labels: &[String]) -> Result<(), WriterError> {
        self.header = labels.to_vec();
        self.emit_header()
    }

    fn write_row(&mut self, cells: &[Value]) -> Result<(), WriterError> {
        if self.next_row >= self.row_limit {
            self.roll_over()?;
        }
        let row = self.next_row;
        let ws = sheet(&mut self.workbook, self.sheet_index)?;
        for (col, cell) in cells.iter().enumerate() {
            let col = column(col)?;
            match cell {
                Value::Null => {}
                Value::Int(v) if v.unsigned_abs() < EXACT_F64_INT => {
                    #[allow(clippy::cast_precision_loss)]
                    ws.write_number(row, col, *v as f64).map_err(xlsx_err)?;
                }
                Value::Float(v) if v.is_finite() => {
                    ws.write_number(row, col, *v).map_err(xlsx_err)?;
                }
                other => {
                    ws.write_string(row, col, cell_text(other)).map_err(xlsx_err)?;
                }
            }
        }
        self.next_row += 1;
        self.rows += 1;
        Ok(())
    }

    fn rows(&self) -> u64 {
        self.rows
    }

    fn close(self: Box<Self>) -> Result<Artifact, WriterError> {
        let mut this = *self;
        this.workbook.save(&this.path).map_err(xlsx_err)?;
        let bytes = std::fs::metadata(&this.path)
            .map_err(|e| WriterError::io(&this.path, e))?
            .len();
        tracing::debug!(
            path = %this.path.display(),
            rows = this.rows,
            sheets = this.sheet_no,
            bytes,
            "Saved workbook"
        );
        Ok(Artifact {
            path: this.path,
            rows: this.rows,
            bytes,
            format: OutputFormat::Tabular,
        })
    }
}
