use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use siphon_types::{OutputFormat, Value, WriterError};

use super::{cell_text, Artifact, ArtifactWriter};

const BUFFER_BYTES: usize = 64 * 1024;

/// Tab-separated, newline-terminated line writer.
pub struct LinesWriter {
    out: BufWriter<File>,
    path: PathBuf,
    flush_rows: u64,
    rows: u64,
    bytes: u64,
    since_flush: u64,
}

impl LinesWriter {
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn create(path: &Path, flush_rows: u64) -> Result<Self, WriterError> {
        let file = File::create(path).map_err(|e| WriterError::io(path, e))?;
        Ok(Self {
            out: BufWriter::with_capacity(BUFFER_BYTES, file),
            path: path.to_path_buf(),
            flush_rows: flush_rows.max(1),
            rows: 0,
            bytes: 0,
            since_flush: 0,
        })
    }

    fn write_line(&mut self, cells: impl Iterator<Item = String>) -> Result<(), WriterError> {
        let mut line = cells.collect::<Vec<_>>().join("\t");
        line.push('\n');
        self.out
            .write_all(line.as_bytes())
            .map_err(|e| WriterError::io(&self.path, e))?;
        self.bytes += line.len() as u64;
        Ok(())
    }
}

impl ArtifactWriter for LinesWriter {
    fn write_header(&mut self, labels: &[String]) -> Result<(), WriterError> {
        self.write_line(labels.iter().cloned())
    }

    fn write_row(&mut self, cells: &[Value]) -> Result<(), WriterError> {
        self.write_line(cells.iter().map(cell_text))?;
        self.rows += 1;
        self.since_flush += 1;
        if self.since_flush >= self.flush_rows {
            self.out.flush().map_err(|e| WriterError::io(&self.path, e))?;
            self.since_flush = 0;
            tracing::debug!(rows = self.rows, path = %self.path.display(), "Flushed line output");
        }
        Ok(())
    }

    fn rows(&self) -> u64 {
        self.rows
    }

    fn close(self: Box<Self>) -> Result<Artifact, WriterError> {
        let mut this = *self;
        this.out.flush().map_err(|e| WriterError::io(&this.path, e))?;
        this.out
            .get_ref()
            .sync_all()
            .map_err(|e| WriterError::io(&this.path, e))?;
        Ok(Artifact {
            path: this.path,
            rows: this.rows,
            bytes: this.bytes,
            format: OutputFormat::Flat,
        })
    }
}
