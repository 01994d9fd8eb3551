//! Error taxonomy for exports.
//!
//! [`SourceError`] is what a paged source returns. [`ExportError`] is what
//! an export run surfaces to its caller; every variant is fatal for the run
//! and none is retried automatically.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Broad classification of a source failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceErrorKind {
    /// Could not reach or authenticate against the store.
    Connect,
    /// The store rejected or failed a query.
    Query,
    /// A returned row could not be decoded.
    Decode,
    /// The source was configured with values it cannot use.
    Config,
}

impl fmt::Display for SourceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connect => "connect",
            Self::Query => "query",
            Self::Decode => "decode",
            Self::Config => "config",
        };
        f.write_str(s)
    }
}

/// Failure reported by a paged source.
///
/// Construct via the kind-specific factory methods (e.g. [`SourceError::query`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("[{kind}] {message}")]
pub struct SourceError {
    pub kind: SourceErrorKind,
    pub message: String,
}

impl SourceError {
    fn new(kind: SourceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Connect, message)
    }

    #[must_use]
    pub fn query(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Query, message)
    }

    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Decode, message)
    }

    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Config, message)
    }
}

/// Local artifact write failure.
#[derive(Debug, thiserror::Error)]
pub enum WriterError {
    #[error("i/o error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("spreadsheet error: {0}")]
    Spreadsheet(String),
    #[error("writer task failed: {0}")]
    Join(String),
}

impl WriterError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Artifact store failure after a successful local write.
#[derive(Debug, thiserror::Error)]
#[error("failed to store {file}: {message}")]
pub struct UploadError {
    pub file: String,
    pub message: String,
}

impl UploadError {
    pub fn new(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            message: message.into(),
        }
    }
}

/// Terminal failure of an export run.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// Storage I/O or query failure.
    #[error("source error: {0}")]
    Source(#[from] SourceError),
    /// The filter matched nothing.
    #[error("no data matched the request")]
    EmptyResult,
    /// Local disk, permission, or spreadsheet failure.
    #[error("writer error: {0}")]
    Writer(#[from] WriterError),
    /// Store failure after a successful write.
    #[error("upload error: {0}")]
    Upload(#[from] UploadError),
    /// Request rejected before any I/O.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ExportError {
    /// Whether the failure is a user-visible outcome rather than a fault.
    #[must_use]
    pub fn is_user_facing(&self) -> bool {
        matches!(self, Self::EmptyResult | Self::InvalidRequest(_))
    }

    /// Short stable label for logs and reports.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Source(_) => "source",
            Self::EmptyResult => "empty_result",
            Self::Writer(_) => "writer",
            Self::Upload(_) => "upload",
            Self::InvalidRequest(_) => "invalid_request",
        }
    }
}
