//! Shared siphon data model types.
//!
//! Pure data: records read from the store, pushed-down filters, paging
//! cursors, output schemas, export requests, and the error taxonomy. This
//! crate performs no I/O so both the engine and source connectors can
//! depend on it.

pub mod cursor;
pub mod error;
pub mod filter;
pub mod record;
pub mod request;
pub mod schema;
pub mod value;

pub use cursor::{Cursor, ScanOrder};
pub use error::{ExportError, SourceError, SourceErrorKind, UploadError, WriterError};
pub use filter::{Discriminator, Filter, Predicate};
pub use record::{JoinedRecord, Record};
pub use request::{Criteria, DatasetSpec, ExportRequest, OutputFormat, SecondarySpec};
pub use schema::{CategoricalMap, ColumnSpec, Schema, SchemaError};
pub use value::Value;
