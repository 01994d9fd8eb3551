//! Export engine: cursor pagination, streaming dedup, key-set merge join,
//! schema projection, and bounded-memory artifact writers.

pub mod artifact;
pub mod config;
pub mod dedup;
pub mod join;
pub mod memory;
pub mod orchestrator;
pub mod paginator;
pub mod projector;
pub mod registry;
pub mod result;
pub mod sink;
pub mod source;
pub mod store;

// Re-export public API for convenience
pub use config::{parse_config, validate_config, ExportSettings, ServiceConfig, SourceKind};
pub use dedup::Deduplicator;
pub use join::{JoinStrategy, MergeJoiner};
pub use memory::MemorySource;
pub use orchestrator::Exporter;
pub use paginator::{PageLimits, Paginator, StopReason};
pub use projector::{project, RowLayout};
pub use registry::SchemaRegistry;
pub use result::{ExportOutcome, ExportReport};
pub use source::{Page, PageRequest, PagedSource, Projection};
pub use store::{LocalStore, Store, SweepReport};
