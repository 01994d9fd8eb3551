//! PostgreSQL-wire source for siphon exports.
//!
//! Routes each task type and country to a physical table, pushes the whole
//! filter down as bound SQL, and pages with keyset cursors.

mod client;
pub mod config;
mod decode;
pub mod identifier;
mod query;
mod source;

pub use config::{Config, TableRouting, ValueEncoding};
pub use source::PostgresSource;
