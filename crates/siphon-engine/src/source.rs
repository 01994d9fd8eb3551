//! Paged access to the backing store.

use async_trait::async_trait;
use siphon_types::{Cursor, Filter, Record, ScanOrder, SourceError};

/// Which columns a page carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Projection {
    /// Every stored field.
    #[default]
    Full,
    /// Only the key and the ordering columns.
    KeyOnly,
}

/// One `fetch_page` call: rows matching `filter`, strictly after `cursor`
/// in `order`, at most `limit` of them.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest<'a> {
    pub filter: &'a Filter,
    pub cursor: Option<&'a Cursor>,
    pub order: ScanOrder,
    pub projection: Projection,
    pub limit: usize,
}

/// Rows returned by one fetch plus the cursor positioned on the last row.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub rows: Vec<Record>,
    pub next_cursor: Option<Cursor>,
}

impl Page {
    /// Build a page, deriving the next cursor from the last row.
    #[must_use]
    pub fn from_rows(rows: Vec<Record>, order: ScanOrder) -> Self {
        let next_cursor = rows.last().and_then(|row| Cursor::at(row, order));
        Self { rows, next_cursor }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Cursor-paged reads against the store.
///
/// Implementations push the whole filter down and never retry internally;
/// any failure surfaces as a [`SourceError`].
#[async_trait]
pub trait PagedSource: Send + Sync {
    /// Short identifier used in logs.
    fn id(&self) -> &str;

    /// Fetch the next page after `request.cursor`.
    async fn fetch_page(&self, request: PageRequest<'_>) -> Result<Page, SourceError>;

    /// Rows whose key is in `keys` and which match `filter`, ordered
    /// `key ASC, inserted_at DESC` so the first row per key is the newest.
    async fn fetch_by_keys(&self, keys: &[String], filter: &Filter)
        -> Result<Vec<Record>, SourceError>;

    /// The single row at zero-based `position` in `order`, if any.
    async fn probe_at(
        &self,
        filter: &Filter,
        order: ScanOrder,
        position: u64,
    ) -> Result<Option<Record>, SourceError>;

    /// Number of matching rows (not distinct keys).
    async fn count(&self, filter: &Filter) -> Result<u64, SourceError>;
}
