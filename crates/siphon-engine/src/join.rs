//! Key-set merge join against a secondary source.

use std::fmt;

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use siphon_types::{Filter, JoinedRecord, Record, SourceError};

use crate::dedup::Deduplicator;
use crate::source::PagedSource;

/// How primary rows are fed to the joiner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinStrategy {
    /// Collect the whole primary result, then join once.
    Prefetch,
    /// Join each primary batch before fetching the next.
    Interleaved,
}

impl JoinStrategy {
    /// Prefetch only for an explicit limit at or below `prefetch_threshold`.
    #[must_use]
    pub fn choose(limit: Option<u64>, prefetch_threshold: u64) -> Self {
        match limit {
            Some(n) if n > 0 && n <= prefetch_threshold => Self::Prefetch,
            _ => Self::Interleaved,
        }
    }
}

impl fmt::Display for JoinStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Prefetch => "prefetch",
            Self::Interleaved => "interleaved",
        })
    }
}

/// Inner-joins primary records to a secondary source by key.
pub struct MergeJoiner<'a> {
    source: &'a dyn PagedSource,
    filter: &'a Filter,
    chunk_size: usize,
    lookups: u64,
    matched: u64,
}

impl<'a> MergeJoiner<'a> {
    pub fn new(source: &'a dyn PagedSource, filter: &'a Filter, chunk_size: usize) -> Self {
        Self {
            source,
            filter,
            chunk_size: chunk_size.max(1),
            lookups: 0,
            matched: 0,
        }
    }

    /// Newest secondary record for each key, in key-request order.
    ///
    /// Keys are deduplicated and blank keys dropped before chunking; one
    /// `fetch_by_keys` call is issued per chunk.
    ///
    /// # Errors
    ///
    /// Returns the first source error; no partial result is kept.
    pub async fn lookup<'k>(
        &mut self,
        keys: impl IntoIterator<Item = &'k str>,
    ) -> Result<IndexMap<String, Record>, SourceError> {
        let keys: IndexSet<&str> = keys
            .into_iter()
            .filter(|k| !k.trim().is_empty())
            .collect();
        let keys: Vec<String> = keys.into_iter().map(str::to_string).collect();

        let mut found = Deduplicator::new();
        for chunk in keys.chunks(self.chunk_size) {
            let rows = self.source.fetch_by_keys(chunk, self.filter).await?;
            self.lookups += 1;
            tracing::debug!(
                source = self.source.id(),
                task_type = self.filter.task_type(),
                keys = chunk.len(),
                rows = rows.len(),
                "Key lookup"
            );
            found.extend(rows);
        }

        let mut by_key = found.take_map();
        // Reorder to request order; rows for keys nobody asked for are dropped.
        let mut ordered = IndexMap::with_capacity(by_key.len());
        for key in keys {
            if let Some(record) = by_key.swap_remove(&key) {
                ordered.insert(key, record);
            }
        }
        Ok(ordered)
    }

    /// Pair each primary with its secondary. Primaries without a match are
    /// dropped; each key is emitted at most once.
    ///
    /// # Errors
    ///
    /// Returns the first source error.
    pub async fn join(&mut self, primaries: Vec<Record>) -> Result<Vec<JoinedRecord>, SourceError> {
        let mut secondaries = self.lookup(primaries.iter().map(Record::key)).await?;
        let mut joined = Vec::with_capacity(secondaries.len());
        for primary in primaries {
            let Some(secondary) = secondaries.swap_remove(primary.key()) else {
                continue;
            };
            if let Some(pair) = JoinedRecord::pair(primary, secondary) {
                joined.push(pair);
            }
        }
        self.matched += joined.len() as u64;
        Ok(joined)
    }

    /// `fetch_by_keys` calls issued so far.
    #[must_use]
    pub fn lookups(&self) -> u64 {
        self.lookups
    }

    /// Joined records emitted so far.
    #[must_use]
    pub fn matched(&self) -> u64 {
        self.matched
    }
}
