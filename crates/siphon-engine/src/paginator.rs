//! Cursor-driven batch pagination.
//!
//! ```text
//! Init ──▶ Fetching ──▶ (Accumulating ──▶ Fetching)* ──▶ Done(reason)
//!                 └──────────────────────────────────▶ Failed
//! ```
//!
//! `Init` resolves an optional skip into a starting cursor with a single
//! position probe. Every later request is cursor based; `OFFSET` is never
//! used. Each page feeds the owned [`Deduplicator`] and the newly seen
//! records are handed to the caller.

use std::fmt;

use serde::Serialize;
use siphon_types::{Cursor, Filter, Record, ScanOrder, SourceError};

use crate::dedup::Deduplicator;
use crate::source::{PageRequest, PagedSource, Projection};

/// Why a scan stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// A fetch returned no rows.
    EmptyPage,
    /// A fetch returned fewer rows than requested.
    ShortPage,
    /// The row budget was used up.
    BudgetExhausted,
    /// The fetch cap was reached.
    BatchCap,
    /// The last row carried no ordering value to continue from.
    CursorUnavailable,
    /// The skip probe found no row at the boundary.
    SkipBeyondEnd,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::EmptyPage => "empty_page",
            Self::ShortPage => "short_page",
            Self::BudgetExhausted => "budget_exhausted",
            Self::BatchCap => "batch_cap",
            Self::CursorUnavailable => "cursor_unavailable",
            Self::SkipBeyondEnd => "skip_beyond_end",
        };
        f.write_str(s)
    }
}

/// Fixed paging parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    /// Rows requested per fetch.
    pub batch_size: usize,
    /// Hard cap on fetches per scan.
    pub max_batches: u32,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            batch_size: 10_000,
            max_batches: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Init,
    Fetching,
    Done(StopReason),
    Failed,
}

/// Drives a [`PagedSource`] batch by batch for one filter.
pub struct Paginator<'a> {
    source: &'a dyn PagedSource,
    filter: &'a Filter,
    order: ScanOrder,
    projection: Projection,
    limits: PageLimits,
    skip: u64,
    remaining: u64,
    cursor: Option<Cursor>,
    state: State,
    pages: u32,
    rows_fetched: u64,
    dedup: Deduplicator,
}

impl<'a> Paginator<'a> {
    /// Scan `filter` in `order`, stopping after `budget` fetched rows.
    pub fn new(
        source: &'a dyn PagedSource,
        filter: &'a Filter,
        order: ScanOrder,
        limits: PageLimits,
        budget: u64,
    ) -> Self {
        Self {
            source,
            filter,
            order,
            projection: Projection::Full,
            limits: PageLimits {
                batch_size: limits.batch_size.max(1),
                max_batches: limits.max_batches,
            },
            skip: 0,
            remaining: budget,
            cursor: None,
            state: State::Init,
            pages: 0,
            rows_fetched: 0,
            dedup: Deduplicator::new(),
        }
    }

    #[must_use]
    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    /// Start after the first `skip` rows in scan order. Best effort under
    /// concurrent inserts.
    #[must_use]
    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    /// Fetch the next page and return the records it contributed that were
    /// not seen before. Returns `Ok(None)` once the scan is over.
    ///
    /// A page made entirely of already-seen keys yields `Some(vec![])`.
    ///
    /// # Errors
    ///
    /// Returns the source error of a failed fetch or probe. The paginator
    /// yields nothing afterwards.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<Record>>, SourceError> {
        loop {
            match self.state {
                State::Done(_) | State::Failed => return Ok(None),
                State::Init => self.init().await?,
                State::Fetching => return self.fetch().await,
            }
        }
    }

    /// Run the scan to the end, returning every distinct record in first
    /// seen order.
    ///
    /// # Errors
    ///
    /// Returns the first source error.
    pub async fn collect_all(&mut self) -> Result<Vec<Record>, SourceError> {
        let mut all = Vec::new();
        while let Some(batch) = self.next_batch().await? {
            all.extend(batch);
        }
        Ok(all)
    }

    async fn init(&mut self) -> Result<(), SourceError> {
        if self.skip == 0 {
            self.state = State::Fetching;
            return Ok(());
        }
        let probe = self
            .source
            .probe_at(self.filter, self.order, self.skip - 1)
            .await;
        let row = match probe {
            Ok(row) => row,
            Err(e) => {
                self.state = State::Failed;
                return Err(e);
            }
        };
        self.state = match row.as_ref().map(|r| Cursor::at(r, self.order)) {
            None => State::Done(StopReason::SkipBeyondEnd),
            Some(None) => {
                tracing::warn!(
                    source = self.source.id(),
                    skip = self.skip,
                    "Skip boundary row has no ordering value"
                );
                State::Done(StopReason::CursorUnavailable)
            }
            Some(Some(cursor)) => {
                tracing::debug!(skip = self.skip, ?cursor, "Resolved skip boundary");
                self.cursor = Some(cursor);
                State::Fetching
            }
        };
        Ok(())
    }

    async fn fetch(&mut self) -> Result<Option<Vec<Record>>, SourceError> {
        if self.remaining == 0 {
            self.state = State::Done(StopReason::BudgetExhausted);
            return Ok(None);
        }
        if self.pages >= self.limits.max_batches {
            tracing::warn!(
                source = self.source.id(),
                task_type = self.filter.task_type(),
                pages = self.pages,
                "Reached fetch cap, returning rows gathered so far"
            );
            self.state = State::Done(StopReason::BatchCap);
            return Ok(None);
        }

        let requested = usize::try_from(self.remaining)
            .unwrap_or(usize::MAX)
            .min(self.limits.batch_size);
        let request = PageRequest {
            filter: self.filter,
            cursor: self.cursor.as_ref(),
            order: self.order,
            projection: self.projection,
            limit: requested,
        };
        let mut page = match self.source.fetch_page(request).await {
            Ok(page) => page,
            Err(e) => {
                self.state = State::Failed;
                return Err(e);
            }
        };
        self.pages += 1;

        if page.rows.is_empty() {
            self.state = State::Done(StopReason::EmptyPage);
            return Ok(None);
        }
        if page.rows.len() > requested {
            page.rows.truncate(requested);
            page.next_cursor = page.rows.last().and_then(|r| Cursor::at(r, self.order));
        }

        // Accumulating
        let fetched = page.rows.len();
        self.rows_fetched += fetched as u64;
        self.remaining = self.remaining.saturating_sub(fetched as u64);
        let kept = self.dedup.extend(page.rows);
        let batch = self.dedup.take_batch();

        tracing::info!(
            source = self.source.id(),
            task_type = self.filter.task_type(),
            page = self.pages,
            fetched,
            kept,
            remaining = self.remaining,
            "Fetched page"
        );

        self.state = if fetched < requested {
            State::Done(StopReason::ShortPage)
        } else if self.remaining == 0 {
            State::Done(StopReason::BudgetExhausted)
        } else if let Some(next) = page.next_cursor {
            self.cursor = Some(next);
            State::Fetching
        } else {
            tracing::warn!(
                source = self.source.id(),
                page = self.pages,
                "Last row of page has no ordering value, stopping"
            );
            State::Done(StopReason::CursorUnavailable)
        };
        Ok(Some(batch))
    }

    /// Terminal reason, once the scan has ended normally.
    #[must_use]
    pub fn stop_reason(&self) -> Option<StopReason> {
        match self.state {
            State::Done(reason) => Some(reason),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self.state, State::Done(_) | State::Failed)
    }

    #[must_use]
    pub fn pages_fetched(&self) -> u32 {
        self.pages
    }

    #[must_use]
    pub fn rows_fetched(&self) -> u64 {
        self.rows_fetched
    }

    #[must_use]
    pub fn dedup(&self) -> &Deduplicator {
        &self.dedup
    }
}
