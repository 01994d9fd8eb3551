//! In-memory paged source.
//!
//! Serves fixture records with the same ordering and cursor semantics a
//! database source provides. Used for local dry runs (`source.kind:
//! fixture`) and throughout the test suites, where its call counters and
//! failure injection make fetch behavior observable.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Deserialize;
use siphon_types::{
    Cursor, Discriminator, Filter, Record, ScanOrder, SourceError, Value,
};

use crate::source::{Page, PageRequest, PagedSource, Projection};

/// Source operations that can be counted and made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceOp {
    FetchPage,
    FetchByKeys,
    ProbeAt,
    Count,
}

/// Snapshot of how many times each operation was called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub fetch_page: u64,
    pub fetch_by_keys: u64,
    pub probe_at: u64,
    pub count: u64,
}

#[derive(Debug, Default)]
struct Counters {
    fetch_page: AtomicU64,
    fetch_by_keys: AtomicU64,
    probe_at: AtomicU64,
    count: AtomicU64,
}

impl Counters {
    fn slot(&self, op: SourceOp) -> &AtomicU64 {
        match op {
            SourceOp::FetchPage => &self.fetch_page,
            SourceOp::FetchByKeys => &self.fetch_by_keys,
            SourceOp::ProbeAt => &self.probe_at,
            SourceOp::Count => &self.count,
        }
    }
}

/// Records held in memory, partitioned by discriminator.
#[derive(Debug, Default)]
pub struct MemorySource {
    datasets: HashMap<Discriminator, Vec<Record>>,
    counters: Counters,
    // op -> number of calls that succeed before every later call fails
    fail_after: HashMap<SourceOp, u64>,
}

impl MemorySource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add rows to the dataset selected by `discriminator`.
    #[must_use]
    pub fn with_dataset(mut self, discriminator: Discriminator, rows: Vec<Record>) -> Self {
        self.insert(discriminator, rows);
        self
    }

    pub fn insert(&mut self, discriminator: Discriminator, rows: Vec<Record>) {
        self.datasets.entry(discriminator).or_default().extend(rows);
    }

    /// Let the first `succeed` calls of `op` through, then fail every later
    /// call with a query error.
    #[must_use]
    pub fn fail_on(mut self, op: SourceOp, succeed: u64) -> Self {
        self.fail_after.insert(op, succeed);
        self
    }

    #[must_use]
    pub fn calls(&self) -> CallCounts {
        CallCounts {
            fetch_page: self.counters.fetch_page.load(Ordering::Relaxed),
            fetch_by_keys: self.counters.fetch_by_keys.load(Ordering::Relaxed),
            probe_at: self.counters.probe_at.load(Ordering::Relaxed),
            count: self.counters.count.load(Ordering::Relaxed),
        }
    }

    /// Total rows across all datasets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.datasets.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load a JSON-lines fixture. Each line is one row:
    ///
    /// ```json
    /// {"task_type":"gender","country_code":"US","key":"15550001111",
    ///  "inserted_at":"2025-01-01 10:00:00","fields":{"age":31,"sex":1}}
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a config error if the file cannot be read or a line is
    /// malformed.
    pub fn from_jsonl(path: &Path) -> Result<Self, SourceError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SourceError::config(format!("cannot read fixture {}: {e}", path.display()))
        })?;
        let mut source = Self::new();
        let mut loaded = 0_usize;
        for (i, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let row: FixtureRow = serde_json::from_str(line).map_err(|e| {
                SourceError::config(format!("{}:{}: {e}", path.display(), i + 1))
            })?;
            let (discriminator, record) = row.into_record().map_err(|msg| {
                SourceError::config(format!("{}:{}: {msg}", path.display(), i + 1))
            })?;
            source.insert(discriminator, vec![record]);
            loaded += 1;
        }
        tracing::info!(path = %path.display(), rows = loaded, "Loaded fixture source");
        Ok(source)
    }

    fn enter(&self, op: SourceOp) -> Result<(), SourceError> {
        let call = self.counters.slot(op).fetch_add(1, Ordering::Relaxed) + 1;
        match self.fail_after.get(&op) {
            Some(&succeed) if call > succeed => Err(SourceError::query(format!(
                "injected failure on {op:?} call {call}"
            ))),
            _ => Ok(()),
        }
    }

    fn matching(&self, filter: &Filter) -> Vec<&Record> {
        self.datasets
            .get(&filter.discriminator)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).collect())
            .unwrap_or_default()
    }

    fn sorted(&self, filter: &Filter, order: ScanOrder) -> Vec<&Record> {
        let mut rows = self.matching(filter);
        rows.sort_by(|a, b| order.compare(a, b));
        rows
    }
}

fn project(record: &Record, projection: Projection) -> Record {
    match projection {
        Projection::Full => record.clone(),
        Projection::KeyOnly => Record::new(record.key(), record.inserted_at()),
    }
}

#[async_trait]
impl PagedSource for MemorySource {
    fn id(&self) -> &str {
        "memory"
    }

    async fn fetch_page(&self, request: PageRequest<'_>) -> Result<Page, SourceError> {
        self.enter(SourceOp::FetchPage)?;
        if let Some(cursor) = request.cursor {
            if cursor.order() != request.order {
                return Err(SourceError::query(format!(
                    "cursor for {:?} used with {:?} scan",
                    cursor.order(),
                    request.order
                )));
            }
        }
        let rows: Vec<Record> = self
            .sorted(request.filter, request.order)
            .into_iter()
            .filter(|r| request.cursor.map_or(true, |c: &Cursor| c.admits(r)))
            .take(request.limit)
            .map(|r| project(r, request.projection))
            .collect();
        Ok(Page::from_rows(rows, request.order))
    }

    async fn fetch_by_keys(
        &self,
        keys: &[String],
        filter: &Filter,
    ) -> Result<Vec<Record>, SourceError> {
        self.enter(SourceOp::FetchByKeys)?;
        let wanted: HashSet<&str> = keys.iter().map(String::as_str).collect();
        Ok(self
            .sorted(filter, ScanOrder::KeyAsc)
            .into_iter()
            .filter(|r| wanted.contains(r.key()))
            .cloned()
            .collect())
    }

    async fn probe_at(
        &self,
        filter: &Filter,
        order: ScanOrder,
        position: u64,
    ) -> Result<Option<Record>, SourceError> {
        self.enter(SourceOp::ProbeAt)?;
        let position = usize::try_from(position).unwrap_or(usize::MAX);
        Ok(self.sorted(filter, order).get(position).map(|r| (*r).clone()))
    }

    async fn count(&self, filter: &Filter) -> Result<u64, SourceError> {
        self.enter(SourceOp::Count)?;
        Ok(self.matching(filter).len() as u64)
    }
}

#[derive(Debug, Deserialize)]
struct FixtureRow {
    task_type: String,
    country_code: String,
    key: String,
    #[serde(default)]
    inserted_at: Option<String>,
    #[serde(default)]
    fields: serde_json::Map<String, serde_json::Value>,
}

impl FixtureRow {
    fn into_record(self) -> Result<(Discriminator, Record), String> {
        let inserted_at = self
            .inserted_at
            .as_deref()
            .map(parse_timestamp)
            .transpose()?;
        let mut record = Record::new(self.key, inserted_at);
        for (name, value) in self.fields {
            record = record.with_field(name, json_to_value(value));
        }
        Ok((Discriminator::new(self.task_type, &self.country_code), record))
    }
}

fn parse_timestamp(text: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(text, siphon_types::value::TIMESTAMP_FORMAT)
        .or_else(|_| text.parse::<NaiveDateTime>())
        .map_err(|e| format!("invalid inserted_at '{text}': {e}"))
}

fn json_to_value(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Int(i64::from(b)),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => n.as_f64().map_or(Value::Null, Value::Float),
        },
        serde_json::Value::String(s) => Value::Text(s),
        other => Value::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use siphon_types::Predicate;
    use std::io::Write;

    fn ts(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 2, 2)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn source() -> MemorySource {
        let d = Discriminator::new("gender", "US");
        MemorySource::new().with_dataset(
            d,
            vec![
                Record::new("b", Some(ts(1))).with_field("age", 20_i64),
                Record::new("a", Some(ts(2))).with_field("age", 40_i64),
                Record::new("a", Some(ts(3))).with_field("age", 41_i64),
                Record::new("c", Some(ts(0))).with_field("age", 60_i64),
            ],
        )
    }

    fn filter() -> Filter {
        Filter::new(Discriminator::new("gender", "us"))
    }

    #[tokio::test]
    async fn filters_are_applied_at_the_source() {
        let f = filter().with(Predicate::Range {
            field: "age".into(),
            min: Some(30),
            max: Some(50),
        });
        assert_eq!(source().count(&f).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn key_lookup_returns_newest_first_per_key() {
        let rows = source()
            .fetch_by_keys(&["a".into(), "c".into()], &filter())
            .await
            .unwrap();
        let got: Vec<_> = rows.iter().map(|r| (r.key(), r.inserted_at())).collect();
        assert_eq!(
            got,
            vec![("a", Some(ts(3))), ("a", Some(ts(2))), ("c", Some(ts(0)))]
        );
    }

    #[tokio::test]
    async fn key_only_projection_strips_fields() {
        let f = filter();
        let page = source()
            .fetch_page(PageRequest {
                filter: &f,
                cursor: None,
                order: ScanOrder::KeyAsc,
                projection: Projection::KeyOnly,
                limit: 10,
            })
            .await
            .unwrap();
        assert_eq!(page.len(), 4);
        assert!(page.rows.iter().all(|r| r.fields().next().is_none()));
    }

    #[tokio::test]
    async fn unknown_discriminator_is_empty() {
        let f = Filter::new(Discriminator::new("gender", "BR"));
        assert_eq!(source().count(&f).await.unwrap(), 0);
        assert!(source()
            .probe_at(&f, ScanOrder::RecencyDesc, 0)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn injected_failures_start_after_the_allowed_calls() {
        let s = source().fail_on(SourceOp::Count, 1);
        assert!(s.count(&filter()).await.is_ok());
        let err = s.count(&filter()).await.unwrap_err();
        assert_eq!(err.kind, siphon_types::SourceErrorKind::Query);
        assert_eq!(s.calls().count, 2);
    }

    #[tokio::test]
    async fn loads_jsonl_fixture() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"task_type":"gender","country_code":"us","key":"1","inserted_at":"2025-01-01 10:00:00","fields":{{"age":31,"sex":"1","pic":null}}}}"#
        )
        .unwrap();
        writeln!(file).unwrap();
        writeln!(
            file,
            r#"{{"task_type":"gender","country_code":"US","key":"2","inserted_at":"2025-01-01T09:00:00"}}"#
        )
        .unwrap();
        let source = MemorySource::from_jsonl(file.path()).unwrap();
        assert_eq!(source.len(), 2);
        let first = source
            .probe_at(&filter(), ScanOrder::RecencyDesc, 0)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.key(), "1");
        assert_eq!(first.field("age"), Some(&Value::Int(31)));
        assert_eq!(first.field("pic"), Some(&Value::Null));
    }

    #[test]
    fn malformed_fixture_line_names_the_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{not json").unwrap();
        let err = MemorySource::from_jsonl(file.path()).unwrap_err();
        assert!(err.message.contains(":1:"));
    }
}
