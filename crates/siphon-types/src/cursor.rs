//! Paging cursors for OFFSET-free scans.
//!
//! A cursor marks the last row returned by a page so the next page can be
//! requested as "everything strictly after this row" in the scan order.
//! Reusing a cursor is idempotent: the same cursor yields the same next
//! page, modulo concurrent inserts.

use std::cmp::Ordering;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::record::Record;

/// Row order requested from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanOrder {
    /// `inserted_at DESC, key ASC`: newest rows first, ties broken by key.
    RecencyDesc,
    /// `key ASC, inserted_at DESC`: exhaustive key enumeration.
    KeyAsc,
}

impl ScanOrder {
    /// Total order over records matching what the store is asked for.
    ///
    /// Rows without an insertion timestamp sort after every timestamped row,
    /// mirroring `NULLS LAST` on a descending column.
    #[must_use]
    pub fn compare(self, a: &Record, b: &Record) -> Ordering {
        match self {
            Self::RecencyDesc => newest_first(a.inserted_at(), b.inserted_at())
                .then_with(|| a.key().cmp(b.key())),
            Self::KeyAsc => a
                .key()
                .cmp(b.key())
                .then_with(|| newest_first(a.inserted_at(), b.inserted_at())),
        }
    }
}

fn newest_first(a: Option<NaiveDateTime>, b: Option<NaiveDateTime>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Position of the last row handed out by a page.
///
/// Serializes with an explicit tag:
/// `{"type": "key", "key": "15550001111"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Cursor {
    /// Position in a [`ScanOrder::RecencyDesc`] scan.
    Recency {
        inserted_at: NaiveDateTime,
        key: String,
    },
    /// Position in a [`ScanOrder::KeyAsc`] scan.
    Key { key: String },
}

impl Cursor {
    /// Cursor positioned on `record` for the given scan order.
    ///
    /// Returns `None` when the record carries no ordering value, in which
    /// case the scan cannot continue past it.
    #[must_use]
    pub fn at(record: &Record, order: ScanOrder) -> Option<Self> {
        match order {
            ScanOrder::RecencyDesc => record.inserted_at().map(|inserted_at| Self::Recency {
                inserted_at,
                key: record.key().to_string(),
            }),
            ScanOrder::KeyAsc => Some(Self::Key {
                key: record.key().to_string(),
            }),
        }
    }

    #[must_use]
    pub fn order(&self) -> ScanOrder {
        match self {
            Self::Recency { .. } => ScanOrder::RecencyDesc,
            Self::Key { .. } => ScanOrder::KeyAsc,
        }
    }

    /// Whether `record` lies strictly after this cursor in the cursor's
    /// scan order.
    #[must_use]
    pub fn admits(&self, record: &Record) -> bool {
        match self {
            Self::Recency { inserted_at, key } => match record.inserted_at() {
                Some(ts) => ts < *inserted_at || (ts == *inserted_at && record.key() > key.as_str()),
                None => true,
            },
            // Key scans skip the remaining duplicates of the cursor key.
            Self::Key { key } => record.key() > key.as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn recency_order_is_newest_first_then_key() {
        let mut rows = vec![
            Record::new("b", Some(at(1))),
            Record::new("a", Some(at(3))),
            Record::new("c", None),
            Record::new("a", Some(at(1))),
        ];
        rows.sort_by(|x, y| ScanOrder::RecencyDesc.compare(x, y));
        let keys: Vec<_> = rows.iter().map(|r| (r.key(), r.inserted_at())).collect();
        assert_eq!(
            keys,
            vec![
                ("a", Some(at(3))),
                ("a", Some(at(1))),
                ("b", Some(at(1))),
                ("c", None)
            ]
        );
    }

    #[test]
    fn key_order_puts_newest_duplicate_first() {
        let mut rows = vec![
            Record::new("b", Some(at(1))),
            Record::new("a", Some(at(1))),
            Record::new("a", Some(at(5))),
        ];
        rows.sort_by(|x, y| ScanOrder::KeyAsc.compare(x, y));
        assert_eq!(rows[0].inserted_at(), Some(at(5)));
        assert_eq!(rows[2].key(), "b");
    }

    #[test]
    fn recency_cursor_breaks_timestamp_ties_by_key() {
        let cursor = Cursor::at(&Record::new("m", Some(at(2))), ScanOrder::RecencyDesc).unwrap();
        assert!(cursor.admits(&Record::new("z", Some(at(2)))));
        assert!(!cursor.admits(&Record::new("a", Some(at(2)))));
        assert!(!cursor.admits(&Record::new("m", Some(at(2)))));
        assert!(cursor.admits(&Record::new("a", Some(at(1)))));
        assert!(!cursor.admits(&Record::new("z", Some(at(3)))));
    }

    #[test]
    fn key_cursor_skips_remaining_duplicates() {
        let cursor = Cursor::at(&Record::new("200", None), ScanOrder::KeyAsc).unwrap();
        assert!(!cursor.admits(&Record::new("200", Some(at(1)))));
        assert!(cursor.admits(&Record::new("201", None)));
    }

    #[test]
    fn record_without_timestamp_has_no_recency_cursor() {
        assert!(Cursor::at(&Record::new("1", None), ScanOrder::RecencyDesc).is_none());
        assert!(Cursor::at(&Record::new("1", None), ScanOrder::KeyAsc).is_some());
    }

    #[test]
    fn cursor_json_format() {
        let cursor = Cursor::Key { key: "42".into() };
        let json = serde_json::to_value(&cursor).unwrap();
        assert_eq!(json, serde_json::json!({"type": "key", "key": "42"}));
        let back: Cursor = serde_json::from_value(json).unwrap();
        assert_eq!(back, cursor);
        assert_eq!(back.order(), ScanOrder::KeyAsc);
    }
}
