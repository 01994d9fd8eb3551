//! SQL builders for paged, key-set, probe, and count reads.
//!
//! Every value reaches the server as a bind parameter; identifiers are
//! quoted. Predicates are pushed down in full.

use pg_escape::quote_identifier;
use siphon_types::{Cursor, Filter, Predicate, ScanOrder, SourceError};
use tokio_postgres::types::ToSql;

use siphon_engine::Projection;

use crate::config::TableRouting;

/// Cursor timestamps keep microseconds, the server's timestamp precision.
const CURSOR_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum BindParam {
    Int64(i64),
    Text(String),
    TextArray(Vec<String>),
}

impl BindParam {
    pub(crate) fn as_tosql(&self) -> &(dyn ToSql + Sync) {
        match self {
            Self::Int64(v) => v,
            Self::Text(v) => v,
            Self::TextArray(v) => v,
        }
    }
}

#[derive(Debug)]
pub(crate) struct SqlQuery {
    pub(crate) sql: String,
    pub(crate) binds: Vec<BindParam>,
}

impl SqlQuery {
    pub(crate) fn params(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.binds.iter().map(BindParam::as_tosql).collect()
    }
}

/// WHERE clause under construction.
#[derive(Default)]
struct Conditions {
    clauses: Vec<String>,
    binds: Vec<BindParam>,
}

impl Conditions {
    /// Register a bind and return its placeholder with `cast` applied.
    fn bind(&mut self, param: BindParam, cast: &str) -> String {
        self.binds.push(param);
        format!("${}::{cast}", self.binds.len())
    }

    fn push(&mut self, clause: String) {
        self.clauses.push(clause);
    }

    fn sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }
}

fn filter_conditions(routing: &TableRouting, filter: &Filter) -> Conditions {
    let mut cond = Conditions::default();
    let task_type = filter.task_type();
    let disc = quote_identifier(&routing.discriminator_column);
    let p = cond.bind(BindParam::Text(task_type.to_string()), "text");
    cond.push(format!("{disc} = {p}"));

    for predicate in &filter.predicates {
        let col = quote_identifier(predicate.field());
        match predicate {
            Predicate::Range { min, max, .. } => {
                if let Some(min) = min {
                    let p = cond.bind(BindParam::Int64(*min), "bigint");
                    cond.push(format!("{col} >= {p}"));
                }
                if let Some(max) = max {
                    let p = cond.bind(BindParam::Int64(*max), "bigint");
                    cond.push(format!("{col} <= {p}"));
                }
            }
            Predicate::OneOf { field, values } => {
                let encoded = encode_all(routing, task_type, field, values);
                let p = cond.bind(BindParam::TextArray(encoded), "text[]");
                cond.push(format!("{col}::text = ANY({p})"));
            }
            Predicate::NoneOf { field, values } => {
                let encoded = encode_all(routing, task_type, field, values);
                let p = cond.bind(BindParam::TextArray(encoded), "text[]");
                cond.push(format!("({col} IS NOT NULL AND NOT ({col}::text = ANY({p})))"));
            }
            Predicate::Empty { empty: true, .. } => {
                cond.push(format!("({col} IS NULL OR {col}::text = '')"));
            }
            Predicate::Empty { empty: false, .. } => {
                cond.push(format!("({col} IS NOT NULL AND {col}::text <> '')"));
            }
        }
    }
    cond
}

fn encode_all(routing: &TableRouting, task_type: &str, field: &str, values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| routing.encode(task_type, field, v).to_string())
        .collect()
}

fn order_by(routing: &TableRouting, order: ScanOrder) -> String {
    let key = quote_identifier(&routing.key_column);
    let ts = quote_identifier(&routing.inserted_at_column);
    match order {
        ScanOrder::RecencyDesc => format!(" ORDER BY {ts} DESC NULLS LAST, {key} ASC"),
        ScanOrder::KeyAsc => format!(" ORDER BY {key} ASC, {ts} DESC NULLS LAST"),
    }
}

fn select_list(routing: &TableRouting, projection: Projection) -> String {
    match projection {
        Projection::Full => "*".to_string(),
        Projection::KeyOnly => format!(
            "{}, {}",
            quote_identifier(&routing.key_column),
            quote_identifier(&routing.inserted_at_column)
        ),
    }
}

fn cursor_condition(
    routing: &TableRouting,
    cursor: &Cursor,
    order: ScanOrder,
    cond: &mut Conditions,
) -> Result<(), SourceError> {
    if cursor.order() != order {
        return Err(SourceError::query(format!(
            "cursor for {:?} used with {:?} scan",
            cursor.order(),
            order
        )));
    }
    let key = quote_identifier(&routing.key_column);
    let ts = quote_identifier(&routing.inserted_at_column);
    match cursor {
        Cursor::Recency { inserted_at, key: last_key } => {
            // Sessions run in UTC (see client.rs), so a timestamptz column
            // compares against this naive UTC value without a zone shift.
            let at = cond.bind(
                BindParam::Text(inserted_at.format(CURSOR_TIMESTAMP_FORMAT).to_string()),
                "text::timestamp",
            );
            let k = cond.bind(BindParam::Text(last_key.clone()), "text");
            cond.push(format!(
                "({ts} < {at} OR ({ts} = {at} AND {key} > {k}) OR {ts} IS NULL)"
            ));
        }
        Cursor::Key { key: last_key } => {
            let k = cond.bind(BindParam::Text(last_key.clone()), "text");
            cond.push(format!("{key} > {k}"));
        }
    }
    Ok(())
}

/// Next page after `cursor`.
pub(crate) fn page_query(
    routing: &TableRouting,
    table: &str,
    filter: &Filter,
    cursor: Option<&Cursor>,
    order: ScanOrder,
    projection: Projection,
    limit: usize,
) -> Result<SqlQuery, SourceError> {
    let mut cond = filter_conditions(routing, filter);
    if let Some(cursor) = cursor {
        cursor_condition(routing, cursor, order, &mut cond)?;
    }
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let p = cond.bind(BindParam::Int64(limit), "bigint");
    let sql = format!(
        "SELECT {} FROM {}{}{} LIMIT {p}",
        select_list(routing, projection),
        quote_identifier(table),
        cond.sql(),
        order_by(routing, order),
    );
    Ok(SqlQuery {
        sql,
        binds: cond.binds,
    })
}

/// Rows for a key set, newest first within each key.
pub(crate) fn keys_query(
    routing: &TableRouting,
    table: &str,
    filter: &Filter,
    keys: &[String],
) -> SqlQuery {
    let mut cond = filter_conditions(routing, filter);
    let key = quote_identifier(&routing.key_column);
    let p = cond.bind(BindParam::TextArray(keys.to_vec()), "text[]");
    cond.push(format!("{key} = ANY({p})"));
    let sql = format!(
        "SELECT * FROM {}{}{}",
        quote_identifier(table),
        cond.sql(),
        order_by(routing, ScanOrder::KeyAsc),
    );
    SqlQuery {
        sql,
        binds: cond.binds,
    }
}

/// Single row at `position` in `order`.
pub(crate) fn probe_query(
    routing: &TableRouting,
    table: &str,
    filter: &Filter,
    order: ScanOrder,
    position: u64,
) -> SqlQuery {
    let mut cond = filter_conditions(routing, filter);
    let offset = i64::try_from(position).unwrap_or(i64::MAX);
    let p = cond.bind(BindParam::Int64(offset), "bigint");
    let sql = format!(
        "SELECT {} FROM {}{}{} LIMIT 1 OFFSET {p}",
        select_list(routing, Projection::KeyOnly),
        quote_identifier(table),
        cond.sql(),
        order_by(routing, order),
    );
    SqlQuery {
        sql,
        binds: cond.binds,
    }
}

pub(crate) fn count_query(routing: &TableRouting, table: &str, filter: &Filter) -> SqlQuery {
    let cond = filter_conditions(routing, filter);
    let sql = format!("SELECT COUNT(*) FROM {}{}", quote_identifier(table), cond.sql());
    SqlQuery {
        sql,
        binds: cond.binds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use siphon_types::{Discriminator, Record};

    use crate::config::ValueEncoding;

    fn routing() -> TableRouting {
        TableRouting::default()
    }

    fn gender() -> Filter {
        Filter::new(Discriminator::new("gender", "US"))
    }

    #[test]
    fn first_page_orders_by_recency() {
        let q = page_query(
            &routing(),
            "ts_ws_task_record_US",
            &gender(),
            None,
            ScanOrder::RecencyDesc,
            Projection::Full,
            10_000,
        )
        .unwrap();
        assert_eq!(
            q.sql,
            "SELECT * FROM \"ts_ws_task_record_US\" WHERE task_type = $1::text \
             ORDER BY create_time DESC NULLS LAST, phone ASC LIMIT $2::bigint"
        );
        assert_eq!(
            q.binds,
            vec![BindParam::Text("gender".into()), BindParam::Int64(10_000)]
        );
    }

    #[test]
    fn recency_cursor_breaks_timestamp_ties_by_key() {
        let at = NaiveDate::from_ymd_opt(2025, 3, 1)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        let cursor = Cursor::Recency {
            inserted_at: at,
            key: "155".into(),
        };
        let q = page_query(
            &routing(),
            "t_US",
            &gender(),
            Some(&cursor),
            ScanOrder::RecencyDesc,
            Projection::Full,
            5,
        )
        .unwrap();
        assert!(q.sql.contains(
            "(create_time < $2::text::timestamp OR (create_time = $2::text::timestamp \
             AND phone > $3::text) OR create_time IS NULL)"
        ));
        assert_eq!(q.binds[1], BindParam::Text("2025-03-01 08:30:00.000000".into()));
        assert_eq!(q.binds[2], BindParam::Text("155".into()));
        assert_eq!(q.binds.len(), 4);
    }

    #[test]
    fn recency_cursor_keeps_fractional_seconds() {
        let at = NaiveDate::from_ymd_opt(2025, 3, 1)
            .unwrap()
            .and_hms_milli_opt(8, 30, 0, 500)
            .unwrap();
        let cursor = Cursor::Recency {
            inserted_at: at,
            key: "155".into(),
        };
        let earlier_in_same_second = Record::new(
            "200",
            NaiveDate::from_ymd_opt(2025, 3, 1)
                .unwrap()
                .and_hms_milli_opt(8, 30, 0, 300),
        );
        assert!(cursor.admits(&earlier_in_same_second));

        let q = page_query(
            &routing(),
            "t_US",
            &gender(),
            Some(&cursor),
            ScanOrder::RecencyDesc,
            Projection::Full,
            5,
        )
        .unwrap();
        assert_eq!(q.binds[1], BindParam::Text("2025-03-01 08:30:00.500000".into()));
    }

    #[test]
    fn key_scan_projects_key_only() {
        let cursor = Cursor::Key { key: "100".into() };
        let q = page_query(
            &routing(),
            "t_US",
            &gender(),
            Some(&cursor),
            ScanOrder::KeyAsc,
            Projection::KeyOnly,
            10,
        )
        .unwrap();
        assert!(q.sql.starts_with("SELECT phone, create_time FROM"));
        assert!(q.sql.contains("phone > $2::text"));
        assert!(q.sql.contains("ORDER BY phone ASC, create_time DESC NULLS LAST"));
    }

    #[test]
    fn mismatched_cursor_is_rejected() {
        let cursor = Cursor::Key { key: "1".into() };
        let err = page_query(
            &routing(),
            "t_US",
            &gender(),
            Some(&cursor),
            ScanOrder::RecencyDesc,
            Projection::Full,
            10,
        )
        .unwrap_err();
        assert!(err.to_string().contains("cursor"));
    }

    #[test]
    fn predicates_push_down_with_binds() {
        let filter = gender()
            .with(Predicate::Range {
                field: "age".into(),
                min: Some(18),
                max: None,
            })
            .with(Predicate::NoneOf {
                field: "skin".into(),
                values: vec!["2".into()],
            })
            .with(Predicate::Empty {
                field: "user_name".into(),
                empty: false,
            });
        let q = count_query(&routing(), "t_US", &filter);
        assert_eq!(
            q.sql,
            "SELECT COUNT(*) FROM \"t_US\" WHERE task_type = $1::text AND age >= $2::bigint \
             AND (skin IS NOT NULL AND NOT (skin::text = ANY($3::text[]))) \
             AND (user_name IS NOT NULL AND user_name::text <> '')"
        );
        assert_eq!(q.params().len(), 3);
    }

    #[test]
    fn membership_values_use_stored_encoding() {
        let mut routing = routing();
        routing.encodings.push(ValueEncoding {
            task_types: vec!["sieveLive".into()],
            field: "sex".into(),
            values: [("1".to_string(), "男".to_string())].into_iter().collect(),
        });
        let filter = Filter::new(Discriminator::new("sieveLive", "US")).with(Predicate::OneOf {
            field: "sex".into(),
            values: vec!["1".into()],
        });
        let q = count_query(&routing, "t_US", &filter);
        assert!(q.sql.contains("sex::text = ANY($2::text[])"));
        assert_eq!(q.binds[1], BindParam::TextArray(vec!["男".into()]));
    }

    #[test]
    fn key_lookup_and_probe() {
        let keys = vec!["1".to_string(), "2".to_string()];
        let q = keys_query(&routing(), "t_US", &gender(), &keys);
        assert!(q.sql.contains("phone = ANY($2::text[])"));
        assert!(q.sql.ends_with("ORDER BY phone ASC, create_time DESC NULLS LAST"));

        let q = probe_query(&routing(), "t_US", &gender(), ScanOrder::RecencyDesc, 499);
        assert!(q.sql.ends_with("LIMIT 1 OFFSET $2::bigint"));
        assert_eq!(q.binds[1], BindParam::Int64(499));
    }
}
