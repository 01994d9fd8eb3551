//! Row decoding into records.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use siphon_types::{Record, SourceError, Value};
use tokio_postgres::types::Type;
use tokio_postgres::Row;

use crate::config::TableRouting;

/// Decode one row. The key and ordering columns become the record key and
/// timestamp; every other column becomes a field.
pub(crate) fn decode_row(row: &Row, routing: &TableRouting) -> Result<Record, SourceError> {
    let mut key = String::new();
    let mut inserted_at = None;
    let mut fields = Vec::with_capacity(row.len());

    for (idx, column) in row.columns().iter().enumerate() {
        let name = column.name();
        let value = decode_value(row, idx, column.type_())?;
        if name == routing.key_column {
            key = value.render().unwrap_or_default();
        } else if name == routing.inserted_at_column {
            inserted_at = value.as_timestamp();
        } else {
            fields.push((name.to_string(), value));
        }
    }

    Ok(fields
        .into_iter()
        .fold(Record::new(key, inserted_at), |record, (name, value)| {
            record.with_field(name, value)
        }))
}

fn decode_value(row: &Row, idx: usize, ty: &Type) -> Result<Value, SourceError> {
    let err = |e: tokio_postgres::Error| {
        SourceError::decode(format!(
            "column '{}' ({ty}): {e}",
            row.columns()[idx].name()
        ))
    };
    // tokio-postgres `try_get()` requires exact type matches, so dispatch on
    // the declared column type.
    let value = match *ty {
        Type::INT2 => row.try_get::<_, Option<i16>>(idx).map_err(err)?.map(i64::from).into(),
        Type::INT4 => row.try_get::<_, Option<i32>>(idx).map_err(err)?.map(i64::from).into(),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx).map_err(err)?.into(),
        Type::FLOAT4 => row.try_get::<_, Option<f32>>(idx).map_err(err)?.map(f64::from).into(),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx).map_err(err)?.into(),
        Type::BOOL => row
            .try_get::<_, Option<bool>>(idx)
            .map_err(err)?
            .map(i64::from)
            .into(),
        Type::TIMESTAMP => row.try_get::<_, Option<NaiveDateTime>>(idx).map_err(err)?.into(),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)
            .map_err(err)?
            .map(|dt| dt.naive_utc())
            .into(),
        Type::DATE => row
            .try_get::<_, Option<NaiveDate>>(idx)
            .map_err(err)?
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .into(),
        _ => match row.try_get::<_, Option<String>>(idx) {
            Ok(text) => text.into(),
            Err(_) => {
                tracing::debug!(
                    column = row.columns()[idx].name(),
                    pg_type = %ty,
                    "Unsupported column type, reading as NULL"
                );
                Value::Null
            }
        },
    };
    Ok(value)
}
