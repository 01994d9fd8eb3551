//! Record projection onto output schemas.

use std::collections::HashMap;

use siphon_types::{ColumnSpec, JoinedRecord, Record, Schema, SchemaError, Value};

/// Project `record` through `schema`, prefixing every label.
///
/// A column reads its source field, then its fallback field when the
/// source is absent or NULL. Columns with neither are omitted. Mapped
/// columns are rendered to text and translated.
#[must_use]
pub fn project(record: &Record, schema: &Schema, label_prefix: &str) -> Vec<(String, Value)> {
    schema
        .columns
        .iter()
        .filter_map(|column| {
            let value = read_column(record, column)?;
            Some((format!("{label_prefix}{}", column.label), value))
        })
        .collect()
}

fn read_column(record: &Record, column: &ColumnSpec) -> Option<Value> {
    let raw = if column.key {
        Value::Text(record.key().to_string())
    } else {
        present(record, &column.source)
            .or_else(|| column.fallback.as_deref().and_then(|f| present(record, f)))?
            .clone()
    };
    match &column.mapping {
        Some(mapping) => {
            let text = raw.render()?;
            Some(Value::Text(mapping.apply(&text).to_string()))
        }
        None => Some(raw),
    }
}

fn present<'r>(record: &'r Record, field: &str) -> Option<&'r Value> {
    record.field(field).filter(|v| !v.is_null())
}

/// Fixed column order for one or two `(schema, prefix)` parts.
///
/// The header is decided once, up front, so every row lines up with it
/// regardless of which fields a particular record happened to carry.
#[derive(Debug, Clone)]
pub struct RowLayout {
    parts: Vec<(Schema, String)>,
    labels: Vec<String>,
    index: HashMap<String, usize>,
}

impl RowLayout {
    /// # Errors
    ///
    /// Returns [`SchemaError::DuplicateLabel`] when two parts produce the
    /// same prefixed label.
    pub fn new(parts: Vec<(Schema, String)>) -> Result<Self, SchemaError> {
        let mut labels = Vec::new();
        let mut index = HashMap::new();
        for (schema, prefix) in &parts {
            for label in schema.labels() {
                let full = format!("{prefix}{label}");
                if index.insert(full.clone(), labels.len()).is_some() {
                    return Err(SchemaError::DuplicateLabel {
                        schema: schema.name.clone(),
                        label: full,
                    });
                }
                labels.push(full);
            }
        }
        Ok(Self {
            parts,
            labels,
            index,
        })
    }

    /// Layout for a single schema with unprefixed labels.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema repeats a label.
    pub fn single(schema: Schema) -> Result<Self, SchemaError> {
        Self::new(vec![(schema, String::new())])
    }

    /// Layout for a primary schema followed by a prefixed secondary one.
    ///
    /// # Errors
    ///
    /// Returns an error if the prefixed labels collide.
    pub fn merged(primary: Schema, secondary: Schema, prefix: &str) -> Result<Self, SchemaError> {
        Self::new(vec![(primary, String::new()), (secondary, prefix.to_string())])
    }

    #[must_use]
    pub fn header(&self) -> &[String] {
        &self.labels
    }

    /// Place projected entries into header order; gaps become `Null`.
    #[must_use]
    pub fn arrange(&self, entries: Vec<(String, Value)>) -> Vec<Value> {
        let mut row = vec![Value::Null; self.labels.len()];
        for (label, value) in entries {
            if let Some(&i) = self.index.get(&label) {
                row[i] = value;
            }
        }
        row
    }

    /// Row for a single record, projected through the first part.
    #[must_use]
    pub fn row(&self, record: &Record) -> Vec<Value> {
        let entries = self
            .parts
            .first()
            .map(|(schema, prefix)| project(record, schema, prefix))
            .unwrap_or_default();
        self.arrange(entries)
    }

    /// Row for a joined record: primary through the first part, secondary
    /// through the second.
    #[must_use]
    pub fn joined_row(&self, joined: &JoinedRecord) -> Vec<Value> {
        let mut entries = Vec::new();
        let records = [joined.primary(), joined.secondary()];
        for ((schema, prefix), record) in self.parts.iter().zip(records) {
            entries.extend(project(record, schema, prefix));
        }
        self.arrange(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use siphon_types::CategoricalMap;

    fn gender_schema() -> Schema {
        let sex: CategoricalMap = "-1=识别不出,0=女,1=男".parse().unwrap();
        Schema {
            name: "gender".into(),
            aliases: vec![],
            columns: vec![
                ColumnSpec::key("phone", "号码"),
                ColumnSpec::new("sex", "性别").with_mapping(sex),
                ColumnSpec::new("age", "年龄"),
                ColumnSpec::new("last_online_time", "最后上线时间").with_fallback("status"),
            ],
        }
    }

    #[test]
    fn maps_categorical_values_and_keeps_numbers() {
        let record = Record::new("1555", None)
            .with_field("sex", 1_i64)
            .with_field("age", 33_i64);
        let out = project(&record, &gender_schema(), "");
        assert_eq!(
            out,
            vec![
                ("号码".to_string(), Value::Text("1555".into())),
                ("性别".to_string(), Value::Text("男".into())),
                ("年龄".to_string(), Value::Int(33)),
            ]
        );
    }

    #[test]
    fn unmatched_codes_pass_through() {
        let record = Record::new("1", None).with_field("sex", "9");
        let out = project(&record, &gender_schema(), "");
        assert_eq!(out[1].1, Value::Text("9".into()));
    }

    #[test]
    fn fallback_used_when_source_is_null() {
        let record = Record::new("1", None)
            .with_field("last_online_time", Value::Null)
            .with_field("status", "recently");
        let out = project(&record, &gender_schema(), "");
        assert_eq!(
            out.last(),
            Some(&("最后上线时间".to_string(), Value::Text("recently".into())))
        );
    }

    #[test]
    fn mapped_timestamp_renders_as_text() {
        let ts = NaiveDate::from_ymd_opt(2024, 12, 31)
            .unwrap()
            .and_hms_opt(23, 59, 1)
            .unwrap();
        let schema = Schema {
            name: "t".into(),
            aliases: vec![],
            columns: vec![ColumnSpec::new("seen", "Seen").with_mapping("x=y".parse().unwrap())],
        };
        let out = project(&Record::new("1", None).with_field("seen", ts), &schema, "");
        assert_eq!(out[0].1, Value::Text("2024-12-31 23:59:01".into()));
    }

    #[test]
    fn missing_fields_are_omitted_and_labels_prefixed() {
        let out = project(&Record::new("1", None), &gender_schema(), "副-");
        assert_eq!(out, vec![("副-号码".to_string(), Value::Text("1".into()))]);
    }

    #[test]
    fn layout_fills_gaps_with_null() {
        let layout = RowLayout::single(gender_schema()).unwrap();
        assert_eq!(layout.header().len(), 4);
        let row = layout.row(&Record::new("7", None).with_field("age", 20_i64));
        assert_eq!(
            row,
            vec![Value::Text("7".into()), Value::Null, Value::Int(20), Value::Null]
        );
    }

    #[test]
    fn merged_layout_prefixes_secondary_header() {
        let secondary = Schema::key_only("exists", "phone", "号码");
        let layout = RowLayout::merged(gender_schema(), secondary, "副-").unwrap();
        assert_eq!(layout.header().last().map(String::as_str), Some("副-号码"));

        let joined = JoinedRecord::pair(
            Record::new("5", None).with_field("age", 40_i64),
            Record::new("5", None),
        )
        .unwrap();
        let row = layout.joined_row(&joined);
        assert_eq!(row.len(), 5);
        assert_eq!(row[4], Value::Text("5".into()));
    }

    #[test]
    fn colliding_labels_are_rejected() {
        let a = Schema::key_only("a", "phone", "号码");
        let b = Schema::key_only("b", "phone", "号码");
        assert!(RowLayout::merged(a, b, "").is_err());
    }
}
