//! Output schemas: which fields to emit, under which labels, and how to
//! translate categorical codes into display text.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Schema definition problem, reported when schemas are loaded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("schema name must not be empty")]
    EmptyName,
    #[error("schema '{0}' has no columns")]
    NoColumns(String),
    #[error("schema '{schema}' column {index} has an empty {what}")]
    EmptyColumnPart {
        schema: String,
        index: usize,
        what: &'static str,
    },
    #[error("schema '{schema}' declares label '{label}' more than once")]
    DuplicateLabel { schema: String, label: String },
    #[error("task type '{0}' is claimed by more than one schema")]
    DuplicateName(String),
    #[error("invalid categorical mapping '{expr}': {reason}")]
    BadMapping { expr: String, reason: String },
}

/// Categorical value translation parsed from a `"0=女,1=男"` expression.
///
/// Keys match after trimming both sides; unmatched values pass through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CategoricalMap {
    entries: Vec<(String, String)>,
}

impl CategoricalMap {
    /// Translate `raw`, or `None` when no entry matches.
    #[must_use]
    pub fn lookup(&self, raw: &str) -> Option<&str> {
        let raw = raw.trim();
        self.entries
            .iter()
            .find(|(k, _)| k == raw)
            .map(|(_, v)| v.as_str())
    }

    /// Translate `raw`, passing it through unchanged when no entry matches.
    #[must_use]
    pub fn apply<'a>(&'a self, raw: &'a str) -> &'a str {
        self.lookup(raw).unwrap_or(raw)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromStr for CategoricalMap {
    type Err = SchemaError;

    fn from_str(expr: &str) -> Result<Self, Self::Err> {
        let bad = |reason: &str| SchemaError::BadMapping {
            expr: expr.to_string(),
            reason: reason.to_string(),
        };
        let mut entries = Vec::new();
        for item in expr.split(',') {
            let (key, value) = item
                .split_once('=')
                .ok_or_else(|| bad("every entry must look like key=value"))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(bad("entry has an empty key"));
            }
            if entries.iter().any(|(k, _): &(String, String)| k == key) {
                return Err(bad("key appears more than once"));
            }
            // Values are kept verbatim; a lone space is a deliberate blank.
            entries.push((key.to_string(), value.to_string()));
        }
        Ok(Self { entries })
    }
}

impl TryFrom<String> for CategoricalMap {
    type Error = SchemaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CategoricalMap> for String {
    fn from(map: CategoricalMap) -> Self {
        map.to_string()
    }
}

impl fmt::Display for CategoricalMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}

/// One output column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Source field name as stored.
    pub source: String,
    /// Output header label.
    pub label: String,
    /// Render the record key instead of reading `source`.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<CategoricalMap>,
    /// Field read when `source` is absent or NULL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
}

impl ColumnSpec {
    #[must_use]
    pub fn new(source: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            label: label.into(),
            key: false,
            mapping: None,
            fallback: None,
        }
    }

    #[must_use]
    pub fn key(source: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: true,
            ..Self::new(source, label)
        }
    }

    #[must_use]
    pub fn with_mapping(mut self, mapping: CategoricalMap) -> Self {
        self.mapping = Some(mapping);
        self
    }

    #[must_use]
    pub fn with_fallback(mut self, field: impl Into<String>) -> Self {
        self.fallback = Some(field.into());
        self
    }
}

/// Named, ordered column list for one or more task types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub name: String,
    /// Additional task types served by this schema.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    pub columns: Vec<ColumnSpec>,
}

impl Schema {
    /// Single-column schema that emits only the record key.
    #[must_use]
    pub fn key_only(name: impl Into<String>, source: &str, label: &str) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            columns: vec![ColumnSpec::key(source, label)],
        }
    }

    /// Every task type this schema answers to, its own name first.
    pub fn task_types(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.label.as_str())
    }

    /// Structural checks: non-empty name, at least one column, every
    /// column with a source and a label, labels unique.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.name.trim().is_empty() {
            return Err(SchemaError::EmptyName);
        }
        if self.columns.is_empty() {
            return Err(SchemaError::NoColumns(self.name.clone()));
        }
        let mut seen = HashSet::new();
        for (index, column) in self.columns.iter().enumerate() {
            for (what, part) in [("source", &column.source), ("label", &column.label)] {
                if part.trim().is_empty() {
                    return Err(SchemaError::EmptyColumnPart {
                        schema: self.name.clone(),
                        index,
                        what,
                    });
                }
            }
            if !seen.insert(column.label.as_str()) {
                return Err(SchemaError::DuplicateLabel {
                    schema: self.name.clone(),
                    label: column.label.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_translates_after_trimming() {
        let map: CategoricalMap = "-3=无效,-2=无图片,0=女,1=男".parse().unwrap();
        assert_eq!(map.len(), 4);
        assert_eq!(map.apply("0"), "女");
        assert_eq!(map.apply(" 1 "), "男");
        assert_eq!(map.apply("-2"), "无图片");
        assert_eq!(map.apply("7"), "7");
        assert_eq!(map.lookup("7"), None);
    }

    #[test]
    fn mapping_keeps_blank_values() {
        let map: CategoricalMap = "-1= ,0=黑色".parse().unwrap();
        assert_eq!(map.apply("-1"), " ");
    }

    #[test]
    fn mapping_rejects_malformed_entries() {
        assert!("0=a,1".parse::<CategoricalMap>().is_err());
        assert!("=a".parse::<CategoricalMap>().is_err());
        assert!("0=a,0=b".parse::<CategoricalMap>().is_err());
    }

    #[test]
    fn mapping_round_trips_through_text() {
        let expr = "0=否,1=是";
        let map: CategoricalMap = expr.parse().unwrap();
        assert_eq!(map.to_string(), expr);
    }

    #[test]
    fn schema_deserializes_from_yaml() {
        let yaml = r#"
name: gender
aliases: [line_gender]
columns:
  - { source: phone, label: 号码, key: true }
  - { source: sex, label: 性别, mapping: "0=女,1=男" }
  - { source: last_online_time, label: 最后上线时间, fallback: status }
"#;
        let schema: Schema = serde_yaml::from_str(yaml).unwrap();
        schema.validate().unwrap();
        assert_eq!(
            schema.task_types().collect::<Vec<_>>(),
            vec!["gender", "line_gender"]
        );
        assert!(schema.columns[0].key);
        assert_eq!(
            schema.columns[1].mapping.as_ref().map(|m| m.apply("1")),
            Some("男")
        );
        assert_eq!(schema.columns[2].fallback.as_deref(), Some("status"));
    }

    #[test]
    fn bad_mapping_fails_deserialization() {
        let yaml = "name: x\ncolumns:\n  - { source: a, label: A, mapping: \"nonsense\" }\n";
        assert!(serde_yaml::from_str::<Schema>(yaml).is_err());
    }

    #[test]
    fn validate_rejects_duplicate_labels() {
        let schema = Schema {
            name: "dup".into(),
            aliases: vec![],
            columns: vec![ColumnSpec::new("a", "A"), ColumnSpec::new("b", "A")],
        };
        assert_eq!(
            schema.validate(),
            Err(SchemaError::DuplicateLabel {
                schema: "dup".into(),
                label: "A".into()
            })
        );
    }

    #[test]
    fn validate_rejects_empty_schema_parts() {
        let no_cols = Schema {
            name: "x".into(),
            aliases: vec![],
            columns: vec![],
        };
        assert!(matches!(no_cols.validate(), Err(SchemaError::NoColumns(_))));

        let blank_label = Schema {
            name: "x".into(),
            aliases: vec![],
            columns: vec![ColumnSpec::new("a", " ")],
        };
        assert!(matches!(
            blank_label.validate(),
            Err(SchemaError::EmptyColumnPart { what: "label", .. })
        ));
    }

    #[test]
    fn key_only_schema_is_valid() {
        let schema = Schema::key_only("fallback", "phone", "号码");
        schema.validate().unwrap();
        assert!(schema.columns[0].key);
    }
}
