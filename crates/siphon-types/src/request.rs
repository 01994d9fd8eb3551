//! Export request shape accepted from callers.
//!
//! ```json
//! {
//!   "datasetA": {"taskType": "gender", "countryCode": "us", "criteria": {"minAge": 18}},
//!   "datasetB": {"taskType": "sieveLive"},
//!   "limit": 30000,
//!   "outputFormat": "xlsx"
//! }
//! ```

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ExportError;
use crate::filter::{Discriminator, Filter, Predicate};

/// Store field names the criteria are pushed down against.
pub mod fields {
    pub const AGE: &str = "age";
    pub const SEX: &str = "sex";
    pub const SKIN: &str = "skin";
    pub const USER_NAME: &str = "user_name";
}

/// Artifact format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Newline-delimited key list.
    #[serde(alias = "txt", alias = "FLAT", alias = "TXT")]
    Flat,
    /// Spreadsheet workbook.
    #[default]
    #[serde(alias = "xlsx", alias = "TABULAR", alias = "XLSX", alias = "excel")]
    Tabular,
}

impl OutputFormat {
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Flat => "txt",
            Self::Tabular => "xlsx",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Flat => "flat",
            Self::Tabular => "tabular",
        })
    }
}

/// Optional per-dataset criteria.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Criteria {
    pub min_age: Option<i64>,
    pub max_age: Option<i64>,
    #[serde(deserialize_with = "scalar_text")]
    pub sex: Option<String>,
    #[serde(deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub include_skin: Vec<String>,
    #[serde(deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub exclude_skin: Vec<String>,
    /// `0` keeps only empty user names, `1` only non-empty ones.
    pub check_user_name_empty: Option<u8>,
}

impl Criteria {
    fn problems(&self, dataset: &str, out: &mut Vec<String>) {
        if let (Some(min), Some(max)) = (self.min_age, self.max_age) {
            if min > max {
                out.push(format!("{dataset}: minAge {min} is greater than maxAge {max}"));
            }
        }
        if let Some(flag) = self.check_user_name_empty {
            if flag > 1 {
                out.push(format!(
                    "{dataset}: checkUserNameEmpty must be 0 or 1, got {flag}"
                ));
            }
        }
    }

    /// Translate criteria into pushed-down predicates for `discriminator`.
    #[must_use]
    pub fn to_filter(&self, discriminator: Discriminator) -> Filter {
        let mut filter = Filter::new(discriminator);
        if self.min_age.is_some() || self.max_age.is_some() {
            filter = filter.with(Predicate::Range {
                field: fields::AGE.into(),
                min: self.min_age,
                max: self.max_age,
            });
        }
        if let Some(sex) = &self.sex {
            filter = filter.with(Predicate::OneOf {
                field: fields::SEX.into(),
                values: vec![sex.clone()],
            });
        }
        if !self.include_skin.is_empty() {
            filter = filter.with(Predicate::OneOf {
                field: fields::SKIN.into(),
                values: self.include_skin.clone(),
            });
        }
        if !self.exclude_skin.is_empty() {
            filter = filter.with(Predicate::NoneOf {
                field: fields::SKIN.into(),
                values: self.exclude_skin.clone(),
            });
        }
        match self.check_user_name_empty {
            Some(0) => {
                filter = filter.with(Predicate::Empty {
                    field: fields::USER_NAME.into(),
                    empty: true,
                });
            }
            Some(1) => {
                filter = filter.with(Predicate::Empty {
                    field: fields::USER_NAME.into(),
                    empty: false,
                });
            }
            _ => {}
        }
        filter
    }
}

/// Primary dataset selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSpec {
    pub task_type: String,
    pub country_code: String,
    #[serde(default)]
    pub criteria: Criteria,
}

/// Secondary dataset selector. Inherits the primary's country code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecondarySpec {
    pub task_type: String,
    #[serde(default)]
    pub criteria: Criteria,
}

/// A single export request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    pub dataset_a: DatasetSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_b: Option<SecondarySpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,
    #[serde(default)]
    pub output_format: OutputFormat,
}

impl ExportRequest {
    /// Reject requests that cannot be served, before any I/O.
    pub fn validate(&self) -> Result<(), ExportError> {
        let mut problems = Vec::new();
        if self.dataset_a.task_type.trim().is_empty() {
            problems.push("datasetA.taskType is required".to_string());
        }
        if self.dataset_a.country_code.trim().is_empty() {
            problems.push("datasetA.countryCode is required".to_string());
        }
        self.dataset_a.criteria.problems("datasetA", &mut problems);
        if let Some(b) = &self.dataset_b {
            if b.task_type.trim().is_empty() {
                problems.push("datasetB.taskType is required".to_string());
            }
            b.criteria.problems("datasetB", &mut problems);
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ExportError::InvalidRequest(problems.join("; ")))
        }
    }

    #[must_use]
    pub fn skip(&self) -> u64 {
        self.skip.unwrap_or(0)
    }

    #[must_use]
    pub fn country_code(&self) -> String {
        self.dataset_a.country_code.trim().to_uppercase()
    }

    #[must_use]
    pub fn primary_filter(&self) -> Filter {
        let spec = &self.dataset_a;
        spec.criteria
            .to_filter(Discriminator::new(spec.task_type.trim(), &spec.country_code))
    }

    /// Filter for dataset B, scoped to dataset A's country.
    #[must_use]
    pub fn secondary_filter(&self) -> Option<Filter> {
        self.dataset_b.as_ref().map(|b| {
            b.criteria
                .to_filter(Discriminator::new(b.task_type.trim(), &self.dataset_a.country_code))
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Int(i64),
    Text(String),
}

impl Scalar {
    fn into_text(self) -> String {
        match self {
            Self::Int(v) => v.to_string(),
            Self::Text(s) => s.trim().to_string(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(Scalar),
    Many(Vec<Scalar>),
}

fn scalar_text<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<Scalar>::deserialize(de)?
        .map(Scalar::into_text)
        .filter(|s| !s.is_empty()))
}

fn one_or_many<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<String>, D::Error> {
    let values = match Option::<OneOrMany>::deserialize(de)? {
        None => Vec::new(),
        Some(OneOrMany::One(v)) => vec![v.into_text()],
        Some(OneOrMany::Many(vs)) => vs.into_iter().map(Scalar::into_text).collect(),
    };
    Ok(values.into_iter().filter(|s| !s.is_empty()).collect())
}
