//! Artifact file, sheet, and folder naming.

use std::path::Path;

use chrono::{Local, NaiveDate};
use siphon_types::{ExportRequest, OutputFormat, WriterError};
use tempfile::TempPath;

use crate::sink::sanitize_sheet_name;

/// Names derived from one export request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactName {
    /// Request-derived part of the file name, without prefix or extension.
    pub stem: String,
    pub sheet: String,
    pub format: OutputFormat,
}

impl ArtifactName {
    #[must_use]
    pub fn for_request(request: &ExportRequest) -> Self {
        let a = name_part(&request.dataset_a.task_type);
        let cc = name_part(&request.country_code());
        let format = request.output_format;
        let (stem, sheet) = match &request.dataset_b {
            Some(b) => {
                let b = name_part(&b.task_type);
                (format!("merge_{a}_{b}_{cc}"), format!("merge_{a}_{b}"))
            }
            None => (format!("{a}_{cc}"), format!("{a}_{cc}")),
        };
        let stem = match format {
            OutputFormat::Flat => format!("phones_{stem}"),
            OutputFormat::Tabular => stem,
        };
        Self {
            stem,
            sheet: sanitize_sheet_name(&sheet),
            format,
        }
    }

    /// `{millis}_{uuid8}_{stem}.{ext}`, unique per call.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.unique_base(), self.format.extension())
    }

    /// Create an empty, uniquely named scratch file in `dir`. The file is
    /// removed when the returned path is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn scratch_in(&self, dir: &Path) -> Result<TempPath, WriterError> {
        let base = self.unique_base();
        let suffix = format!(".{}", self.format.extension());
        let file = tempfile::Builder::new()
            .prefix(&base)
            .suffix(&suffix)
            .rand_bytes(0)
            .tempfile_in(dir)
            .map_err(|e| WriterError::io(dir.join(format!("{base}{suffix}")), e))?;
        Ok(file.into_temp_path())
    }

    fn unique_base(&self) -> String {
        let millis = chrono::Utc::now().timestamp_millis();
        let id = uuid::Uuid::new_v4().simple().to_string();
        format!("{millis}_{}_{}", &id[..8], self.stem)
    }
}

/// Store folder for artifacts produced on `date`.
#[must_use]
pub fn folder_for(date: NaiveDate) -> String {
    format!("download/{}", date.format("%Y%m%d"))
}

/// Store folder for artifacts produced today, local time.
#[must_use]
pub fn today_folder() -> String {
    folder_for(Local::now().date_naive())
}

// Keep request values from introducing separators into file names.
fn name_part(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use siphon_types::{Criteria, DatasetSpec, SecondarySpec};

    fn request(b: Option<&str>, format: OutputFormat) -> ExportRequest {
        ExportRequest {
            dataset_a: DatasetSpec {
                task_type: "gender".into(),
                country_code: "us".into(),
                criteria: Criteria::default(),
            },
            dataset_b: b.map(|t| SecondarySpec {
                task_type: t.into(),
                criteria: Criteria::default(),
            }),
            limit: None,
            skip: None,
            output_format: format,
        }
    }

    #[test]
    fn single_tabular_names() {
        let name = ArtifactName::for_request(&request(None, OutputFormat::Tabular));
        assert_eq!(name.stem, "gender_US");
        assert_eq!(name.sheet, "gender_US");
        let file = name.file_name();
        assert!(file.ends_with("_gender_US.xlsx"), "{file}");
        let parts: Vec<&str> = file.splitn(3, '_').collect();
        assert!(parts[0].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[1].len(), 8);
    }

    #[test]
    fn merge_and_flat_names() {
        let merge = ArtifactName::for_request(&request(Some("sieveLive"), OutputFormat::Tabular));
        assert_eq!(merge.stem, "merge_gender_sieveLive_US");
        assert_eq!(merge.sheet, "merge_gender_sieveLive");

        let flat = ArtifactName::for_request(&request(None, OutputFormat::Flat));
        assert!(flat.file_name().ends_with("_phones_gender_US.txt"));
    }

    #[test]
    fn file_names_are_unique() {
        let name = ArtifactName::for_request(&request(None, OutputFormat::Flat));
        assert_ne!(name.file_name(), name.file_name());
    }

    #[test]
    fn separators_are_replaced() {
        let mut req = request(None, OutputFormat::Tabular);
        req.dataset_a.task_type = "../etc".into();
        let name = ArtifactName::for_request(&req);
        assert!(!name.stem.contains('/'));
        assert!(!name.stem.contains(".."));
    }

    #[test]
    fn scratch_file_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let name = ArtifactName::for_request(&request(None, OutputFormat::Tabular));
        let scratch = name.scratch_in(dir.path()).unwrap();
        let path = scratch.to_path_buf();
        assert!(path.exists());
        let file_name = path.file_name().unwrap().to_str().unwrap().to_string();
        assert!(file_name.ends_with("_gender_US.xlsx"), "{file_name}");
        drop(scratch);
        assert!(!path.exists());
    }

    #[test]
    fn folder_is_dated() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 7).unwrap();
        assert_eq!(folder_for(date), "download/20250107");
    }
}
