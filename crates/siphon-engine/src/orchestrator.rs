//! Per-request export pipeline.
//!
//! One request runs as a single linear pass:
//! paginate, dedup, join (merge requests only), project, write, store.
//! The scratch artifact is owned by a guard that removes it on every exit.

use std::sync::Arc;
use std::time::Instant;

use siphon_types::{
    ExportError, ExportRequest, Filter, JoinedRecord, OutputFormat, Record, ScanOrder, Value,
    WriterError,
};

use crate::artifact::{today_folder, ArtifactName};
use crate::config::ExportSettings;
use crate::join::{JoinStrategy, MergeJoiner};
use crate::paginator::{PageLimits, Paginator};
use crate::projector::RowLayout;
use crate::registry::SchemaRegistry;
use crate::result::{ExportOutcome, ExportReport};
use crate::sink::{self, ArtifactWriter, SinkOptions};
use crate::source::{PagedSource, Projection};
use crate::store::Store;

/// Shared collaborators for export runs. Cheap to clone; independent
/// requests may run concurrently against one exporter.
#[derive(Clone)]
pub struct Exporter {
    source: Arc<dyn PagedSource>,
    store: Arc<dyn Store>,
    registry: Arc<SchemaRegistry>,
    settings: ExportSettings,
}

impl Exporter {
    pub fn new(
        source: Arc<dyn PagedSource>,
        store: Arc<dyn Store>,
        registry: Arc<SchemaRegistry>,
        settings: ExportSettings,
    ) -> Self {
        Self {
            source,
            store,
            registry,
            settings,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    /// Rows matching the request's primary dataset.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for a malformed request or `Source` when
    /// the count query fails.
    pub async fn count(&self, request: &ExportRequest) -> Result<u64, ExportError> {
        request.validate()?;
        let filter = request.primary_filter();
        Ok(self.source.count(&filter).await?)
    }

    /// Run one export request end to end and return the stored artifact.
    ///
    /// # Errors
    ///
    /// Returns the [`ExportError`] that ended the run. The scratch file
    /// never outlives the call.
    pub async fn run_export(&self, request: &ExportRequest) -> Result<ExportOutcome, ExportError> {
        let start = Instant::now();
        let result = self.export(request, start).await;
        if let Err(err) = &result {
            let task_type = request.dataset_a.task_type.as_str();
            let country_code = request.dataset_a.country_code.as_str();
            let elapsed_secs = start.elapsed().as_secs_f64();
            if err.is_user_facing() {
                tracing::warn!(
                    task_type,
                    country_code,
                    kind = err.kind(),
                    elapsed_secs,
                    "Export rejected: {}",
                    err
                );
            } else {
                tracing::error!(
                    task_type,
                    country_code,
                    kind = err.kind(),
                    elapsed_secs,
                    "Export failed: {}",
                    err
                );
            }
        }
        result
    }

    async fn export(
        &self,
        request: &ExportRequest,
        start: Instant,
    ) -> Result<ExportOutcome, ExportError> {
        request.validate()?;

        let format = request.output_format;
        let layout = self.layout_for(request)?;
        let primary = request.primary_filter();
        let secondary = request.secondary_filter();
        let budget = self.settings.budget(request.limit);
        let skip = request.skip();

        let mut report = ExportReport::new(primary.task_type(), primary.country_code(), format);
        tracing::info!(
            source = self.source.id(),
            task_type = primary.task_type(),
            country_code = primary.country_code(),
            merge_with = secondary.as_ref().map(Filter::task_type),
            format = %format,
            budget,
            skip,
            "Starting export"
        );

        if skip == 0 && self.settings.preflight_count {
            let matched = self.source.count(&primary).await?;
            report.matched = Some(matched);
            tracing::info!(matched, "Pre-flight count");
            if matched == 0 {
                return Err(ExportError::EmptyResult);
            }
        }

        let name = ArtifactName::for_request(request);
        let scratch = name.scratch_in(&self.settings.scratch_dir)?;
        let mut writer = sink::open(
            format,
            &scratch,
            &name.sheet,
            SinkOptions {
                flush_rows: self.settings.flush_rows,
            },
        )?;
        if let Some(layout) = &layout {
            writer.write_header(layout.header())?;
        }

        let scan_start = Instant::now();
        let (order, projection) = match format {
            OutputFormat::Flat => (ScanOrder::KeyAsc, Projection::KeyOnly),
            OutputFormat::Tabular => (ScanOrder::RecencyDesc, Projection::Full),
        };
        let limits = PageLimits {
            batch_size: self.settings.batch_size,
            max_batches: self.settings.max_batches,
        };
        let mut pager = Paginator::new(self.source.as_ref(), &primary, order, limits, budget)
            .with_projection(projection)
            .with_skip(skip);

        match &secondary {
            None => {
                while let Some(batch) = pager.next_batch().await? {
                    write_records(writer.as_mut(), layout.as_ref(), &batch)?;
                }
            }
            Some(secondary) => {
                let strategy = JoinStrategy::choose(request.limit, self.settings.prefetch_threshold);
                report.join_strategy = Some(strategy);
                let mut joiner = MergeJoiner::new(
                    self.source.as_ref(),
                    secondary,
                    self.settings.join_chunk_size,
                );
                match strategy {
                    JoinStrategy::Prefetch => {
                        let primaries = pager.collect_all().await?;
                        let joined = joiner.join(primaries).await?;
                        write_joined(writer.as_mut(), layout.as_ref(), &joined)?;
                    }
                    JoinStrategy::Interleaved => {
                        while let Some(batch) = pager.next_batch().await? {
                            if batch.is_empty() {
                                continue;
                            }
                            let joined = joiner.join(batch).await?;
                            write_joined(writer.as_mut(), layout.as_ref(), &joined)?;
                        }
                    }
                }
                report.key_lookups = joiner.lookups();
            }
        }

        report.pages_fetched = pager.pages_fetched();
        report.rows_scanned = pager.rows_fetched();
        report.unique_keys = pager.dedup().unique_keys() as u64;
        report.dropped_empty_keys = pager.dedup().dropped_empty_keys();
        report.stop_reason = pager.stop_reason();
        report.scan_secs = scan_start.elapsed().as_secs_f64();

        let finalize_start = Instant::now();
        let artifact = tokio::task::spawn_blocking(move || writer.close())
            .await
            .map_err(|e| WriterError::Join(e.to_string()))??;
        report.finalize_secs = finalize_start.elapsed().as_secs_f64();
        report.rows_written = artifact.rows;
        report.bytes = artifact.bytes;

        if artifact.rows == 0 {
            return Err(ExportError::EmptyResult);
        }

        let folder = today_folder();
        let upload_start = Instant::now();
        let url = self.store.put(&scratch, &folder).await?;
        report.upload_secs = upload_start.elapsed().as_secs_f64();
        report.duration_secs = start.elapsed().as_secs_f64();

        let file_name = scratch
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        drop(scratch);

        tracing::info!(
            task_type = %report.task_type,
            country_code = %report.country_code,
            rows = report.rows_written,
            pages = report.pages_fetched,
            stop_reason = ?report.stop_reason,
            bytes = report.bytes,
            duration_secs = report.duration_secs,
            url = %url,
            "Export complete"
        );

        Ok(ExportOutcome {
            url,
            file_name,
            folder,
            report,
        })
    }

    /// Column layout for tabular output; flat output has none.
    fn layout_for(&self, request: &ExportRequest) -> Result<Option<RowLayout>, ExportError> {
        if request.output_format == OutputFormat::Flat {
            return Ok(None);
        }
        let primary = self.registry.lookup(request.dataset_a.task_type.trim()).clone();
        let layout = match &request.dataset_b {
            None => RowLayout::single(primary),
            Some(b) => RowLayout::merged(
                primary,
                self.registry.lookup(b.task_type.trim()).clone(),
                &self.settings.secondary_prefix,
            ),
        };
        layout
            .map(Some)
            .map_err(|e| ExportError::InvalidRequest(e.to_string()))
    }
}

fn key_cell(record: &Record) -> [Value; 1] {
    [Value::Text(record.key().to_string())]
}

fn write_records(
    writer: &mut dyn ArtifactWriter,
    layout: Option<&RowLayout>,
    records: &[Record],
) -> Result<(), WriterError> {
    for record in records {
        match layout {
            Some(layout) => writer.write_row(&layout.row(record))?,
            None => writer.write_row(&key_cell(record))?,
        }
    }
    Ok(())
}

fn write_joined(
    writer: &mut dyn ArtifactWriter,
    layout: Option<&RowLayout>,
    joined: &[JoinedRecord],
) -> Result<(), WriterError> {
    for pair in joined {
        match layout {
            Some(layout) => writer.write_row(&layout.joined_row(pair))?,
            None => writer.write_row(&key_cell(pair.primary()))?,
        }
    }
    Ok(())
}
