//! Batch conversion driver: runs a [`Converter`] over a list of source keys
//! and records one ledger row per key.
//!
//! # Behaviour
//! - Keys are processed in sorted order; duplicates are kept.
//! - A failing or timed-out file becomes a `Failure` row and the run moves on.
//!   Nothing is retried.
//! - With `concurrency > 1` several conversions overlap, but rows are still
//!   appended by this task alone, in sorted key order.
//! - Once every file has a row, the ledger and a metadata summary are
//!   published when a [`Publisher`] is supplied (see [`crate::publish`]).
//!
//! # Errors
//! Only a staging directory that cannot be created aborts the run.

use futures::stream::{self, StreamExt};
use tokio::time::timeout;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::config::BatchConfig;
use crate::contract::{ConversionJob, Converter};
use crate::error::{BatchError, ConvertError};
use crate::ledger::{BatchSummary, ProcessingLedger, ProcessingRecord};
use crate::publish::{PublishReport, Publisher};

/// Result of one batch run.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub run_id: Uuid,
    pub ledger: ProcessingLedger,
    /// `None` when nothing was published (empty ledger or no publisher).
    pub publication: Option<PublishReport>,
}

impl BatchOutcome {
    pub fn summary(&self) -> BatchSummary {
        self.ledger.summary()
    }
}

/// COG name for a source key: `{event}_{stem}.tif`, or `{stem}.tif` without an event.
pub fn default_cog_name(source_id: &str, event: Option<&str>) -> String {
    let file = source_id.rsplit('/').next().unwrap_or(source_id);
    let stem = file
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .filter(|stem| !stem.is_empty())
        .unwrap_or(file);
    match event {
        Some(event) if !event.is_empty() => format!("{event}_{stem}.tif"),
        _ => format!("{stem}.tif"),
    }
}

/// Convert every key in `source_ids` and return the ledger.
///
/// `name_for_source` receives the key and `event_tag` and returns the
/// destination file name.
pub async fn run_batch<N>(
    source_ids: &[String],
    config: &BatchConfig,
    name_for_source: N,
    converter: &dyn Converter,
    event_tag: Option<&str>,
    publisher: Option<Publisher<'_>>,
) -> Result<BatchOutcome, BatchError>
where
    N: Fn(&str, Option<&str>) -> String,
{
    let run_id = Uuid::new_v4();
    let span = info_span!("batch", %run_id);
    async move {
        if let Some(dir) = &config.staging_dir {
            tokio::fs::create_dir_all(dir).await.map_err(|source| {
                error!(path = %dir.display(), error = %source, "[BATCH][ERROR] Cannot create staging directory");
                BatchError::Staging {
                    path: dir.clone(),
                    source,
                }
            })?;
            info!(path = %dir.display(), "[BATCH] Staging directory ready");
        }

        let mut ordered: Vec<&String> = source_ids.iter().collect();
        ordered.sort();
        let total = ordered.len();
        info!(total, concurrency = config.concurrency, "[BATCH] Starting batch");

        let records = stream::iter(ordered.into_iter().enumerate())
            .map(move |(idx, source_id)| {
                let destination_name = name_for_source(source_id.as_str(), event_tag);
                let job = ConversionJob {
                    source_id: source_id.clone(),
                    source_bucket: config.source_bucket.clone(),
                    destination_name: destination_name.clone(),
                    destination_bucket: config.destination_bucket.clone(),
                    destination_prefix: config.destination_prefix.clone(),
                    staging_dir: config.staging_dir.clone(),
                };
                async move {
                    info!(
                        progress = %format!("{}/{}", idx + 1, total),
                        source = %source_id,
                        output = %destination_name,
                        "[BATCH] Processing"
                    );
                    convert_one(converter, job, config).await
                }
            })
            .buffered(config.concurrency.max(1));
        futures::pin_mut!(records);

        let mut ledger = ProcessingLedger::new();
        while let Some(record) = records.next().await {
            ledger.append(record);
        }
        info!(
            processed = ledger.len(),
            successful = ledger.success_count(),
            "[BATCH] Batch processing complete"
        );

        let publication = match publisher {
            Some(publisher) if !ledger.is_empty() => Some(publisher.publish(&ledger, config).await),
            _ => None,
        };

        Ok(BatchOutcome {
            run_id,
            ledger,
            publication,
        })
    }
    .instrument(span)
    .await
}

async fn convert_one(
    converter: &dyn Converter,
    job: ConversionJob,
    config: &BatchConfig,
) -> ProcessingRecord {
    let source_id = job.source_id.clone();
    let destination_name = job.destination_name.clone();
    let result = match timeout(config.per_file_timeout, converter.convert(job)).await {
        Ok(result) => result,
        Err(_) => Err(ConvertError::TimedOut(config.per_file_timeout)),
    };
    match result {
        Ok(()) => {
            info!(source = %source_id, output = %destination_name, "[BATCH] Generated and saved COG");
            ProcessingRecord::success(source_id, destination_name)
        }
        Err(e) => {
            error!(source = %source_id, error = %e, "[BATCH][ERROR] Error processing file");
            ProcessingRecord::failure(source_id, &e.to_string())
        }
    }
}
