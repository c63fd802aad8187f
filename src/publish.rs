//! Publishing the run's artifacts next to the converted imagery:
//! `metadata.json` (raster facts of one sample plus run counts) and
//! `files_converted.csv` (the full ledger).
//!
//! The two steps are independent. A failure in one is reported as a warning
//! and never affects the other or the ledger already produced.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{error, info, warn};

use crate::config::BatchConfig;
use crate::contract::{ObjectStore, RasterInfo, RasterInspector};
use crate::error::PublishError;
use crate::ledger::ProcessingLedger;

pub const METADATA_FILE: &str = "metadata.json";
pub const LEDGER_FILE: &str = "files_converted.csv";

/// Contents of `metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RasterMetadata {
    pub description: BTreeMap<String, String>,
    pub driver: String,
    pub dtype: String,
    pub nodata: Option<f64>,
    pub width: u64,
    pub height: u64,
    pub count: usize,
    pub crs: Option<String>,
    pub transform: Vec<f64>,
    pub bounds: Vec<f64>,
    pub total_files_processed: usize,
    pub total_files_attempted: usize,
    pub processing_timestamp: String,
}

impl RasterMetadata {
    pub fn new(info: &RasterInfo, ledger: &ProcessingLedger) -> Self {
        Self {
            description: info.tags.clone(),
            driver: info.driver.clone(),
            dtype: info.dtype.clone(),
            nodata: info.nodata,
            width: info.width,
            height: info.height,
            count: info.band_count,
            crs: info.crs.clone(),
            transform: info.transform.to_vec(),
            bounds: info.bounds().to_vec(),
            total_files_processed: ledger.success_count(),
            total_files_attempted: ledger.len(),
            processing_timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// What happened to one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Uploaded { key: String },
    /// Nothing to publish, e.g. no successful conversion to sample.
    Skipped,
    /// Turned off in the batch configuration.
    Disabled,
    /// Upload or preparation failed; the message was logged as a warning.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub metadata: PublishOutcome,
    pub ledger: PublishOutcome,
}

/// Handles needed to publish artifacts.
#[derive(Clone, Copy)]
pub struct Publisher<'a> {
    pub store: &'a dyn ObjectStore,
    pub inspector: &'a dyn RasterInspector,
}

impl<'a> Publisher<'a> {
    pub fn new(store: &'a dyn ObjectStore, inspector: &'a dyn RasterInspector) -> Self {
        Self { store, inspector }
    }

    /// Run both steps as enabled in `config`, absorbing their failures.
    pub async fn publish(&self, ledger: &ProcessingLedger, config: &BatchConfig) -> PublishReport {
        let metadata = if config.persist_metadata {
            settle(
                "metadata",
                persist_metadata(self.store, self.inspector, ledger, config).await,
            )
        } else {
            PublishOutcome::Disabled
        };
        let ledger = if config.persist_ledger {
            settle("ledger", persist_ledger(self.store, ledger, config).await)
        } else {
            PublishOutcome::Disabled
        };
        PublishReport { metadata, ledger }
    }
}

fn settle(step: &str, result: Result<PublishOutcome, PublishError>) -> PublishOutcome {
    match result {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(step, error = %e, "[PUBLISH] Step failed, batch result unaffected");
            PublishOutcome::Failed(e.to_string())
        }
    }
}

fn scratch_file(config: &BatchConfig, suffix: &str) -> std::io::Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("drcs-cog-").suffix(suffix);
    match &config.staging_dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    }
}

async fn upload_text(
    store: &dyn ObjectStore,
    config: &BatchConfig,
    file_name: &str,
    suffix: &str,
    body: &str,
) -> Result<String, PublishError> {
    let scratch = scratch_file(config, suffix)?;
    tokio::fs::write(scratch.path(), body).await?;
    let key = config.destination_key(file_name);
    store
        .upload_object(scratch.path(), &config.destination_bucket, &key)
        .await?;
    Ok(key)
}

/// Describe the first successfully converted source in `metadata.json`.
///
/// With no successful record this is a logged no-op that touches nothing.
pub async fn persist_metadata(
    store: &dyn ObjectStore,
    inspector: &dyn RasterInspector,
    ledger: &ProcessingLedger,
    config: &BatchConfig,
) -> Result<PublishOutcome, PublishError> {
    let Some(sample) = ledger.first_success() else {
        info!("[PUBLISH] No successfully processed files to extract metadata from");
        return Ok(PublishOutcome::Skipped);
    };

    let sample_file = scratch_file(config, ".tif")?;
    store
        .download_object(&config.source_bucket, &sample.source_id, sample_file.path())
        .await?;
    let info = inspector.inspect(sample_file.path()).await.map_err(|e| {
        error!(sample = %sample.source_id, error = %e, "[PUBLISH] Failed to inspect sample");
        e
    })?;

    let metadata = RasterMetadata::new(&info, ledger);
    let json = serde_json::to_string_pretty(&metadata)?;
    let key = upload_text(store, config, METADATA_FILE, ".json", &json).await?;

    info!(
        sample = %sample.source_id,
        destination = %format!("s3://{}/{}", config.destination_bucket, key),
        "[PUBLISH] Uploaded metadata"
    );
    Ok(PublishOutcome::Uploaded { key })
}

/// Upload the whole ledger as `files_converted.csv`.
pub async fn persist_ledger(
    store: &dyn ObjectStore,
    ledger: &ProcessingLedger,
    config: &BatchConfig,
) -> Result<PublishOutcome, PublishError> {
    let key = upload_text(store, config, LEDGER_FILE, ".csv", &ledger.to_csv()).await?;
    info!(
        rows = ledger.len(),
        destination = %format!("s3://{}/{}", config.destination_bucket, key),
        "[PUBLISH] Saved processing log"
    );
    Ok(PublishOutcome::Uploaded { key })
}

/// Write the ledger CSV to a local path, for runs without an object store.
pub async fn write_ledger_local(ledger: &ProcessingLedger, path: &Path) -> Result<(), PublishError> {
    tokio::fs::write(path, ledger.to_csv()).await?;
    info!(path = %path.display(), rows = ledger.len(), "[PUBLISH] Wrote processing log locally");
    Ok(())
}
