// drcs-cog/src/config.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Default deadline for a single file conversion.
pub const DEFAULT_PER_FILE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Where sources come from and where COGs, ledger and metadata go.
/// Immutable for the duration of one batch run.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchConfig {
    pub source_bucket: String,
    pub destination_bucket: String,
    /// Key prefix for COGs, `metadata.json` and `files_converted.csv`.
    pub destination_prefix: String,
    /// Local directory for scratch files; created at the start of a run.
    pub staging_dir: Option<PathBuf>,
    /// Conversions allowed in flight at once. 1 keeps the run strictly sequential.
    pub concurrency: usize,
    pub per_file_timeout: Duration,
    pub persist_metadata: bool,
    pub persist_ledger: bool,
}

impl BatchConfig {
    pub fn new(
        source_bucket: impl Into<String>,
        destination_bucket: impl Into<String>,
        destination_prefix: impl Into<String>,
    ) -> Self {
        Self {
            source_bucket: source_bucket.into(),
            destination_bucket: destination_bucket.into(),
            destination_prefix: destination_prefix.into().trim_matches('/').to_string(),
            staging_dir: None,
            concurrency: 1,
            per_file_timeout: DEFAULT_PER_FILE_TIMEOUT,
            persist_metadata: true,
            persist_ledger: true,
        }
    }

    /// Object key for `name` under the destination prefix.
    pub fn destination_key(&self, name: &str) -> String {
        crate::store::object_key(&self.destination_prefix, name)
    }

    pub fn trace_loaded(&self) {
        info!(
            source_bucket = %self.source_bucket,
            destination = %format!("s3://{}/{}", self.destination_bucket, self.destination_prefix),
            staging_dir = ?self.staging_dir,
            concurrency = self.concurrency,
            per_file_timeout_secs = self.per_file_timeout.as_secs(),
            "Loaded BatchConfig"
        );
        debug!(?self, "BatchConfig loaded (full debug)");
    }
}

/// `gdal_translate -of COG` creation options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CogOptions {
    pub compress: String,
    pub blocksize: u32,
    pub overview_resampling: String,
    /// Written as `-a_nodata` when set.
    pub nodata: Option<f64>,
    /// Keep a copy of every COG in this local directory.
    pub keep_local_dir: Option<PathBuf>,
    pub translate_bin: PathBuf,
    pub info_bin: PathBuf,
}

impl Default for CogOptions {
    fn default() -> Self {
        Self {
            compress: "DEFLATE".to_string(),
            blocksize: 512,
            overview_resampling: "AVERAGE".to_string(),
            nodata: None,
            keep_local_dir: None,
            translate_bin: PathBuf::from("gdal_translate"),
            info_bin: PathBuf::from("gdalinfo"),
        }
    }
}

impl CogOptions {
    pub fn trace_loaded(&self) {
        info!(
            compress = %self.compress,
            blocksize = self.blocksize,
            overview_resampling = %self.overview_resampling,
            nodata = ?self.nodata,
            "Loaded COG options"
        );
    }
}

/// Which part of the index a conversion run reads its file list from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSelection {
    /// Logical path, e.g. `drcs_activations/202405_Flood_TX/planet`.
    pub path: String,
    /// Leading segment(s) stripped before walking the index.
    pub base: String,
}

/// Fully merged configuration for the `convert` command.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Explicit index location; `None` means the default candidate list.
    pub index_path: Option<PathBuf>,
    pub source: SourceSelection,
    pub event: Option<String>,
    pub region: Option<String>,
    pub batch: BatchConfig,
    pub cog: CogOptions,
}

impl AppConfig {
    pub fn trace_loaded(&self) {
        info!(
            index_path = ?self.index_path,
            source_path = %self.source.path,
            event = self.event.as_deref().unwrap_or("<none>"),
            "Loaded AppConfig"
        );
        self.batch.trace_loaded();
        self.cog.trace_loaded();
    }
}
