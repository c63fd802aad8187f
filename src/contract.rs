#![allow(unused)]

//! # contract: seams between the batch driver and its collaborators
//!
//! The driver never talks to S3 or GDAL directly. It goes through three
//! async traits defined here:
//!
//! - [`ObjectStore`]: paged key listing, single-object download and upload.
//! - [`Converter`]: turns one source object into one COG at the destination.
//! - [`RasterInspector`]: reads raster facts from a local file.
//!
//! Concrete implementations live in [`crate::store`] (aws-sdk-s3) and
//! [`crate::gdal`] (GDAL command-line tools).
//!
//! ## Mocking & Testing
//! - Every trait is annotated for `mockall`; with the default
//!   `test-export-mocks` feature the generated `Mock*` types are available to
//!   integration tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mockall::{automock, predicate::*};

use crate::error::{ConvertError, InspectError, StoreError};

/// One page of a key listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyPage {
    pub keys: Vec<String>,
    /// Cursor for the next page; `None` on the last page.
    pub next_continuation: Option<String>,
}

/// Trait for the object store the imagery lives in.
///
/// Credential resolution and connectivity are the implementor's concern.
/// Pagination is driven by the caller, see [`crate::store::list_keys`].
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch one page of keys under `prefix`, resuming from `continuation`.
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<KeyPage, StoreError>;

    /// Download `bucket/key` to `local_path`, overwriting it.
    async fn download_object(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
    ) -> Result<(), StoreError>;

    /// Upload the file at `local_path` to `bucket/key`.
    async fn upload_object(
        &self,
        local_path: &Path,
        bucket: &str,
        key: &str,
    ) -> Result<(), StoreError>;
}

/// Everything a converter needs to produce one COG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionJob {
    /// Source object key, e.g. `drcs_activations/202405_Flood_TX/planet/a.tif`.
    pub source_id: String,
    pub source_bucket: String,
    pub destination_name: String,
    pub destination_bucket: String,
    pub destination_prefix: String,
    /// Local directory scratch files are created under, if configured.
    pub staging_dir: Option<PathBuf>,
}

/// Trait for the per-file conversion routine driven by [`crate::batch::run_batch`].
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Converter: Send + Sync {
    /// Convert one source object. Any error is recorded in the ledger and the
    /// batch moves on.
    async fn convert(&self, job: ConversionJob) -> Result<(), ConvertError>;
}

/// Raster facts used for `metadata.json` and COG validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterInfo {
    /// Short driver name, `GTiff` or `COG` for the files we care about.
    pub driver: String,
    pub width: u64,
    pub height: u64,
    pub band_count: usize,
    /// Pixel type of band 1 in lowercase numpy style (`uint8`, `float32`, ...).
    pub dtype: String,
    pub nodata: Option<f64>,
    pub crs: Option<String>,
    /// Affine coefficients `a, b, c, d, e, f, 0, 0, 1`.
    pub transform: [f64; 9],
    /// Default-domain metadata items.
    pub tags: BTreeMap<String, String>,
    pub compression: Option<String>,
    /// Band 1 block size as (x, y).
    pub block_size: (u64, u64),
    /// Band 1 overview decimation factors.
    pub overview_factors: Vec<u32>,
}

impl RasterInfo {
    /// Bounding box `(left, bottom, right, top)` of the raster.
    pub fn bounds(&self) -> [f64; 4] {
        let [a, b, c, d, e, f, ..] = self.transform;
        let (w, h) = (self.width as f64, self.height as f64);
        let corners = [(0.0, 0.0), (w, 0.0), (0.0, h), (w, h)];
        let xs = corners.iter().map(|(col, row)| a * col + b * row + c);
        let ys = corners.iter().map(|(col, row)| d * col + e * row + f);
        let (left, right) = xs.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), x| {
            (lo.min(x), hi.max(x))
        });
        let (bottom, top) = ys.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), y| {
            (lo.min(y), hi.max(y))
        });
        [left, bottom, right, top]
    }
}

/// Trait for reading [`RasterInfo`] from a local raster file.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RasterInspector: Send + Sync {
    async fn inspect(&self, local_path: &Path) -> Result<RasterInfo, InspectError>;
}
