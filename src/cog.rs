//! Heuristic Cloud-Optimized GeoTIFF check.
//!
//! A file passes when it is a GeoTIFF, internally tiled, has overviews and
//! uses an allow-listed codec. IFD ordering is not inspected, so a pass means
//! "likely COG", not conformance.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};

use crate::contract::{RasterInfo, RasterInspector};

pub const ACCEPTED_DRIVERS: &[&str] = &["GTiff", "COG"];
pub const ACCEPTED_COMPRESSION: &[&str] = &["DEFLATE", "LZW", "ZSTD", "WEBP", "JPEG"];
pub const STANDARD_TILE_SIZES: &[u64] = &[256, 512, 1024];

/// Everything the check found. `errors` invalidate, `warnings` do not.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CogValidation {
    pub is_cog: bool,
    pub driver: Option<String>,
    pub has_tiles: bool,
    pub tile_size: Option<(u64, u64)>,
    pub has_overviews: bool,
    pub overview_levels: Vec<u32>,
    pub compression: Option<String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Internally tiled: blocks narrower than the raster, or square multi-row blocks
/// for rasters no wider than one tile.
pub fn is_tiled(info: &RasterInfo) -> bool {
    let (bx, by) = info.block_size;
    by > 1 && (bx < info.width || bx == by)
}

/// Judge raster facts. All violated conditions are collected.
pub fn assess(info: &RasterInfo) -> CogValidation {
    let mut report = CogValidation {
        driver: Some(info.driver.clone()),
        compression: info.compression.clone(),
        ..CogValidation::default()
    };

    if !ACCEPTED_DRIVERS.contains(&info.driver.as_str()) {
        report
            .errors
            .push(format!("Invalid driver: {}, expected GTiff or COG", info.driver));
    }

    if is_tiled(info) {
        report.has_tiles = true;
        report.tile_size = Some(info.block_size);
        let (tx, ty) = info.block_size;
        if !STANDARD_TILE_SIZES.contains(&tx) || !STANDARD_TILE_SIZES.contains(&ty) {
            report.warnings.push(format!("Non-standard tile size: {tx}x{ty}"));
        }
    } else {
        report.errors.push("File is not tiled".to_string());
    }

    if info.overview_factors.is_empty() {
        report.errors.push("No overviews found".to_string());
    } else {
        report.has_overviews = true;
        report.overview_levels = info.overview_factors.clone();
    }

    let codec_ok = info
        .compression
        .as_deref()
        .is_some_and(|c| ACCEPTED_COMPRESSION.contains(&c));
    if !codec_ok {
        report.errors.push(format!(
            "Compression '{}' may not be optimal for COG",
            info.compression.as_deref().unwrap_or("None")
        ));
    }

    report.is_cog = report.errors.is_empty();
    report
}

/// Inspect `local_path` and judge it. Inspection failures fail closed.
pub async fn validate_cog(
    inspector: &dyn RasterInspector,
    local_path: &Path,
) -> (bool, CogValidation) {
    match inspector.inspect(local_path).await {
        Ok(info) => {
            let report = assess(&info);
            debug!(
                path = %local_path.display(),
                is_cog = report.is_cog,
                errors = report.errors.len(),
                "COG validation finished"
            );
            (report.is_cog, report)
        }
        Err(e) => {
            warn!(path = %local_path.display(), error = %e, "COG validation could not inspect file");
            let report = CogValidation {
                errors: vec![format!("Validation error: {e}")],
                ..CogValidation::default()
            };
            (false, report)
        }
    }
}
