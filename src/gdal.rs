//! GDAL command-line tooling: `gdalinfo -json` for raster facts and
//! `gdal_translate -of COG` for conversion.
//!
//! Tools run through `tokio::process` with `kill_on_drop`, so a per-file
//! deadline in the batch driver also stops a hung subprocess.

use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::CogOptions;
use crate::contract::{ConversionJob, Converter, ObjectStore, RasterInfo, RasterInspector};
use crate::error::{ConvertError, InspectError};
use crate::store::object_key;

/// Affine identity, used when a raster carries no geotransform.
const IDENTITY_TRANSFORM: [f64; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GdalInfoJson {
    driver_short_name: String,
    size: [u64; 2],
    #[serde(default)]
    coordinate_system: Option<CoordinateSystem>,
    #[serde(default)]
    geo_transform: Option<Vec<f64>>,
    #[serde(default)]
    metadata: HashMap<String, Value>,
    #[serde(default)]
    bands: Vec<BandJson>,
}

#[derive(Debug, Deserialize)]
struct CoordinateSystem {
    #[serde(default)]
    wkt: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BandJson {
    block: [u64; 2],
    #[serde(rename = "type")]
    data_type: String,
    #[serde(default)]
    no_data_value: Option<Value>,
    #[serde(default)]
    overviews: Vec<OverviewJson>,
}

#[derive(Debug, Deserialize)]
struct OverviewJson {
    size: [u64; 2],
}

/// Parse the output of `gdalinfo -json`.
pub fn parse_gdalinfo(raw: &str) -> Result<RasterInfo, InspectError> {
    let info: GdalInfoJson = serde_json::from_str(raw)?;
    let band = info.bands.first().ok_or(InspectError::NoBands)?;
    let [width, height] = info.size;

    let transform = match info.geo_transform.as_deref() {
        Some(&[c, a, b, f, d, e]) => [a, b, c, d, e, f, 0.0, 0.0, 1.0],
        Some(other) => {
            return Err(InspectError::Other(format!(
                "geoTransform has {} coefficients, expected 6",
                other.len()
            )))
        }
        None => IDENTITY_TRANSFORM,
    };

    let overview_factors = band
        .overviews
        .iter()
        .filter(|o| o.size[0] > 0)
        .map(|o| (width as f64 / o.size[0] as f64).round() as u32)
        .collect();

    Ok(RasterInfo {
        driver: info.driver_short_name,
        width,
        height,
        band_count: info.bands.len(),
        dtype: numpy_dtype(&band.data_type),
        nodata: band.no_data_value.as_ref().and_then(nodata_value),
        crs: info
            .coordinate_system
            .as_ref()
            .map(|cs| cs.wkt.trim())
            .filter(|wkt| !wkt.is_empty())
            .map(crs_label),
        transform,
        tags: string_domain(info.metadata.get("")),
        compression: string_domain(info.metadata.get("IMAGE_STRUCTURE"))
            .remove("COMPRESSION"),
        block_size: (band.block[0], band.block[1]),
        overview_factors,
    })
}

/// Items of a metadata domain, keeping only string values.
fn string_domain(domain: Option<&Value>) -> BTreeMap<String, String> {
    domain
        .and_then(Value::as_object)
        .map(|items| {
            items
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// GDAL reports nodata as a number, or as a string for NaN and infinities.
fn nodata_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn numpy_dtype(gdal_type: &str) -> String {
    match gdal_type {
        "Byte" => "uint8",
        "Int8" => "int8",
        "UInt16" => "uint16",
        "Int16" => "int16",
        "UInt32" => "uint32",
        "Int32" => "int32",
        "UInt64" => "uint64",
        "Int64" => "int64",
        "Float32" => "float32",
        "Float64" => "float64",
        "CInt16" => "complex_int16",
        "CFloat32" => "complex64",
        "CFloat64" => "complex128",
        other => return other.to_lowercase(),
    }
    .to_string()
}

/// `EPSG:<code>` when the outermost authority of the WKT is EPSG, else the WKT.
fn crs_label(wkt: &str) -> String {
    static EPSG: OnceLock<Regex> = OnceLock::new();
    let re = EPSG.get_or_init(|| {
        Regex::new(r#"(?:ID\["EPSG",\s*(\d+)\]|AUTHORITY\["EPSG",\s*"(\d+)"\])\]\s*$"#)
            .expect("static EPSG pattern")
    });
    re.captures(wkt)
        .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|code| format!("EPSG:{}", code.as_str()))
        .unwrap_or_else(|| wkt.to_string())
}

fn tool_name(bin: &Path) -> String {
    bin.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| bin.display().to_string())
}

fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

/// [`RasterInspector`] backed by `gdalinfo -json`.
#[derive(Debug, Clone)]
pub struct GdalInfo {
    bin: PathBuf,
}

impl Default for GdalInfo {
    fn default() -> Self {
        Self::new("gdalinfo")
    }
}

impl GdalInfo {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self { bin: bin.into() }
    }
}

#[async_trait]
impl RasterInspector for GdalInfo {
    async fn inspect(&self, local_path: &Path) -> Result<RasterInfo, InspectError> {
        let tool = tool_name(&self.bin);
        let output = Command::new(&self.bin)
            .arg("-json")
            .arg(local_path)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| InspectError::Spawn {
                tool: tool.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(InspectError::Tool {
                tool,
                status: output.status.to_string(),
                stderr: stderr_text(&output),
            });
        }
        let info = parse_gdalinfo(&String::from_utf8_lossy(&output.stdout))?;
        debug!(path = %local_path.display(), driver = %info.driver, "Inspected raster");
        Ok(info)
    }
}

/// [`Converter`] that downloads a source object, runs `gdal_translate -of COG`
/// and uploads the result.
///
/// Scratch files live in a per-job temporary directory that is removed when
/// the job ends, whether it succeeded, failed or was cancelled.
pub struct GdalCogConverter {
    store: Arc<dyn ObjectStore>,
    inspector: Arc<dyn RasterInspector>,
    options: CogOptions,
}

impl GdalCogConverter {
    /// Sources are inspected with `gdalinfo` from `options.info_bin`.
    pub fn new(store: Arc<dyn ObjectStore>, options: CogOptions) -> Self {
        let inspector = Arc::new(GdalInfo::new(options.info_bin.clone()));
        Self {
            store,
            inspector,
            options,
        }
    }

    pub fn with_inspector(mut self, inspector: Arc<dyn RasterInspector>) -> Self {
        self.inspector = inspector;
        self
    }

    /// Nodata to write for a source of pixel type `source_dtype`.
    ///
    /// Byte rasters cannot hold a configured value outside 0..=255 (e.g. the
    /// usual -9999), so those get 0.
    pub fn nodata_for(&self, source_dtype: &str) -> Option<f64> {
        let configured = self.options.nodata?;
        if source_dtype == "uint8" && !(0.0..=255.0).contains(&configured) {
            return Some(0.0);
        }
        Some(configured)
    }

    async fn source_nodata(&self, local_source: &Path) -> Option<f64> {
        let configured = self.options.nodata?;
        match self.inspector.inspect(local_source).await {
            Ok(info) => {
                let nodata = self.nodata_for(&info.dtype);
                if nodata != Some(configured) {
                    info!(dtype = %info.dtype, configured, used = ?nodata, "Adjusted nodata for source pixel type");
                }
                nodata
            }
            Err(e) => {
                warn!(path = %local_source.display(), error = %e, "Could not inspect source, using configured nodata");
                Some(configured)
            }
        }
    }

    /// Arguments for `gdal_translate`, excluding the binary itself.
    pub fn translate_args(&self, input: &Path, output: &Path, nodata: Option<f64>) -> Vec<OsString> {
        let opts = &self.options;
        let mut args: Vec<OsString> = vec![
            "-of".into(),
            "COG".into(),
            "-co".into(),
            format!("COMPRESS={}", opts.compress).into(),
            "-co".into(),
            format!("BLOCKSIZE={}", opts.blocksize).into(),
            "-co".into(),
            format!("OVERVIEW_RESAMPLING={}", opts.overview_resampling).into(),
        ];
        if let Some(nodata) = nodata {
            args.push("-a_nodata".into());
            args.push(nodata.to_string().into());
        }
        args.push(input.as_os_str().to_owned());
        args.push(output.as_os_str().to_owned());
        args
    }

    async fn translate(
        &self,
        input: &Path,
        output: &Path,
        nodata: Option<f64>,
    ) -> Result<(), ConvertError> {
        let tool = tool_name(&self.options.translate_bin);
        let result = Command::new(&self.options.translate_bin)
            .args(self.translate_args(input, output, nodata))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ConvertError::Spawn {
                tool: tool.clone(),
                source,
            })?;
        if !result.status.success() {
            return Err(ConvertError::Tool {
                tool,
                status: result.status.to_string(),
                stderr: stderr_text(&result),
            });
        }
        Ok(())
    }

    fn staging_dir(&self, job: &ConversionJob) -> std::io::Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("drcs-cog-");
        match &job.staging_dir {
            Some(dir) => builder.tempdir_in(dir),
            None => builder.tempdir(),
        }
    }
}

async fn keep_local_copy(local_cog: &Path, dir: &Path, name: &str) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::copy(local_cog, dir.join(name)).await?;
    Ok(())
}

fn base_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

#[async_trait]
impl Converter for GdalCogConverter {
    async fn convert(&self, job: ConversionJob) -> Result<(), ConvertError> {
        let scratch = self.staging_dir(&job)?;
        let local_source = scratch.path().join(format!("src_{}", base_name(&job.source_id)));
        let cog_name = base_name(&job.destination_name);
        let local_cog = scratch.path().join(cog_name);

        self.store
            .download_object(&job.source_bucket, &job.source_id, &local_source)
            .await?;
        debug!(source = %job.source_id, "Downloaded source for conversion");

        let nodata = self.source_nodata(&local_source).await;
        self.translate(&local_source, &local_cog, nodata).await?;

        if let Some(keep) = &self.options.keep_local_dir {
            if let Err(e) = keep_local_copy(&local_cog, keep, cog_name).await {
                warn!(dir = %keep.display(), error = %e, "Could not keep local COG copy");
            }
        }

        let key = object_key(&job.destination_prefix, &job.destination_name);
        self.store
            .upload_object(&local_cog, &job.destination_bucket, &key)
            .await?;
        info!(
            source = %job.source_id,
            destination = %format!("s3://{}/{}", job.destination_bucket, key),
            "Uploaded COG"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crs_label_prefers_outer_epsg_code() {
        let wkt = r#"PROJCRS["WGS 84 / UTM zone 15N",BASEGEOGCRS["WGS 84",ID["EPSG",4326]],ID["EPSG",32615]]"#;
        assert_eq!(crs_label(wkt), "EPSG:32615");
        let wkt1 = r#"GEOGCS["WGS 84",AUTHORITY["EPSG","4326"]]"#;
        assert_eq!(crs_label(wkt1), "EPSG:4326");
        assert_eq!(crs_label("LOCAL_CS[\"x\"]"), "LOCAL_CS[\"x\"]");
    }

    #[test]
    fn numpy_dtype_maps_gdal_names() {
        assert_eq!(numpy_dtype("Byte"), "uint8");
        assert_eq!(numpy_dtype("Float32"), "float32");
        assert_eq!(numpy_dtype("Weird"), "weird");
    }
}
