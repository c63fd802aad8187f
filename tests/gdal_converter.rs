use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use drcs_cog::config::CogOptions;
use drcs_cog::contract::{
    ConversionJob, Converter, MockObjectStore, MockRasterInspector, RasterInfo, RasterInspector,
};
use drcs_cog::error::{ConvertError, InspectError, StoreError};
use drcs_cog::gdal::{GdalCogConverter, GdalInfo};
use tempfile::tempdir;

fn job(staging: &Path) -> ConversionJob {
    ConversionJob {
        source_id: "drcs_activations/e/planet/scene.tif".into(),
        source_bucket: "src".into(),
        destination_name: "E_scene.tif".into(),
        destination_bucket: "dst".into(),
        destination_prefix: "cogs/E".into(),
        staging_dir: Some(staging.to_path_buf()),
    }
}

#[test]
fn translate_args_carry_creation_options() {
    let options = CogOptions {
        compress: "ZSTD".into(),
        blocksize: 256,
        nodata: Some(-9999.0),
        ..CogOptions::default()
    };
    let converter = GdalCogConverter::new(Arc::new(MockObjectStore::new()), options);

    let args = converter.translate_args(Path::new("in.tif"), Path::new("out.tif"), Some(-9999.0));
    let expected: Vec<OsString> = [
        "-of",
        "COG",
        "-co",
        "COMPRESS=ZSTD",
        "-co",
        "BLOCKSIZE=256",
        "-co",
        "OVERVIEW_RESAMPLING=AVERAGE",
        "-a_nodata",
        "-9999",
        "in.tif",
        "out.tif",
    ]
    .iter()
    .map(OsString::from)
    .collect();
    assert_eq!(args, expected);
}

#[tokio::test]
async fn missing_tool_fails_and_cleans_up_scratch() {
    let staging = tempdir().unwrap();
    let mut store = MockObjectStore::new();
    store
        .expect_download_object()
        .times(1)
        .returning(|bucket, key, path| {
            assert_eq!(bucket, "src");
            assert_eq!(key, "drcs_activations/e/planet/scene.tif");
            assert!(path.ends_with("src_scene.tif"));
            std::fs::write(path, b"fake tiff").unwrap();
            Ok(())
        });
    let options = CogOptions {
        translate_bin: PathBuf::from("/nonexistent/gdal_translate"),
        ..CogOptions::default()
    };
    let converter = GdalCogConverter::new(Arc::new(store), options);

    let err = converter.convert(job(staging.path())).await.unwrap_err();
    assert!(matches!(err, ConvertError::Spawn { .. }), "{err:?}");
    let leftovers: Vec<_> = std::fs::read_dir(staging.path()).unwrap().collect();
    assert!(leftovers.is_empty(), "scratch directory was not removed");
}

#[tokio::test]
async fn download_failure_is_a_conversion_error() {
    let staging = tempdir().unwrap();
    let mut store = MockObjectStore::new();
    store.expect_download_object().returning(|bucket, key, _| {
        Err(StoreError::Download {
            bucket: bucket.to_string(),
            key: key.to_string(),
            source: "NoSuchKey".into(),
        })
    });
    let converter = GdalCogConverter::new(Arc::new(store), CogOptions::default());

    let err = converter.convert(job(staging.path())).await.unwrap_err();
    assert!(err.to_string().contains("NoSuchKey"), "{err}");
    assert!(std::fs::read_dir(staging.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn missing_gdalinfo_is_a_spawn_error() {
    let inspector = GdalInfo::new("/nonexistent/gdalinfo");
    let err = inspector.inspect(Path::new("scene.tif")).await.unwrap_err();
    assert!(matches!(err, InspectError::Spawn { .. }), "{err:?}");
}

fn source_info(dtype: &str) -> RasterInfo {
    RasterInfo {
        driver: "GTiff".into(),
        width: 64,
        height: 64,
        band_count: 3,
        dtype: dtype.into(),
        nodata: None,
        crs: None,
        transform: [1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, 1.0],
        tags: BTreeMap::new(),
        compression: None,
        block_size: (64, 8),
        overview_factors: Vec::new(),
    }
}

fn nodata_options(nodata: f64) -> CogOptions {
    CogOptions {
        nodata: Some(nodata),
        ..CogOptions::default()
    }
}

#[test]
fn byte_sources_get_an_in_range_nodata() {
    let converter =
        GdalCogConverter::new(Arc::new(MockObjectStore::new()), nodata_options(-9999.0));
    assert_eq!(converter.nodata_for("uint8"), Some(0.0));
    assert_eq!(converter.nodata_for("float32"), Some(-9999.0));

    let converter = GdalCogConverter::new(Arc::new(MockObjectStore::new()), nodata_options(255.0));
    assert_eq!(converter.nodata_for("uint8"), Some(255.0));

    let converter = GdalCogConverter::new(Arc::new(MockObjectStore::new()), CogOptions::default());
    assert_eq!(converter.nodata_for("uint8"), None);
}

/// Stand-in for `gdal_translate`: records its arguments and writes the output file.
#[cfg(unix)]
fn fake_translate(dir: &Path) -> (PathBuf, PathBuf) {
    use std::os::unix::fs::PermissionsExt;

    let args_file = dir.join("args.txt");
    let script = dir.join("fake_gdal_translate");
    std::fs::write(
        &script,
        format!(
            "#!/bin/sh\nprintf '%s\\n' \"$@\" > '{}'\neval \"out=\\${{$#}}\"\nprintf cog > \"$out\"\n",
            args_file.display()
        ),
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    (script, args_file)
}

#[cfg(unix)]
fn uploading_store() -> MockObjectStore {
    let mut store = MockObjectStore::new();
    store.expect_download_object().returning(|_, _, path| {
        std::fs::write(path, b"fake tiff").unwrap();
        Ok(())
    });
    store
        .expect_upload_object()
        .times(1)
        .returning(|path, bucket, key| {
            assert_eq!(bucket, "dst");
            assert_eq!(key, "cogs/E/E_scene.tif");
            assert_eq!(std::fs::read(path).unwrap(), b"cog");
            Ok(())
        });
    store
}

#[cfg(unix)]
#[tokio::test]
async fn uint8_source_is_translated_with_zero_nodata() {
    let tools = tempdir().unwrap();
    let staging = tempdir().unwrap();
    let (script, args_file) = fake_translate(tools.path());

    let mut inspector = MockRasterInspector::new();
    inspector
        .expect_inspect()
        .withf(|path| path.ends_with("src_scene.tif"))
        .times(1)
        .returning(|_| Ok(source_info("uint8")));

    let options = CogOptions {
        translate_bin: script,
        ..nodata_options(-9999.0)
    };
    let converter = GdalCogConverter::new(Arc::new(uploading_store()), options)
        .with_inspector(Arc::new(inspector));

    converter.convert(job(staging.path())).await.expect("conversion succeeds");

    let args = std::fs::read_to_string(&args_file).unwrap();
    let args: Vec<&str> = args.lines().collect();
    let at = args.iter().position(|a| *a == "-a_nodata").expect("nodata flag passed");
    assert_eq!(args[at + 1], "0");
}

#[cfg(unix)]
#[tokio::test]
async fn failed_local_copy_does_not_fail_a_published_cog() {
    let tools = tempdir().unwrap();
    let staging = tempdir().unwrap();
    let (script, _) = fake_translate(tools.path());
    let blocker = tools.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let options = CogOptions {
        translate_bin: script,
        keep_local_dir: Some(blocker.join("keep")),
        ..CogOptions::default()
    };
    let converter = GdalCogConverter::new(Arc::new(uploading_store()), options);

    converter
        .convert(job(staging.path()))
        .await
        .expect("local copy failure is only a warning");
}
