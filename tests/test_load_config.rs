use std::env;
use std::fs::write;
use std::path::PathBuf;
use std::time::Duration;

use drcs_cog::config::DEFAULT_PER_FILE_TIMEOUT;
use drcs_cog::load_config::{load_config, INDEX_PATH_ENV};
use serial_test::serial;
use tempfile::NamedTempFile;

fn config_file(yaml: &str) -> NamedTempFile {
    let file = NamedTempFile::new().expect("temp file");
    write(file.path(), yaml).unwrap();
    file
}

const FULL_CONFIG: &str = r#"
index:
  path: ./s3-crawler/drcs_activations_tif_files.json
source:
  bucket: drcs-imagery
  path: drcs_activations/202405_Flood_TX/planet
destination:
  bucket: drcs-cogs
  prefix: /cogs/202405_Flood_TX/
staging_dir: ./data_download
event: 202405_Flood_TX
region: us-east-1
batch:
  concurrency: 4
  per_file_timeout_secs: 600
  persist_metadata: false
cog:
  compress: ZSTD
  nodata: 0
"#;

/// A complete static config is merged into runtime settings.
#[tokio::test]
#[serial]
async fn test_load_config_reads_every_section() {
    env::remove_var(INDEX_PATH_ENV);
    let file = config_file(FULL_CONFIG);

    let config = load_config(file.path()).expect("Config should load");

    assert_eq!(
        config.index_path,
        Some(PathBuf::from("./s3-crawler/drcs_activations_tif_files.json"))
    );
    assert_eq!(config.source.path, "drcs_activations/202405_Flood_TX/planet");
    assert_eq!(config.source.base, "drcs_activations");
    assert_eq!(config.event.as_deref(), Some("202405_Flood_TX"));
    assert_eq!(config.region.as_deref(), Some("us-east-1"));

    let batch = &config.batch;
    assert_eq!(batch.source_bucket, "drcs-imagery");
    assert_eq!(batch.destination_bucket, "drcs-cogs");
    assert_eq!(batch.destination_prefix, "cogs/202405_Flood_TX");
    assert_eq!(batch.staging_dir, Some(PathBuf::from("./data_download")));
    assert_eq!(batch.concurrency, 4);
    assert_eq!(batch.per_file_timeout, Duration::from_secs(600));
    assert!(!batch.persist_metadata);
    assert!(batch.persist_ledger);

    assert_eq!(config.cog.compress, "ZSTD");
    assert_eq!(config.cog.nodata, Some(0.0));
    assert_eq!(config.cog.blocksize, 512);
}

/// Omitted optional sections fall back to defaults.
#[tokio::test]
#[serial]
async fn test_load_config_applies_defaults() {
    env::remove_var(INDEX_PATH_ENV);
    let file = config_file(
        "source:\n  bucket: a\n  path: drcs_activations/e\ndestination:\n  bucket: b\n",
    );

    let config = load_config(file.path()).expect("Config should load");

    assert_eq!(config.index_path, None);
    assert_eq!(config.event, None);
    assert_eq!(config.batch.destination_prefix, "");
    assert_eq!(config.batch.concurrency, 1);
    assert_eq!(config.batch.per_file_timeout, DEFAULT_PER_FILE_TIMEOUT);
    assert!(config.batch.persist_metadata && config.batch.persist_ledger);
    assert_eq!(config.cog.translate_bin, PathBuf::from("gdal_translate"));
}

/// The environment overrides the configured index location.
#[tokio::test]
#[serial]
async fn test_load_config_env_overrides_index_path() {
    let file = config_file(FULL_CONFIG);
    env::set_var(INDEX_PATH_ENV, "/srv/index.json");

    let config = load_config(file.path());
    env::remove_var(INDEX_PATH_ENV);

    assert_eq!(
        config.expect("Config should load").index_path,
        Some(PathBuf::from("/srv/index.json"))
    );
}

#[tokio::test]
#[serial]
async fn test_load_config_rejects_invalid_values() {
    env::remove_var(INDEX_PATH_ENV);
    let cases = [
        (
            "source:\n  bucket: ''\n  path: p\ndestination:\n  bucket: b\n",
            "source.bucket",
        ),
        (
            "source:\n  bucket: a\n  path: p\ndestination:\n  bucket: ' '\n",
            "destination.bucket",
        ),
        (
            "source:\n  bucket: a\n  path: /\ndestination:\n  bucket: b\n",
            "source.path",
        ),
        (
            "source:\n  bucket: a\n  path: p\ndestination:\n  bucket: b\nbatch:\n  concurrency: 0\n",
            "concurrency",
        ),
        (
            "source:\n  bucket: a\n  path: p\ndestination:\n  bucket: b\nbatch:\n  per_file_timeout_secs: 0\n",
            "per_file_timeout_secs",
        ),
    ];
    for (yaml, field) in cases {
        let file = config_file(yaml);
        let msg = load_config(file.path()).unwrap_err().to_string();
        assert!(msg.contains(field), "expected error about {field}, got: {msg}");
    }
}

/// If the config file is not valid YAML, load_config errors and reports as such.
#[tokio::test]
#[serial]
async fn test_load_config_errors_for_invalid_file() {
    let file = config_file("not-yaml: [:::");
    let msg = load_config(file.path()).unwrap_err().to_string();
    assert!(
        msg.contains("parse") || msg.contains("YAML"),
        "Parse error expected, got: {msg}"
    );
}

#[tokio::test]
#[serial]
async fn test_load_config_errors_for_missing_file() {
    let msg = load_config("/nonexistent/drcs-cog.yaml")
        .unwrap_err()
        .to_string();
    assert!(msg.contains("Failed to read config file"), "{msg}");
}
