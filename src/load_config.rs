use crate::config::{AppConfig, BatchConfig, CogOptions, SourceSelection, DEFAULT_PER_FILE_TIMEOUT};
use crate::index::ROOT_KEY;
use anyhow::Result;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

/// Environment variable that overrides `index.path`.
pub const INDEX_PATH_ENV: &str = "DRCS_INDEX_PATH";

#[derive(Deserialize)]
struct StaticConfig {
    #[serde(default)]
    index: IndexSection,
    source: SourceSection,
    destination: DestinationSection,
    #[serde(default)]
    staging_dir: Option<PathBuf>,
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    batch: BatchSection,
    #[serde(default)]
    cog: CogOptions,
}

#[derive(Deserialize, Default)]
struct IndexSection {
    #[serde(default)]
    path: Option<PathBuf>,
}

#[derive(Deserialize)]
struct SourceSection {
    bucket: String,
    path: String,
    #[serde(default = "default_base")]
    base: String,
}

fn default_base() -> String {
    ROOT_KEY.to_string()
}

#[derive(Deserialize)]
struct DestinationSection {
    bucket: String,
    #[serde(default)]
    prefix: String,
}

#[derive(Deserialize)]
#[serde(default)]
struct BatchSection {
    concurrency: usize,
    per_file_timeout_secs: u64,
    persist_metadata: bool,
    persist_ledger: bool,
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            concurrency: 1,
            per_file_timeout_secs: DEFAULT_PER_FILE_TIMEOUT.as_secs(),
            persist_metadata: true,
            persist_ledger: true,
        }
    }
}

/// Loads the static YAML run description and merges the environment into it.
/// Returns a validated AppConfig or an error.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!("Failed to read config file {:?}: {}", path_ref, e));
        }
    };

    let static_conf: StaticConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    if static_conf.source.bucket.trim().is_empty() {
        error!("source.bucket is empty");
        anyhow::bail!("source.bucket must not be empty");
    }
    if static_conf.destination.bucket.trim().is_empty() {
        error!("destination.bucket is empty");
        anyhow::bail!("destination.bucket must not be empty");
    }
    if static_conf.source.path.trim_matches('/').is_empty() {
        error!("source.path is empty");
        anyhow::bail!("source.path must not be empty");
    }
    if static_conf.batch.concurrency == 0 {
        error!("batch.concurrency is zero");
        anyhow::bail!("batch.concurrency must be at least 1");
    }
    if static_conf.batch.per_file_timeout_secs == 0 {
        error!("batch.per_file_timeout_secs is zero");
        anyhow::bail!("batch.per_file_timeout_secs must be greater than 0");
    }

    let index_path = match std::env::var(INDEX_PATH_ENV) {
        Ok(var) if !var.trim().is_empty() => {
            info!(index_path = %var, "{} found in env, overriding index.path", INDEX_PATH_ENV);
            Some(PathBuf::from(var))
        }
        _ => static_conf.index.path,
    };

    let mut batch = BatchConfig::new(
        static_conf.source.bucket,
        static_conf.destination.bucket,
        static_conf.destination.prefix,
    );
    batch.staging_dir = static_conf.staging_dir;
    batch.concurrency = static_conf.batch.concurrency;
    batch.per_file_timeout = Duration::from_secs(static_conf.batch.per_file_timeout_secs);
    batch.persist_metadata = static_conf.batch.persist_metadata;
    batch.persist_ledger = static_conf.batch.persist_ledger;

    let config = AppConfig {
        index_path,
        source: SourceSelection {
            path: static_conf.source.path,
            base: static_conf.source.base,
        },
        event: static_conf.event.filter(|e| !e.is_empty()),
        region: static_conf.region,
        batch,
        cog: static_conf.cog,
    };
    config.trace_loaded();
    info!("Config loaded and merged successfully");
    Ok(config)
}
