use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use crate::batch::{default_cog_name, run_batch};
use crate::cache::{cache_status, clear_cache, DEFAULT_CACHE_DIR};
use crate::cog::validate_cog;
use crate::contract::ObjectStore;
use crate::gdal::{GdalCogConverter, GdalInfo};
use crate::index::{DirectoryIndex, Lookup, ROOT_KEY};
use crate::load_config::{load_config, INDEX_PATH_ENV};
use crate::publish::{write_ledger_local, Publisher};
use crate::store::{list_keys, S3ObjectStore};

/// CLI for drcs-cog: browse the activation index and convert imagery to COGs.
#[derive(Parser)]
#[clap(
    name = "drcs-cog",
    version,
    about = "Browse the DRCS activation index and convert GeoTIFFs to Cloud-Optimized GeoTIFFs"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the files stored at a logical path of the index
    Files {
        /// Logical path, e.g. drcs_activations/202405_Flood_TX/planet
        #[clap(long)]
        path: String,
        /// Leading segment stripped before walking the index
        #[clap(long, default_value = ROOT_KEY)]
        base: String,
        /// Index JSON file; defaults to DRCS_INDEX_PATH, then the usual locations
        #[clap(long)]
        index: Option<PathBuf>,
        /// Print object keys (`path/name`) instead of bare names
        #[clap(long)]
        full: bool,
    },
    /// List the subdirectories at a logical path of the index
    Dirs {
        #[clap(long, default_value = ROOT_KEY)]
        path: String,
        #[clap(long)]
        index: Option<PathBuf>,
    },
    /// Convert every file of the configured index path to COG and publish the ledger
    Convert {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Also write files_converted.csv to this local path
        #[clap(long)]
        ledger_out: Option<PathBuf>,
    },
    /// List object keys under a prefix of a bucket
    ListKeys {
        #[clap(long)]
        bucket: String,
        #[clap(long)]
        prefix: String,
        #[clap(long, default_value = ".tif")]
        ext: String,
        #[clap(long)]
        region: Option<String>,
    },
    /// Check whether a local file looks like a Cloud-Optimized GeoTIFF
    Validate {
        path: PathBuf,
        #[clap(long, default_value = "gdalinfo")]
        gdalinfo: PathBuf,
    },
    /// Inspect or clear the local download cache
    Cache {
        #[clap(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// Count cached .tif files and their total size
    Status {
        #[clap(long, default_value = DEFAULT_CACHE_DIR)]
        dir: PathBuf,
    },
    /// Delete the cache directory (requires --confirm)
    Clear {
        #[clap(long, default_value = DEFAULT_CACHE_DIR)]
        dir: PathBuf,
        #[clap(long)]
        confirm: bool,
    },
}

/// Async CLI entrypoint shared by main() and the integration tests.
pub async fn run(cli: Cli) -> Result<()> {
    info!("trace_initialised");

    match cli.command {
        Commands::Files {
            path,
            base,
            index,
            full,
        } => {
            let index = load_index(index.as_deref())?;
            let lookup = if full {
                index.resolve_full_paths(&path, &base)
            } else {
                index.list_files(&path, &base)
            };
            print_lookup(&lookup);
            Ok(())
        }
        Commands::Dirs { path, index } => {
            let index = load_index(index.as_deref())?;
            print_lookup(&index.list_subdirectories(&path));
            Ok(())
        }
        Commands::Convert { config, ledger_out } => convert(&config, ledger_out.as_deref()).await,
        Commands::ListKeys {
            bucket,
            prefix,
            ext,
            region,
        } => {
            let store = S3ObjectStore::from_env(region.as_deref()).await;
            let keys = list_keys(&store, &bucket, &prefix, &ext).await?;
            for key in &keys {
                println!("{key}");
            }
            eprintln!("{} key(s)", keys.len());
            Ok(())
        }
        Commands::Validate { path, gdalinfo } => {
            let inspector = GdalInfo::new(gdalinfo);
            let (is_cog, report) = validate_cog(&inspector, &path).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !is_cog {
                anyhow::bail!("{} is not a valid COG", path.display());
            }
            Ok(())
        }
        Commands::Cache { action } => match action {
            CacheAction::Status { dir } => {
                let status = cache_status(&dir)?;
                println!("Cache directory: {}", dir.display());
                println!("Files: {}", status.total_files);
                println!("Total size: {:.2} GiB", status.total_gib());
                for (file, size) in &status.files {
                    println!("  {} ({} bytes)", file.display(), size);
                }
                Ok(())
            }
            CacheAction::Clear { dir, confirm } => {
                if clear_cache(&dir, confirm)? {
                    println!("Cleared {}", dir.display());
                } else if !confirm && dir.exists() {
                    println!("Pass --confirm to delete {}", dir.display());
                } else {
                    println!("Nothing to clear at {}", dir.display());
                }
                Ok(())
            }
        },
    }
}

fn load_index(explicit: Option<&Path>) -> Result<DirectoryIndex> {
    let from_env = std::env::var_os(INDEX_PATH_ENV).map(PathBuf::from);
    let path = explicit.map(Path::to_path_buf).or(from_env);
    DirectoryIndex::load(path.as_deref()).map_err(|e| {
        error!(error = %e, "Failed to load directory index");
        anyhow::Error::new(e)
    })
}

fn print_lookup(lookup: &Lookup) {
    for entry in &lookup.entries {
        println!("{entry}");
    }
    if let Some(diagnostic) = &lookup.diagnostic {
        eprintln!("{diagnostic}");
    }
}

async fn convert(config_path: &Path, ledger_out: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let index = load_index(config.index_path.as_deref())?;

    let lookup = index.resolve_full_paths(&config.source.path, &config.source.base);
    if let Some(diagnostic) = &lookup.diagnostic {
        eprintln!("{diagnostic}");
    }
    if lookup.is_empty() {
        println!("No source files to convert.");
        return Ok(());
    }

    let store: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::from_env(config.region.as_deref()).await);
    let converter = GdalCogConverter::new(Arc::clone(&store), config.cog.clone());
    let inspector = GdalInfo::new(config.cog.info_bin.clone());
    let publisher = Publisher::new(store.as_ref(), &inspector);

    println!("Converting {} file(s)...", lookup.entries.len());
    let outcome = run_batch(
        &lookup.entries,
        &config.batch,
        default_cog_name,
        &converter,
        config.event.as_deref(),
        Some(publisher),
    )
    .await?;

    if let Some(path) = ledger_out {
        write_ledger_local(&outcome.ledger, path).await?;
    }
    if let Some(report) = &outcome.publication {
        info!(metadata = ?report.metadata, ledger = ?report.ledger, "Publication finished");
    }
    println!("{}", outcome.summary());
    Ok(())
}
