//! Error types shared across the index, store, conversion and publishing steps.
//!
//! Only [`IndexError`] and [`BatchError`] abort a run. Everything else is
//! either captured into the ledger ([`ConvertError`]) or logged as a warning
//! ([`PublishError`]).

use std::path::PathBuf;
use std::time::Duration;

/// Boxed upstream error, as returned by the AWS SDK and friends.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failures while loading the directory index.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("index file not found, tried: {tried:?}")]
    IndexNotFound { tried: Vec<PathBuf> },

    #[error("failed to read index file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse index JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("index document has no top-level '{0}' key")]
    MissingRoot(String),

    /// A node carries a file list and child directories at the same time.
    #[error("node '{path}' has both a file list and child directories")]
    MixedNode { path: String },

    #[error("malformed node '{path}': {reason}")]
    MalformedNode { path: String, reason: String },
}

/// Failures talking to the object store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to list s3://{bucket}/{prefix}: {source}")]
    List {
        bucket: String,
        prefix: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to download s3://{bucket}/{key}: {source}")]
    Download {
        bucket: String,
        key: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to upload s3://{bucket}/{key}: {source}")]
    Upload {
        bucket: String,
        key: String,
        #[source]
        source: BoxError,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of a single file conversion. Recorded in the ledger, never fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("{tool} exited with {status}: {stderr}")]
    Tool {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("failed to launch {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("conversion timed out after {:?}", .0)]
    TimedOut(Duration),

    /// Free-form failure for custom [`Converter`](crate::contract::Converter) implementations.
    #[error("{0}")]
    Other(String),
}

/// Failures while reading raster facts from a local file.
#[derive(Debug, thiserror::Error)]
pub enum InspectError {
    #[error("failed to launch {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}: {stderr}")]
    Tool {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("failed to parse raster description: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("raster has no bands")]
    NoBands,

    #[error("{0}")]
    Other(String),
}

/// Failures persisting `metadata.json` or `files_converted.csv`.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Inspect(#[from] InspectError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialise metadata: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failures that abort a whole batch run.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("failed to prepare staging directory {path:?}: {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
