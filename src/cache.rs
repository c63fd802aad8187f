//! Housekeeping for the local download/staging cache directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

/// Default cache directory, relative to the working directory.
pub const DEFAULT_CACHE_DIR: &str = "data_download";

/// Cached `.tif` files found under a cache directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStatus {
    pub total_files: usize,
    pub total_bytes: u64,
    /// Paths relative to the cache directory with their sizes, sorted by path.
    pub files: Vec<(PathBuf, u64)>,
}

impl CacheStatus {
    pub fn total_gib(&self) -> f64 {
        self.total_bytes as f64 / (1024.0 * 1024.0 * 1024.0)
    }
}

/// Count cached `.tif` files. A missing directory is created and reported empty.
pub fn cache_status(dir: &Path) -> io::Result<CacheStatus> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
        info!(path = %dir.display(), "Cache directory created");
        return Ok(CacheStatus::default());
    }

    fn visit(dir: &Path, root: &Path, out: &mut Vec<(PathBuf, u64)>) -> io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                visit(&path, root, out)?;
            } else if path.extension().is_some_and(|ext| ext == "tif") {
                let size = fs::metadata(&path)?.len();
                let relative = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
                debug!(file = %relative.display(), size, "Cached file");
                out.push((relative, size));
            }
        }
        Ok(())
    }

    let mut files = Vec::new();
    visit(dir, dir, &mut files)?;
    files.sort();
    let status = CacheStatus {
        total_files: files.len(),
        total_bytes: files.iter().map(|(_, size)| size).sum(),
        files,
    };
    info!(
        path = %dir.display(),
        total_files = status.total_files,
        total_gib = %format!("{:.2}", status.total_gib()),
        "Cache status"
    );
    Ok(status)
}

/// Remove the cache directory. Without `confirm` nothing is deleted.
///
/// Returns whether anything was removed.
pub fn clear_cache(dir: &Path, confirm: bool) -> io::Result<bool> {
    if !dir.exists() {
        info!(path = %dir.display(), "Cache directory does not exist");
        return Ok(false);
    }
    if !confirm {
        warn!(path = %dir.display(), "Refusing to clear cache without confirmation");
        return Ok(false);
    }
    fs::remove_dir_all(dir)?;
    info!(path = %dir.display(), "Cache cleared");
    Ok(true)
}
