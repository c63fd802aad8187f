use std::fs;
use std::path::PathBuf;

use drcs_cog::cache::{cache_status, clear_cache};
use tempfile::tempdir;

#[test]
fn missing_cache_directory_is_created_empty() {
    let root = tempdir().unwrap();
    let dir = root.path().join("data_download");

    let status = cache_status(&dir).unwrap();

    assert!(dir.is_dir());
    assert_eq!(status.total_files, 0);
    assert_eq!(status.total_bytes, 0);
}

#[test]
fn status_counts_nested_tifs_only() {
    let root = tempdir().unwrap();
    let dir = root.path();
    fs::create_dir_all(dir.join("event/planet")).unwrap();
    fs::write(dir.join("b.tif"), vec![0u8; 10]).unwrap();
    fs::write(dir.join("event/planet/a.tif"), vec![0u8; 32]).unwrap();
    fs::write(dir.join("event/notes.txt"), b"ignored").unwrap();
    fs::write(dir.join("event/a.tif.aux.xml"), b"ignored").unwrap();

    let status = cache_status(dir).unwrap();

    assert_eq!(status.total_files, 2);
    assert_eq!(status.total_bytes, 42);
    assert_eq!(
        status.files,
        vec![
            (PathBuf::from("b.tif"), 10),
            (PathBuf::from("event/planet/a.tif"), 32),
        ]
    );
}

#[test]
fn clear_requires_confirmation() {
    let root = tempdir().unwrap();
    let dir = root.path().join("cache");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("a.tif"), b"x").unwrap();

    assert!(!clear_cache(&dir, false).unwrap());
    assert!(dir.join("a.tif").exists());

    assert!(clear_cache(&dir, true).unwrap());
    assert!(!dir.exists());
}

#[test]
fn clearing_a_missing_directory_is_a_no_op() {
    let root = tempdir().unwrap();
    assert!(!clear_cache(&root.path().join("absent"), true).unwrap());
}
