//! Tests for MetadataFile

use chunkstore::{Config, DoubleBufferedStore, MetadataFile};
use tempfile::TempDir;

#[test]
fn test_store_and_load() {
    let temp_dir = TempDir::new().unwrap();
    let metadata = MetadataFile::new(temp_dir.path(), "test");

    metadata.store(b"opaque blob").unwrap();

    assert_eq!(metadata.load().unwrap(), Some(b"opaque blob".to_vec()));
    assert_eq!(metadata.path(), temp_dir.path().join("test-metadata"));
}

#[test]
fn test_store_replaces_blob() {
    let temp_dir = TempDir::new().unwrap();
    let metadata = MetadataFile::new(temp_dir.path(), "test");

    metadata.store(b"first").unwrap();
    metadata.store(b"").unwrap();

    assert_eq!(metadata.load().unwrap(), Some(Vec::new()));
}

#[test]
fn test_load_missing() {
    let temp_dir = TempDir::new().unwrap();
    let metadata = MetadataFile::new(temp_dir.path(), "test");

    assert_eq!(metadata.load().unwrap(), None);
    metadata.remove().unwrap();
}

#[test]
fn test_load_corrupt() {
    let temp_dir = TempDir::new().unwrap();
    let metadata = MetadataFile::new(temp_dir.path(), "test");
    metadata.store(b"some metadata").unwrap();

    let mut bytes = std::fs::read(metadata.path()).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    std::fs::write(metadata.path(), &bytes).unwrap();

    assert_eq!(metadata.load().unwrap(), None);
}

#[test]
fn test_load_truncated() {
    let temp_dir = TempDir::new().unwrap();
    let metadata = MetadataFile::new(temp_dir.path(), "test");
    metadata.store(b"some metadata").unwrap();

    let bytes = std::fs::read(metadata.path()).unwrap();
    std::fs::write(metadata.path(), &bytes[..bytes.len() - 3]).unwrap();

    assert_eq!(metadata.load().unwrap(), None);
}

#[test]
fn test_remove() {
    let temp_dir = TempDir::new().unwrap();
    let metadata = MetadataFile::new(temp_dir.path(), "test");
    metadata.store(b"blob").unwrap();

    metadata.remove().unwrap();

    assert!(!metadata.path().exists());
    assert_eq!(metadata.load().unwrap(), None);
}

#[test]
fn test_store_metadata_lives_beside_data_files() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .base_name("objects")
        .build();
    let store = DoubleBufferedStore::new(config).unwrap();

    assert_eq!(
        store.metadata().path(),
        temp_dir.path().join("objects-metadata")
    );
}
