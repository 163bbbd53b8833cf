//! Ephemeral file lifetime
//!
//! Run with: cargo test -p grabcore --test files_test

use grabcore::{AppError, FileRegistry};
use std::time::Duration;

#[tokio::test]
async fn test_file_is_deleted_after_ttl() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("video.mp4");
    std::fs::write(&path, b"mp4").unwrap();

    let registry = FileRegistry::new(Duration::from_millis(100));
    let id = registry.register(1, &path);
    assert_eq!(registry.resolve(id).unwrap(), path);

    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(matches!(registry.resolve(id), Err(AppError::NotFound(_))));
    assert!(!path.exists());
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_entries_expire_independently() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("a.mp3");
    let second = dir.path().join("b.gif");
    std::fs::write(&first, b"a").unwrap();
    std::fs::write(&second, b"b").unwrap();

    let registry = FileRegistry::new(Duration::from_millis(300));
    let a = registry.register(1, &first);
    tokio::time::sleep(Duration::from_millis(200)).await;
    let b = registry.register(2, &second);

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(registry.resolve(a).is_err());
    assert!(registry.resolve(b).is_ok());
    assert!(second.exists());
}

#[tokio::test]
async fn test_already_deleted_file_is_tolerated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gone.mp4");
    std::fs::write(&path, b"x").unwrap();

    let registry = FileRegistry::new(Duration::from_millis(50));
    let id = registry.register(1, &path);
    std::fs::remove_file(&path).unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(registry.resolve(id).is_err());
    assert!(registry.is_empty());
}
