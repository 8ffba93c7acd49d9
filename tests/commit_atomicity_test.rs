//! Tests that a failed commit leaves the key fully absent with no staged
//! files left behind, regardless of where in the rename sequence it failed.

use partcache::entry_store::EntryStore;
use partcache::CacheError;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

async fn open_store(dir: &TempDir, max_size: u64) -> Arc<EntryStore> {
    EntryStore::open(dir.path().to_path_buf(), max_size, true)
        .await
        .unwrap()
}

fn stage(store: &EntryStore, content: &[u8]) -> PathBuf {
    let path = store.allocate_temp_file().unwrap();
    std::fs::write(&path, content).unwrap();
    path
}

/// Names of plain files currently in the cache directory
fn file_names(dir: &TempDir) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .flatten()
        .filter(|e| e.path().is_file())
        .map(|e| e.file_name().into_string().unwrap())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_failed_second_rename_rolls_back_first() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir, 1024).await;

    let staged_zero = stage(&store, b"part zero content");
    // Never written: the rename of part 1 fails with NotFound
    let missing_one = store.allocate_temp_file().unwrap();

    let result = store.commit("entry", &[staged_zero.clone(), missing_one]).await;
    assert!(matches!(result, Err(CacheError::CommitFailed(_))));

    // All-or-nothing: the key is fully absent afterwards
    assert!(!store.exists("entry", 0));
    assert!(!store.exists("entry", 1));
    assert_eq!(store.size(), 0);

    // No staged file survives the rollback either
    assert!(!staged_zero.exists());
    assert!(file_names(&dir).is_empty());
}

#[tokio::test]
async fn test_blocked_destination_rolls_back_and_discards_staging() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir, 1024).await;

    // A directory squatting on the part-1 path makes its rename fail
    let blocker = dir.path().join("entry.1");
    std::fs::create_dir(&blocker).unwrap();

    let staged = vec![stage(&store, b"part zero"), stage(&store, b"part one")];
    let result = store.commit("entry", &staged).await;
    assert!(matches!(result, Err(CacheError::CommitFailed(_))));

    assert!(!store.exists("entry", 0));
    assert_eq!(store.size(), 0);
    for path in &staged {
        assert!(!path.exists(), "staged file {:?} should be discarded", path);
    }
    assert!(file_names(&dir).is_empty());

    // Once the blocker is gone, the same key commits cleanly again
    std::fs::remove_dir(&blocker).unwrap();
    let retry = vec![stage(&store, b"part zero"), stage(&store, b"part one")];
    store.commit("entry", &retry).await.unwrap();
    assert!(store.exists("entry", 0));
    assert!(store.exists("entry", 1));
}

#[tokio::test]
async fn test_failed_commit_discards_prior_content() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir, 1024).await;

    store.commit("entry", &[stage(&store, b"original")]).await.unwrap();

    // Removal of prior content is unconditional, so a failed re-commit
    // leaves the key absent rather than restoring the original
    let missing = store.allocate_temp_file().unwrap();
    let result = store.commit("entry", &[missing]).await;
    assert!(matches!(result, Err(CacheError::CommitFailed(_))));

    assert!(!store.exists("entry", 0));
    assert_eq!(store.size(), 0);
}

#[tokio::test]
async fn test_failed_commit_leaves_unrelated_entries_intact() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir, 1024).await;

    store.commit("stable", &[stage(&store, b"stable content")]).await.unwrap();

    let missing = store.allocate_temp_file().unwrap();
    assert!(store.commit("doomed", &[missing]).await.is_err());

    assert!(store.exists("stable", 0));
    assert_eq!(store.size(), 1);
    assert_eq!(file_names(&dir), vec!["stable.0".to_string()]);
}
