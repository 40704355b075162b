/// Behaviour every backend must share, exercised against the backends that
/// need no network: the local folder and the null backend.
use std::sync::Arc;
use std::time::Duration;

use savesync_core::revision;
use savesync_core::types::RemoteFileInfo;
use savesync_storage::local::LocalFolderStorage;
use savesync_storage::null::NullStorage;
use savesync_storage::{CloudStorage, ProviderState, StorageError};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn stamp(day: u32) -> chrono::NaiveDateTime {
    chrono::NaiveDate::from_ymd_opt(2024, 3, day)
        .unwrap()
        .and_hms_milli_opt(12, 0, 0, 0)
        .unwrap()
}

async fn assert_gated(storage: &dyn CloudStorage) {
    let cancel = CancellationToken::new();
    let file = RemoteFileInfo::parse("2024-03-01_12-00-00-000.zip", "id");
    assert_eq!(storage.state(), ProviderState::Uninitialized);
    assert!(matches!(
        storage.list_files("/", &cancel).await,
        Err(StorageError::NotInitialized(_))
    ));
    assert!(matches!(
        storage.upload("/x.zip", vec![1], &cancel).await,
        Err(StorageError::NotInitialized(_))
    ));
    assert!(matches!(
        storage.delete(&file, &cancel).await,
        Err(StorageError::NotInitialized(_))
    ));
}

#[tokio::test]
async fn every_backend_gates_on_initialize() {
    let tmp = TempDir::new().unwrap();
    let backends: Vec<Arc<dyn CloudStorage>> = vec![
        Arc::new(NullStorage::new()),
        Arc::new(LocalFolderStorage::new(tmp.path(), "contract")),
    ];
    for backend in &backends {
        assert_gated(backend.as_ref()).await;
        backend.initialize(&CancellationToken::new()).await.unwrap();
        assert_eq!(backend.state(), ProviderState::Ready);
        backend.dispose().await;
        assert_gated(backend.as_ref()).await;
    }
}

#[tokio::test]
async fn local_folder_keeps_revision_history() {
    let tmp = TempDir::new().unwrap();
    let storage = LocalFolderStorage::new(&tmp.path().join("cloud"), "contract");
    let cancel = CancellationToken::new();
    storage.initialize(&cancel).await.unwrap();

    for day in 1..=4 {
        let name = revision::remote_filename("/DarkSoulsIII", stamp(day));
        assert!(
            storage
                .upload(&name, format!("rev {day}").into_bytes(), &cancel)
                .await
                .unwrap()
        );
    }

    let files = revision::sort_descending(storage.list_files("/DarkSoulsIII", &cancel).await.unwrap());
    assert_eq!(files.len(), 4);
    assert_eq!(files[0].store_timestamp(), Some(stamp(4)));
    assert_eq!(storage.download(&files[0], &cancel).await.unwrap(), b"rev 4");

    let stale = &files[2..];
    assert!(
        storage
            .delete_many(stale, Duration::from_secs(5), &cancel)
            .await
            .unwrap()
    );

    let left = revision::sort_descending(storage.list_files("/DarkSoulsIII", &cancel).await.unwrap());
    let days: Vec<_> = left.iter().filter_map(|f| f.store_timestamp()).collect();
    assert_eq!(days, vec![stamp(4), stamp(3)]);
}

#[tokio::test]
async fn cancelled_batch_stops_early() {
    let tmp = TempDir::new().unwrap();
    let storage = LocalFolderStorage::new(tmp.path(), "contract");
    let cancel = CancellationToken::new();
    storage.initialize(&cancel).await.unwrap();
    storage
        .upload("/2024-03-01_12-00-00-000.zip", vec![1], &cancel)
        .await
        .unwrap();
    let files = storage.list_files("/", &cancel).await.unwrap();

    cancel.cancel();
    let result = storage
        .delete_many(&files, Duration::from_secs(5), &cancel)
        .await;
    assert!(matches!(result, Err(StorageError::Cancelled(_))));
}
