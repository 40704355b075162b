/// Integration tests for the Dropbox and Google Drive backends.
///
/// These tests require real access tokens and are skipped if env vars are not set.
///
/// Run with:
///   DROPBOX_TEST_TOKEN="..." \
///   GDRIVE_TEST_TOKEN="..." \
///   cargo test -p savesync-storage --test cloud_providers -- --nocapture
#[cfg(any(feature = "dropbox", feature = "gdrive"))]
mod common {
    use std::sync::Arc;
    use std::time::Duration;

    use savesync_core::revision;
    use savesync_keys::CredentialStore;
    use savesync_keys::plain::PlainProtector;
    use savesync_storage::CloudStorage;
    use savesync_storage::auth::OAuthToken;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    pub fn store_with_token(tmp: &TempDir, provider_id: &str, access_token: &str) -> Arc<CredentialStore> {
        let store = CredentialStore::new(tmp.path(), Box::new(PlainProtector)).unwrap();
        OAuthToken {
            access_token: access_token.to_string(),
            refresh_token: None,
            expires_at: None,
        }
        .save(&store, provider_id)
        .unwrap();
        Arc::new(store)
    }

    pub async fn exercise(storage: &dyn CloudStorage) {
        let cancel = CancellationToken::new();
        storage.initialize(&cancel).await.expect("initialize failed");

        let root = format!("/savesync-test-{}", revision::format(revision::now()));
        let name = revision::remote_filename(&root, revision::now());
        assert!(storage.upload(&name, b"payload".to_vec(), &cancel).await.unwrap());

        let files = storage.list_files(&root, &cancel).await.unwrap();
        assert_eq!(files.len(), 1, "expected exactly one revision");
        let data = storage.download(&files[0], &cancel).await.unwrap();
        assert_eq!(data, b"payload");

        assert!(
            storage
                .delete_many(&files, Duration::from_secs(20), &cancel)
                .await
                .unwrap()
        );
        assert!(storage.list_files(&root, &cancel).await.unwrap().is_empty());
        storage.dispose().await;
    }
}

#[cfg(feature = "dropbox")]
mod dropbox_tests {
    use std::sync::Arc;

    use savesync_storage::auth::NonInteractivePrompt;
    use savesync_storage::dropbox::DropboxStorage;
    use tempfile::TempDir;

    #[tokio::test]
    async fn dropbox_roundtrip() {
        let Ok(token) = std::env::var("DROPBOX_TEST_TOKEN") else {
            eprintln!("SKIP: DROPBOX_TEST_TOKEN not set");
            return;
        };
        let app_key = std::env::var("DROPBOX_TEST_APP_KEY").unwrap_or_default();
        let tmp = TempDir::new().unwrap();
        let store = super::common::store_with_token(&tmp, "dropbox", &token);
        let storage = DropboxStorage::new(&app_key, None, store, Arc::new(NonInteractivePrompt));
        super::common::exercise(&storage).await;
    }
}

#[cfg(feature = "gdrive")]
mod gdrive_tests {
    use std::sync::Arc;

    use savesync_storage::auth::NonInteractivePrompt;
    use savesync_storage::gdrive::GoogleDriveStorage;
    use tempfile::TempDir;

    #[tokio::test]
    async fn gdrive_roundtrip() {
        let Ok(token) = std::env::var("GDRIVE_TEST_TOKEN") else {
            eprintln!("SKIP: GDRIVE_TEST_TOKEN not set");
            return;
        };
        let client_id = std::env::var("GDRIVE_TEST_CLIENT_ID").unwrap_or_default();
        let tmp = TempDir::new().unwrap();
        let store = super::common::store_with_token(&tmp, "google-drive", &token);
        let storage = GoogleDriveStorage::new(
            "SaveSync tests",
            &client_id,
            None,
            store,
            Arc::new(NonInteractivePrompt),
        );
        super::common::exercise(&storage).await;
    }
}
