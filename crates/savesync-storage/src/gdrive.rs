#[cfg(feature = "gdrive")]
mod inner {
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, FixedOffset};
    use futures::future::join_all;
    use reqwest::StatusCode;
    use savesync_core::revision;
    use savesync_core::types::{ProviderKind, RemoteFileInfo};
    use savesync_keys::CredentialStore;
    use serde::Deserialize;
    use serde_json::json;
    use tokio::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    use crate::auth::{AuthPrompt, OAuthToken, Pkce, random_token};
    use crate::budget::{batch_timeout, bounded};
    use crate::error::{Result, StorageError};
    use crate::oauth::{LoopbackRedirect, TokenEndpoint};
    use crate::provider::{CloudStorage, ProviderState, StateCell};

    const SCOPE: &str = "https://www.googleapis.com/auth/drive.appdata";
    const APP_DATA_FOLDER: &str = "appDataFolder";
    const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
    const MULTIPART_BOUNDARY: &str = "savesync-multipart-boundary";

    /// Google endpoints; overridable for tests against a local server.
    #[derive(Debug, Clone)]
    pub struct DriveEndpoints {
        pub authorize_url: String,
        pub token_url: String,
        pub api_base: String,
        pub upload_base: String,
    }

    impl Default for DriveEndpoints {
        fn default() -> Self {
            Self {
                authorize_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
                token_url: "https://oauth2.googleapis.com/token".to_string(),
                api_base: "https://www.googleapis.com/drive/v3".to_string(),
                upload_base: "https://www.googleapis.com/upload/drive/v3".to_string(),
            }
        }
    }

    /// Google Drive backend restricted to the application data folder.
    ///
    /// Drive allows several files with the same name in one folder, so
    /// listings keep only the most recently created file per name.
    pub struct GoogleDriveStorage {
        application_name: String,
        endpoints: DriveEndpoints,
        token_endpoint: TokenEndpoint,
        http: reqwest::Client,
        credentials: Arc<CredentialStore>,
        prompt: Arc<dyn AuthPrompt>,
        state: StateCell,
        token: Mutex<Option<OAuthToken>>,
        folders: Mutex<HashMap<String, String>>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct FileList {
        #[serde(default)]
        next_page_token: Option<String>,
        #[serde(default)]
        files: Vec<DriveFile>,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub(crate) struct DriveFile {
        id: String,
        name: String,
        #[serde(default)]
        created_time: Option<String>,
        #[serde(default)]
        mime_type: Option<String>,
    }

    impl DriveFile {
        fn created(&self) -> Option<DateTime<FixedOffset>> {
            self.created_time
                .as_deref()
                .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        }

        fn is_folder(&self) -> bool {
            self.mime_type.as_deref() == Some(FOLDER_MIME)
        }
    }

    /// Keep the newest-created archive per name. Files without a readable
    /// creation time lose against any file that has one.
    pub(crate) fn newest_per_name(files: Vec<DriveFile>) -> Vec<RemoteFileInfo> {
        let mut newest: BTreeMap<String, DriveFile> = BTreeMap::new();
        for file in files {
            if file.is_folder() || !revision::is_archive_name(&file.name) {
                continue;
            }
            match newest.get(&file.name) {
                Some(current) if current.created() >= file.created() => {}
                _ => {
                    newest.insert(file.name.clone(), file);
                }
            }
        }
        newest
            .into_values()
            .map(|f| RemoteFileInfo::parse(f.name.trim_start_matches('/'), &f.id))
            .collect()
    }

    /// Split same-named files into the newest-created one and the rest.
    pub(crate) fn take_newest(mut files: Vec<DriveFile>) -> (Option<DriveFile>, Vec<DriveFile>) {
        let newest = files
            .iter()
            .enumerate()
            .max_by_key(|(_, f)| f.created())
            .map(|(i, _)| i);
        match newest {
            Some(i) => {
                let kept = files.swap_remove(i);
                (Some(kept), files)
            }
            None => (None, files),
        }
    }

    /// Quote a value for a Drive `q` expression.
    fn quote(value: &str) -> String {
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
    }

    /// Split `/a/b/2024-...zip` into (`a/b`, `2024-...zip`).
    pub(crate) fn split_remote(remote_filename: &str) -> (String, String) {
        let trimmed = remote_filename.trim_matches('/');
        match trimmed.rsplit_once('/') {
            Some((folder, name)) => (folder.to_string(), name.to_string()),
            None => (String::new(), trimmed.to_string()),
        }
    }

    fn multipart_body(metadata: &serde_json::Value, data: &[u8]) -> Vec<u8> {
        let mut body = Vec::with_capacity(data.len() + 512);
        body.extend_from_slice(
            format!(
                "--{MULTIPART_BOUNDARY}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n\
                 --{MULTIPART_BOUNDARY}\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}--\r\n").as_bytes());
        body
    }

    async fn check(response: reqwest::Response, operation: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED {
            return Err(StorageError::Authentication(format!(
                "{operation}: access token rejected: {body}"
            )));
        }
        Err(StorageError::Transport(format!(
            "{operation}: HTTP {status}: {body}"
        )))
    }

    impl GoogleDriveStorage {
        pub fn new(
            application_name: &str,
            client_id: &str,
            client_secret: Option<&str>,
            credentials: Arc<CredentialStore>,
            prompt: Arc<dyn AuthPrompt>,
        ) -> Self {
            Self::with_endpoints(
                application_name,
                client_id,
                client_secret,
                credentials,
                prompt,
                DriveEndpoints::default(),
            )
        }

        pub fn with_endpoints(
            application_name: &str,
            client_id: &str,
            client_secret: Option<&str>,
            credentials: Arc<CredentialStore>,
            prompt: Arc<dyn AuthPrompt>,
            endpoints: DriveEndpoints,
        ) -> Self {
            Self {
                application_name: application_name.to_string(),
                token_endpoint: TokenEndpoint {
                    url: endpoints.token_url.clone(),
                    client_id: client_id.to_string(),
                    client_secret: client_secret.map(str::to_string),
                },
                endpoints,
                http: reqwest::Client::new(),
                credentials,
                prompt,
                state: StateCell::default(),
                token: Mutex::new(None),
                folders: Mutex::new(HashMap::new()),
            }
        }

        fn authorize_url(&self, pkce: &Pkce, redirect_uri: &str, state: &str) -> Result<String> {
            let url = reqwest::Url::parse_with_params(
                &self.endpoints.authorize_url,
                &[
                    ("client_id", self.token_endpoint.client_id.as_str()),
                    ("redirect_uri", redirect_uri),
                    ("response_type", "code"),
                    ("scope", SCOPE),
                    ("code_challenge", pkce.challenge.as_str()),
                    ("code_challenge_method", "S256"),
                    ("state", state),
                    ("access_type", "offline"),
                    ("prompt", "consent"),
                ],
            )
            .map_err(|e| StorageError::InvalidArgument(format!("bad authorize URL: {e}")))?;
            Ok(url.to_string())
        }

        async fn authenticate(&self, cancel: &CancellationToken) -> Result<OAuthToken> {
            let stored = OAuthToken::load(&self.credentials, self.id())
                .map_err(|e| StorageError::Credentials(e.to_string()))?;

            if let Some(token) = stored {
                if !token.is_expired(chrono::Utc::now()) {
                    return Ok(token);
                }
                if token.can_refresh() {
                    tracing::info!(provider = self.id(), "Refreshing expired access token");
                    match self.token_endpoint.refresh(&self.http, &token).await {
                        Ok(refreshed) => {
                            self.persist(&refreshed)?;
                            return Ok(refreshed);
                        }
                        Err(StorageError::Authentication(reason)) => {
                            tracing::warn!(provider = self.id(), %reason, "Stored refresh token rejected, authorizing again");
                            OAuthToken::clear(&self.credentials, self.id())
                                .map_err(|e| StorageError::Credentials(e.to_string()))?;
                        }
                        Err(e) => return Err(e),
                    }
                }
            }

            self.authorize_interactively(cancel).await
        }

        async fn authorize_interactively(&self, cancel: &CancellationToken) -> Result<OAuthToken> {
            let redirect = LoopbackRedirect::bind().await?;
            let redirect_uri = redirect.redirect_uri();
            let pkce = Pkce::generate();
            let state = random_token(16);
            let url = self.authorize_url(&pkce, &redirect_uri, &state)?;

            self.prompt
                .open_authorization_page(self.name(), &url)
                .await
                .map_err(|e| StorageError::Authentication(e.to_string()))?;

            let code = redirect.wait_for_code(&state, cancel).await?;
            let token = self
                .token_endpoint
                .exchange_code(&self.http, &code, &pkce.verifier, Some(&redirect_uri))
                .await?;
            self.persist(&token)?;
            self.prompt
                .notify(self.name(), "Authorization process succeeded.")
                .await;
            Ok(token)
        }

        fn persist(&self, token: &OAuthToken) -> Result<()> {
            token
                .save(&self.credentials, self.id())
                .map_err(|e| StorageError::Credentials(e.to_string()))
        }

        async fn access_token(&self) -> Result<String> {
            self.state.ensure_ready(self.name())?;
            let mut guard = self.token.lock().await;
            let Some(token) = guard.as_ref() else {
                return Err(StorageError::NotInitialized(self.name().to_string()));
            };

            if token.is_expired(chrono::Utc::now()) && token.can_refresh() {
                let refreshed = self.token_endpoint.refresh(&self.http, token).await?;
                self.persist(&refreshed)?;
                let access = refreshed.access_token.clone();
                *guard = Some(refreshed);
                return Ok(access);
            }
            Ok(token.access_token.clone())
        }

        /// Every page of a `files.list` query inside the app data space.
        async fn query(&self, q: &str) -> Result<Vec<DriveFile>> {
            let mut files = Vec::new();
            let mut page_token: Option<String> = None;
            loop {
                let token = self.access_token().await?;
                let mut request = self
                    .http
                    .get(format!("{}/files", self.endpoints.api_base))
                    .bearer_auth(token)
                    .query(&[
                        ("spaces", APP_DATA_FOLDER),
                        ("q", q),
                        (
                            "fields",
                            "nextPageToken, files(id, name, createdTime, mimeType)",
                        ),
                        ("pageSize", "1000"),
                    ]);
                if let Some(page) = &page_token {
                    request = request.query(&[("pageToken", page.as_str())]);
                }

                let list: FileList = check(request.send().await?, "files.list")
                    .await?
                    .json()
                    .await?;
                files.extend(list.files);
                match list.next_page_token {
                    Some(next) if !next.is_empty() => page_token = Some(next),
                    _ => return Ok(files),
                }
            }
        }

        /// Id of the folder at `path` below the app data folder, creating
        /// missing levels when `create` is set.
        async fn resolve_folder(&self, path: &str, create: bool) -> Result<Option<String>> {
            let path = path.trim_matches('/');
            if path.is_empty() {
                return Ok(Some(APP_DATA_FOLDER.to_string()));
            }
            if let Some(id) = self.folders.lock().await.get(path) {
                return Ok(Some(id.clone()));
            }

            let mut parent = APP_DATA_FOLDER.to_string();
            for segment in path.split('/').filter(|s| !s.is_empty()) {
                let q = format!(
                    "name = {} and {} in parents and mimeType = {} and trashed = false",
                    quote(segment),
                    quote(&parent),
                    quote(FOLDER_MIME)
                );
                let found = self.query(&q).await?.into_iter().next();
                parent = match (found, create) {
                    (Some(folder), _) => folder.id,
                    (None, true) => self.create_folder(segment, &parent).await?,
                    (None, false) => return Ok(None),
                };
            }

            self.folders
                .lock()
                .await
                .insert(path.to_string(), parent.clone());
            Ok(Some(parent))
        }

        /// `Ok(false)` when Drive no longer knows the file.
        async fn delete_by_id(&self, id: &str) -> Result<bool> {
            let token = self.access_token().await?;
            let response = self
                .http
                .delete(format!("{}/files/{id}", self.endpoints.api_base))
                .bearer_auth(token)
                .send()
                .await?;
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(false);
            }
            check(response, "delete").await?;
            Ok(true)
        }

        async fn create_folder(&self, name: &str, parent: &str) -> Result<String> {
            let token = self.access_token().await?;
            let response = self
                .http
                .post(format!("{}/files", self.endpoints.api_base))
                .bearer_auth(token)
                .query(&[("fields", "id")])
                .json(&json!({ "name": name, "mimeType": FOLDER_MIME, "parents": [parent] }))
                .send()
                .await?;
            let created: serde_json::Value = check(response, "create folder").await?.json().await?;
            created["id"]
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| StorageError::Transport("folder creation returned no id".into()))
        }
    }

    #[async_trait]
    impl CloudStorage for GoogleDriveStorage {
        fn kind(&self) -> ProviderKind {
            ProviderKind::GoogleDrive
        }

        fn name(&self) -> &str {
            "Google Drive"
        }

        fn state(&self) -> ProviderState {
            self.state.get()
        }

        async fn initialize(&self, cancel: &CancellationToken) -> Result<()> {
            let attempt = self.state.begin_authentication();
            match self.authenticate(cancel).await {
                Ok(token) => {
                    *self.token.lock().await = Some(token);
                    attempt.succeed();
                    tracing::info!(provider = self.id(), application = %self.application_name, "Google Drive initialized");
                    Ok(())
                }
                Err(e) => {
                    drop(attempt);
                    tracing::warn!(provider = self.id(), error = %e, "Google Drive initialization failed");
                    Err(match e {
                        StorageError::Cancelled(_) | StorageError::Authentication(_) => e,
                        other => StorageError::Authentication(other.to_string()),
                    })
                }
            }
        }

        async fn list_files(
            &self,
            path: &str,
            _cancel: &CancellationToken,
        ) -> Result<Vec<RemoteFileInfo>> {
            self.state.ensure_ready(self.name())?;
            let Some(folder) = self.resolve_folder(path, false).await? else {
                return Ok(vec![]);
            };

            let q = format!("{} in parents and trashed = false", quote(&folder));
            let files = newest_per_name(self.query(&q).await?);
            tracing::debug!(provider = self.id(), path, files = files.len(), "Listed revisions");
            Ok(files)
        }

        async fn download(
            &self,
            file: &RemoteFileInfo,
            _cancel: &CancellationToken,
        ) -> Result<Vec<u8>> {
            self.state.ensure_ready(self.name())?;
            if file.remote_file_identifier().trim().is_empty() {
                return Err(StorageError::InvalidArgument("blank file identifier".into()));
            }

            let token = self.access_token().await?;
            let response = self
                .http
                .get(format!(
                    "{}/files/{}",
                    self.endpoints.api_base,
                    file.remote_file_identifier()
                ))
                .bearer_auth(token)
                .query(&[("alt", "media")])
                .send()
                .await?;
            Ok(check(response, "download").await?.bytes().await?.to_vec())
        }

        async fn upload(
            &self,
            remote_filename: &str,
            data: Vec<u8>,
            _cancel: &CancellationToken,
        ) -> Result<bool> {
            self.state.ensure_ready(self.name())?;
            let (folder_path, name) = split_remote(remote_filename);
            if name.is_empty() {
                return Err(StorageError::InvalidArgument("blank remote filename".into()));
            }

            let folder = self
                .resolve_folder(&folder_path, true)
                .await?
                .ok_or_else(|| StorageError::Transport(format!("cannot create {folder_path}")))?;
            let q = format!(
                "name = {} and {} in parents and trashed = false",
                quote(&name),
                quote(&folder)
            );
            let (current, duplicates) = take_newest(self.query(&q).await?);
            let size = data.len();
            let token = self.access_token().await?;

            let response = match &current {
                Some(current) => {
                    self.http
                        .patch(format!(
                            "{}/files/{}",
                            self.endpoints.upload_base, current.id
                        ))
                        .bearer_auth(token)
                        .query(&[("uploadType", "media")])
                        .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                        .body(data)
                        .send()
                        .await?
                }
                None => {
                    let metadata = json!({ "name": name, "parents": [folder] });
                    self.http
                        .post(format!("{}/files", self.endpoints.upload_base))
                        .bearer_auth(token)
                        .query(&[("uploadType", "multipart")])
                        .header(
                            reqwest::header::CONTENT_TYPE,
                            format!("multipart/related; boundary={MULTIPART_BOUNDARY}"),
                        )
                        .body(multipart_body(&metadata, &data))
                        .send()
                        .await?
                }
            };
            check(response, "upload").await?;
            tracing::debug!(provider = self.id(), remote_filename, bytes = size, "Uploaded revision");

            // The overwritten file is the only one listings should see.
            for duplicate in &duplicates {
                if let Err(e) = self.delete_by_id(&duplicate.id).await {
                    tracing::warn!(provider = self.id(), id = %duplicate.id, error = %e, "Failed to delete duplicate");
                }
            }
            Ok(true)
        }

        async fn delete(&self, file: &RemoteFileInfo, _cancel: &CancellationToken) -> Result<bool> {
            self.state.ensure_ready(self.name())?;
            if file.remote_file_identifier().trim().is_empty() {
                return Err(StorageError::InvalidArgument("blank file identifier".into()));
            }

            let deleted = self.delete_by_id(file.remote_file_identifier()).await?;
            if !deleted {
                tracing::warn!(provider = self.id(), file = %file, "File already gone");
            }
            Ok(deleted)
        }

        async fn delete_many(
            &self,
            files: &[RemoteFileInfo],
            per_file_timeout: Duration,
            cancel: &CancellationToken,
        ) -> Result<bool> {
            self.state.ensure_ready(self.name())?;
            if files.is_empty() {
                return Ok(true);
            }

            let budget = batch_timeout(per_file_timeout, files.len());
            bounded("delete batch", budget, cancel, async {
                let results = join_all(files.iter().map(|f| self.delete(f, cancel))).await;
                let mut all = true;
                for (file, result) in files.iter().zip(results) {
                    match result {
                        Ok(true) => {}
                        Ok(false) => all = false,
                        Err(e) => {
                            tracing::warn!(provider = self.id(), file = %file, error = %e, "Deletion failed");
                            all = false;
                        }
                    }
                }
                Ok(all)
            })
            .await
        }

        async fn dispose(&self) {
            *self.token.lock().await = None;
            self.folders.lock().await.clear();
            self.state.set(ProviderState::Uninitialized);
        }
    }

}

#[cfg(feature = "gdrive")]
pub use inner::{DriveEndpoints, GoogleDriveStorage};
