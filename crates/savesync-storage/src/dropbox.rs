#[cfg(feature = "dropbox")]
mod inner {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use reqwest::StatusCode;
    use savesync_core::revision;
    use savesync_core::types::{ProviderKind, RemoteFileInfo};
    use savesync_keys::CredentialStore;
    use serde::Deserialize;
    use serde_json::json;
    use tokio::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    use crate::auth::{AuthPrompt, OAuthToken, Pkce};
    use crate::budget::{
        BATCH_POLL_ATTEMPTS, BATCH_POLL_INTERVAL, JobStatus, batch_timeout, bounded, poll_job,
    };
    use crate::error::{Result, StorageError};
    use crate::oauth::TokenEndpoint;
    use crate::provider::{CloudStorage, ProviderState, StateCell};

    const AUTHORIZE_INSTRUCTIONS: &str = "A web page asking you to allow the application will open, \
        followed by a page showing an authorization code. Copy that code to continue.";

    /// Dropbox HTTP endpoints; overridable for tests against a local server.
    #[derive(Debug, Clone)]
    pub struct DropboxEndpoints {
        pub authorize_url: String,
        pub token_url: String,
        pub api_base: String,
        pub content_base: String,
    }

    impl Default for DropboxEndpoints {
        fn default() -> Self {
            Self {
                authorize_url: "https://www.dropbox.com/oauth2/authorize".to_string(),
                token_url: "https://api.dropboxapi.com/oauth2/token".to_string(),
                api_base: "https://api.dropboxapi.com/2".to_string(),
                content_base: "https://content.dropboxapi.com/2".to_string(),
            }
        }
    }

    /// Dropbox backend using the app folder of a Dropbox application.
    ///
    /// Authorization is the code-paste variant: the user approves the app in
    /// the browser and hands the displayed code back through the prompt.
    pub struct DropboxStorage {
        endpoints: DropboxEndpoints,
        token_endpoint: TokenEndpoint,
        http: reqwest::Client,
        credentials: Arc<CredentialStore>,
        prompt: Arc<dyn AuthPrompt>,
        state: StateCell,
        token: Mutex<Option<OAuthToken>>,
    }

    #[derive(Debug, Deserialize)]
    struct ListFolderResult {
        entries: Vec<Entry>,
        cursor: String,
        has_more: bool,
    }

    #[derive(Debug, Deserialize)]
    struct Entry {
        #[serde(rename = ".tag")]
        tag: String,
        name: String,
        #[serde(default)]
        path_display: Option<String>,
        #[serde(default)]
        id: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    struct DeleteResult {
        metadata: Entry,
    }

    #[derive(Debug, Deserialize)]
    struct BatchStatus {
        #[serde(rename = ".tag")]
        tag: String,
        #[serde(default)]
        async_job_id: Option<String>,
        #[serde(default)]
        entries: Option<Vec<BatchEntry>>,
    }

    #[derive(Debug, Deserialize)]
    struct BatchEntry {
        #[serde(rename = ".tag")]
        tag: String,
    }

    impl BatchStatus {
        fn into_job_status(self) -> JobStatus<bool> {
            match self.tag.as_str() {
                "complete" => JobStatus::Complete(
                    self.entries
                        .unwrap_or_default()
                        .iter()
                        .all(|e| e.tag == "success"),
                ),
                "in_progress" | "async_job_id" => JobStatus::InProgress,
                other => JobStatus::Failed(other.to_string()),
            }
        }
    }

    impl DropboxStorage {
        pub fn new(
            app_key: &str,
            app_secret: Option<&str>,
            credentials: Arc<CredentialStore>,
            prompt: Arc<dyn AuthPrompt>,
        ) -> Self {
            Self::with_endpoints(
                app_key,
                app_secret,
                credentials,
                prompt,
                DropboxEndpoints::default(),
            )
        }

        pub fn with_endpoints(
            app_key: &str,
            app_secret: Option<&str>,
            credentials: Arc<CredentialStore>,
            prompt: Arc<dyn AuthPrompt>,
            endpoints: DropboxEndpoints,
        ) -> Self {
            Self {
                token_endpoint: TokenEndpoint {
                    url: endpoints.token_url.clone(),
                    client_id: app_key.to_string(),
                    client_secret: app_secret.map(str::to_string),
                },
                endpoints,
                http: reqwest::Client::new(),
                credentials,
                prompt,
                state: StateCell::default(),
                token: Mutex::new(None),
            }
        }

        fn authorize_url(&self, pkce: &Pkce) -> Result<String> {
            let url = reqwest::Url::parse_with_params(
                &self.endpoints.authorize_url,
                &[
                    ("client_id", self.token_endpoint.client_id.as_str()),
                    ("response_type", "code"),
                    ("token_access_type", "offline"),
                    ("code_challenge", pkce.challenge.as_str()),
                    ("code_challenge_method", "S256"),
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
            let pkce = Pkce::generate();
            let url = self.authorize_url(&pkce)?;

            self.prompt.notify(self.name(), AUTHORIZE_INSTRUCTIONS).await;
            self.prompt
                .open_authorization_page(self.name(), &url)
                .await
                .map_err(|e| StorageError::Authentication(e.to_string()))?;

            let code = tokio::select! {
                _ = cancel.cancelled() => return Err(StorageError::Cancelled("authorization")),
                code = self.prompt.request_code(self.name()) => {
                    code.map_err(|e| StorageError::Authentication(e.to_string()))?
                }
            };
            let code = code.trim();
            if code.is_empty() {
                return Err(StorageError::Authentication(
                    "no authorization code provided".to_string(),
                ));
            }

            let token = self
                .token_endpoint
                .exchange_code(&self.http, code, &pkce.verifier, None)
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

        /// Current access token, refreshed first when expired.
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

        async fn rpc(&self, endpoint: &str, body: serde_json::Value) -> Result<reqwest::Response> {
            let token = self.access_token().await?;
            let response = self
                .http
                .post(format!("{}/{endpoint}", self.endpoints.api_base))
                .bearer_auth(token)
                .json(&body)
                .send()
                .await?;
            Ok(response)
        }

        async fn rpc_json<T: serde::de::DeserializeOwned>(
            &self,
            endpoint: &str,
            body: serde_json::Value,
        ) -> Result<T> {
            let response = check(self.rpc(endpoint, body).await?, endpoint).await?;
            Ok(response.json::<T>().await?)
        }

        async fn check_batch(&self, job_id: &str) -> Result<JobStatus<bool>> {
            let status: BatchStatus = self
                .rpc_json("files/delete_batch/check", json!({ "async_job_id": job_id }))
                .await?;
            Ok(status.into_job_status())
        }
    }

    /// Map non-success responses onto the error taxonomy.
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

    /// Dropbox addresses the app folder root as "" and everything else with a
    /// leading slash and no trailing one.
    pub(crate) fn folder_path(path: &str) -> String {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        }
    }

    pub(crate) fn file_path(name: &str) -> String {
        format!("/{}", name.trim_start_matches('/'))
    }

    fn to_file_info(entry: Entry) -> Option<RemoteFileInfo> {
        if entry.tag != "file" || !revision::is_archive_name(&entry.name) {
            return None;
        }
        let id = entry.id?;
        let display = entry.path_display.unwrap_or(entry.name);
        Some(RemoteFileInfo::parse(display.trim_start_matches('/'), &id))
    }

    #[async_trait]
    impl CloudStorage for DropboxStorage {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Dropbox
        }

        fn name(&self) -> &str {
            "Dropbox"
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
                    tracing::info!(provider = self.id(), "Dropbox initialized");
                    Ok(())
                }
                Err(e) => {
                    drop(attempt);
                    tracing::warn!(provider = self.id(), error = %e, "Dropbox initialization failed");
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

            let response = self
                .rpc(
                    "files/list_folder",
                    json!({ "path": folder_path(path), "recursive": false }),
                )
                .await?;
            if response.status() == StatusCode::CONFLICT {
                let body = response.text().await.unwrap_or_default();
                if body.contains("not_found") {
                    return Ok(vec![]);
                }
                return Err(StorageError::Transport(format!("list_folder: {body}")));
            }
            let mut page: ListFolderResult = check(response, "list_folder").await?.json().await?;

            let mut files = Vec::new();
            loop {
                files.extend(page.entries.into_iter().filter_map(to_file_info));
                if !page.has_more {
                    break;
                }
                page = self
                    .rpc_json("files/list_folder/continue", json!({ "cursor": page.cursor }))
                    .await?;
            }

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
            let arg = json!({ "path": file.remote_file_identifier() }).to_string();
            let response = self
                .http
                .post(format!("{}/files/download", self.endpoints.content_base))
                .bearer_auth(token)
                .header("Dropbox-API-Arg", arg)
                .send()
                .await?;
            let bytes = check(response, "download").await?.bytes().await?;
            Ok(bytes.to_vec())
        }

        async fn upload(
            &self,
            remote_filename: &str,
            data: Vec<u8>,
            _cancel: &CancellationToken,
        ) -> Result<bool> {
            self.state.ensure_ready(self.name())?;
            if remote_filename.trim().is_empty() {
                return Err(StorageError::InvalidArgument("blank remote filename".into()));
            }

            let token = self.access_token().await?;
            let arg = json!({
                "path": file_path(remote_filename),
                "mode": "overwrite",
                "autorename": false,
                "mute": true,
            })
            .to_string();
            let size = data.len();
            let response = self
                .http
                .post(format!("{}/files/upload", self.endpoints.content_base))
                .bearer_auth(token)
                .header("Dropbox-API-Arg", arg)
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(data)
                .send()
                .await?;
            check(response, "upload").await?;
            tracing::debug!(provider = self.id(), remote_filename, bytes = size, "Uploaded revision");
            Ok(true)
        }

        async fn delete(&self, file: &RemoteFileInfo, _cancel: &CancellationToken) -> Result<bool> {
            self.state.ensure_ready(self.name())?;
            if file.local_filename().trim().is_empty() {
                return Err(StorageError::InvalidArgument("blank file name".into()));
            }

            let result: DeleteResult = self
                .rpc_json(
                    "files/delete_v2",
                    json!({ "path": file_path(file.local_filename()) }),
                )
                .await?;
            let matches = result.metadata.id.as_deref() == Some(file.remote_file_identifier());
            if !matches {
                tracing::warn!(provider = self.id(), file = %file, "Deleted object id differs from the listed one");
            }
            Ok(matches)
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

            let entries: Vec<_> = files
                .iter()
                .map(|f| json!({ "path": file_path(f.local_filename()) }))
                .collect();
            let budget = batch_timeout(per_file_timeout, files.len());

            bounded("delete batch", budget, cancel, async {
                let launch: BatchStatus = self
                    .rpc_json("files/delete_batch", json!({ "entries": entries }))
                    .await?;

                let job_id = if launch.tag == "async_job_id" {
                    launch.async_job_id.clone()
                } else {
                    None
                };
                let Some(job_id) = job_id else {
                    return match launch.into_job_status() {
                        JobStatus::Complete(all) => Ok(all),
                        JobStatus::Failed(reason) => Err(StorageError::Transport(format!(
                            "delete_batch failed: {reason}"
                        ))),
                        JobStatus::InProgress => Ok(false),
                    };
                };

                let outcome = poll_job(
                    || self.check_batch(&job_id),
                    BATCH_POLL_INTERVAL,
                    BATCH_POLL_ATTEMPTS,
                    cancel,
                )
                .await?;
                Ok(outcome.unwrap_or(false))
            })
            .await
        }

        async fn dispose(&self) {
            *self.token.lock().await = None;
            self.state.set(ProviderState::Uninitialized);
        }
    }

}

#[cfg(feature = "dropbox")]
pub use inner::{DropboxEndpoints, DropboxStorage};
