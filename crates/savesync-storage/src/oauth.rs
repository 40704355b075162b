#[cfg(any(feature = "dropbox", feature = "gdrive"))]
mod inner {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::Router;
    use axum::extract::State;
    use axum::http::{StatusCode, Uri};
    use axum::response::{Html, IntoResponse, Response};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::auth::{OAuthToken, TokenResponse};
    use crate::error::{Result, StorageError};

    const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

    const SUCCESS_PAGE: &str = "<html><body><h3>Authorization complete.</h3>\
        <p>You can close this window and return to SaveSync.</p></body></html>";

    /// OAuth token endpoint of one application registration.
    #[derive(Debug, Clone)]
    pub struct TokenEndpoint {
        pub url: String,
        pub client_id: String,
        pub client_secret: Option<String>,
    }

    impl TokenEndpoint {
        /// Trade an authorization code for a token.
        pub async fn exchange_code(
            &self,
            http: &reqwest::Client,
            code: &str,
            verifier: &str,
            redirect_uri: Option<&str>,
        ) -> Result<OAuthToken> {
            let mut form = vec![
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("code_verifier", verifier),
            ];
            if let Some(secret) = &self.client_secret {
                form.push(("client_secret", secret.as_str()));
            }
            if let Some(uri) = redirect_uri {
                form.push(("redirect_uri", uri));
            }

            let response = self.post(http, &form).await?;
            Ok(OAuthToken::from_response(response, None))
        }

        /// Obtain a fresh access token from the refresh token in `token`.
        pub async fn refresh(&self, http: &reqwest::Client, token: &OAuthToken) -> Result<OAuthToken> {
            let refresh_token = token.refresh_token.as_deref().ok_or_else(|| {
                StorageError::Authentication("no refresh token stored".to_string())
            })?;

            let mut form = vec![
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.client_id.as_str()),
            ];
            if let Some(secret) = &self.client_secret {
                form.push(("client_secret", secret.as_str()));
            }

            let response = self.post(http, &form).await?;
            Ok(OAuthToken::from_response(
                response,
                token.refresh_token.clone(),
            ))
        }

        async fn post(&self, http: &reqwest::Client, form: &[(&str, &str)]) -> Result<TokenResponse> {
            let response = http.post(&self.url).form(form).send().await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(StorageError::Authentication(format!(
                    "token endpoint returned {status}: {body}"
                )));
            }
            response
                .json::<TokenResponse>()
                .await
                .map_err(|e| StorageError::Authentication(format!("unreadable token response: {e}")))
        }
    }

    /// One-shot HTTP listener on the loopback interface receiving the OAuth
    /// redirect.
    ///
    /// The socket is released when `wait_for_code` returns, whatever the
    /// outcome, or when the value is dropped unused.
    pub struct LoopbackRedirect {
        listener: TcpListener,
        port: u16,
    }

    struct RedirectState {
        expected_state: String,
        outcome: mpsc::Sender<Result<String>>,
    }

    impl LoopbackRedirect {
        pub async fn bind() -> Result<Self> {
            let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
            let port = listener.local_addr()?.port();
            Ok(Self { listener, port })
        }

        pub fn redirect_uri(&self) -> String {
            format!("http://127.0.0.1:{}/", self.port)
        }

        /// Serve requests until one carries the authorization code (or an
        /// error) for `expected_state`, or `cancel` fires.
        pub async fn wait_for_code(
            self,
            expected_state: &str,
            cancel: &CancellationToken,
        ) -> Result<String> {
            let (outcome, mut received) = mpsc::channel(1);
            let app = Router::new()
                .fallback(receive_redirect)
                .with_state(Arc::new(RedirectState {
                    expected_state: expected_state.to_string(),
                    outcome,
                }));

            let stop = CancellationToken::new();
            let serve = axum::serve(self.listener, app)
                .with_graceful_shutdown(stop.clone().cancelled_owned());
            let mut server = tokio::spawn(async move { serve.await });

            let result = tokio::select! {
                _ = cancel.cancelled() => Err(StorageError::Cancelled("authorization")),
                outcome = received.recv() => outcome.unwrap_or_else(|| {
                    Err(StorageError::Transport("redirect listener stopped".to_string()))
                }),
            };

            stop.cancel();
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await.is_err() {
                tracing::debug!("Loopback connections still open, aborting listener");
                server.abort();
            }
            result
        }
    }

    async fn receive_redirect(State(redirect): State<Arc<RedirectState>>, uri: Uri) -> Response {
        let target = uri.path_and_query().map_or("/", |pq| pq.as_str());
        match parse_redirect(target, &redirect.expected_state) {
            Ok(Some(code)) => {
                let _ = redirect.outcome.try_send(Ok(code));
                Html(SUCCESS_PAGE).into_response()
            }
            Ok(None) => StatusCode::NOT_FOUND.into_response(),
            Err(e) => {
                let message = e.to_string();
                let _ = redirect.outcome.try_send(Err(e));
                (StatusCode::BAD_REQUEST, message).into_response()
            }
        }
    }

    /// Extract the code from a redirect target such as `/?code=..&state=..`.
    ///
    /// `Ok(None)` for requests that are not the redirect (favicon and the like).
    pub fn parse_redirect(target: &str, expected_state: &str) -> Result<Option<String>> {
        let url = reqwest::Url::parse(&format!("http://127.0.0.1{target}"))
            .map_err(|e| StorageError::InvalidArgument(format!("bad redirect target: {e}")))?;

        let mut code = None;
        let mut state = None;
        let mut error = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                _ => {}
            }
        }

        if let Some(error) = error {
            return Err(StorageError::Authentication(format!(
                "authorization denied: {error}"
            )));
        }
        let Some(code) = code else {
            return Ok(None);
        };
        if state.as_deref() != Some(expected_state) {
            return Err(StorageError::Authentication(
                "authorization state mismatch".to_string(),
            ));
        }
        Ok(Some(code))
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn parse_redirect_accepts_matching_state() {
            let code = parse_redirect("/?code=4%2F0Ab&state=xyz&scope=a", "xyz").unwrap();
            assert_eq!(code.as_deref(), Some("4/0Ab"));
        }

        #[test]
        fn parse_redirect_rejects_wrong_state() {
            let result = parse_redirect("/?code=abc&state=other", "xyz");
            assert!(matches!(result, Err(StorageError::Authentication(_))));
        }

        #[test]
        fn parse_redirect_reports_denial() {
            let result = parse_redirect("/?error=access_denied&state=xyz", "xyz");
            assert!(matches!(result, Err(StorageError::Authentication(_))));
        }

        #[test]
        fn parse_redirect_ignores_other_paths() {
            assert_eq!(parse_redirect("/favicon.ico", "xyz").unwrap(), None);
        }

        #[tokio::test]
        async fn loopback_receives_code() {
            let redirect = LoopbackRedirect::bind().await.unwrap();
            let port = redirect.port;
            let cancel = CancellationToken::new();

            let client = tokio::spawn(async move {
                // A browser preconnect that never sends a request.
                let _idle = tokio::net::TcpStream::connect(("127.0.0.1", port)).await.unwrap();
                let http = reqwest::Client::new();
                let favicon = http
                    .get(format!("http://127.0.0.1:{port}/favicon.ico"))
                    .send()
                    .await
                    .unwrap();
                assert_eq!(favicon.status(), reqwest::StatusCode::NOT_FOUND);

                let answer = http
                    .get(format!("http://127.0.0.1:{port}/?code=the-code&state=s1"))
                    .send()
                    .await
                    .unwrap();
                (answer.status(), answer.text().await.unwrap())
            });

            let code = redirect.wait_for_code("s1", &cancel).await.unwrap();
            assert_eq!(code, "the-code");
            let (status, body) = client.await.unwrap();
            assert_eq!(status, reqwest::StatusCode::OK);
            assert!(body.contains("Authorization complete"));
            assert!(tokio::net::TcpStream::connect(("127.0.0.1", port)).await.is_err());
        }

        #[tokio::test]
        async fn loopback_reports_denial() {
            let redirect = LoopbackRedirect::bind().await.unwrap();
            let uri = redirect.redirect_uri();
            let client = tokio::spawn(async move {
                reqwest::get(format!("{uri}?error=access_denied&state=s1"))
                    .await
                    .unwrap()
                    .status()
            });

            let result = redirect.wait_for_code("s1", &CancellationToken::new()).await;
            assert!(matches!(result, Err(StorageError::Authentication(_))));
            assert_eq!(client.await.unwrap(), reqwest::StatusCode::BAD_REQUEST);
        }

        #[tokio::test]
        async fn loopback_stops_on_cancel() {
            let redirect = LoopbackRedirect::bind().await.unwrap();
            let cancel = CancellationToken::new();
            cancel.cancel();
            let result = redirect.wait_for_code("s", &cancel).await;
            assert!(matches!(result, Err(StorageError::Cancelled(_))));
        }

        #[tokio::test]
        async fn cancel_wins_over_a_silent_connection() {
            let redirect = LoopbackRedirect::bind().await.unwrap();
            let port = redirect.port;
            let cancel = CancellationToken::new();

            let _silent = tokio::net::TcpStream::connect(("127.0.0.1", port)).await.unwrap();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                trigger.cancel();
            });

            let result = tokio::time::timeout(
                Duration::from_secs(5),
                redirect.wait_for_code("s", &cancel),
            )
            .await
            .expect("wait_for_code ignored cancellation");
            assert!(matches!(result, Err(StorageError::Cancelled(_))));
        }
    }
}

#[cfg(any(feature = "dropbox", feature = "gdrive"))]
pub use inner::{LoopbackRedirect, TokenEndpoint, parse_redirect};
