//! Pieces of the OAuth flows shared by every backend: the user-facing prompt,
//! the persisted token, and PKCE material.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use savesync_keys::CredentialStore;
use sha2::{Digest, Sha256};

const ACCESS_TOKEN_KEY: &str = "AccessToken";
const REFRESH_TOKEN_KEY: &str = "RefreshToken";
const EXPIRES_AT_KEY: &str = "ExpiresAt";

/// Tokens are refreshed this long before their stated expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// User interaction needed by the interactive authorization flows.
#[async_trait]
pub trait AuthPrompt: Send + Sync {
    /// Bring the user to the provider's consent page.
    async fn open_authorization_page(&self, provider: &str, url: &str) -> anyhow::Result<()>;

    /// Obtain the authorization code the user copied from the provider.
    async fn request_code(&self, provider: &str) -> anyhow::Result<String>;

    /// Inform the user about progress of the flow.
    async fn notify(&self, provider: &str, message: &str);
}

/// Prompt for unattended runs: any interactive step fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NonInteractivePrompt;

#[async_trait]
impl AuthPrompt for NonInteractivePrompt {
    async fn open_authorization_page(&self, provider: &str, _url: &str) -> anyhow::Result<()> {
        anyhow::bail!("{provider} needs an interactive login; run `savesync login {provider}`")
    }

    async fn request_code(&self, provider: &str) -> anyhow::Result<String> {
        anyhow::bail!("{provider} needs an interactive login; run `savesync login {provider}`")
    }

    async fn notify(&self, provider: &str, message: &str) {
        tracing::info!(provider, "{message}");
    }
}

/// Credential obtained from an OAuth token endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthToken")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl OAuthToken {
    /// Build from a token endpoint answer. Endpoints that omit the refresh
    /// token on refresh keep the previous one.
    pub fn from_response(response: TokenResponse, previous_refresh: Option<String>) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or(previous_refresh),
            expires_at: response
                .expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs)),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|at| at - Duration::seconds(EXPIRY_MARGIN_SECS) <= now)
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Stored token for `provider_id`, if any.
    pub fn load(store: &CredentialStore, provider_id: &str) -> anyhow::Result<Option<Self>> {
        let Some(access_token) = store.get_secret(provider_id, ACCESS_TOKEN_KEY)? else {
            return Ok(None);
        };
        if access_token.trim().is_empty() {
            return Ok(None);
        }

        let refresh_token = store.get_secret(provider_id, REFRESH_TOKEN_KEY)?;
        let expires_at = match store.get_secret(provider_id, EXPIRES_AT_KEY)? {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(&raw)
                    .map_err(|e| anyhow::anyhow!("Stored expiry '{raw}' is invalid: {e}"))?
                    .with_timezone(&Utc),
            ),
            None => None,
        };

        Ok(Some(Self {
            access_token,
            refresh_token,
            expires_at,
        }))
    }

    /// Persist the token. Fields the token lacks are removed from the store.
    pub fn save(&self, store: &CredentialStore, provider_id: &str) -> anyhow::Result<()> {
        let expires_at = self.expires_at.map(|at| at.to_rfc3339());
        let mut values = vec![(ACCESS_TOKEN_KEY, self.access_token.as_str())];
        let mut absent = Vec::new();
        match &self.refresh_token {
            Some(refresh) => values.push((REFRESH_TOKEN_KEY, refresh.as_str())),
            None => absent.push(REFRESH_TOKEN_KEY),
        }
        match &expires_at {
            Some(at) => values.push((EXPIRES_AT_KEY, at.as_str())),
            None => absent.push(EXPIRES_AT_KEY),
        }
        store.update_secrets(provider_id, &values, &absent)
    }

    /// Forget the stored token of `provider_id`.
    pub fn clear(store: &CredentialStore, provider_id: &str) -> anyhow::Result<()> {
        store.update_secrets(
            provider_id,
            &[],
            &[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, EXPIRES_AT_KEY],
        )
    }
}

/// Body of a successful token endpoint response.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// PKCE verifier and its S256 challenge.
#[derive(Debug, Clone)]
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

impl Pkce {
    pub fn generate() -> Self {
        let verifier = random_token(32);
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier,
            challenge,
        }
    }
}

/// URL-safe random string carrying `bytes` bytes of entropy.
pub fn random_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    OsRng.fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use savesync_keys::plain::PlainProtector;
    use tempfile::TempDir;

    #[test]
    fn pkce_challenge_matches_verifier() {
        let pkce = Pkce::generate();
        assert_eq!(pkce.verifier.len(), 43);
        let expected = URL_SAFE_NO_PAD.encode(Sha256::digest(pkce.verifier.as_bytes()));
        assert_eq!(pkce.challenge, expected);
        assert_ne!(Pkce::generate().verifier, pkce.verifier);
    }

    #[test]
    fn expiry_uses_margin() {
        let now = Utc::now();
        let mut token = OAuthToken {
            access_token: "a".into(),
            refresh_token: None,
            expires_at: None,
        };
        assert!(!token.is_expired(now));
        token.expires_at = Some(now + Duration::seconds(30));
        assert!(token.is_expired(now));
        token.expires_at = Some(now + Duration::hours(1));
        assert!(!token.is_expired(now));
    }

    #[test]
    fn refresh_keeps_previous_refresh_token() {
        let response = TokenResponse {
            access_token: "new".into(),
            refresh_token: None,
            expires_in: Some(14400),
        };
        let token = OAuthToken::from_response(response, Some("r".into()));
        assert_eq!(token.refresh_token.as_deref(), Some("r"));
        assert!(token.expires_at.is_some());
        assert!(token.can_refresh());
    }

    #[test]
    fn token_persists_through_store() {
        let tmp = TempDir::new().unwrap();
        let store = CredentialStore::new(tmp.path(), Box::new(PlainProtector)).unwrap();
        assert!(OAuthToken::load(&store, "dropbox").unwrap().is_none());

        let token = OAuthToken {
            access_token: "sl.abc".into(),
            refresh_token: Some("refresh".into()),
            expires_at: Some(Utc::now() + Duration::hours(4)),
        };
        token.save(&store, "dropbox").unwrap();

        let loaded = OAuthToken::load(&store, "dropbox").unwrap().unwrap();
        assert_eq!(loaded.access_token, "sl.abc");
        assert_eq!(loaded.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(
            loaded.expires_at.map(|t| t.timestamp()),
            token.expires_at.map(|t| t.timestamp())
        );
    }

    #[test]
    fn saving_drops_fields_the_token_lacks() {
        let tmp = TempDir::new().unwrap();
        let store = CredentialStore::new(tmp.path(), Box::new(PlainProtector)).unwrap();
        OAuthToken {
            access_token: "old".into(),
            refresh_token: Some("refresh".into()),
            expires_at: Some(Utc::now() - Duration::hours(1)),
        }
        .save(&store, "google-drive")
        .unwrap();

        OAuthToken {
            access_token: "new".into(),
            refresh_token: None,
            expires_at: None,
        }
        .save(&store, "google-drive")
        .unwrap();

        let loaded = OAuthToken::load(&store, "google-drive").unwrap().unwrap();
        assert_eq!(loaded.access_token, "new");
        assert_eq!(loaded.refresh_token, None);
        assert_eq!(loaded.expires_at, None);
        assert!(!loaded.is_expired(Utc::now()));

        OAuthToken::clear(&store, "google-drive").unwrap();
        assert!(OAuthToken::load(&store, "google-drive").unwrap().is_none());
    }

    #[test]
    fn debug_redacts_tokens() {
        let token = OAuthToken {
            access_token: "secret-access".into(),
            refresh_token: Some("secret-refresh".into()),
            expires_at: None,
        };
        let printed = format!("{token:?}");
        assert!(!printed.contains("secret"));
    }
}
