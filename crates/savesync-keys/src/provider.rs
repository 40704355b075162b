use zeroize::ZeroizeOnDrop;

/// A 256-bit key protecting credential values at rest.
#[derive(Clone, ZeroizeOnDrop)]
pub struct UserKey {
    pub key: [u8; 32],
}

impl std::fmt::Debug for UserKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Trait for the at-rest protection applied to secret credential values
/// (access and refresh tokens) before they are written to a provider's
/// configuration file.
pub trait SecretProtector: Send + Sync {
    /// Short name used in logs and configuration ("local", "plain").
    fn name(&self) -> &'static str;

    /// Turn a plain value into its printable, protected form.
    fn protect(&self, value: &str) -> anyhow::Result<String>;

    /// Reverse [`protect`](Self::protect). Fails when the stored value is
    /// corrupt or was protected with another key.
    fn unprotect(&self, stored: &str) -> anyhow::Result<String>;
}
