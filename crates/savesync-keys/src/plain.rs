use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::provider::SecretProtector;

/// Stores values as plain base64, for platforms or setups without a usable
/// per-user key.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainProtector;

impl SecretProtector for PlainProtector {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn protect(&self, value: &str) -> anyhow::Result<String> {
        Ok(STANDARD.encode(value.as_bytes()))
    }

    fn unprotect(&self, stored: &str) -> anyhow::Result<String> {
        let bytes = STANDARD
            .decode(stored.trim())
            .map_err(|e| anyhow::anyhow!("Stored value is not valid base64: {e}"))?;
        Ok(String::from_utf8(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let p = PlainProtector;
        let stored = p.protect("sl.token-value").unwrap();
        assert_ne!(stored, "sl.token-value");
        assert_eq!(p.unprotect(&stored).unwrap(), "sl.token-value");
    }

    #[test]
    fn rejects_garbage() {
        assert!(PlainProtector.unprotect("%%%").is_err());
    }
}
