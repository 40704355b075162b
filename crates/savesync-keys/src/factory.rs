//! Factory for creating the appropriate SecretProtector based on configuration.

use std::path::Path;

use crate::local::LocalProtector;
use crate::plain::PlainProtector;
use crate::provider::SecretProtector;

/// Create a SecretProtector based on the protection mode string from config.
///
/// Supported modes:
/// - `"local"`: AES-256-GCM under a per-user key stored at `key_file`
/// - `"plain"`: base64 only
pub fn create_protector(mode: &str, key_file: &Path) -> anyhow::Result<Box<dyn SecretProtector>> {
    match mode {
        "local" => Ok(Box::new(LocalProtector::open_or_create(key_file)?)),
        "plain" => {
            tracing::warn!("Credentials are stored without encryption (protection = \"plain\")");
            Ok(Box::new(PlainProtector))
        }
        other => anyhow::bail!("Unknown credential protection mode: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn builds_known_modes() {
        let tmp = TempDir::new().unwrap();
        let key = tmp.path().join("user.key");
        assert_eq!(create_protector("local", &key).unwrap().name(), "local");
        assert!(key.exists());
        assert_eq!(create_protector("plain", &key).unwrap().name(), "plain");
    }

    #[test]
    fn unknown_mode_fails() {
        let tmp = TempDir::new().unwrap();
        assert!(create_protector("dpapi", &tmp.path().join("k")).is_err());
    }
}
