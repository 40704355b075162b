use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hkdf::Hkdf;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use std::path::{Path, PathBuf};
use zeroize::Zeroize;

use crate::provider::{SecretProtector, UserKey};

/// Fixed entropy mixed into every derived key, so that the raw user key is
/// never used directly as a cipher key.
const PROTECTION_ENTROPY: [u8; 16] = [
    0x5b, 0x50, 0x9f, 0x82, 0xf1, 0x4b, 0x4c, 0x4d, 0x92, 0xee, 0x00, 0xac, 0xb1, 0xd2, 0xee, 0x6f,
];

const KEY_INFO: &[u8] = b"savesync-credentials-v1";
const NONCE_LEN: usize = 12;

/// Per-user credential protection.
///
/// A random 32-byte secret lives in a key file readable only by the current
/// user. The cipher key is HKDF-SHA256(secret, salt = fixed entropy,
/// info = "savesync-credentials-v1"). Values are sealed with AES-256-GCM and
/// written as `base64(nonce || ciphertext)`.
pub struct LocalProtector {
    key_path: PathBuf,
    key: UserKey,
}

impl LocalProtector {
    /// Open the key file, creating it with a fresh secret when absent.
    pub fn open_or_create(key_path: &Path) -> anyhow::Result<Self> {
        if key_path.exists() {
            Self::open(key_path)
        } else {
            Self::create(key_path)
        }
    }

    pub fn create(key_path: &Path) -> anyhow::Result<Self> {
        let mut secret = [0u8; 32];
        OsRng.fill_bytes(&mut secret);

        if let Some(parent) = key_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(key_path, secret)?;
        restrict_permissions(key_path)?;
        tracing::info!(path = %key_path.display(), "Created user credential key");

        let key = Self::derive(&secret)?;
        secret.zeroize();
        Ok(Self {
            key_path: key_path.to_path_buf(),
            key,
        })
    }

    pub fn open(key_path: &Path) -> anyhow::Result<Self> {
        let mut data = std::fs::read(key_path)?;
        if data.len() != 32 {
            data.zeroize();
            anyhow::bail!(
                "User key file {} is corrupt (expected 32 bytes)",
                key_path.display()
            );
        }
        let key = Self::derive(&data)?;
        data.zeroize();
        Ok(Self {
            key_path: key_path.to_path_buf(),
            key,
        })
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    fn derive(secret: &[u8]) -> anyhow::Result<UserKey> {
        let hk = Hkdf::<Sha256>::new(Some(&PROTECTION_ENTROPY), secret);
        let mut okm = [0u8; 32];
        hk.expand(KEY_INFO, &mut okm)
            .map_err(|e| anyhow::anyhow!("HKDF expansion failed: {e}"))?;
        Ok(UserKey { key: okm })
    }

    fn cipher(&self) -> anyhow::Result<Aes256Gcm> {
        Aes256Gcm::new_from_slice(&self.key.key).map_err(|e| anyhow::anyhow!("Invalid user key: {e}"))
    }
}

impl SecretProtector for LocalProtector {
    fn name(&self) -> &'static str {
        "local"
    }

    fn protect(&self, value: &str) -> anyhow::Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher()?
            .encrypt(nonce, value.as_bytes())
            .map_err(|e| anyhow::anyhow!("Credential encryption failed: {e}"))?;

        let mut output = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        output.extend_from_slice(&nonce_bytes);
        output.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(output))
    }

    fn unprotect(&self, stored: &str) -> anyhow::Result<String> {
        let data = STANDARD
            .decode(stored.trim())
            .map_err(|e| anyhow::anyhow!("Protected value is not valid base64: {e}"))?;
        if data.len() <= NONCE_LEN {
            anyhow::bail!("Protected value too short");
        }

        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
        let mut plaintext = self
            .cipher()?
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| anyhow::anyhow!("Wrong user key or corrupted credential"))?;

        let value = String::from_utf8(plaintext.clone())?;
        plaintext.zeroize();
        Ok(value)
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> anyhow::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn create_and_reopen_key() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("user.key");

        let p1 = LocalProtector::open_or_create(&path).unwrap();
        let stored = p1.protect("refresh-token").unwrap();

        let p2 = LocalProtector::open_or_create(&path).unwrap();
        assert_eq!(p2.unprotect(&stored).unwrap(), "refresh-token");
    }

    #[test]
    fn same_value_encrypts_differently() {
        let tmp = TempDir::new().unwrap();
        let p = LocalProtector::create(&tmp.path().join("user.key")).unwrap();
        assert_ne!(p.protect("x").unwrap(), p.protect("x").unwrap());
    }

    #[test]
    fn other_key_cannot_unprotect() {
        let tmp = TempDir::new().unwrap();
        let a = LocalProtector::create(&tmp.path().join("a.key")).unwrap();
        let b = LocalProtector::create(&tmp.path().join("b.key")).unwrap();
        let stored = a.protect("secret").unwrap();
        assert!(b.unprotect(&stored).is_err());
    }

    #[test]
    fn corrupt_key_file_fails() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("user.key");
        std::fs::write(&path, b"short").unwrap();
        assert!(LocalProtector::open(&path).is_err());
    }

    #[test]
    fn tampered_value_fails() {
        let tmp = TempDir::new().unwrap();
        let p = LocalProtector::create(&tmp.path().join("user.key")).unwrap();
        let stored = p.protect("secret").unwrap();
        let mut raw = STANDARD.decode(&stored).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xff;
        assert!(p.unprotect(&STANDARD.encode(raw)).is_err());
        assert!(p.unprotect("AAAA").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn key_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("user.key");
        LocalProtector::create(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
