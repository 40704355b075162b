//! Per-provider credential files: `{dir}/{provider-id}.config`, one
//! `key=value` pair per line.

use std::path::{Path, PathBuf};

use crate::provider::SecretProtector;

const COMMENT_PREFIXES: [&str; 3] = ["#", ";", "//"];

/// Parsed content of one credential file, in file order.
///
/// A line without `=` is a key with no value. Values are kept verbatim;
/// secret values are stored in protected form and only decoded through
/// [`CredentialStore::get_secret`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialFile {
    entries: Vec<(String, Option<String>)>,
}

impl CredentialFile {
    pub fn parse(content: &str) -> Self {
        let mut file = Self::default();
        for line in content.lines() {
            let line = line.trim_start();
            if COMMENT_PREFIXES.iter().any(|p| line.starts_with(p)) {
                continue;
            }

            let (key, value) = match line.split_once('=') {
                Some((k, v)) => (k.trim_end(), Some(v.trim_end_matches('\r').to_string())),
                None => (line.trim_end(), None),
            };
            if key.is_empty() {
                continue;
            }
            file.put(key, value);
        }
        file
    }

    /// Serialized form. Keys without a value are dropped.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .filter_map(|(k, v)| v.as_ref().map(|v| format!("{k}={v}")))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.put(key, Some(value.to_string()));
    }

    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| k != key);
        self.entries.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    fn put(&mut self, key: &str, value: Option<String>) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }
}

/// Directory of credential files plus the protector applied to secret values.
pub struct CredentialStore {
    dir: PathBuf,
    protector: Box<dyn SecretProtector>,
}

impl CredentialStore {
    pub fn new(dir: &Path, protector: Box<dyn SecretProtector>) -> anyhow::Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            protector,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, provider_id: &str) -> PathBuf {
        self.dir.join(format!("{provider_id}.config"))
    }

    /// Read a provider's file. A missing file is created empty.
    pub fn load(&self, provider_id: &str) -> anyhow::Result<CredentialFile> {
        let path = self.path_for(provider_id);
        if !path.exists() {
            std::fs::write(&path, "")?;
            return Ok(CredentialFile::default());
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(CredentialFile::parse(&content))
    }

    pub fn save(&self, provider_id: &str, file: &CredentialFile) -> anyhow::Result<()> {
        let path = self.path_for(provider_id);
        std::fs::write(&path, file.render())?;
        tracing::debug!(provider = provider_id, path = %path.display(), "Saved credentials");
        Ok(())
    }

    /// Decoded secret value, or `None` when absent.
    pub fn get_secret(&self, provider_id: &str, key: &str) -> anyhow::Result<Option<String>> {
        let file = self.load(provider_id)?;
        match file.get(key) {
            Some(stored) if !stored.is_empty() => {
                let value = self.protector.unprotect(stored).map_err(|e| {
                    anyhow::anyhow!("Stored credential '{key}' for {provider_id} is unreadable: {e}")
                })?;
                Ok(Some(value))
            }
            _ => Ok(None),
        }
    }

    /// Protect and persist several secrets in one write.
    pub fn set_secrets(&self, provider_id: &str, values: &[(&str, &str)]) -> anyhow::Result<()> {
        self.update_secrets(provider_id, values, &[])
    }

    /// Set `values` and drop `removed` keys in one write.
    pub fn update_secrets(
        &self,
        provider_id: &str,
        values: &[(&str, &str)],
        removed: &[&str],
    ) -> anyhow::Result<()> {
        let mut file = self.load(provider_id)?;
        for (key, value) in values {
            file.set(key, &self.protector.protect(value)?);
        }
        for key in removed {
            file.remove(key);
        }
        self.save(provider_id, &file)
    }

    pub fn set_secret(&self, provider_id: &str, key: &str, value: &str) -> anyhow::Result<()> {
        self.set_secrets(provider_id, &[(key, value)])
    }

    /// Forget every stored value for a provider.
    pub fn clear(&self, provider_id: &str) -> anyhow::Result<()> {
        self.save(provider_id, &CredentialFile::default())
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("dir", &self.dir)
            .field("protector", &self.protector.name())
            .finish()
    }
}
