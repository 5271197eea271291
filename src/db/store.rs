use anyhow::{anyhow, ensure, Context as _, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

const TEMPFILE_SUFFIX: &str = ".temp";

/// Identifier-keyed blob storage. Writes of a single key are atomic, there is no
/// other synchronization between keys.
#[allow(async_fn_in_trait)]
pub trait KeyValueStore {
    async fn exists(&self, key: &str) -> Result<bool>;
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn put(&self, key: &str, value: &[u8]) -> Result<()>;
    async fn keys(&self) -> Result<Vec<String>>;
}

/// Stores each key as a file in a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> Result<PathBuf> {
        ensure!(is_valid_key(key), "Invalid storage key: {key:?}");
        Ok(self.dir.join(key))
    }
}

fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl KeyValueStore for FileStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.path(key)?).await?)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key)?;
        if !tokio::fs::try_exists(&path).await? {
            return Ok(None);
        }
        let content = tokio::fs::read(&path)
            .await
            .with_context(|| anyhow!("Failed to read {}", path.display()))?;
        Ok(Some(content))
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.path(key)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| anyhow!("Failed to create {}", self.dir.display()))?;

        // Write to a temporary file first so readers never see a half-written value
        let tmppath = self.dir.join(format!("{key}{TEMPFILE_SUFFIX}"));
        tokio::fs::write(&tmppath, value)
            .await
            .with_context(|| anyhow!("Failed to write {}", tmppath.display()))?;
        tokio::fs::rename(&tmppath, &path)
            .await
            .with_context(|| anyhow!("Failed to move {} into place", path.display()))?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        if !tokio::fs::try_exists(&self.dir).await? {
            return Ok(vec![]);
        }
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut keys = vec![];
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if !name.ends_with(TEMPFILE_SUFFIX) && is_valid_key(name) {
                    keys.push(name.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.entries().contains_key(key))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries().get(key).cloned())
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        ensure!(is_valid_key(key), "Invalid storage key: {key:?}");
        self.entries().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.entries().keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}
