use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::NamedTempFile;

/// Byte-oriented key-value persistence for the little durable state the core owns.
pub trait KeyValueStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn save(&self, key: &str, bytes: &[u8]) -> Result<()>;
}

/// Stores each key as `<dir>/<key>.json`.
pub struct FileKeyValueStore {
    dir: PathBuf,
}

impl FileKeyValueStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", file_name))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Some(bytes))
    }

    fn save(&self, key: &str, bytes: &[u8]) -> Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir).context("Failed to create store directory")?;
        }
        let path = self.path_for(key);

        // Same directory as the target so the final rename stays atomic
        let mut tmp = NamedTempFile::new_in(&self.dir).context("Failed to create temp file")?;
        tmp.write_all(bytes)
            .and_then(|_| tmp.as_file().sync_all())
            .with_context(|| format!("Failed to write {}", tmp.path().display()))?;
        tmp.persist(&path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| anyhow::anyhow!("store lock poisoned: {}", e))?;
        Ok(entries.get(key).cloned())
    }

    fn save(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| anyhow::anyhow!("store lock poisoned: {}", e))?;
        entries.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}
