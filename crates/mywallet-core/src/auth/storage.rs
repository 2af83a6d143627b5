//! Durable key–value backends for the persisted session record.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use keyring::Entry;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::config::{Config, StorageKind};

/// Keychain service name for [`KeyringStore`] entries
const SERVICE_NAME: &str = "mywallet";

/// Session file name in the data directory
const SESSION_FILE: &str = "session.json";

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    /// Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Build the backend selected in the config.
pub fn from_config(config: &Config) -> Result<Arc<dyn KeyValueStore>> {
    Ok(match config.storage {
        StorageKind::File => Arc::new(FileStore::new(config.data_dir()?)),
        StorageKind::Keyring => Arc::new(KeyringStore::new(SERVICE_NAME)),
        StorageKind::Memory => Arc::new(MemoryStore::default()),
    })
}

/// In-process map. Nothing survives a restart unless the same instance is reused.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.entries.lock().clone()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// All keys in one JSON object file, rewritten whole on every change.
pub struct FileStore {
    dir: PathBuf,
    // Serializes read-modify-write cycles within this process
    write_lock: tokio::sync::Mutex<()>,
}

impl FileStore {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn path(&self) -> PathBuf {
        self.dir.join(SESSION_FILE)
    }

    async fn read_raw(&self) -> Result<Option<String>> {
        let path = self.path();
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read session file {}", path.display())),
        }
    }

    async fn read_all(&self) -> Result<BTreeMap<String, String>> {
        match self.read_raw().await? {
            Some(contents) => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse session file {}", self.path().display())),
            None => Ok(BTreeMap::new()),
        }
    }

    /// Entries for a read-modify-write. An unparseable file counts as empty;
    /// the flag tells the caller it must be rewritten even if nothing changed.
    async fn read_for_update(&self) -> Result<(BTreeMap<String, String>, bool)> {
        let Some(contents) = self.read_raw().await? else {
            return Ok((BTreeMap::new(), false));
        };
        match serde_json::from_str(&contents) {
            Ok(entries) => Ok((entries, false)),
            Err(e) => {
                warn!(path = %self.path().display(), error = %e, "Discarding unreadable session file");
                Ok((BTreeMap::new(), true))
            }
        }
    }

    /// Replace the file atomically: write a sibling temp file, then rename it
    /// over the old one. An empty map removes the file.
    async fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let path = self.path();
        if entries.is_empty() {
            return match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e).context("Failed to remove session file"),
            };
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create directory {}", self.dir.display()))?;
        let contents = serde_json::to_string_pretty(entries)?;
        let tmp = self.dir.join(format!("{}.tmp", SESSION_FILE));

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options
            .open(&tmp)
            .await
            .with_context(|| format!("Failed to open {} for writing", tmp.display()))?;
        file.write_all(contents.as_bytes())
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        file.sync_all()
            .await
            .with_context(|| format!("Failed to flush {}", tmp.display()))?;
        drop(file);

        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to replace session file {}", path.display()))?;

        debug!(path = %path.display(), keys = entries.len(), "Session file written");
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_all().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let (mut entries, _) = self.read_for_update().await?;
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let (mut entries, corrupt) = self.read_for_update().await?;
        if entries.remove(key).is_some() || corrupt {
            self.write_all(&entries).await?;
        }
        Ok(())
    }
}

/// One OS keychain entry per key.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Keychain calls block, so they run on the blocking pool.
    async fn with_entry<T, F>(&self, key: &str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Entry) -> Result<T> + Send + 'static,
    {
        let service = self.service.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            let entry = Entry::new(&service, &key).context("Failed to create keyring entry")?;
            op(entry)
        })
        .await
        .context("Keyring task panicked")?
    }
}

#[async_trait]
impl KeyValueStore for KeyringStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_entry(key, |entry| match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve value from keychain"),
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let value = value.to_string();
        self.with_entry(key, move |entry| {
            entry
                .set_password(&value)
                .context("Failed to store value in keychain")
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.with_entry(key, |entry| match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete value from keychain"),
        })
        .await
    }
}
