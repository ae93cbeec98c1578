use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};
use tracing::{debug, warn};

use crate::{
    error::{Result, SessionError},
    models::PendingAppend,
};

pub const TRANSACTION_COUNT_KEY: &str = "transactionCount";
pub const PENDING_APPENDS_KEY: &str = "pendingAppends";

/// Durable string key/value storage that survives between sessions.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: String) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

fn poisoned<T>(_: T) -> SessionError {
    SessionError::Storage("store lock poisoned".into())
}

#[derive(Debug, Default)]
pub struct MemoryStore(Mutex<BTreeMap<String, String>>);

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.0.lock().map_err(poisoned)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        self.0.lock().map_err(poisoned)?.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.0.lock().map_err(poisoned)?.remove(key);
        Ok(())
    }
}

/// A store persisted as a single JSON object on disk. Every write rewrites the
/// whole file through a sibling temp file and a rename.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Opens the store at `path`, starting empty if the file does not exist yet.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), keys = entries.len(), "opened file store");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().map_err(poisoned)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        let mut entries = self.entries.lock().map_err(poisoned)?;
        entries.insert(key.to_string(), value);
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(poisoned)?;
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }
}

/// Reads the cached transaction count. A value that does not parse is treated
/// as absent, the contract is authoritative anyway.
pub fn load_transaction_count(store: &dyn KeyValueStore) -> Result<Option<u64>> {
    let raw = match store.get(TRANSACTION_COUNT_KEY)? {
        Some(raw) => raw,
        None => return Ok(None),
    };
    match raw.trim().parse::<u64>() {
        Ok(count) => Ok(Some(count)),
        Err(e) => {
            warn!(value = %raw, error = %e, "ignoring corrupt cached transaction count");
            Ok(None)
        }
    }
}

pub fn save_transaction_count(store: &dyn KeyValueStore, count: u64) -> Result<()> {
    store.set(TRANSACTION_COUNT_KEY, count.to_string())
}

pub fn load_pending_appends(store: &dyn KeyValueStore) -> Result<Vec<PendingAppend>> {
    match store.get(PENDING_APPENDS_KEY)? {
        Some(raw) => Ok(serde_json::from_str(&raw)?),
        None => Ok(Vec::new()),
    }
}

pub fn save_pending_appends(store: &dyn KeyValueStore, pending: &[PendingAppend]) -> Result<()> {
    if pending.is_empty() {
        store.remove(PENDING_APPENDS_KEY)
    } else {
        store.set(PENDING_APPENDS_KEY, serde_json::to_string(pending)?)
    }
}
