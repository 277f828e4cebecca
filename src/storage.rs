//! Host-scoped key/value storage exposed through the driver
//!
//! Each driver supplies two independent stores: a durable one that survives
//! application restarts and a session-scoped one that lives in a per-run
//! temporary directory.

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use tempfile::TempDir;
use tracing::warn;

/// String key/value storage scoped to the running application.
pub trait KvStorage: Send + Sync {
    /// Look up a value.
    fn get(&self, key: &str) -> Option<String>;

    /// Store a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> io::Result<()>;

    /// Remove a value if present.
    fn remove(&self, key: &str) -> io::Result<()>;

    /// Remove all values.
    fn clear(&self) -> io::Result<()>;
}

type Entries = BTreeMap<String, String>;

fn lock_entries(entries: &Mutex<Entries>) -> MutexGuard<'_, Entries> {
    entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// JSON-file-backed store. Every mutation is flushed to disk.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<Entries>,
    // Keeps a session store's backing directory alive for the run.
    _session_dir: Option<TempDir>,
}

impl FileStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let entries = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "discarding unreadable storage file");
                Entries::new()
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Entries::new(),
            Err(e) => return Err(e),
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
            _session_dir: None,
        })
    }

    /// Create a session-scoped store in a fresh temporary directory.
    pub fn session() -> io::Result<Self> {
        let dir = TempDir::new()?;
        let path = dir.path().join("session-storage.json");
        Ok(Self {
            path,
            entries: Mutex::new(Entries::new()),
            _session_dir: Some(dir),
        })
    }

    fn flush(&self, entries: &Entries) -> io::Result<()> {
        let json = serde_json::to_vec_pretty(entries)?;
        std::fs::write(&self.path, json)
    }
}

impl KvStorage for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        lock_entries(&self.entries).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        let mut entries = lock_entries(&self.entries);
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        let mut entries = lock_entries(&self.entries);
        entries.remove(key);
        self.flush(&entries)
    }

    fn clear(&self) -> io::Result<()> {
        let mut entries = lock_entries(&self.entries);
        entries.clear();
        self.flush(&entries)
    }
}

/// Purely in-memory store, used by the stub driver and as a fallback when no
/// writable data directory exists.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<Entries>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStorage for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        lock_entries(&self.entries).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        lock_entries(&self.entries).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        lock_entries(&self.entries).remove(key);
        Ok(())
    }

    fn clear(&self) -> io::Result<()> {
        lock_entries(&self.entries).clear();
        Ok(())
    }
}

/// Durable store under the user data directory, falling back to memory when
/// the directory is unavailable.
pub(crate) fn durable(app: &str) -> Arc<dyn KvStorage> {
    let path = dirs::data_dir().map(|dir| dir.join(app).join("local-storage.json"));
    match path.map(FileStore::open) {
        Some(Ok(store)) => Arc::new(store),
        Some(Err(e)) => {
            warn!(error = %e, "durable storage unavailable, using in-memory store");
            Arc::new(MemoryStore::new())
        }
        None => {
            warn!("no user data directory, using in-memory store");
            Arc::new(MemoryStore::new())
        }
    }
}

/// Session store in a per-run temporary directory, falling back to memory.
pub(crate) fn session() -> Arc<dyn KvStorage> {
    match FileStore::session() {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!(error = %e, "session storage unavailable, using in-memory store");
            Arc::new(MemoryStore::new())
        }
    }
}
