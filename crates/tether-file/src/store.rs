//! Filesystem-backed session store.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fs2::FileExt;
use tracing::{debug, instrument};

use tether_core::Result;
use tether_core::error::{Error, StorageError};
use tether_core::store::{SessionKey, SessionStore, decode_value, encode_value};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

fn map_io(err: std::io::Error) -> Error {
    Error::Storage(StorageError::Io {
        message: err.to_string(),
    })
}

/// The on-disk document: wire key name to encoded value.
pub(crate) type Document = HashMap<String, String>;

pub(crate) struct StoreInner {
    session_path: PathBuf,
    lock_path: PathBuf,
    /// Last document this process wrote or observed, used to tell external
    /// mutations apart from our own writes.
    pub(crate) snapshot: Mutex<Document>,
}

impl StoreInner {
    pub(crate) fn session_path(&self) -> &Path {
        &self.session_path
    }
}

/// A [`SessionStore`] persisted to a JSON document in a profile directory.
///
/// Writes are atomic (temp file + rename) and serialized across processes by
/// an advisory lock; on Unix the document is only readable by the owner.
/// Pair with [`FileSessionStore::watch`] to surface mutations made by other
/// processes as storage-change events.
#[derive(Clone)]
pub struct FileSessionStore {
    pub(crate) inner: Arc<StoreInner>,
}

impl FileSessionStore {
    /// Open (or create) the session document inside `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(map_io)?;

        let session_path = dir.join("session.json");
        let lock_path = dir.join("session.lock");
        let snapshot = read_document(&session_path);

        Ok(Self {
            inner: Arc::new(StoreInner {
                session_path,
                lock_path,
                snapshot: Mutex::new(snapshot),
            }),
        })
    }

    /// The path of the backing document.
    pub fn path(&self) -> &Path {
        &self.inner.session_path
    }

    #[instrument(skip(self, mutate), fields(path = %self.inner.session_path.display()))]
    fn update<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut Document),
    {
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.inner.lock_path)
            .map_err(map_io)?;
        lock.lock_exclusive().map_err(|e| {
            Error::Storage(StorageError::Lock {
                message: e.to_string(),
            })
        })?;

        let mut document = read_document(&self.inner.session_path);
        mutate(&mut document);

        // Record our own write before it lands so the watcher does not
        // re-announce it as an external change.
        *self.inner.snapshot.lock().unwrap() = document.clone();

        let json = serde_json::to_string_pretty(&document).map_err(|e| {
            Error::Storage(StorageError::Serialization {
                message: e.to_string(),
            })
        })?;

        let tmp_path = self.inner.session_path.with_extension("json.tmp");
        fs::write(&tmp_path, &json).map_err(map_io)?;
        fs::rename(&tmp_path, &self.inner.session_path).map_err(map_io)?;

        #[cfg(unix)]
        {
            let mut perms = fs::metadata(&self.inner.session_path)
                .map_err(map_io)?
                .permissions();
            perms.set_mode(0o600);
            fs::set_permissions(&self.inner.session_path, perms).map_err(map_io)?;
        }

        let _ = lock.unlock();
        debug!("Session document updated");
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn get(&self, key: SessionKey) -> Result<Option<String>> {
        let document = read_document(&self.inner.session_path);
        Ok(document
            .get(key.as_str())
            .and_then(|encoded| decode_value(encoded)))
    }

    async fn set(&self, key: SessionKey, value: &str) -> Result<()> {
        let encoded = encode_value(value);
        self.update(|document| {
            document.insert(key.as_str().to_string(), encoded);
        })
    }

    async fn remove(&self, key: SessionKey) -> Result<()> {
        self.update(|document| {
            document.remove(key.as_str());
        })
    }
}

/// Read and parse the session document; any failure reads as empty.
pub(crate) fn read_document(path: &Path) -> Document {
    let Ok(json) = fs::read_to_string(path) else {
        return Document::new();
    };
    serde_json::from_str(&json).unwrap_or_default()
}
