//! Watcher that turns external session-document mutations into bus events.

use std::sync::Arc;
use std::time::Duration;

use notify::{RecursiveMode, Watcher};
use tracing::debug;

use tether_core::Result;
use tether_core::error::{Error, StorageError};
use tether_core::events::{SessionBus, SessionEvent};
use tether_core::store::SessionKey;

use crate::store::{FileSessionStore, StoreInner, read_document};

/// Poll backstop for platforms where the notify backend misses events.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Publishes [`SessionEvent::StorageChanged`] for mutations of the session
/// document made by *other* processes.
///
/// Our own writes are recorded in the store's snapshot before they land, so
/// they never echo back as external changes. Dropping the watcher stops both
/// the filesystem subscription and the poll task.
pub struct SessionWatcher {
    _watcher: notify::RecommendedWatcher,
    poll_task: tokio::task::JoinHandle<()>,
}

impl FileSessionStore {
    /// Watch the backing document and publish external changes to `bus`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn watch(&self, bus: SessionBus) -> Result<SessionWatcher> {
        let dir = self
            .path()
            .parent()
            .ok_or_else(|| {
                Error::Storage(StorageError::Io {
                    message: "session document has no parent directory".to_string(),
                })
            })?
            .to_path_buf();

        let inner = self.inner.clone();
        let event_bus = bus.clone();
        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
                if let Ok(event) = res {
                    if !matches!(
                        event.kind,
                        notify::EventKind::Modify(_)
                            | notify::EventKind::Create(_)
                            | notify::EventKind::Remove(_)
                    ) {
                        return;
                    }

                    let is_session = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().is_some_and(|n| n == "session.json"));
                    if is_session {
                        diff_and_publish(&inner, &event_bus);
                    }
                }
            })
            .map_err(|e| {
                Error::Storage(StorageError::Io {
                    message: format!("failed to create file watcher: {}", e),
                })
            })?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| {
                Error::Storage(StorageError::Io {
                    message: format!("failed to watch directory: {}", e),
                })
            })?;

        let inner = self.inner.clone();
        let poll_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(POLL_INTERVAL);
            loop {
                interval.tick().await;
                diff_and_publish(&inner, &bus);
            }
        });

        Ok(SessionWatcher {
            _watcher: watcher,
            poll_task,
        })
    }
}

impl Drop for SessionWatcher {
    fn drop(&mut self) {
        self.poll_task.abort();
    }
}

/// Compare the on-disk document with the last-known snapshot and publish one
/// event per session key that differs.
///
/// The snapshot lock is held across the read so a concurrent local write
/// cannot be misreported as external.
fn diff_and_publish(inner: &Arc<StoreInner>, bus: &SessionBus) {
    let mut snapshot = inner.snapshot.lock().unwrap();
    let current = read_document(inner.session_path());

    for key in SessionKey::ALL {
        let before = snapshot.get(key.as_str());
        let after = current.get(key.as_str());
        if before != after {
            debug!(key = %key, present = after.is_some(), "External session change");
            bus.publish(SessionEvent::StorageChanged {
                key,
                present: after.is_some(),
            });
        }
    }
    *snapshot = current;
}
