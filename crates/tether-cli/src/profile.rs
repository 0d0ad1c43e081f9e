//! Profile directory and session manager construction.

use std::sync::Arc;

use anyhow::{Context, Result};
use directories::ProjectDirs;

use tether_core::{ServiceUrl, SessionBus, SessionConfig};
use tether_file::{FileSessionStore, SessionWatcher};
use tether_http::SessionManager;

/// A manager wired to the profile's session document.
pub struct Profile {
    pub manager: SessionManager,
    /// Keeps external-change notifications flowing while the command runs.
    _watcher: SessionWatcher,
}

/// Open the profile store and restore any persisted session.
pub async fn open(service: &str) -> Result<Profile> {
    let service = ServiceUrl::new(service).context("Invalid service URL")?;

    let dirs = ProjectDirs::from("", "", "tether").context("Could not determine profile directory")?;
    let store =
        FileSessionStore::open(dirs.data_dir()).context("Failed to open session storage")?;

    let bus = SessionBus::new();
    let watcher = store
        .watch(bus.clone())
        .context("Failed to watch session storage")?;

    let manager = SessionManager::with_config(
        service,
        Arc::new(store),
        SessionConfig::default(),
        bus,
    );
    manager
        .initialize()
        .await
        .context("Failed to restore session")?;

    Ok(Profile {
        manager,
        _watcher: watcher,
    })
}
