//! In-memory session store.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::Result;
use crate::events::{SessionBus, SessionEvent};

use super::{SessionKey, SessionStore, decode_value, encode_value};

/// In-memory [`SessionStore`] for embedding and tests.
///
/// Holds encoded values, exactly like a persistent backing area would, so the
/// codec path is exercised. When built with a bus, every mutation publishes a
/// [`SessionEvent::StorageChanged`] notification, which is how a second
/// manager sharing the store observes logouts performed elsewhere.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    values: RwLock<HashMap<SessionKey, String>>,
    bus: Option<SessionBus>,
}

impl MemorySessionStore {
    /// Create a store with no change notifications.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that publishes mutations to `bus`.
    pub fn with_bus(bus: SessionBus) -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
            bus: Some(bus),
        }
    }

    fn notify(&self, key: SessionKey, present: bool) {
        if let Some(bus) = &self.bus {
            bus.publish(SessionEvent::StorageChanged { key, present });
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, key: SessionKey) -> Result<Option<String>> {
        let values = self.values.read().unwrap();
        Ok(values.get(&key).and_then(|encoded| decode_value(encoded)))
    }

    async fn set(&self, key: SessionKey, value: &str) -> Result<()> {
        self.values
            .write()
            .unwrap()
            .insert(key, encode_value(value));
        self.notify(key, true);
        Ok(())
    }

    async fn remove(&self, key: SessionKey) -> Result<()> {
        let removed = self.values.write().unwrap().remove(&key).is_some();
        if removed {
            self.notify(key, false);
        }
        Ok(())
    }
}
