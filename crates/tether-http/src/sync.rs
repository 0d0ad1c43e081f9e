//! Cross-context reconciliation task.
//!
//! Subscribes the manager to the session event bus and routes storage-change
//! notifications, logout broadcasts from other windows, and internal
//! forced-logout signals to its reconciliation handlers. Reconciliation
//! never issues network calls; it only aligns local state with the
//! authoritative store.

use std::sync::Weak;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::warn;

use tether_core::events::SessionBus;

use crate::manager::ManagerInner;

pub(crate) fn spawn(manager: Weak<ManagerInner>, bus: SessionBus) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Session event bus lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let Some(manager) = manager.upgrade() else {
                break;
            };
            manager.handle_event(event).await;
        }
    })
}
