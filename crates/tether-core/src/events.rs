//! Session event bus.
//!
//! A single broadcast channel carries every cross-component signal: storage
//! mutations, logout broadcasts from other windows, and the monitor's
//! expiry/inactivity transitions. Delivery to live subscribers is FIFO and
//! at-least-once; a subscriber that lags more than the channel capacity
//! loses the oldest events.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::store::SessionKey;

/// Buffered events per subscriber before lagging sets in.
const BUS_CAPACITY: usize = 64;

/// Why a session was terminated without an explicit user request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    /// The user asked to log out.
    UserRequested,
    /// The access token expired and could not be used.
    TokenExpired,
    /// The refresh endpoint rejected the exchange.
    RefreshFailed,
    /// The inactivity timeout elapsed.
    Inactive,
    /// Another window or process cleared the session.
    EndedElsewhere,
}

/// A signal on the session event bus.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A session key changed in the backing store. `present` is whether the
    /// key holds a value after the change.
    StorageChanged {
        /// The key that changed.
        key: SessionKey,
        /// Whether the key still holds a value.
        present: bool,
    },

    /// A window or process announced an explicit logout.
    LogoutBroadcast {
        /// The user whose session ended.
        user_id: String,
        /// When the logout happened.
        timestamp: DateTime<Utc>,
    },

    /// The access token is within the warning threshold of expiry.
    ExpiryWarning {
        /// Time left before the safety-margin expiry.
        remaining: Duration,
    },

    /// The access token is within the near-expiry threshold (UI hint).
    NearExpiry,

    /// The access token reached its safety-margin expiry.
    SessionExpired,

    /// The inactivity timeout elapsed.
    SessionInactive,

    /// A component demands the session be terminated.
    ForcedLogout {
        /// What triggered the termination.
        reason: LogoutReason,
    },

    /// A refresh attempt settled.
    RefreshSettled {
        /// Whether new tokens were obtained.
        ok: bool,
    },
}

/// Publish/subscribe fan-out for [`SessionEvent`]s.
///
/// Cloning shares the underlying channel; all clones publish to the same
/// subscribers.
#[derive(Debug, Clone)]
pub struct SessionBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl SessionBus {
    /// Create a new bus with nobody subscribed yet.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Publish an event to every live subscriber.
    ///
    /// Publishing with no subscribers is not an error.
    pub fn publish(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}

impl Default for SessionBus {
    fn default() -> Self {
        Self::new()
    }
}
