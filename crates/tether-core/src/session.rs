//! Derived session state.

use std::time::Duration;

/// Top-level authentication phase.
///
/// The machine only moves forward: `Uninitialized → Loading →
/// { Authenticated, Anonymous }`, and `Authenticated → Anonymous` on any
/// logout. It never returns to `Authenticated` without a fresh login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    /// `initialize` has not been called.
    Uninitialized,
    /// Persisted state is being read.
    Loading,
    /// A user is signed in with a usable token pair.
    Authenticated,
    /// No session; the store is empty.
    Anonymous,
}

/// A point-in-time view of the session, derived on demand and never
/// persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    /// Whether a user record is present.
    pub has_user: bool,
    /// Time until the access token's safety-margin expiry.
    pub time_remaining: Duration,
    /// Whether the inactivity timeout has elapsed.
    pub is_inactive: bool,
    /// Whether a token refresh is in flight.
    pub is_refreshing: bool,
    /// The most recent terminal error message, if any.
    pub error: Option<String>,
}

impl SessionSnapshot {
    /// The empty snapshot used for anonymous sessions.
    pub fn empty() -> Self {
        Self {
            has_user: false,
            time_remaining: Duration::ZERO,
            is_inactive: false,
            is_refreshing: false,
            error: None,
        }
    }
}
