//! Single-flight token refresh.

use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};

use tether_core::claims;
use tether_core::error::AuthError;
use tether_core::events::{LogoutReason, SessionBus, SessionEvent};
use tether_core::store::{self, SessionKey, SessionStore};
use tether_core::tokens::{AccessToken, TokenPair};

use crate::api::AuthApi;

/// What every caller of a refresh receives.
type RefreshOutcome = Result<AccessToken, AuthError>;

/// A caller parked while another refresh is in flight.
type RefreshWaiter = oneshot::Sender<RefreshOutcome>;

struct CoordinatorState {
    in_flight: bool,
    /// Bumped on teardown so a late network response is discarded instead of
    /// resurrecting a cleared session.
    epoch: u64,
    waiters: Vec<RefreshWaiter>,
}

/// Guarantees at most one in-flight refresh call per service.
///
/// Concurrent callers that observe a refresh in flight are queued and settled
/// in FIFO order with the same outcome the network call produced: everybody
/// gets the new access token, or everybody gets the same error.
pub struct RefreshCoordinator {
    state: Mutex<CoordinatorState>,
    api: AuthApi,
    store: Arc<dyn SessionStore>,
    bus: SessionBus,
}

impl RefreshCoordinator {
    /// Create a coordinator over the given endpoints and store.
    pub fn new(api: AuthApi, store: Arc<dyn SessionStore>, bus: SessionBus) -> Self {
        Self {
            state: Mutex::new(CoordinatorState {
                in_flight: false,
                epoch: 0,
                waiters: Vec::new(),
            }),
            api,
            store,
            bus,
        }
    }

    /// Whether a refresh call is currently in flight.
    pub fn is_refreshing(&self) -> bool {
        self.state.lock().unwrap().in_flight
    }

    /// Obtain a fresh access token, joining the in-flight refresh if one
    /// exists.
    ///
    /// Preconditions are checked before any network traffic: a missing,
    /// malformed, or expired refresh token fails immediately with
    /// [`AuthError::RefreshTokenInvalid`].
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> RefreshOutcome {
        let claim = {
            let mut state = self.state.lock().unwrap();
            if state.in_flight {
                let (tx, rx) = oneshot::channel();
                state.waiters.push(tx);
                Err(rx)
            } else {
                state.in_flight = true;
                Ok(state.epoch)
            }
        };

        let epoch = match claim {
            Err(rx) => {
                debug!("Joining in-flight refresh");
                // A dropped sender means the session was torn down.
                return rx.await.unwrap_or(Err(AuthError::SessionEnded));
            }
            Ok(epoch) => epoch,
        };

        let outcome = self.perform(epoch).await;
        if self.settle(epoch, &outcome) {
            self.bus.publish(SessionEvent::RefreshSettled {
                ok: outcome.is_ok(),
            });
            if outcome.is_err() {
                self.bus.publish(SessionEvent::ForcedLogout {
                    reason: LogoutReason::RefreshFailed,
                });
            }
            outcome
        } else {
            // The session ended while the call was in flight.
            Err(AuthError::SessionEnded)
        }
    }

    /// Reject every parked waiter and invalidate any in-flight call.
    ///
    /// Called on logout so nobody keeps waiting on a refresh that can no
    /// longer matter.
    pub fn fail_pending(&self) {
        let waiters = {
            let mut state = self.state.lock().unwrap();
            state.epoch += 1;
            state.in_flight = false;
            std::mem::take(&mut state.waiters)
        };
        if !waiters.is_empty() {
            debug!(count = waiters.len(), "Rejecting parked refresh waiters");
        }
        for waiter in waiters {
            let _ = waiter.send(Err(AuthError::SessionEnded));
        }
    }

    async fn perform(&self, epoch: u64) -> RefreshOutcome {
        let refresh_token = match self.store.get(SessionKey::RefreshToken).await {
            Ok(value) => value,
            Err(err) => {
                return Err(AuthError::RefreshFailed {
                    message: err.to_string(),
                });
            }
        };

        // Never submit an expired refresh token; fail without a network call.
        let Some(refresh_token) = refresh_token else {
            warn!("No refresh token stored; refusing to refresh");
            return Err(AuthError::RefreshTokenInvalid);
        };
        if claims::is_expired(Some(&refresh_token)) {
            warn!("Refresh token expired; refusing to refresh");
            return Err(AuthError::RefreshTokenInvalid);
        }

        info!("Refreshing session tokens");
        let response = self
            .api
            .refresh(&refresh_token)
            .await
            .map_err(|err| AuthError::RefreshFailed {
                message: err.to_string(),
            })?;

        let pair = TokenPair::new(response.access_token, response.refresh_token);

        // Discard the response if the session changed while we were away.
        if self.state.lock().unwrap().epoch != epoch {
            debug!("Session ended during refresh; discarding response");
            return Err(AuthError::SessionEnded);
        }

        store::store_token_pair(self.store.as_ref(), &pair)
            .await
            .map_err(|err| AuthError::RefreshFailed {
                message: err.to_string(),
            })?;

        debug!("Session tokens refreshed");
        Ok(pair.access)
    }

    /// Release every waiter in FIFO order with the shared outcome.
    ///
    /// Returns `false` when the epoch moved on (teardown already settled
    /// everybody).
    fn settle(&self, epoch: u64, outcome: &RefreshOutcome) -> bool {
        let waiters = {
            let mut state = self.state.lock().unwrap();
            if state.epoch != epoch {
                return false;
            }
            state.in_flight = false;
            std::mem::take(&mut state.waiters)
        };
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
        true
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("RefreshCoordinator")
            .field("in_flight", &state.in_flight)
            .field("waiters", &state.waiters.len())
            .finish()
    }
}
