//! Session lifetime and inactivity monitoring.
//!
//! A single spawned task owns every session timer. Expiry deadlines are
//! armed as monotonic instants computed from the token's wall-clock
//! remaining lifetime at the moment it is observed, so the warning fires
//! near-exactly at its threshold instead of on the next poll tick, and a
//! paused test clock can drive all of it. The periodic check only exists to
//! catch token swaps performed by other components.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, instrument};

use tether_core::SessionConfig;
use tether_core::claims;
use tether_core::error::AuthError;
use tether_core::events::{LogoutReason, SessionBus, SessionEvent};
use tether_core::store::{SessionKey, SessionStore};
use tether_core::tokens::AccessToken;

use crate::refresh::RefreshCoordinator;

/// Where the monitored session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionHealth {
    /// Token comfortably valid, user active.
    Valid,
    /// Within the loose near-expiry bound (UI hint only).
    NearExpiry,
    /// Within the warning threshold; renewal should be offered.
    ExpiringWarning,
    /// Past the safety-margin expiry.
    Expired,
    /// The inactivity timeout elapsed.
    Inactive,
}

struct MonitorStatus {
    health: SessionHealth,
    /// The warning fires once per observed token.
    warned: bool,
    near_hinted: bool,
    inactive: bool,
    observed_token: Option<String>,
    expiry_deadline: Option<Instant>,
    grace_deadline: Option<Instant>,
    last_activity: Instant,
}

struct MonitorInner {
    store: Arc<dyn SessionStore>,
    coordinator: Arc<RefreshCoordinator>,
    bus: SessionBus,
    config: SessionConfig,
    status: RwLock<MonitorStatus>,
    wake: Notify,
}

/// Watches the stored access token and the user's activity, publishing
/// expiry and inactivity transitions on the bus.
///
/// All timers live in one task; [`SessionMonitor::shutdown`] (or drop) kills
/// them so nothing ever fires against a cleared token.
pub struct SessionMonitor {
    inner: Arc<MonitorInner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionMonitor {
    /// Spawn the monitor task. Must be called from within a tokio runtime.
    pub fn start(
        store: Arc<dyn SessionStore>,
        coordinator: Arc<RefreshCoordinator>,
        bus: SessionBus,
        config: SessionConfig,
    ) -> Self {
        let inner = Arc::new(MonitorInner {
            store,
            coordinator,
            bus,
            config,
            status: RwLock::new(MonitorStatus {
                health: SessionHealth::Valid,
                warned: false,
                near_hinted: false,
                inactive: false,
                observed_token: None,
                expiry_deadline: None,
                grace_deadline: None,
                last_activity: Instant::now(),
            }),
            wake: Notify::new(),
        });

        let task = tokio::spawn(run(inner.clone()));
        Self {
            inner,
            task: Mutex::new(Some(task)),
        }
    }

    /// Current health classification.
    pub fn health(&self) -> SessionHealth {
        self.inner.status.read().unwrap().health
    }

    /// Whether the inactivity timeout has elapsed.
    pub fn is_inactive(&self) -> bool {
        self.inner.status.read().unwrap().inactive
    }

    /// Time until the armed safety-margin expiry, once a token has been
    /// observed.
    pub fn time_remaining(&self) -> Option<Duration> {
        self.inner
            .status
            .read()
            .unwrap()
            .expiry_deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Note user interaction: re-arms the inactivity timer.
    ///
    /// The host maps its interaction events (pointer, key, scroll, touch,
    /// focus, visibility) onto this.
    pub fn record_activity(&self) {
        {
            let mut status = self.inner.status.write().unwrap();
            status.last_activity = Instant::now();
            if status.inactive {
                status.inactive = false;
                status.grace_deadline = None;
                status.health = SessionHealth::Valid;
            }
        }
        self.inner.wake.notify_one();
    }

    /// Renew the token pair through the coordinator and re-arm the expiry
    /// schedule.
    #[instrument(skip(self))]
    pub async fn renew_session(&self) -> Result<AccessToken, AuthError> {
        let token = self.inner.coordinator.refresh().await?;
        // The task re-observes the swapped token and clears the warning.
        self.inner.wake.notify_one();
        Ok(token)
    }

    /// Nudge the task to re-observe the stored token, e.g. after an
    /// externally-driven refresh.
    pub(crate) fn notify_token_refreshed(&self) {
        self.inner.wake.notify_one();
    }

    /// Dismiss warnings and re-arm the inactivity timer without touching the
    /// network.
    pub fn extend_session(&self) {
        {
            let mut status = self.inner.status.write().unwrap();
            status.last_activity = Instant::now();
            status.inactive = false;
            status.grace_deadline = None;
            status.health = SessionHealth::Valid;
        }
        self.inner.wake.notify_one();
        debug!("Session extended without refresh");
    }

    /// Stop the monitor task and with it every session timer.
    pub fn shutdown(&self) {
        if let Some(task) = self.task.lock().unwrap().take() {
            task.abort();
            debug!("Session monitor shut down");
        }
    }
}

impl Drop for SessionMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SessionMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionMonitor")
            .field("health", &self.health())
            .finish()
    }
}

async fn run(inner: Arc<MonitorInner>) {
    let mut check = time::interval(inner.config.check_interval);
    check.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    loop {
        let token = inner.store.get(SessionKey::Token).await.unwrap_or(None);
        let now = Instant::now();

        let mut events: Vec<SessionEvent> = Vec::new();
        let mut stop = false;

        {
            let mut status = inner.status.write().unwrap();

            if status.observed_token != token {
                let remaining = claims::time_remaining(token.as_deref());
                debug!(
                    remaining_secs = remaining.as_secs(),
                    "Token changed; re-arming expiry schedule"
                );
                status.observed_token = token.clone();
                status.expiry_deadline = Some(now + remaining);
                status.warned = false;
                status.near_hinted = false;
                if !status.inactive {
                    status.health = SessionHealth::Valid;
                }
            }

            let deadline = status.expiry_deadline.unwrap_or(now);
            let remaining = deadline.saturating_duration_since(now);

            if remaining.is_zero() {
                status.health = SessionHealth::Expired;
                events.push(SessionEvent::SessionExpired);
                events.push(SessionEvent::ForcedLogout {
                    reason: LogoutReason::TokenExpired,
                });
                stop = true;
            } else if remaining <= inner.config.warning_threshold {
                if !status.warned {
                    status.warned = true;
                    if !status.inactive {
                        status.health = SessionHealth::ExpiringWarning;
                    }
                    events.push(SessionEvent::ExpiryWarning { remaining });
                }
            } else if remaining <= inner.config.near_expiry_threshold && !status.near_hinted {
                status.near_hinted = true;
                if status.health == SessionHealth::Valid {
                    status.health = SessionHealth::NearExpiry;
                }
                events.push(SessionEvent::NearExpiry);
            }

            if !stop {
                let idle_deadline = status.last_activity + inner.config.inactivity_timeout;
                if !status.inactive && now >= idle_deadline {
                    status.inactive = true;
                    status.health = SessionHealth::Inactive;
                    status.grace_deadline = Some(now + inner.config.inactivity_grace);
                    events.push(SessionEvent::SessionInactive);
                }
                if status.inactive
                    && status.grace_deadline.is_some_and(|grace| now >= grace)
                {
                    events.push(SessionEvent::ForcedLogout {
                        reason: LogoutReason::Inactive,
                    });
                    stop = true;
                }
            }
        }

        for event in events {
            inner.bus.publish(event);
        }
        if stop {
            info!("Session monitor stopping");
            return;
        }

        // Earliest point anything above could change on its own.
        let wake_at = {
            let status = inner.status.read().unwrap();
            let now = Instant::now();
            let mut deadlines: Vec<Instant> = Vec::new();

            if let Some(deadline) = status.expiry_deadline {
                deadlines.push(deadline);
                if !status.warned {
                    if let Some(warn_at) = deadline.checked_sub(inner.config.warning_threshold) {
                        if warn_at > now {
                            deadlines.push(warn_at);
                        }
                    }
                }
            }
            deadlines.push(match status.grace_deadline {
                Some(grace) if status.inactive => grace,
                _ => status.last_activity + inner.config.inactivity_timeout,
            });

            deadlines.into_iter().min()
        };

        let precise = async {
            match wake_at {
                Some(at) => time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = check.tick() => {}
            _ = precise => {}
            _ = inner.wake.notified() => {}
        }
    }
}
