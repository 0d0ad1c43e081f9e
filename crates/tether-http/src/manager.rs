//! Top-level session state machine.

use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use tether_core::claims;
use tether_core::error::{AuthError, Error};
use tether_core::events::{LogoutReason, SessionBus, SessionEvent};
use tether_core::store::{self, SessionKey, SessionStore};
use tether_core::tokens::TokenPair;
use tether_core::user::UserRecord;
use tether_core::{AuthPhase, Credentials, Result, ServiceUrl, SessionConfig, SessionSnapshot};

use crate::api::AuthApi;
use crate::client::HttpClient;
use crate::middleware::ApiClient;
use crate::monitor::SessionMonitor;
use crate::refresh::RefreshCoordinator;
use crate::sync;

struct ManagerState {
    phase: AuthPhase,
    user: Option<UserRecord>,
    error: Option<String>,
}

pub(crate) struct ManagerInner {
    api: AuthApi,
    store: Arc<dyn SessionStore>,
    bus: SessionBus,
    config: SessionConfig,
    coordinator: Arc<RefreshCoordinator>,
    client: ApiClient,
    state: RwLock<ManagerState>,
    monitor: Mutex<Option<SessionMonitor>>,
    sync_task: Mutex<Option<JoinHandle<()>>>,
}

/// Orchestrates login, logout, renewal, and cross-context reconciliation.
///
/// The phase machine only moves forward: `Uninitialized → Loading →
/// { Authenticated, Anonymous }`, and `Authenticated → Anonymous` on any
/// logout. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

impl SessionManager {
    /// Create a manager with default configuration and a fresh event bus.
    pub fn new(service: ServiceUrl, store: Arc<dyn SessionStore>) -> Self {
        Self::with_config(service, store, SessionConfig::default(), SessionBus::new())
    }

    /// Create a manager with explicit configuration and bus.
    ///
    /// Pass the same bus the store publishes on so external storage changes
    /// reach the reconciler.
    pub fn with_config(
        service: ServiceUrl,
        store: Arc<dyn SessionStore>,
        config: SessionConfig,
        bus: SessionBus,
    ) -> Self {
        let http = HttpClient::new(service, &config);
        let api = AuthApi::new(http.clone());
        let coordinator = Arc::new(RefreshCoordinator::new(
            api.clone(),
            store.clone(),
            bus.clone(),
        ));
        let client = ApiClient::new(
            http,
            store.clone(),
            coordinator.clone(),
            bus.clone(),
            config.retry.clone(),
        );

        Self {
            inner: Arc::new(ManagerInner {
                api,
                store,
                bus,
                config,
                coordinator,
                client,
                state: RwLock::new(ManagerState {
                    phase: AuthPhase::Uninitialized,
                    user: None,
                    error: None,
                }),
                monitor: Mutex::new(None),
                sync_task: Mutex::new(None),
            }),
        }
    }

    /// The event bus shared by every session component.
    pub fn bus(&self) -> &SessionBus {
        &self.inner.bus
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SessionEvent> {
        self.inner.bus.subscribe()
    }

    /// The middleware-backed client for application endpoints.
    pub fn client(&self) -> ApiClient {
        self.inner.client.clone()
    }

    /// Current phase.
    pub fn phase(&self) -> AuthPhase {
        self.inner.state.read().unwrap().phase
    }

    /// The signed-in user, if any.
    pub fn current_user(&self) -> Option<UserRecord> {
        self.inner.state.read().unwrap().user.clone()
    }

    /// Restore a session from persisted state.
    ///
    /// Ends in `Authenticated` when a non-expired token pair and user record
    /// are present; otherwise clears the store and ends in `Anonymous`. The
    /// `Loading` phase never outlives this call.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<AuthPhase> {
        self.inner.set_state(AuthPhase::Loading, None, None);

        let restored = self.try_restore().await;
        match restored {
            Ok(phase) => Ok(phase),
            Err(err) => {
                self.inner.set_state(AuthPhase::Anonymous, None, None);
                Err(err)
            }
        }
    }

    async fn try_restore(&self) -> Result<AuthPhase> {
        let pair = store::load_token_pair(self.inner.store.as_ref()).await?;
        let user = store::load_user(self.inner.store.as_ref()).await?;

        match (pair, user) {
            (Some(pair), Some(user)) if !claims::is_expired(Some(pair.access.as_str())) => {
                info!(user_id = %user.id, "Restored persisted session");
                self.inner
                    .set_state(AuthPhase::Authenticated, Some(user), None);
                self.inner.start_background();
                Ok(AuthPhase::Authenticated)
            }
            (None, None) => {
                debug!("No persisted session");
                self.inner.set_state(AuthPhase::Anonymous, None, None);
                Ok(AuthPhase::Anonymous)
            }
            _ => {
                info!("Persisted session expired or partial; clearing");
                if let Err(err) = self.inner.store.clear().await {
                    warn!(error = %err, "Failed to clear stale session");
                }
                self.inner.set_state(AuthPhase::Anonymous, None, None);
                Ok(AuthPhase::Anonymous)
            }
        }
    }

    /// Establish a session.
    ///
    /// On failure nothing is persisted and the phase stays `Anonymous`.
    #[instrument(skip(self, credentials), fields(email = %credentials.email()))]
    pub async fn login(&self, credentials: &Credentials) -> Result<UserRecord> {
        let response = self
            .inner
            .api
            .login(credentials)
            .await
            .map_err(|err| match err {
                Error::Protocol(p) if p.is_auth_error() => {
                    Error::Auth(AuthError::InvalidCredentials)
                }
                other => other,
            })?;

        let pair = TokenPair::new(response.access_token, response.refresh_token);
        if let Err(err) = store::store_login(self.inner.store.as_ref(), &pair, &response.user).await
        {
            // Half a login is worse than none.
            let _ = self.inner.store.clear().await;
            return Err(err);
        }

        self.inner
            .set_state(AuthPhase::Authenticated, Some(response.user.clone()), None);
        self.inner.start_background();

        info!(user_id = %response.user.id, "Logged in");
        Ok(response.user)
    }

    /// End the session.
    ///
    /// The server is told best-effort; local cleanup always runs. Calling
    /// this twice is a no-op the second time and never an error.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<()> {
        self.inner
            .terminate(LogoutReason::UserRequested, None)
            .await;
        Ok(())
    }

    /// Obtain a fresh token pair through the single-flight coordinator.
    ///
    /// On failure the session is terminated, exactly as if the server had
    /// rejected the bearer.
    #[instrument(skip(self))]
    pub async fn renew_session(&self) -> Result<()> {
        match self.inner.coordinator.refresh().await {
            Ok(_) => {
                if let Some(monitor) = &*self.inner.monitor.lock().unwrap() {
                    monitor.notify_token_refreshed();
                }
                Ok(())
            }
            Err(err) => {
                self.inner
                    .handle_forced_logout(LogoutReason::RefreshFailed)
                    .await;
                Err(Error::Auth(err))
            }
        }
    }

    /// Alias for [`Self::renew_session`].
    pub async fn refresh_token(&self) -> Result<()> {
        self.renew_session().await
    }

    /// Dismiss inactivity/expiry warnings without contacting the network.
    pub fn extend_session(&self) {
        if let Some(monitor) = &*self.inner.monitor.lock().unwrap() {
            monitor.extend_session();
        }
    }

    /// Note user interaction, resetting the inactivity timer.
    pub fn record_activity(&self) {
        if let Some(monitor) = &*self.inner.monitor.lock().unwrap() {
            monitor.record_activity();
        }
    }

    /// A point-in-time view of the session.
    pub async fn snapshot(&self) -> SessionSnapshot {
        let (has_user, error) = {
            let state = self.inner.state.read().unwrap();
            (state.user.is_some(), state.error.clone())
        };

        let (is_inactive, monitored_remaining) = {
            let monitor = self.inner.monitor.lock().unwrap();
            monitor
                .as_ref()
                .map(|m| (m.is_inactive(), m.time_remaining()))
                .unwrap_or((false, None))
        };
        let time_remaining = match monitored_remaining {
            Some(remaining) => remaining,
            None => {
                let token = self
                    .inner
                    .store
                    .get(SessionKey::Token)
                    .await
                    .unwrap_or(None);
                claims::time_remaining(token.as_deref())
            }
        };

        SessionSnapshot {
            has_user,
            time_remaining,
            is_inactive,
            is_refreshing: self.inner.coordinator.is_refreshing(),
            error,
        }
    }

    /// Stop background tasks without ending the session, for host teardown.
    pub fn shutdown(&self) {
        if let Some(monitor) = self.inner.monitor.lock().unwrap().take() {
            monitor.shutdown();
        }
        if let Some(task) = self.inner.sync_task.lock().unwrap().take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.read().unwrap();
        f.debug_struct("SessionManager")
            .field("phase", &state.phase)
            .field("user", &state.user.as_ref().map(|u| &u.id))
            .finish()
    }
}

impl ManagerInner {
    fn set_state(&self, phase: AuthPhase, user: Option<UserRecord>, error: Option<String>) {
        let mut state = self.state.write().unwrap();
        state.phase = phase;
        state.user = user;
        state.error = error;
    }

    fn start_background(self: &Arc<Self>) {
        {
            let mut monitor = self.monitor.lock().unwrap();
            if monitor.is_none() {
                *monitor = Some(SessionMonitor::start(
                    self.store.clone(),
                    self.coordinator.clone(),
                    self.bus.clone(),
                    self.config.clone(),
                ));
            }
        }
        let mut sync_task = self.sync_task.lock().unwrap();
        if sync_task.is_none() {
            *sync_task = Some(sync::spawn(Arc::downgrade(self), self.bus.clone()));
        }
    }

    /// Shared teardown for every way a session can end.
    pub(crate) async fn terminate(&self, reason: LogoutReason, error: Option<String>) {
        let user_id = {
            let state = self.state.read().unwrap();
            state.user.as_ref().map(|u| u.id.clone())
        };

        // Best-effort server notice; never blocks local cleanup. Reconciling
        // a logout that happened elsewhere must not re-trigger the network.
        if reason != LogoutReason::EndedElsewhere {
            let token = self.store.get(SessionKey::Token).await.unwrap_or(None);
            if token.is_some() || reason == LogoutReason::UserRequested {
                if let Err(err) = self.api.logout(token.as_deref()).await {
                    warn!(error = %err, "Logout endpoint failed; continuing local cleanup");
                }
            }
        }

        if let Some(monitor) = self.monitor.lock().unwrap().take() {
            monitor.shutdown();
        }
        self.coordinator.fail_pending();

        if let Err(err) = self.store.clear().await {
            warn!(error = %err, "Failed to clear session store");
        }

        self.set_state(AuthPhase::Anonymous, None, error);

        if reason != LogoutReason::EndedElsewhere {
            if let Some(user_id) = user_id {
                self.bus.publish(SessionEvent::LogoutBroadcast {
                    user_id,
                    timestamp: Utc::now(),
                });
            }
        }
        info!(?reason, "Session terminated");
    }

    pub(crate) async fn handle_event(&self, event: SessionEvent) {
        match event {
            SessionEvent::ForcedLogout { reason } => self.handle_forced_logout(reason).await,
            SessionEvent::StorageChanged { key, present } => {
                self.reconcile_storage(key, present).await;
            }
            SessionEvent::LogoutBroadcast { user_id, .. } => {
                self.reconcile_broadcast(&user_id).await;
            }
            _ => {}
        }
    }

    pub(crate) async fn handle_forced_logout(&self, reason: LogoutReason) {
        if self.state.read().unwrap().phase != AuthPhase::Authenticated {
            return;
        }
        self.terminate(reason, reason_message(reason)).await;
    }

    async fn reconcile_storage(&self, key: SessionKey, present: bool) {
        if self.state.read().unwrap().phase != AuthPhase::Authenticated {
            return;
        }
        match (key, present) {
            (SessionKey::Token | SessionKey::User, false) => self.reconcile_cleared().await,
            (SessionKey::Token | SessionKey::User, true) => self.reconcile_replaced().await,
            _ => {}
        }
    }

    /// The authoritative store lost its session: follow it.
    async fn reconcile_cleared(&self) {
        info!("Session keys cleared externally; reconciling");
        self.terminate(
            LogoutReason::EndedElsewhere,
            Some(AuthError::EndedElsewhere.to_string()),
        )
        .await;
    }

    /// The authoritative store holds a (possibly different) session: check
    /// it and adopt it when it belongs to someone else.
    async fn reconcile_replaced(&self) {
        let user = store::load_user(self.store.as_ref()).await.unwrap_or(None);
        let token = self.store.get(SessionKey::Token).await.unwrap_or(None);

        let local_id = {
            let state = self.state.read().unwrap();
            state.user.as_ref().map(|u| u.id.clone())
        };

        if let Some(user) = user {
            if Some(&user.id) != local_id.as_ref() {
                if claims::is_expired(token.as_deref()) {
                    self.reconcile_cleared().await;
                } else {
                    info!(user_id = %user.id, "Adopting session established in another window");
                    self.set_state(AuthPhase::Authenticated, Some(user), None);
                    if let Some(monitor) = &*self.monitor.lock().unwrap() {
                        monitor.notify_token_refreshed();
                    }
                }
            }
        }
    }

    async fn reconcile_broadcast(&self, user_id: &str) {
        let matches_local = {
            let state = self.state.read().unwrap();
            state.phase == AuthPhase::Authenticated
                && state.user.as_ref().is_some_and(|u| u.id == user_id)
        };
        if matches_local {
            self.reconcile_cleared().await;
        }
    }
}

fn reason_message(reason: LogoutReason) -> Option<String> {
    match reason {
        LogoutReason::UserRequested => None,
        LogoutReason::TokenExpired => Some(AuthError::TokenExpired.to_string()),
        LogoutReason::RefreshFailed => Some("token refresh failed".to_string()),
        LogoutReason::Inactive => Some(AuthError::SessionInactive.to_string()),
        LogoutReason::EndedElsewhere => Some(AuthError::EndedElsewhere.to_string()),
    }
}
