//! Request middleware: bearer attachment, refresh-on-401, retry with
//! backoff.
//!
//! Every service call outside the auth endpoints goes through [`ApiClient`].
//! The policy per request:
//!
//! - an expired access token never reaches the network (the logout path is
//!   the one exemption, so a stale session can still announce its end);
//! - a 401 triggers one coordinated token refresh and one replay;
//! - errors with no response (connect, timeout) are retried with exponential
//!   backoff, at most three retries, counted per request;
//! - errors that carry a response are never backoff-retried.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use tether_core::claims;
use tether_core::error::{AuthError, Error};
use tether_core::events::{LogoutReason, SessionBus, SessionEvent};
use tether_core::store::{SessionKey, SessionStore};
use tether_core::{Result, RetryPolicy};

use crate::AUDIT_TARGET;
use crate::api::LOGOUT_PATH;
use crate::client::{HttpClient, is_network_error, is_security_relevant, map_send_error};
use crate::refresh::RefreshCoordinator;

struct ClientInner {
    http: HttpClient,
    store: Arc<dyn SessionStore>,
    coordinator: Arc<RefreshCoordinator>,
    bus: SessionBus,
    retry: RetryPolicy,
}

/// The authenticated service client the application calls endpoints through.
///
/// Cheap to clone; clones share the transport, store, and refresh
/// coordinator.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

impl ApiClient {
    /// Assemble the middleware over its collaborators.
    pub fn new(
        http: HttpClient,
        store: Arc<dyn SessionStore>,
        coordinator: Arc<RefreshCoordinator>,
        bus: SessionBus,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                http,
                store,
                coordinator,
                bus,
                retry,
            }),
        }
    }

    /// GET a JSON resource.
    pub async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        let response = self.send(Method::GET, path, None).await?;
        response.json::<R>().await.map_err(map_send_error)
    }

    /// POST a JSON body, expecting a JSON response.
    pub async fn post<B: Serialize, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R> {
        let body = to_body(body)?;
        let response = self.send(Method::POST, path, Some(body)).await?;
        response.json::<R>().await.map_err(map_send_error)
    }

    /// PUT a JSON body, expecting a JSON response.
    pub async fn put<B: Serialize, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R> {
        let body = to_body(body)?;
        let response = self.send(Method::PUT, path, Some(body)).await?;
        response.json::<R>().await.map_err(map_send_error)
    }

    /// DELETE a resource, ignoring any response body.
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.send(Method::DELETE, path, None).await?;
        Ok(())
    }

    /// Run one request through the full policy, returning only successful
    /// responses.
    #[instrument(skip(self, body), fields(%method, path))]
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response> {
        let mut bearer = self.bearer_for(path).await?;
        let mut auth_retried = false;
        let mut retries = 0u32;

        loop {
            let mut request = self.inner.http.request(method.clone(), path);
            if let Some(body) = &body {
                request = request.json(body);
            }
            if let Some(token) = &bearer {
                request = request.bearer_auth(token);
            }

            match request.send().await {
                Err(err) if is_network_error(&err) && retries < self.inner.retry.max_retries => {
                    retries += 1;
                    let delay = self.inner.retry.delay(retries);
                    warn!(
                        retry = retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Network error; backing off before retry"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(map_send_error(err)),
                Ok(response) => {
                    let status = response.status();

                    if status == StatusCode::UNAUTHORIZED
                        && !auth_retried
                        && !is_logout_path(path)
                    {
                        // One coordinated refresh, one replay.
                        auth_retried = true;
                        debug!("401 received; refreshing before replay");
                        let token = self
                            .inner
                            .coordinator
                            .refresh()
                            .await
                            .map_err(Error::Auth)?;
                        bearer = Some(token.as_str().to_string());
                        retries = 0;
                        continue;
                    }

                    return self.conclude(&method, path, response).await;
                }
            }
        }
    }

    /// Audit the outcome and split success from protocol errors.
    async fn conclude(
        &self,
        method: &Method,
        path: &str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response> {
        let status = response.status();
        debug!(
            target: AUDIT_TARGET,
            %method,
            path,
            status = status.as_u16(),
            "request completed"
        );

        if status.is_success() {
            return Ok(response);
        }

        let error = crate::client::parse_error_response(response).await;
        if is_security_relevant(status) {
            warn!(
                target: AUDIT_TARGET,
                %method,
                path,
                status = status.as_u16(),
                "security-relevant response"
            );
        }
        Err(Error::Protocol(error))
    }

    /// Resolve the bearer for this request, enforcing the expiry gate.
    async fn bearer_for(&self, path: &str) -> Result<Option<String>> {
        let token = self.inner.store.get(SessionKey::Token).await?;
        let Some(token) = token else {
            return Ok(None);
        };

        // The logout call must go out even with a stale token.
        if is_logout_path(path) {
            return Ok(Some(token));
        }

        if claims::is_expired(Some(&token)) {
            warn!(path, "Access token expired; request short-circuited");
            self.inner.bus.publish(SessionEvent::ForcedLogout {
                reason: LogoutReason::TokenExpired,
            });
            return Err(Error::Auth(AuthError::TokenExpired));
        }

        Ok(Some(token))
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("service", self.inner.http.service())
            .finish()
    }
}

fn to_body<B: Serialize>(body: &B) -> Result<serde_json::Value> {
    serde_json::to_value(body).map_err(|e| {
        Error::InvalidInput(tether_core::error::InvalidInputError::Other {
            message: format!("unserializable request body: {}", e),
        })
    })
}

fn is_logout_path(path: &str) -> bool {
    path.trim_start_matches('/') == LOGOUT_PATH.trim_start_matches('/')
}
