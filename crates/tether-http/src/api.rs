//! Auth endpoint bindings.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use tether_core::user::UserRecord;
use tether_core::{Credentials, Result};

use crate::client::{HttpClient, map_send_error};

/// Path of the login endpoint.
pub const LOGIN_PATH: &str = "/auth/login";

/// Path of the refresh endpoint.
pub const REFRESH_PATH: &str = "/auth/refresh";

/// Path of the logout endpoint.
pub const LOGOUT_PATH: &str = "/auth/logout";

/// Request body for login.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Response from login.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    /// The signed-in user.
    pub user: UserRecord,
    /// Fresh access token.
    pub access_token: String,
    /// Fresh refresh token.
    pub refresh_token: String,
}

/// Request body for the token refresh.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Response from the token refresh.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    /// Replacement access token.
    pub access_token: String,
    /// Replacement refresh token.
    pub refresh_token: String,
}

/// Typed access to the three auth endpoints.
///
/// The auth endpoints deliberately bypass the request middleware: login and
/// refresh run without a bearer, and logout must be allowed to proceed with
/// a stale one.
#[derive(Debug, Clone)]
pub struct AuthApi {
    http: HttpClient,
}

impl AuthApi {
    /// Create the endpoint bindings over a transport.
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    /// Exchange credentials for a user record and token pair.
    #[instrument(skip(self, credentials), fields(email = %credentials.email()))]
    pub async fn login(&self, credentials: &Credentials) -> Result<LoginResponse> {
        debug!("Logging in");
        let request = LoginRequest {
            email: credentials.email(),
            password: credentials.password(),
        };

        let response = self
            .http
            .request(Method::POST, LOGIN_PATH)
            .json(&request)
            .send()
            .await
            .map_err(map_send_error)?;

        self.http.handle_response(response).await
    }

    /// Exchange a refresh token for a replacement token pair.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse> {
        debug!("Refreshing tokens");
        let request = RefreshRequest { refresh_token };

        let response = self
            .http
            .request(Method::POST, REFRESH_PATH)
            .json(&request)
            .send()
            .await
            .map_err(map_send_error)?;

        self.http.handle_response(response).await
    }

    /// Tell the server the session ended. The bearer may be stale; callers
    /// treat failures as non-blocking.
    #[instrument(skip_all)]
    pub async fn logout(&self, access_token: Option<&str>) -> Result<()> {
        debug!("Logging out");
        let mut request = self.http.request(Method::POST, LOGOUT_PATH);
        if let Some(token) = access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(map_send_error)?;
        self.http.handle_empty_response(response).await
    }
}
