//! HTTP transport plumbing shared by the auth endpoints and the middleware.

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::trace;

use tether_core::error::{Error, ProtocolError, TransportError};
use tether_core::{Result, ServiceUrl, SessionConfig};

/// Body shape the service uses for error responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Thin wrapper around a shared [`reqwest::Client`] bound to one service.
///
/// Every request carries the toolkit `User-Agent` and a fixed
/// `X-API-Version` header.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    service: ServiceUrl,
}

impl HttpClient {
    /// Create a new client for the given service.
    pub fn new(service: ServiceUrl, config: &SessionConfig) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-API-Version",
            HeaderValue::from_str(&config.api_version)
                .unwrap_or_else(|_| HeaderValue::from_static("1")),
        );

        let client = reqwest::Client::builder()
            .user_agent(concat!("tether/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .expect("failed to build HTTP client");

        Self { client, service }
    }

    /// Returns the service URL this client is configured for.
    pub fn service(&self) -> &ServiceUrl {
        &self.service
    }

    /// Start building a request against a service path.
    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.service.endpoint(path))
    }

    /// Parse a successful response body, or map the error body.
    pub(crate) async fn handle_response<R: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<R> {
        let status = response.status();
        trace!(status = %status, "service response");

        if status.is_success() {
            let body = response.json::<R>().await.map_err(map_send_error)?;
            Ok(body)
        } else {
            Err(Error::Protocol(parse_error_response(response).await))
        }
    }

    /// Like [`Self::handle_response`] but discards any success body.
    pub(crate) async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Error::Protocol(parse_error_response(response).await))
        }
    }
}

/// Parse a non-success response into a [`ProtocolError`].
pub(crate) async fn parse_error_response(response: reqwest::Response) -> ProtocolError {
    let status = response.status().as_u16();

    match response.json::<ErrorBody>().await {
        Ok(body) => ProtocolError::new(status, body.error, body.message),
        Err(_) => ProtocolError::new(status, None, None),
    }
}

/// Map a reqwest send error into the crate taxonomy.
pub(crate) fn map_send_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Transport(TransportError::Timeout)
    } else if err.is_connect() {
        Error::Transport(TransportError::Connection {
            message: err.to_string(),
        })
    } else {
        Error::Transport(TransportError::Http {
            message: err.to_string(),
        })
    }
}

/// Whether a send error means no response was received (retryable).
pub(crate) fn is_network_error(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout()
}

/// Whether the status warrants an audit record.
pub(crate) fn is_security_relevant(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || status.is_server_error()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_creation() {
        let service = ServiceUrl::new("https://api.example.com").unwrap();
        let client = HttpClient::new(service.clone(), &SessionConfig::default());
        assert_eq!(client.service().as_str(), service.as_str());
    }

    #[test]
    fn security_relevant_statuses() {
        assert!(is_security_relevant(StatusCode::UNAUTHORIZED));
        assert!(is_security_relevant(StatusCode::FORBIDDEN));
        assert!(is_security_relevant(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!is_security_relevant(StatusCode::NOT_FOUND));
    }
}
