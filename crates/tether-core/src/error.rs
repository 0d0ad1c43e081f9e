//! Error types for the tether toolkit.
//!
//! This module provides a unified error type with explicit variants for
//! transport, authentication, protocol, storage, and input validation
//! errors.

use std::fmt;
use thiserror::Error;

/// The unified error type for tether operations.
///
/// This error type covers all possible failure modes in the toolkit, with
/// explicit variants to allow callers to handle specific cases.
#[derive(Debug, Error)]
pub enum Error {
    /// Network transport errors (connection, timeout).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Authentication errors (expired tokens, failed refresh).
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Protocol errors (non-2xx responses with a body).
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Session storage errors.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Input validation errors (invalid service URL).
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InvalidInputError),
}

/// Transport-level errors: the request never produced a response.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network connection failed.
    #[error("connection failed: {message}")]
    Connection { message: String },

    /// Request timed out.
    #[error("request timed out")]
    Timeout,

    /// Generic HTTP transport failure.
    #[error("HTTP error: {message}")]
    Http { message: String },
}

/// Authentication-related errors.
///
/// `Clone` so a single refresh outcome can fan out to every queued waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The login endpoint rejected the credentials.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The access token is past its safety-margin expiry.
    #[error("access token expired")]
    TokenExpired,

    /// The refresh token is missing, malformed, or itself expired.
    #[error("refresh token invalid or expired")]
    RefreshTokenInvalid,

    /// The refresh endpoint rejected the exchange or was unreachable.
    #[error("token refresh failed: {message}")]
    RefreshFailed {
        /// What the refresh attempt reported.
        message: String,
    },

    /// No session is established.
    #[error("no active session")]
    NotAuthenticated,

    /// The inactivity timeout elapsed without user activity.
    #[error("session ended due to inactivity")]
    SessionInactive,

    /// Another window or process of the same profile logged out.
    #[error("session ended in another window")]
    EndedElsewhere,

    /// The session was torn down while this operation was pending.
    #[error("session ended")]
    SessionEnded,
}

/// Protocol-level error: the server answered with a non-success status.
#[derive(Debug, Clone)]
pub struct ProtocolError {
    /// HTTP status code.
    pub status: u16,
    /// Machine-readable error code from the body (if present).
    pub code: Option<String>,
    /// Error message from the server (if present).
    pub message: Option<String>,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {}", self.status)?;
        if let Some(ref code) = self.code {
            write!(f, " [{}]", code)?;
        }
        if let Some(ref message) = self.message {
            write!(f, ": {}", message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ProtocolError {}

impl ProtocolError {
    /// Create a new protocol error.
    pub fn new(status: u16, code: Option<String>, message: Option<String>) -> Self {
        Self {
            status,
            code,
            message,
        }
    }

    /// Check if this is an authentication error.
    pub fn is_auth_error(&self) -> bool {
        self.status == 401
            || self.code.as_deref() == Some("ExpiredToken")
            || self.code.as_deref() == Some("InvalidToken")
    }

    /// Default user-facing text for the status class.
    ///
    /// The server message, when present, is preferred by UI layers; this is
    /// the fallback.
    pub fn user_message(&self) -> &'static str {
        match self.status {
            400 | 422 => "The submitted data is invalid.",
            401 => "Your session is no longer valid. Please sign in again.",
            403 => "You do not have permission to perform this action.",
            404 => "The requested resource was not found.",
            409 => "The request conflicts with existing data.",
            429 => "Too many requests. Please try again later.",
            500..=599 => "The server is currently unavailable. Please try again later.",
            _ => "Something went wrong. Please try again.",
        }
    }
}

/// Session storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the backing area failed.
    #[error("storage IO error: {message}")]
    Io { message: String },

    /// Encoding a value for the backing area failed.
    #[error("storage serialization error: {message}")]
    Serialization { message: String },

    /// The backing area could not be locked.
    #[error("storage lock error: {message}")]
    Lock { message: String },
}

/// Input validation errors.
#[derive(Debug, Error)]
pub enum InvalidInputError {
    /// Invalid service URL format.
    #[error("invalid service URL '{value}': {reason}")]
    ServiceUrl { value: String, reason: String },

    /// Generic invalid input.
    #[error("invalid input: {message}")]
    Other { message: String },
}
