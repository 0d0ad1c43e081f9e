//! tether-core - Core session types and traits for the tether toolkit.

pub mod claims;
pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod service_url;
pub mod session;
pub mod store;
pub mod tokens;
pub mod user;

pub use config::{RetryPolicy, SessionConfig};
pub use credentials::Credentials;
pub use error::Error;
pub use events::{LogoutReason, SessionBus, SessionEvent};
pub use service_url::ServiceUrl;
pub use session::{AuthPhase, SessionSnapshot};
pub use store::{MemorySessionStore, SessionKey, SessionStore};
pub use tokens::{AccessToken, RefreshToken, TokenPair};
pub use user::UserRecord;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;
