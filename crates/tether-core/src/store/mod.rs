//! Session storage trait and helpers.
//!
//! The store owns the persisted token pair and user record. Everything else
//! reads through it or mutates it via the session manager; other windows of
//! the same profile observe mutations through
//! [`SessionEvent::StorageChanged`](crate::events::SessionEvent::StorageChanged)
//! notifications on the bus.

mod memory;

use std::fmt;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::Result;
use crate::error::StorageError;
use crate::tokens::TokenPair;
use crate::user::UserRecord;

pub use memory::MemorySessionStore;

/// The fixed key set a session store manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKey {
    /// The access token.
    Token,
    /// The refresh token.
    RefreshToken,
    /// The serialized user record.
    User,
}

impl SessionKey {
    /// Every key, in the order `clear` removes them.
    pub const ALL: [SessionKey; 3] = [SessionKey::Token, SessionKey::RefreshToken, SessionKey::User];

    /// The wire name used in the backing area.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKey::Token => "token",
            SessionKey::RefreshToken => "refreshToken",
            SessionKey::User => "user",
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Profile-scoped persistence for the session keys.
///
/// Values are opaque strings to callers. Implementations apply a reversible
/// encoding before writing (see [`encode_value`]) and the inverse on read,
/// failing closed: an undecodable value reads as `None`, never as an error.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Read and decode a value. `Ok(None)` for missing or undecodable values.
    async fn get(&self, key: SessionKey) -> Result<Option<String>>;

    /// Encode and write a value.
    async fn set(&self, key: SessionKey, value: &str) -> Result<()>;

    /// Remove a value. Removing an absent key is a no-op.
    async fn remove(&self, key: SessionKey) -> Result<()>;

    /// Remove every session key.
    async fn clear(&self) -> Result<()> {
        for key in SessionKey::ALL {
            self.remove(key).await?;
        }
        Ok(())
    }
}

/// The reversible encoding applied to values before they reach the backing
/// area. Explicitly not cryptographic; it only keeps raw tokens out of
/// casual reads of the storage file.
pub fn encode_value(raw: &str) -> String {
    STANDARD.encode(raw.as_bytes())
}

/// Inverse of [`encode_value`]; `None` when the stored bytes do not decode.
pub fn decode_value(encoded: &str) -> Option<String> {
    let bytes = STANDARD.decode(encoded).ok()?;
    String::from_utf8(bytes).ok()
}

/// Read the persisted token pair, if both halves are present.
pub async fn load_token_pair(store: &dyn SessionStore) -> Result<Option<TokenPair>> {
    let access = store.get(SessionKey::Token).await?;
    let refresh = store.get(SessionKey::RefreshToken).await?;
    Ok(match (access, refresh) {
        (Some(access), Some(refresh)) => Some(TokenPair::new(access, refresh)),
        _ => None,
    })
}

/// Read the persisted user record, failing closed on undecodable JSON.
pub async fn load_user(store: &dyn SessionStore) -> Result<Option<UserRecord>> {
    Ok(store
        .get(SessionKey::User)
        .await?
        .and_then(|json| serde_json::from_str(&json).ok()))
}

/// Persist a freshly-obtained token pair.
pub async fn store_token_pair(store: &dyn SessionStore, pair: &TokenPair) -> Result<()> {
    store.set(SessionKey::Token, pair.access.as_str()).await?;
    store
        .set(SessionKey::RefreshToken, pair.refresh.as_str())
        .await
}

/// Persist the full login result: token pair plus user record.
pub async fn store_login(
    store: &dyn SessionStore,
    pair: &TokenPair,
    user: &UserRecord,
) -> Result<()> {
    store_token_pair(store, pair).await?;
    let json = serde_json::to_string(user).map_err(|e| StorageError::Serialization {
        message: e.to_string(),
    })?;
    store.set(SessionKey::User, &json).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_codec_round_trips() {
        let encoded = encode_value("eyJhbGciOiJIUzI1NiJ9.payload.sig");
        assert_ne!(encoded, "eyJhbGciOiJIUzI1NiJ9.payload.sig");
        assert_eq!(
            decode_value(&encoded).as_deref(),
            Some("eyJhbGciOiJIUzI1NiJ9.payload.sig")
        );
    }

    #[test]
    fn decode_fails_closed() {
        assert_eq!(decode_value("%%% not base64 %%%"), None);
    }

    #[test]
    fn key_wire_names_are_fixed() {
        assert_eq!(SessionKey::Token.as_str(), "token");
        assert_eq!(SessionKey::RefreshToken.as_str(), "refreshToken");
        assert_eq!(SessionKey::User.as_str(), "user");
    }
}
