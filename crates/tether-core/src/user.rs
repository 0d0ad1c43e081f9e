//! User record type.

use serde::{Deserialize, Serialize};

/// The application-defined user returned by login and stored alongside the
/// token pair. The session layer never validates it; it only persists it and
/// compares identities during cross-context reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Stable user id.
    pub id: String,
    /// Login email.
    pub email: String,
    /// Application role, e.g. `admin`.
    #[serde(default)]
    pub role: String,
}
