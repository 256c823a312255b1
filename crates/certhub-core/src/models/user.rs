//! User domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A principal that can own servers.
///
/// The email is the identity key. Exactly one user has `is_ca` set; it owns
/// the server holding the root certificate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub is_ca: bool,
    /// Organisation whose details are used for this user's servers.
    pub organisation_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub email: String,
    pub is_ca: bool,
    pub organisation_id: Uuid,
}
