//! Private key domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The private key of a server. One per server, never rotated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Key {
    pub id: Uuid,
    pub server_id: Uuid,
    /// Unencrypted PKCS#8 PEM.
    pub private_key: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateKey {
    pub server_id: Uuid,
    pub private_key: String,
}
