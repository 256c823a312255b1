//! Server domain model.
//!
//! A server is one certificate-bearing identity. Its common name is unique
//! across the system and doubles as the lookup key for get-or-create.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Server {
    pub id: Uuid,
    /// The owning principal.
    pub user_id: Uuid,
    pub organisation_id: Uuid,
    /// The configured CA name for the CA's server, a SHA-256 fingerprint
    /// of email and alternate names for tenant servers.
    pub common_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Server {
    /// Human-readable label: the alternate names joined with `", "`, or the
    /// common name when the server has none.
    pub fn display_name(&self, alternative_names: &[String]) -> String {
        if alternative_names.is_empty() {
            self.common_name.clone()
        } else {
            alternative_names.join(", ")
        }
    }
}

/// Fields required to create a new server.
///
/// The alternate names are stored together with the server in a single
/// transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateServer {
    pub user_id: Uuid,
    pub organisation_id: Uuid,
    pub common_name: String,
    pub alternative_names: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> Server {
        Server {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            organisation_id: Uuid::new_v4(),
            common_name: "Night's Watch".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn display_name_joins_alternative_names() {
        let names = vec!["a.example.com".to_string(), "b.example.com".to_string()];
        assert_eq!(server().display_name(&names), "a.example.com, b.example.com");
    }

    #[test]
    fn display_name_falls_back_to_common_name() {
        assert_eq!(server().display_name(&[]), "Night's Watch");
    }
}
