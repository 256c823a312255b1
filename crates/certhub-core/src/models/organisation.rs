//! Organisation domain model.
//!
//! Organisations supply the subject fields (country, province, locality,
//! name, email) of every certificate issued for their servers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An organisation owning users and servers.
///
/// Exactly one organisation carries `ca_rights`: the one whose details
/// appear on the root certificate. A second organisation acts as the
/// default home for tenant users.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Organisation {
    pub id: Uuid,
    /// Two-letter ISO country code.
    pub country: String,
    pub province: String,
    pub locality: String,
    pub name: String,
    /// Unique contact address, also written into certificate subjects.
    pub email: String,
    pub ca_rights: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to create a new organisation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrganisation {
    pub country: String,
    pub province: String,
    pub locality: String,
    pub name: String,
    pub email: String,
    pub ca_rights: bool,
}
