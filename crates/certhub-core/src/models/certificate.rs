//! Certificate domain model.
//!
//! certhub runs a two-level PKI: one self-signed root certificate, held by
//! the CA's server, signs a leaf certificate for every tenant server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The certificate of a server. One per server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Certificate {
    pub id: Uuid,
    pub server_id: Uuid,
    /// `true` only for the root certificate.
    pub self_signed: bool,
    /// PEM-encoded signing request. Empty for the root.
    pub csr: String,
    /// PEM-encoded X.509 certificate.
    pub certificate: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCertificate {
    pub server_id: Uuid,
    pub self_signed: bool,
    pub csr: String,
    pub certificate: String,
}
