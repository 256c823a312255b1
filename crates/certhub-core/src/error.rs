//! Error types for the certhub system.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CertHubError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    /// A unique or referential constraint rejected the write.
    ///
    /// Get-or-create callers treat this as "someone else created it first"
    /// and fall back to a lookup.
    #[error("Constraint violated on {entity}: {constraint}")]
    ConstraintViolation { entity: String, constraint: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Certificate error: {0}")]
    Certificate(String),

    #[error("Cryptography error: {0}")]
    Crypto(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type CertHubResult<T> = Result<T, CertHubError>;
