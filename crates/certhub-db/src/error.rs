//! Database-specific error types and conversions.

use certhub_core::error::CertHubError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Invalid stored value: {0}")]
    Decode(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    /// A write was rejected by a UNIQUE index or a reference guard.
    #[error("Constraint violated on {entity}: {constraint}")]
    Constraint { entity: String, constraint: String },
}

impl DbError {
    pub(crate) fn not_found(entity: &str, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub(crate) fn constraint(entity: &str, constraint: &str) -> Self {
        DbError::Constraint {
            entity: entity.into(),
            constraint: constraint.into(),
        }
    }
}

impl From<DbError> for CertHubError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => CertHubError::NotFound { entity, id },
            DbError::Constraint { entity, constraint } => {
                CertHubError::ConstraintViolation { entity, constraint }
            }
            other => CertHubError::Database(other.to_string()),
        }
    }
}
