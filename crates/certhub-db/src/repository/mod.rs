//! SurrealDB repository implementations.

mod certificate;
mod key;
mod organisation;
mod server;
mod user;

pub use certificate::SurrealCertificateRepository;
pub use key::SurrealKeyRepository;
pub use organisation::SurrealOrganisationRepository;
pub use server::SurrealServerRepository;
pub use user::SurrealUserRepository;

use uuid::Uuid;

use crate::error::DbError;

/// Parse a UUID stored as a string column.
fn parse_uuid(value: &str, field: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(value).map_err(|e| DbError::Decode(format!("invalid {field} UUID: {e}")))
}
