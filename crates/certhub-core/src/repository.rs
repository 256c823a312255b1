//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Lookups return
//! [`CertHubError::NotFound`] when nothing matches, and creates that hit a
//! unique index return [`CertHubError::ConstraintViolation`] so that
//! get-or-create callers can fall back to a lookup.
//!
//! [`CertHubError::NotFound`]: crate::error::CertHubError::NotFound
//! [`CertHubError::ConstraintViolation`]: crate::error::CertHubError::ConstraintViolation

use uuid::Uuid;

use crate::error::CertHubResult;
use crate::models::{
    certificate::{Certificate, CreateCertificate},
    key::{CreateKey, Key},
    organisation::{CreateOrganisation, Organisation},
    server::{CreateServer, Server},
    user::{CreateUser, User},
};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

pub trait OrganisationRepository: Send + Sync {
    fn create(
        &self,
        input: CreateOrganisation,
    ) -> impl Future<Output = CertHubResult<Organisation>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = CertHubResult<Organisation>> + Send;
    fn get_by_email(&self, email: &str)
    -> impl Future<Output = CertHubResult<Organisation>> + Send;
    /// Oldest organisation with the given `ca_rights` flag.
    fn get_by_ca_rights(
        &self,
        ca_rights: bool,
    ) -> impl Future<Output = CertHubResult<Organisation>> + Send;
    /// Refused with `ConstraintViolation` while users or servers reference
    /// the organisation.
    fn delete(&self, id: Uuid) -> impl Future<Output = CertHubResult<()>> + Send;
}

pub trait UserRepository: Send + Sync {
    fn create(&self, input: CreateUser) -> impl Future<Output = CertHubResult<User>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = CertHubResult<User>> + Send;
    fn get_by_email(&self, email: &str) -> impl Future<Output = CertHubResult<User>> + Send;
    /// The single user with `is_ca` set.
    fn get_ca(&self) -> impl Future<Output = CertHubResult<User>> + Send;
}

// ---------------------------------------------------------------------------
// PKI
// ---------------------------------------------------------------------------

pub trait ServerRepository: Send + Sync {
    /// Create a server and its alternate names atomically.
    fn create(&self, input: CreateServer) -> impl Future<Output = CertHubResult<Server>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = CertHubResult<Server>> + Send;
    fn get_by_common_name(
        &self,
        common_name: &str,
    ) -> impl Future<Output = CertHubResult<Server>> + Send;
    /// Oldest server owned by the user.
    fn get_by_user(&self, user_id: Uuid) -> impl Future<Output = CertHubResult<Server>> + Send;
    fn list_by_user(&self, user_id: Uuid)
    -> impl Future<Output = CertHubResult<Vec<Server>>> + Send;
    /// Alternate names of a server, sorted.
    fn alternative_names(
        &self,
        server_id: Uuid,
    ) -> impl Future<Output = CertHubResult<Vec<String>>> + Send;
    /// Delete a server together with its names, key and certificate.
    fn delete(&self, id: Uuid) -> impl Future<Output = CertHubResult<()>> + Send;
}

pub trait KeyRepository: Send + Sync {
    fn create(&self, input: CreateKey) -> impl Future<Output = CertHubResult<Key>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = CertHubResult<Key>> + Send;
    fn get_by_server(&self, server_id: Uuid) -> impl Future<Output = CertHubResult<Key>> + Send;
}

pub trait CertificateRepository: Send + Sync {
    fn create(
        &self,
        input: CreateCertificate,
    ) -> impl Future<Output = CertHubResult<Certificate>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = CertHubResult<Certificate>> + Send;
    fn get_by_server(
        &self,
        server_id: Uuid,
    ) -> impl Future<Output = CertHubResult<Certificate>> + Send;
    /// Every self-signed certificate, oldest first. More than one entry
    /// means the single-root invariant is broken.
    fn list_self_signed(&self) -> impl Future<Output = CertHubResult<Vec<Certificate>>> + Send;
}
