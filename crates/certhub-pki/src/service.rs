//! Issuance orchestration.
//!
//! Each server moves through `NoServer -> ServerCreated -> KeyCreated ->
//! CertificateIssued`. Every step checks for the existing row first and
//! otherwise performs exactly the next creation, so a chain interrupted by
//! an error resumes where it stopped on the next call.

use certhub_core::error::{CertHubError, CertHubResult};
use certhub_core::models::certificate::{Certificate, CreateCertificate};
use certhub_core::models::key::{CreateKey, Key};
use certhub_core::models::server::Server;
use certhub_core::models::user::User;
use certhub_core::repository::{
    CertificateRepository, KeyRepository, OrganisationRepository, ServerRepository,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::codec::{self, SubjectFields};
use crate::config::PkiConfig;
use crate::error::{MAX_ATTEMPTS, PkiError, PkiResult, unsettled};
use crate::keys;
use crate::registry::ServerRegistry;

/// A server together with its key and certificate.
#[derive(Debug, Clone)]
pub struct IssuedServer {
    pub server: Server,
    pub key: Key,
    pub certificate: Certificate,
    /// Whether this call issued the certificate.
    pub created: bool,
}

#[derive(Debug, Clone)]
pub enum Bootstrap {
    Created(IssuedServer),
    AlreadyBootstrapped,
}

/// One row of a user's server listing.
#[derive(Debug, Clone)]
pub struct ServerSummary {
    pub server: Server,
    pub names: Vec<String>,
    pub display_name: String,
    pub key_id: Option<Uuid>,
    pub certificate_id: Option<Uuid>,
}

pub struct IssuanceService<O, S, K, C> {
    config: PkiConfig,
    organisations: O,
    registry: ServerRegistry<S>,
    keys: K,
    certificates: C,
}

impl<O, S, K, C> IssuanceService<O, S, K, C>
where
    O: OrganisationRepository,
    S: ServerRepository,
    K: KeyRepository,
    C: CertificateRepository,
{
    pub fn new(config: PkiConfig, organisations: O, servers: S, keys: K, certificates: C) -> Self {
        let registry = ServerRegistry::new(servers, config.ca_name.clone());
        Self {
            config,
            organisations,
            registry,
            keys,
            certificates,
        }
    }

    pub fn registry(&self) -> &ServerRegistry<S> {
        &self.registry
    }

    /// Create the CA server, its key and the self-signed root.
    ///
    /// Returns [`Bootstrap::AlreadyBootstrapped`] without touching anything
    /// once any root exists, including one issued by a concurrent caller.
    pub async fn bootstrap_ca(&self, ca: &User) -> PkiResult<Bootstrap> {
        if !self.certificates.list_self_signed().await?.is_empty() {
            info!("root certificate already exists");
            return Ok(Bootstrap::AlreadyBootstrapped);
        }

        match self.bootstrap_chain(ca).await {
            Ok(issued) if issued.created => {
                info!(
                    server_id = %issued.server.id,
                    certificate_id = %issued.certificate.id,
                    "CA bootstrapped"
                );
                Ok(Bootstrap::Created(issued))
            }
            Ok(_) => Ok(Bootstrap::AlreadyBootstrapped),
            Err(PkiError::DuplicateRoot) => {
                warn!(ca = %ca.email, "another server holds the root certificate");
                Ok(Bootstrap::AlreadyBootstrapped)
            }
            Err(e) => Err(e),
        }
    }

    async fn bootstrap_chain(&self, ca: &User) -> PkiResult<IssuedServer> {
        let (server, _) = self.registry.get_or_create_for_ca(ca).await?;
        let (key, _) = self.get_or_create_server_key(&server).await?;
        let (certificate, created) = self
            .get_or_create_server_certificate(&server, true)
            .await?;
        Ok(IssuedServer {
            server,
            key,
            certificate,
            created,
        })
    }

    /// Resolve the tenant server for `names`, then its key, then a
    /// certificate signed by the root.
    pub async fn issue_for_tenant(&self, user: &User, names: &[String]) -> PkiResult<IssuedServer> {
        if user.is_ca {
            return Err(CertHubError::Validation {
                message: "the CA holds the root certificate and cannot request a leaf".into(),
            }
            .into());
        }

        let (server, _) = self
            .registry
            .get_or_create_for_alternate_names(user, names)
            .await?;
        let (key, _) = self.get_or_create_server_key(&server).await?;
        let (certificate, created) = self
            .get_or_create_server_certificate(&server, false)
            .await?;

        Ok(IssuedServer {
            server,
            key,
            certificate,
            created,
        })
    }

    pub async fn get_or_create_server_key(&self, server: &Server) -> PkiResult<(Key, bool)> {
        for attempt in 1..=MAX_ATTEMPTS {
            if let Some(key) = found(self.keys.get_by_server(server.id).await)? {
                return Ok((key, false));
            }

            let (size, exponent) = (self.config.rsa_key_size, self.config.rsa_public_exponent);
            let private_key = blocking(move || keys::generate_rsa_key(size, exponent)).await?;

            let input = CreateKey {
                server_id: server.id,
                private_key,
            };
            match self.keys.create(input).await {
                Ok(key) => {
                    info!(server_id = %server.id, key_id = %key.id, bits = size, "server key created");
                    return Ok((key, true));
                }
                Err(CertHubError::ConstraintViolation { .. }) => {
                    debug!(attempt, server_id = %server.id, "key created concurrently, retrying lookup");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(unsettled("key"))
    }

    /// Return the server's certificate, issuing it if absent.
    ///
    /// Without `self_signed` a CSR is built from the server's organisation
    /// and names and signed by the root. With it the certificate becomes
    /// the root, failing with [`PkiError::DuplicateRoot`] if another server
    /// already holds one.
    ///
    /// The root check is a read before the insert with no index behind it:
    /// two concurrent self-signed requests for different servers can both
    /// store a root. [`Self::bootstrap_ca`] is unaffected since the CA name
    /// belongs to one server; other callers must serialise root requests.
    /// Tenant issuance reports any extra root as `DuplicateRoot`.
    pub async fn get_or_create_server_certificate(
        &self,
        server: &Server,
        self_signed: bool,
    ) -> PkiResult<(Certificate, bool)> {
        for attempt in 1..=MAX_ATTEMPTS {
            if let Some(certificate) = found(self.certificates.get_by_server(server.id).await)? {
                return Ok((certificate, false));
            }

            let input = if self_signed {
                self.build_root(server).await?
            } else {
                self.build_leaf(server).await?
            };

            match self.certificates.create(input).await {
                Ok(certificate) => {
                    info!(
                        server_id = %server.id,
                        certificate_id = %certificate.id,
                        self_signed,
                        "certificate issued"
                    );
                    return Ok((certificate, true));
                }
                Err(CertHubError::ConstraintViolation { .. }) => {
                    debug!(attempt, server_id = %server.id, "certificate created concurrently, retrying lookup");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(unsettled("certificate"))
    }

    pub async fn certificate_pem(&self, id: Uuid) -> PkiResult<String> {
        Ok(self.certificates.get_by_id(id).await?.certificate)
    }

    pub async fn key_pem(&self, id: Uuid) -> PkiResult<String> {
        Ok(self.keys.get_by_id(id).await?.private_key)
    }

    /// PEM of the single self-signed root.
    pub async fn root_certificate(&self) -> PkiResult<String> {
        Ok(self.root().await?.certificate)
    }

    pub async fn servers_for_user(&self, user: &User) -> PkiResult<Vec<ServerSummary>> {
        let servers = self.registry.list_for_user(user).await?;
        let mut summaries = Vec::with_capacity(servers.len());

        for server in servers {
            let names = self.registry.alternative_names(&server).await?;
            let key_id = found(self.keys.get_by_server(server.id).await)?.map(|key| key.id);
            let certificate_id =
                found(self.certificates.get_by_server(server.id).await)?.map(|cert| cert.id);

            summaries.push(ServerSummary {
                display_name: server.display_name(&names),
                server,
                names,
                key_id,
                certificate_id,
            });
        }

        Ok(summaries)
    }

    async fn root(&self) -> PkiResult<Certificate> {
        let mut roots = self.certificates.list_self_signed().await?;
        match roots.len() {
            0 => Err(PkiError::RootNotBootstrapped),
            1 => Ok(roots.remove(0)),
            count => {
                warn!(count, "more than one self-signed certificate stored");
                Err(PkiError::DuplicateRoot)
            }
        }
    }

    async fn build_root(&self, server: &Server) -> PkiResult<CreateCertificate> {
        let roots = self.certificates.list_self_signed().await?;
        if roots.iter().any(|root| root.server_id != server.id) {
            return Err(PkiError::DuplicateRoot);
        }

        let subject = self.subject(server).await?;
        let key = self.keys.get_by_server(server.id).await?;
        let days = self.config.ca_validity_days;

        let certificate = blocking(move || {
            codec::generate_self_signed_certificate(&subject, &key.private_key, days)
        })
        .await?;

        Ok(CreateCertificate {
            server_id: server.id,
            self_signed: true,
            csr: String::new(),
            certificate,
        })
    }

    async fn build_leaf(&self, server: &Server) -> PkiResult<CreateCertificate> {
        let root = self.root().await?;
        let root_key = self.keys.get_by_server(root.server_id).await?;

        let subject = self.subject(server).await?;
        let names = self.registry.alternative_names(server).await?;
        let key = self.keys.get_by_server(server.id).await?;
        let days = self.config.server_validity_days;

        let (csr, certificate) = blocking(move || {
            let csr = codec::generate_csr(&subject, &names, &key.private_key)?;
            let certificate =
                codec::sign_csr(&csr, &root.certificate, &root_key.private_key, days)?;
            Ok((csr, certificate))
        })
        .await?;

        Ok(CreateCertificate {
            server_id: server.id,
            self_signed: false,
            csr,
            certificate,
        })
    }

    async fn subject(&self, server: &Server) -> PkiResult<SubjectFields> {
        let organisation = self.organisations.get_by_id(server.organisation_id).await?;
        Ok(SubjectFields {
            country: organisation.country,
            province: organisation.province,
            locality: organisation.locality,
            organisation: organisation.name,
            common_name: server.common_name.clone(),
            email: organisation.email,
        })
    }
}

/// Treat `NotFound` as absence.
fn found<T>(result: CertHubResult<T>) -> PkiResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(CertHubError::NotFound { .. }) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Run CPU-bound crypto on the blocking pool.
async fn blocking<T, F>(task: F) -> PkiResult<T>
where
    F: FnOnce() -> PkiResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| PkiError::Store(CertHubError::Internal(format!("crypto task failed: {e}"))))?
}
