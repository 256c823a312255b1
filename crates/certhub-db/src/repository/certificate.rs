//! SurrealDB implementation of [`CertificateRepository`].

use certhub_core::error::CertHubResult;
use certhub_core::models::certificate::{Certificate, CreateCertificate};
use certhub_core::repository::CertificateRepository;
use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::parse_uuid;
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct CertificateRow {
    server_id: String,
    self_signed: bool,
    csr: String,
    certificate: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct CertificateRowWithId {
    record_id: String,
    server_id: String,
    self_signed: bool,
    csr: String,
    certificate: String,
    created_at: DateTime<Utc>,
}

impl CertificateRow {
    fn into_certificate(self, id: Uuid) -> Result<Certificate, DbError> {
        Ok(Certificate {
            id,
            server_id: parse_uuid(&self.server_id, "server")?,
            self_signed: self.self_signed,
            csr: self.csr,
            certificate: self.certificate,
            created_at: self.created_at,
        })
    }
}

impl CertificateRowWithId {
    fn try_into_certificate(self) -> Result<Certificate, DbError> {
        let id = parse_uuid(&self.record_id, "certificate")?;
        CertificateRow {
            server_id: self.server_id,
            self_signed: self.self_signed,
            csr: self.csr,
            certificate: self.certificate,
            created_at: self.created_at,
        }
        .into_certificate(id)
    }
}

/// SurrealDB implementation of the Certificate repository.
#[derive(Clone)]
pub struct SurrealCertificateRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealCertificateRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> CertificateRepository for SurrealCertificateRepository<C> {
    async fn create(&self, input: CreateCertificate) -> CertHubResult<Certificate> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let server_id = input.server_id;

        let result = self
            .db
            .query(
                "CREATE type::record('server_certificate', $id) SET \
                 server_id = $server_id, self_signed = $self_signed, \
                 csr = $csr, certificate = $certificate",
            )
            .bind(("id", id_str.clone()))
            .bind(("server_id", input.server_id.to_string()))
            .bind(("self_signed", input.self_signed))
            .bind(("csr", input.csr))
            .bind(("certificate", input.certificate))
            .await
            .map_err(DbError::from)?;

        let mut result = match result.check() {
            Ok(result) => result,
            Err(e) => {
                if self.get_by_server(server_id).await.is_ok() {
                    return Err(
                        DbError::constraint("certificate", "one certificate per server").into(),
                    );
                }
                return Err(DbError::Query(e.to_string()).into());
            }
        };

        let rows: Vec<CertificateRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("certificate", id_str))?;

        Ok(row.into_certificate(id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> CertHubResult<Certificate> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('server_certificate', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CertificateRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("certificate", id_str))?;

        Ok(row.into_certificate(id)?)
    }

    async fn get_by_server(&self, server_id: Uuid) -> CertHubResult<Certificate> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM server_certificate WHERE server_id = $server_id",
            )
            .bind(("server_id", server_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CertificateRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| {
            DbError::not_found("certificate", format!("server_id={server_id}"))
        })?;

        Ok(row.try_into_certificate()?)
    }

    async fn list_self_signed(&self) -> CertHubResult<Vec<Certificate>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM server_certificate WHERE self_signed = true \
                 ORDER BY created_at ASC",
            )
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CertificateRowWithId> = result.take(0).map_err(DbError::from)?;

        let certificates = rows
            .into_iter()
            .map(CertificateRowWithId::try_into_certificate)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(certificates)
    }
}
