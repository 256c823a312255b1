//! SurrealDB implementation of [`OrganisationRepository`].

use certhub_core::error::CertHubResult;
use certhub_core::models::organisation::{CreateOrganisation, Organisation};
use certhub_core::repository::OrganisationRepository;
use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::parse_uuid;
use crate::error::DbError;

/// Message thrown by the delete guard; matched when classifying errors.
const STILL_REFERENCED: &str = "organisation is still referenced";

/// DB-side row struct for queries where the UUID is already known.
#[derive(Debug, SurrealValue)]
struct OrganisationRow {
    country: String,
    province: String,
    locality: String,
    name: String,
    email: String,
    ca_rights: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrganisationRow {
    fn into_organisation(self, id: Uuid) -> Organisation {
        Organisation {
            id,
            country: self.country,
            province: self.province,
            locality: self.locality,
            name: self.name,
            email: self.email,
            ca_rights: self.ca_rights,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// DB-side row struct that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct OrganisationRowWithId {
    record_id: String,
    country: String,
    province: String,
    locality: String,
    name: String,
    email: String,
    ca_rights: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrganisationRowWithId {
    fn try_into_organisation(self) -> Result<Organisation, DbError> {
        Ok(Organisation {
            id: parse_uuid(&self.record_id, "organisation")?,
            country: self.country,
            province: self.province,
            locality: self.locality,
            name: self.name,
            email: self.email,
            ca_rights: self.ca_rights,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the Organisation repository.
#[derive(Clone)]
pub struct SurrealOrganisationRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealOrganisationRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> OrganisationRepository for SurrealOrganisationRepository<C> {
    async fn create(&self, input: CreateOrganisation) -> CertHubResult<Organisation> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let email = input.email.clone();

        let result = self
            .db
            .query(
                "CREATE type::record('organisation', $id) SET \
                 country = $country, province = $province, \
                 locality = $locality, name = $name, \
                 email = $email, ca_rights = $ca_rights",
            )
            .bind(("id", id_str.clone()))
            .bind(("country", input.country))
            .bind(("province", input.province))
            .bind(("locality", input.locality))
            .bind(("name", input.name))
            .bind(("email", input.email))
            .bind(("ca_rights", input.ca_rights))
            .await
            .map_err(DbError::from)?;

        let mut result = match result.check() {
            Ok(result) => result,
            Err(e) => {
                if self.get_by_email(&email).await.is_ok() {
                    return Err(
                        DbError::constraint("organisation", "email must be unique").into(),
                    );
                }
                return Err(DbError::Query(e.to_string()).into());
            }
        };

        let rows: Vec<OrganisationRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("organisation", id_str))?;

        Ok(row.into_organisation(id))
    }

    async fn get_by_id(&self, id: Uuid) -> CertHubResult<Organisation> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('organisation', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<OrganisationRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("organisation", id_str))?;

        Ok(row.into_organisation(id))
    }

    async fn get_by_email(&self, email: &str) -> CertHubResult<Organisation> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM organisation WHERE email = $email",
            )
            .bind(("email", email.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<OrganisationRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("organisation", format!("email={email}")))?;

        Ok(row.try_into_organisation()?)
    }

    async fn get_by_ca_rights(&self, ca_rights: bool) -> CertHubResult<Organisation> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM organisation WHERE ca_rights = $ca_rights \
                 ORDER BY created_at ASC LIMIT 1",
            )
            .bind(("ca_rights", ca_rights))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<OrganisationRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| {
            DbError::not_found("organisation", format!("ca_rights={ca_rights}"))
        })?;

        Ok(row.try_into_organisation()?)
    }

    async fn delete(&self, id: Uuid) -> CertHubResult<()> {
        let result = self
            .db
            .query(
                "LET $users = (SELECT VALUE id FROM user \
                     WHERE organisation_id = $id LIMIT 1); \
                 LET $servers = (SELECT VALUE id FROM server \
                     WHERE organisation_id = $id LIMIT 1); \
                 IF array::len($users) + array::len($servers) > 0 { \
                     THROW $message; \
                 } ELSE { \
                     DELETE type::record('organisation', $id); \
                 };",
            )
            .bind(("id", id.to_string()))
            .bind(("message", STILL_REFERENCED))
            .await
            .map_err(DbError::from)?;

        result.check().map_err(|e| {
            let message = e.to_string();
            if message.contains(STILL_REFERENCED) {
                DbError::constraint("organisation", STILL_REFERENCED)
            } else {
                DbError::Query(message)
            }
        })?;

        Ok(())
    }
}
