//! SurrealDB implementation of [`ServerRepository`].
//!
//! A server and its alternate names are written in one transaction, and
//! deleting a server removes its names, key and certificate with it.

use certhub_core::error::CertHubResult;
use certhub_core::models::server::{CreateServer, Server};
use certhub_core::repository::ServerRepository;
use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::debug;
use uuid::Uuid;

use super::parse_uuid;
use crate::error::DbError;

/// DB-side row struct for queries where the UUID is already known.
#[derive(Debug, SurrealValue)]
struct ServerRow {
    user_id: String,
    organisation_id: String,
    common_name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// DB-side row struct that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct ServerRowWithId {
    record_id: String,
    user_id: String,
    organisation_id: String,
    common_name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Row struct for alternate-name queries.
#[derive(Debug, SurrealValue)]
struct ServerNameRow {
    name: String,
}

impl ServerRow {
    fn into_server(self, id: Uuid) -> Result<Server, DbError> {
        Ok(Server {
            id,
            user_id: parse_uuid(&self.user_id, "user")?,
            organisation_id: parse_uuid(&self.organisation_id, "organisation")?,
            common_name: self.common_name,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl ServerRowWithId {
    fn try_into_server(self) -> Result<Server, DbError> {
        let id = parse_uuid(&self.record_id, "server")?;
        ServerRow {
            user_id: self.user_id,
            organisation_id: self.organisation_id,
            common_name: self.common_name,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
        .into_server(id)
    }
}

/// SurrealDB implementation of the Server repository.
#[derive(Clone)]
pub struct SurrealServerRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealServerRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> ServerRepository for SurrealServerRepository<C> {
    async fn create(&self, input: CreateServer) -> CertHubResult<Server> {
        let id = Uuid::new_v4();
        let common_name = input.common_name.clone();

        let result = self
            .db
            .query(
                "BEGIN TRANSACTION; \
                 CREATE type::record('server', $id) SET \
                     user_id = $user_id, \
                     organisation_id = $organisation_id, \
                     common_name = $common_name; \
                 FOR $name IN $names { \
                     CREATE server_name SET server_id = $id, name = $name; \
                 }; \
                 COMMIT TRANSACTION;",
            )
            .bind(("id", id.to_string()))
            .bind(("user_id", input.user_id.to_string()))
            .bind(("organisation_id", input.organisation_id.to_string()))
            .bind(("common_name", input.common_name))
            .bind(("names", input.alternative_names))
            .await
            .map_err(DbError::from)?;

        if let Err(e) = result.check() {
            // A concurrent writer holding the same common name wins the
            // UNIQUE index; anything else is a genuine failure.
            if self.get_by_common_name(&common_name).await.is_ok() {
                debug!(%common_name, "server already created by a concurrent writer");
                return Err(
                    DbError::constraint("server", "common_name must be unique").into(),
                );
            }
            return Err(DbError::Query(e.to_string()).into());
        }

        self.get_by_id(id).await
    }

    async fn get_by_id(&self, id: Uuid) -> CertHubResult<Server> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('server', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ServerRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("server", id_str))?;

        Ok(row.into_server(id)?)
    }

    async fn get_by_common_name(&self, common_name: &str) -> CertHubResult<Server> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM server WHERE common_name = $common_name",
            )
            .bind(("common_name", common_name.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ServerRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| {
            DbError::not_found("server", format!("common_name={common_name}"))
        })?;

        Ok(row.try_into_server()?)
    }

    async fn get_by_user(&self, user_id: Uuid) -> CertHubResult<Server> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM server WHERE user_id = $user_id \
                 ORDER BY created_at ASC LIMIT 1",
            )
            .bind(("user_id", user_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ServerRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("server", format!("user_id={user_id}")))?;

        Ok(row.try_into_server()?)
    }

    async fn list_by_user(&self, user_id: Uuid) -> CertHubResult<Vec<Server>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM server WHERE user_id = $user_id \
                 ORDER BY created_at ASC",
            )
            .bind(("user_id", user_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ServerRowWithId> = result.take(0).map_err(DbError::from)?;

        let servers = rows
            .into_iter()
            .map(ServerRowWithId::try_into_server)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(servers)
    }

    async fn alternative_names(&self, server_id: Uuid) -> CertHubResult<Vec<String>> {
        let mut result = self
            .db
            .query(
                "SELECT name FROM server_name \
                 WHERE server_id = $server_id ORDER BY name ASC",
            )
            .bind(("server_id", server_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ServerNameRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.into_iter().map(|row| row.name).collect())
    }

    async fn delete(&self, id: Uuid) -> CertHubResult<()> {
        self.db
            .query(
                "BEGIN TRANSACTION; \
                 DELETE server_name WHERE server_id = $id; \
                 DELETE server_key WHERE server_id = $id; \
                 DELETE server_certificate WHERE server_id = $id; \
                 DELETE type::record('server', $id); \
                 COMMIT TRANSACTION;",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        Ok(())
    }
}
