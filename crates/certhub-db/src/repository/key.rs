//! SurrealDB implementation of [`KeyRepository`].

use certhub_core::error::CertHubResult;
use certhub_core::models::key::{CreateKey, Key};
use certhub_core::repository::KeyRepository;
use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::parse_uuid;
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct KeyRow {
    server_id: String,
    private_key: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct KeyRowWithId {
    record_id: String,
    server_id: String,
    private_key: String,
    created_at: DateTime<Utc>,
}

impl KeyRow {
    fn into_key(self, id: Uuid) -> Result<Key, DbError> {
        Ok(Key {
            id,
            server_id: parse_uuid(&self.server_id, "server")?,
            private_key: self.private_key,
            created_at: self.created_at,
        })
    }
}

impl KeyRowWithId {
    fn try_into_key(self) -> Result<Key, DbError> {
        Ok(Key {
            id: parse_uuid(&self.record_id, "key")?,
            server_id: parse_uuid(&self.server_id, "server")?,
            private_key: self.private_key,
            created_at: self.created_at,
        })
    }
}

/// SurrealDB implementation of the Key repository.
#[derive(Clone)]
pub struct SurrealKeyRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealKeyRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> KeyRepository for SurrealKeyRepository<C> {
    async fn create(&self, input: CreateKey) -> CertHubResult<Key> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let server_id = input.server_id;

        let result = self
            .db
            .query(
                "CREATE type::record('server_key', $id) SET \
                 server_id = $server_id, private_key = $private_key",
            )
            .bind(("id", id_str.clone()))
            .bind(("server_id", input.server_id.to_string()))
            .bind(("private_key", input.private_key))
            .await
            .map_err(DbError::from)?;

        let mut result = match result.check() {
            Ok(result) => result,
            Err(e) => {
                if self.get_by_server(server_id).await.is_ok() {
                    return Err(DbError::constraint("key", "one key per server").into());
                }
                return Err(DbError::Query(e.to_string()).into());
            }
        };

        let rows: Vec<KeyRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("key", id_str))?;

        Ok(row.into_key(id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> CertHubResult<Key> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('server_key', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<KeyRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("key", id_str))?;

        Ok(row.into_key(id)?)
    }

    async fn get_by_server(&self, server_id: Uuid) -> CertHubResult<Key> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM server_key WHERE server_id = $server_id",
            )
            .bind(("server_id", server_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<KeyRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("key", format!("server_id={server_id}")))?;

        Ok(row.try_into_key()?)
    }
}
