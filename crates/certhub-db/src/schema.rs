//! Schema definitions and migration runner for SurrealDB.
//!
//! All table definitions use SCHEMAFULL mode. UUIDs are stored as strings.
//! Every uniqueness rule the issuance workflow relies on is a UNIQUE index,
//! so a lost creation race surfaces as an index violation rather than a
//! duplicate row.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: SCHEMA_V1,
}];

// -----------------------------------------------------------------------
// Schema v1
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Organisations
-- =======================================================================
DEFINE TABLE organisation SCHEMAFULL;
DEFINE FIELD country ON TABLE organisation TYPE string \
    ASSERT string::len($value) == 2;
DEFINE FIELD province ON TABLE organisation TYPE string;
DEFINE FIELD locality ON TABLE organisation TYPE string;
DEFINE FIELD name ON TABLE organisation TYPE string;
DEFINE FIELD email ON TABLE organisation TYPE string;
DEFINE FIELD ca_rights ON TABLE organisation TYPE bool DEFAULT false;
DEFINE FIELD created_at ON TABLE organisation TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE organisation TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_organisation_email ON TABLE organisation \
    COLUMNS email UNIQUE;
DEFINE INDEX idx_organisation_ca_rights ON TABLE organisation \
    COLUMNS ca_rights;

-- =======================================================================
-- Users
-- =======================================================================
DEFINE TABLE user SCHEMAFULL;
DEFINE FIELD email ON TABLE user TYPE string;
DEFINE FIELD is_ca ON TABLE user TYPE bool DEFAULT false;
DEFINE FIELD organisation_id ON TABLE user TYPE string;
DEFINE FIELD created_at ON TABLE user TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE user TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_user_email ON TABLE user COLUMNS email UNIQUE;
DEFINE INDEX idx_user_organisation ON TABLE user COLUMNS organisation_id;

-- =======================================================================
-- Servers
-- =======================================================================
DEFINE TABLE server SCHEMAFULL;
DEFINE FIELD user_id ON TABLE server TYPE string;
DEFINE FIELD organisation_id ON TABLE server TYPE string;
DEFINE FIELD common_name ON TABLE server TYPE string;
DEFINE FIELD created_at ON TABLE server TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE server TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_server_common_name ON TABLE server \
    COLUMNS common_name UNIQUE;
DEFINE INDEX idx_server_user ON TABLE server COLUMNS user_id;
DEFINE INDEX idx_server_organisation ON TABLE server \
    COLUMNS organisation_id;

-- =======================================================================
-- Server alternate names
-- =======================================================================
DEFINE TABLE server_name SCHEMAFULL;
DEFINE FIELD server_id ON TABLE server_name TYPE string;
DEFINE FIELD name ON TABLE server_name TYPE string;
DEFINE FIELD created_at ON TABLE server_name TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_server_name_server_name ON TABLE server_name \
    COLUMNS server_id, name UNIQUE;

-- =======================================================================
-- Server private keys (one per server)
-- =======================================================================
DEFINE TABLE server_key SCHEMAFULL;
DEFINE FIELD server_id ON TABLE server_key TYPE string;
DEFINE FIELD private_key ON TABLE server_key TYPE string;
DEFINE FIELD created_at ON TABLE server_key TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_server_key_server ON TABLE server_key \
    COLUMNS server_id UNIQUE;

-- =======================================================================
-- Server certificates (one per server)
-- =======================================================================
DEFINE TABLE server_certificate SCHEMAFULL;
DEFINE FIELD server_id ON TABLE server_certificate TYPE string;
DEFINE FIELD self_signed ON TABLE server_certificate TYPE bool \
    DEFAULT false;
DEFINE FIELD csr ON TABLE server_certificate TYPE string;
DEFINE FIELD certificate ON TABLE server_certificate TYPE string;
DEFINE FIELD created_at ON TABLE server_certificate TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_server_certificate_server ON TABLE server_certificate \
    COLUMNS server_id UNIQUE;
DEFINE INDEX idx_server_certificate_self_signed \
    ON TABLE server_certificate COLUMNS self_signed;
";

// -----------------------------------------------------------------------
// Migration runner
// -----------------------------------------------------------------------

/// Run all pending migrations against the database.
///
/// Creates a `_migration` tracking table on first run, then applies
/// each migration whose version exceeds the current maximum.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let mut result = db
        .query("SELECT version FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    let current_version = records.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );

        db.query(migration.sql).await?.check().map_err(|e| {
            DbError::Migration(format!(
                "Migration v{} '{}' failed: {}",
                migration.version, migration.name, e,
            ))
        })?;

        db.query("CREATE _migration SET version = $version, name = $name")
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "Failed to record migration v{}: {}",
                    migration.version, e,
                ))
            })?;

        info!(version = migration.version, "Migration applied");
    }

    Ok(())
}

/// Returns the raw schema DDL for version 1.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_ordered() {
        for window in MIGRATIONS.windows(2) {
            assert!(
                window[0].version < window[1].version,
                "Migrations must be in ascending version order"
            );
        }
    }

    #[test]
    fn schema_declares_every_unique_index() {
        for index in [
            "idx_server_common_name",
            "idx_server_name_server_name",
            "idx_server_key_server",
            "idx_server_certificate_server",
            "idx_organisation_email",
            "idx_user_email",
        ] {
            let line = SCHEMA_V1
                .split(';')
                .find(|stmt| stmt.contains(index))
                .unwrap_or_else(|| panic!("missing index {index}"));
            assert!(line.contains("UNIQUE"), "{index} must be UNIQUE");
        }
    }
}
