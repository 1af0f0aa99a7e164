//! Postgres-backed status store
//!
//! The configured database name selects a schema and the collection name a
//! table. Both are created on connect.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info};

use crate::errors::StatusStoreError;
use crate::models::status::{ExecutionStatus, StatusKey, StatusRecord};
use crate::storage::status::{StatusStore, StatusStoreConnector};

const MAX_IDENTIFIER_LEN: usize = 63;

/// Connects to Postgres for `postgres://` and `postgresql://` connection strings
#[derive(Debug, Clone)]
pub struct PostgresConnector {
    acquire_timeout: Duration,
}

impl PostgresConnector {
    pub fn new(acquire_timeout: Duration) -> Self {
        Self { acquire_timeout }
    }
}

impl Default for PostgresConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl StatusStoreConnector for PostgresConnector {
    async fn connect(
        &self,
        connection_string: &str,
        database: &str,
        collection: &str,
    ) -> Result<Box<dyn StatusStore>, StatusStoreError> {
        let connection_string = connection_string.trim();
        if connection_string.is_empty() {
            return Err(StatusStoreError::NotConfigured);
        }
        if !is_postgres_url(connection_string) {
            return Err(StatusStoreError::UnsupportedBackend);
        }

        let table = qualified_table(database, collection)?;

        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(self.acquire_timeout)
            .connect(connection_string)
            .await
            .map_err(|e| StatusStoreError::Connection(e.to_string()))?;

        let store = PostgresStatusStore { pool, table };
        store.ensure_table(database, collection).await?;
        info!(table = %store.table, "Status store ready");

        Ok(Box::new(store))
    }
}

/// Status records in one Postgres table
pub struct PostgresStatusStore {
    pool: PgPool,
    table: String,
}

impl PostgresStatusStore {
    async fn ensure_table(&self, schema: &str, table: &str) -> Result<(), StatusStoreError> {
        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS \"{}\"", schema))
            .execute(&self.pool)
            .await?;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {}
            (subscription_id TEXT NOT NULL,
             resource_group_name TEXT NOT NULL,
             correlation_id TEXT NOT NULL,
             agent_name TEXT NOT NULL,
             item_name TEXT NOT NULL,
             item_type TEXT NOT NULL,
             installation_name TEXT NOT NULL,
             execution_status TEXT NOT NULL,
             output TEXT NOT NULL,
             reported_on TIMESTAMPTZ NOT NULL,
             is_active BOOLEAN NOT NULL)
            "#,
            self.table
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS "{}_active_key" ON {}
            (subscription_id, resource_group_name, correlation_id, agent_name)
            WHERE is_active
            "#,
            table, self.table
        ))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl StatusStore for PostgresStatusStore {
    async fn record_status(&self, record: &StatusRecord) -> Result<(), StatusStoreError> {
        debug!(
            correlation_id = %record.key.correlation_id,
            status = %record.execution_status,
            "Upserting status record"
        );

        sqlx::query(&format!(
            r#"
            INSERT INTO {}
            (subscription_id, resource_group_name, correlation_id, agent_name,
             item_name, item_type, installation_name, execution_status,
             output, reported_on, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (subscription_id, resource_group_name, correlation_id, agent_name)
            WHERE is_active
            DO UPDATE
            SET item_name = EXCLUDED.item_name,
                item_type = EXCLUDED.item_type,
                installation_name = EXCLUDED.installation_name,
                execution_status = EXCLUDED.execution_status,
                output = EXCLUDED.output,
                reported_on = EXCLUDED.reported_on
            "#,
            self.table
        ))
        .bind(&record.key.subscription_id)
        .bind(&record.key.resource_group_name)
        .bind(&record.key.correlation_id)
        .bind(&record.key.agent_name)
        .bind(&record.item_name)
        .bind(&record.item_type)
        .bind(&record.installation_name)
        .bind(record.execution_status.as_str())
        .bind(&record.output)
        .bind(record.reported_on)
        .bind(record.is_active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn active_status(&self, key: &StatusKey) -> Result<Option<StatusRecord>, StatusStoreError> {
        let row = sqlx::query(&format!(
            r#"
            SELECT subscription_id, resource_group_name, correlation_id, agent_name,
                   item_name, item_type, installation_name, execution_status,
                   output, reported_on, is_active
            FROM {}
            WHERE subscription_id = $1
              AND resource_group_name = $2
              AND correlation_id = $3
              AND agent_name = $4
              AND is_active
            "#,
            self.table
        ))
        .bind(&key.subscription_id)
        .bind(&key.resource_group_name)
        .bind(&key.correlation_id)
        .bind(&key.agent_name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| record_from_row(&row)).transpose()
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

fn record_from_row(row: &PgRow) -> Result<StatusRecord, StatusStoreError> {
    let status: String = row.try_get("execution_status")?;

    Ok(StatusRecord {
        key: StatusKey {
            subscription_id: row.try_get("subscription_id")?,
            resource_group_name: row.try_get("resource_group_name")?,
            correlation_id: row.try_get("correlation_id")?,
            agent_name: row.try_get("agent_name")?,
        },
        item_name: row.try_get("item_name")?,
        item_type: row.try_get("item_type")?,
        installation_name: row.try_get("installation_name")?,
        execution_status: status
            .parse::<ExecutionStatus>()
            .map_err(StatusStoreError::Backend)?,
        output: row.try_get("output")?,
        reported_on: row.try_get("reported_on")?,
        is_active: row.try_get("is_active")?,
    })
}

fn is_postgres_url(connection_string: &str) -> bool {
    connection_string.starts_with("postgres://") || connection_string.starts_with("postgresql://")
}

/// `"schema"."table"`, after checking both are plain identifiers
fn qualified_table(schema: &str, table: &str) -> Result<String, StatusStoreError> {
    validate_identifier(schema)?;
    validate_identifier(table)?;
    Ok(format!("\"{}\".\"{}\"", schema, table))
}

fn validate_identifier(name: &str) -> Result<(), StatusStoreError> {
    let mut chars = name.chars();
    let valid = name.len() <= MAX_IDENTIFIER_LEN
        && chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(StatusStoreError::InvalidName(name.to_string()))
    }
}
