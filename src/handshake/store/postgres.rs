//! Postgres-backed session store.
//!
//! Sessions must survive restarts, so they are the one piece of handshake
//! state that lives in the database. Rows are insert-once: `ON CONFLICT DO
//! NOTHING` keeps the first finalized token for an identity.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use sqlx::{PgPool, Row};
use tracing::{debug, Instrument};

use super::SessionStore;
use crate::handshake::error::StoreError;
use crate::handshake::identity::Identity;
use crate::handshake::models::SessionToken;

pub const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

#[derive(Clone, Debug)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the session table if it does not exist yet.
    ///
    /// # Errors
    /// Returns an error if the schema statement fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        let span = tracing::info_span!("db.query", db.system = "postgresql", db.operation = "CREATE");
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        debug!("session schema ready");
        Ok(())
    }
}

#[async_trait::async_trait]
impl SessionStore for PgSessionStore {
    async fn exists(&self, identity: &Identity) -> Result<bool, StoreError> {
        let query = "SELECT EXISTS(SELECT 1 FROM handshake_sessions WHERE identity = $1)";
        let span = tracing::info_span!("db.query", db.system = "postgresql", db.operation = "SELECT");
        let row = sqlx::query(query)
            .bind(identity.as_str())
            .fetch_one(&self.pool)
            .instrument(span)
            .await?;
        Ok(row.get(0))
    }

    async fn get(&self, identity: &Identity) -> Result<Option<SessionToken>, StoreError> {
        let query = "SELECT token, finalized_at FROM handshake_sessions WHERE identity = $1";
        let span = tracing::info_span!("db.query", db.system = "postgresql", db.operation = "SELECT");
        let row = sqlx::query(query)
            .bind(identity.as_str())
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        Ok(row.map(|row| {
            let token: String = row.get("token");
            let finalized_at: DateTime<Utc> = row.get("finalized_at");
            SessionToken {
                identity: identity.clone(),
                token: SecretString::from(token),
                finalized_at,
            }
        }))
    }

    async fn insert(&self, session: SessionToken) -> Result<bool, StoreError> {
        let query = r"
            INSERT INTO handshake_sessions (identity, token, finalized_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (identity) DO NOTHING
        ";
        let span = tracing::info_span!("db.query", db.system = "postgresql", db.operation = "INSERT");
        let result = sqlx::query(query)
            .bind(session.identity.as_str())
            .bind(session.token.expose_secret())
            .bind(session.finalized_at)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, identity: &Identity) -> Result<bool, StoreError> {
        let query = "DELETE FROM handshake_sessions WHERE identity = $1";
        let span = tracing::info_span!("db.query", db.system = "postgresql", db.operation = "DELETE");
        let result = sqlx::query(query)
            .bind(identity.as_str())
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
