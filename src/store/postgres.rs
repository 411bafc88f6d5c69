//! `PostgreSQL` credential store.
//!
//! Schema lives in `sql/schema.sql`. Unique violations (SQLSTATE 23505) are
//! mapped back to the column through the constraint name.

use async_trait::async_trait;
use sqlx::{Connection, PgPool};
use tracing::Instrument;
use uuid::Uuid;

use super::{CredentialStore, StoreError, UniqueField};
use crate::auth::models::{Account, NewAccount, Provider};

const ACCOUNT_COLUMNS: &str = "id, email, username, password_hash, avatar_url, github_id, google_id, created_at, updated_at";

#[derive(Clone, Debug)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_one_by(&self, column: &str, value: &str) -> Result<Account, StoreError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM users WHERE {column} = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        sqlx::query_as::<_, Account>(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(map_sqlx_error)?
            .ok_or(StoreError::NotFound)
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

/// Resolve a constraint name from `sql/schema.sql` to the guarded column.
fn unique_field_for(constraint: &str) -> Option<UniqueField> {
    match constraint {
        "users_email_key" => Some(UniqueField::Email),
        "users_username_key" => Some(UniqueField::Username),
        "users_github_id_key" => Some(UniqueField::ProviderId(Provider::Github)),
        "users_google_id_key" => Some(UniqueField::ProviderId(Provider::Google)),
        _ => None,
    }
}

fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    if is_unique_violation(&err) {
        let constraint = match &err {
            sqlx::Error::Database(db_err) => db_err.constraint(),
            _ => None,
        };
        // A constraint we do not know means the schema drifted from `sql/schema.sql`.
        return match constraint.and_then(unique_field_for) {
            Some(field) => StoreError::Conflict(field),
            None => StoreError::Corrupt(format!(
                "unique violation on unrecognized constraint {}",
                constraint.unwrap_or("<unnamed>")
            )),
        };
    }
    match err {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Corrupt(err.to_string())
        }
        other => StoreError::Unavailable(other.to_string()),
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn create_account(&self, account: NewAccount) -> Result<Account, StoreError> {
        let query = format!(
            r"
            INSERT INTO users
                (email, username, password_hash, avatar_url, github_id, google_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {ACCOUNT_COLUMNS}
            "
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query.as_str()
        );
        sqlx::query_as::<_, Account>(&query)
            .bind(&account.email)
            .bind(&account.username)
            .bind(&account.password_hash)
            .bind(&account.avatar_url)
            .bind(&account.github_id)
            .bind(&account.google_id)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .map_err(map_sqlx_error)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Account, StoreError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM users WHERE id = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        sqlx::query_as::<_, Account>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(map_sqlx_error)?
            .ok_or(StoreError::NotFound)
    }

    async fn get_by_email(&self, email: &str) -> Result<Account, StoreError> {
        self.fetch_one_by("email", email).await
    }

    async fn get_by_username(&self, username: &str) -> Result<Account, StoreError> {
        self.fetch_one_by("username", username).await
    }

    async fn get_by_provider_id(
        &self,
        provider: Provider,
        provider_user_id: &str,
    ) -> Result<Account, StoreError> {
        let column = match provider {
            Provider::Github => "github_id",
            Provider::Google => "google_id",
        };
        self.fetch_one_by(column, provider_user_id).await
    }

    async fn update(&self, account: &Account) -> Result<Account, StoreError> {
        let query = format!(
            r"
            UPDATE users
            SET email = $2,
                username = $3,
                password_hash = $4,
                avatar_url = $5,
                github_id = $6,
                google_id = $7,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ACCOUNT_COLUMNS}
            "
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query.as_str()
        );
        sqlx::query_as::<_, Account>(&query)
            .bind(account.id)
            .bind(&account.email)
            .bind(&account.username)
            .bind(&account.password_hash)
            .bind(&account.avatar_url)
            .bind(&account.github_id)
            .bind(&account.google_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(map_sqlx_error)?
            .ok_or(StoreError::NotFound)
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let query = "DELETE FROM users WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let acquire_span = tracing::info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self
            .pool
            .acquire()
            .instrument(acquire_span)
            .await
            .map_err(map_sqlx_error)?;
        let ping_span =
            tracing::info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping()
            .instrument(ping_span)
            .await
            .map_err(map_sqlx_error)
    }
}
